// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use super::{
  Entry, IFD, Result, TiffError,
  ifd::{DEFAULT_MAX_DEPTH, IfdWalker},
};
use crate::{
  bits::Endian,
  envparams::rawcore_max_ifd_depth,
  tags::{TiffCommonTag, TiffTag},
};

/// A parsed TIFF structure: the chain of root IFDs with their sub-IFDs.
#[derive(Debug, Clone, Default)]
pub struct TiffFile {
  /// Offset of the TIFF header inside the containing file
  pub base: u32,
  pub endian: Endian,
  pub chain: Vec<IFD>,
}

/// Tags whose values point to nested directories handled by
/// the generic walker.
pub fn wellknown_sub_ifd_tags() -> Vec<u16> {
  vec![
    TiffCommonTag::SubIFDs.into(),
    TiffCommonTag::ExifIFDPointer.into(),
    TiffCommonTag::GPSInfo.into(),
    TiffCommonTag::KodakIfd.into(),
  ]
}

/// Check for a TIFF header (`II*\0` or `MM\0*`) at `base`.
pub fn is_tiff(buf: &[u8], base: usize) -> bool {
  matches!(buf.get(base..base + 4), Some([0x49, 0x49, 0x2a, 0x00]) | Some([0x4d, 0x4d, 0x00, 0x2a]))
}

impl TiffFile {
  /// Parse a TIFF structure whose header starts at `base`.
  /// Any 16 bit magic is accepted, vendors use their own (ORF, RW2).
  pub fn parse(buf: &[u8], base: u32) -> Result<TiffFile> {
    Self::parse_with(buf, base, &wellknown_sub_ifd_tags(), 32)
  }

  pub fn parse_with(buf: &[u8], base: u32, sub_tags: &[u16], max_chain: usize) -> Result<TiffFile> {
    let header = buf
      .get(base as usize..base as usize + 8)
      .ok_or_else(|| TiffError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, format!("TIFF header at {} is behind EOF", base))))?;
    let endian = Endian::from_marker(header).ok_or_else(|| TiffError::General(format!("TIFF: don't know marker {:02x?}", &header[0..2])))?;
    let first = endian.read_u32(header, 4);
    if first == 0 {
      return Err(TiffError::General("Invalid TIFF header, contains no root IFD".to_string()));
    }
    if base as u64 + first as u64 >= buf.len() as u64 {
      // Header only, the file was cut short
      return Err(TiffError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("TIFF root IFD at {} is behind EOF ({} bytes)", first, buf.len()),
      )));
    }
    let max_depth = rawcore_max_ifd_depth().unwrap_or(DEFAULT_MAX_DEPTH);
    let mut walker = IfdWalker::new(buf, max_depth, sub_tags);
    let chain = walker.parse_chain(first, base, endian, max_chain)?;
    Ok(TiffFile { base, endian, chain })
  }

  /// Magic number following the byte order marker
  pub fn magic(buf: &[u8], base: u32) -> Option<u16> {
    let header = buf.get(base as usize..base as usize + 4)?;
    Endian::from_marker(header).map(|e| e.read_u16(header, 2))
  }

  pub fn root_ifd(&self) -> Option<&IFD> {
    self.chain.first()
  }

  /// All directories, root chain first, sub-IFDs depth first.
  pub fn all_ifds(&self) -> Vec<&IFD> {
    self.chain.iter().flat_map(|ifd| ifd.flatten()).collect()
  }

  pub fn get_entry<T: TiffTag>(&self, tag: T) -> Option<&Entry> {
    self.all_ifds().into_iter().find_map(|ifd| ifd.get_entry(tag))
  }

  pub fn has_entry<T: TiffTag>(&self, tag: T) -> bool {
    self.get_entry(tag).is_some()
  }

  pub fn find_ifds_with_tag<T: TiffTag>(&self, tag: T) -> Vec<&IFD> {
    self.all_ifds().into_iter().filter(|ifd| ifd.has_entry(tag)).collect()
  }

  pub fn find_first_ifd_with_tag<T: TiffTag>(&self, tag: T) -> Option<&IFD> {
    self.find_ifds_with_tag(tag).into_iter().next()
  }
}
