// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Handlers for TIFF directories: plain TIFF based raw files (DNG, NEF,
//! CR2, ARW, PEF, ORF, RW2) and TIFF blocks embedded in other containers.
//!
//! Every directory becomes a [`TiffImage`] candidate. Which one holds
//! the raw payload is decided later, once all directories are known.

use log::{debug, trace, warn};

use super::{LoaderHint, MetadataBundle, TiffImage, entry_stream, entry_string, exif, mrw, parse_timestamp};
use crate::bits::Endian;
use crate::cfa::CFA;
use crate::decompressors::ljpeg::LjpegHeader;
use crate::decompressors::panasonic::DEFAULT_LOAD_FLAGS;
use crate::decompressors::sony::SonyDecrypt;
use crate::formats::tiff::ifd::{DEFAULT_MAX_DEPTH, IfdWalker};
use crate::formats::tiff::reader::is_tiff;
use crate::formats::tiff::{Entry, IFD, TiffFile};
use crate::tags::TiffCommonTag;
use crate::{Result, corrupt};

/// D65 white point in XYZ
pub const D65_WHITE: [f64; 3] = [0.950456, 1.0, 1.088754];

/// TIFF blocks nested in JPEG streams nested in TIFF blocks
const MAX_NESTING: usize = 4;

/// Files written by these tools are no longer camera raw data
const CONVERTERS: [&str; 5] = ["Adobe", "dcraw", "UFRaw", "Bibble", "Nikon Scan"];

/// Parse the TIFF structure at `base` and apply all its directories
pub fn parse_tiff(buf: &[u8], base: u32, md: &mut MetadataBundle) -> Result<TiffFile> {
  parse_nested(buf, base, md, 0)
}

fn parse_nested(buf: &[u8], base: u32, md: &mut MetadataBundle, depth: usize) -> Result<TiffFile> {
  let tiff = TiffFile::parse(buf, base)?;
  debug!("TIFF at {}: {} root directories", base, tiff.chain.len());
  for ifd in &tiff.chain {
    apply_directory(buf, ifd, md, depth)?;
  }
  Ok(tiff)
}

/// Apply the tags of a single directory and its sub-directories
pub fn apply_ifd(buf: &[u8], ifd: &IFD, md: &mut MetadataBundle) -> Result<()> {
  apply_directory(buf, ifd, md, 0)
}

/// DNG color tags of one directory, combined after all entries are seen
struct DngColor {
  cm: Option<[[f64; 3]; 4]>,
  cc: [[f64; 4]; 4],
  ab: [f64; 4],
  asn: [f64; 4],
  xyz: [f64; 3],
}

impl DngColor {
  fn new() -> Self {
    let mut cc = [[0.0; 4]; 4];
    for (i, row) in cc.iter_mut().enumerate() {
      row[i] = 1.0;
    }
    Self {
      cm: None,
      cc,
      ab: [1.0; 4],
      asn: [0.0; 4],
      xyz: [1.0; 3],
    }
  }

  fn apply(mut self, colors: usize, md: &mut MetadataBundle) {
    for i in 0..colors {
      for c in 0..colors {
        self.cc[i][c] *= self.ab[i];
      }
    }
    match self.cm {
      Some(cm) => {
        let mut cam_xyz = [[0.0; 3]; 4];
        for c in 0..colors {
          for i in 0..3 {
            cam_xyz[c][i] = (0..colors).map(|j| self.cc[c][j] * cm[j][i] * self.xyz[i]).sum();
          }
        }
        md.cam_xyz = Some(cam_xyz);
      }
      None => {
        for c in 0..colors {
          md.pre_mul[c] /= self.cc[c][c] as f32;
        }
      }
    }
    if self.asn[0] != 0.0 {
      let mut mul = [0.0; 4];
      for c in 0..colors {
        if self.asn[c] != 0.0 {
          mul[c] = (1.0 / self.asn[c]) as f32;
        }
      }
      md.wb.set(mul);
    }
  }
}

/// CFA pattern and plane colors of one directory
struct CfaPattern {
  pattern: [u8; 16],
  len: usize,
  plane_colors: [u8; 4],
}

impl Default for CfaPattern {
  fn default() -> Self {
    Self {
      pattern: [0; 16],
      len: 16,
      plane_colors: [0, 1, 2, 3],
    }
  }
}

impl CfaPattern {
  fn filters(&self, colors: usize) -> u32 {
    let mut tab = [0_u8; 256];
    for c in 0..colors.min(4) {
      tab[self.plane_colors[c] as usize] = c as u8;
    }
    CFA::from_pattern(&self.pattern[..self.len.max(1)], &tab).filters()
  }
}

/// Location and key of the encrypted Sony SR2 directory
#[derive(Default)]
struct SonyPrivate {
  offset: u32,
  length: u32,
  key: u32,
}

fn apply_directory(buf: &[u8], ifd: &IFD, md: &mut MetadataBundle, depth: usize) -> Result<()> {
  use TiffCommonTag as T;

  let idx = md.tiff_images.len();
  md.tiff_images.push(TiffImage::default());
  let mut img = TiffImage::default();
  let mut color = DngColor::new();
  let mut cfa = CfaPattern::default();
  let mut sony = SonyPrivate::default();
  let (mut blrr, mut blrc) = (1, 1);
  let endian = ifd.endian;

  for (raw_tag, entry) in ifd.entries() {
    let Ok(tag) = T::try_from(*raw_tag) else {
      trace!("TIFF: skipping tag {:#x}", raw_tag);
      continue;
    };
    let short_value = entry.value_type() == 3;
    match tag {
      T::PanaSensorLeft => md.width = Some(entry.force_u32(0)),
      T::PanaSensorBottom => md.height = Some(entry.force_u32(0)),
      T::PanaSensorRight => md.width = Some(md.width.unwrap_or(0) + entry.force_u32(0)),
      T::PanaCfaPattern => md.filters = Some(entry.force_u32(0)),
      T::PanaRedBalance | T::PanaBlueBalance => {
        if short_value && entry.count() == 1 {
          let c = (*raw_tag as usize - 0x11) * 2;
          md.wb.set_channel(c, entry.force_f32(0) / 256.0);
        }
      }
      T::PanaIso => {
        if short_value {
          md.shot.iso_speed = Some(entry.force_f32(0));
        }
      }
      T::PanaWbRed | T::PanaWbGreen | T::PanaWbBlue => {
        md.wb.set_channel(*raw_tag as usize - 0x24, entry.force_f32(0));
      }
      T::PanaWbInfo => {
        if entry.count() >= 50 && !md.wb.is_set() {
          let mut s = entry_stream(buf, entry, endian);
          s.consume_bytes(12);
          let mut mul = md.wb.get();
          for m in mul.iter_mut().take(3) {
            *m = s.get_u16()? as f32;
          }
          md.wb.set(mul);
        }
      }
      T::PanaWidth | T::ImageWidth => img.width = entry.force_u32(0),
      T::PanaLength | T::ImageLength => img.height = entry.force_u32(0),
      T::BitsPerSample => {
        img.samples = entry.count() & 7;
        img.bps = entry.force_u32(0);
      }
      T::Compression => img.compression = entry.force_u32(0),
      T::PhotometricInt => img.photometric = entry.force_u16(0),
      T::ImageDescription => md.description = entry_string(entry),
      T::Make => md.make = entry_string(entry),
      T::Model => md.model = entry_string(entry),
      T::PanaRawOffset => {
        if entry.value_type() == 4 {
          md.loader = Some(LoaderHint::Panasonic);
          md.load_flags = Some(DEFAULT_LOAD_FLAGS);
          strip_offset(buf, &mut img, entry, ifd.base, md, depth)?;
        }
      }
      T::StripOffsets | T::JPEGInterchangeFormat => strip_offset(buf, &mut img, entry, ifd.base, md, depth)?,
      T::Orientation => img.flip = b"50132467"[entry.force_u32(0) as usize & 7] - b'0',
      T::SamplesPerPixel => img.samples = entry.force_u32(0) & 7,
      T::StripByteCounts | T::JPEGInterchangeFormatLength => img.bytes = entry.force_u32(0),
      T::Software => {
        md.software = entry_string(entry);
        if CONVERTERS.iter().any(|p| md.software.starts_with(p)) || md.software == "Digital Photo Professional" {
          debug!("TIFF: written by {}, not a raw file", md.software);
          md.is_raw = false;
        }
      }
      T::DateTime => {
        if let Some(ts) = parse_timestamp(&entry_string(entry)) {
          md.timestamp = Some(ts);
        }
      }
      T::Artist => md.artist = entry_string(entry),
      T::TileWidth => img.tile_width = entry.force_u32(0),
      T::TileLength => img.tile_length = entry.force_u32(0),
      T::TileOffsets => {
        img.tile_offsets = (0..entry.count() as usize).map(|i| entry.force_u32(i)).collect();
        img.offset = entry.force_u32(0);
      }
      T::SubIFDs => {
        if md.model == "DSLR-A100" && img.width == 3872 {
          md.loader = Some(LoaderHint::SonyArw);
          md.data_offset = Some(entry.force_u32(0).wrapping_add(ifd.base));
        } else if let Some(subs) = ifd.sub_ifds().get(raw_tag) {
          for sub in subs {
            apply_directory(buf, sub, md, depth)?;
          }
        }
      }
      T::SonyCurve => sony_curve(entry, md),
      T::SonyOffset => sony.offset = entry.force_u32(0),
      T::SonyLength => sony.length = entry.force_u32(0),
      T::SonyKey => sony.key = entry.force_u32(0),
      T::SonyWb => {
        let mut mul = [0.0; 4];
        for c in 0..4 {
          mul[c ^ (c < 2) as usize] = entry.force_f32(c);
        }
        md.wb.set(mul);
      }
      T::SonyWbAlt => {
        let mut mul = [0.0; 4];
        for (c, m) in mul.iter_mut().enumerate() {
          *m = entry.force_f32(c);
        }
        let i = ((mul[1] == 1024.0 && mul[2] == 1024.0) as usize) << 1;
        mul.swap(i, i + 1);
        md.wb.set(mul);
      }
      T::Model2 => md.model2 = entry_string(entry),
      T::LeafMarker | T::LeafMetadata => md.make = "Leaf".into(),
      T::LeafWb => {
        let mut mul = [0.0; 4];
        for c in 0..4 {
          let v = entry.force_f32(c);
          mul[c ^ 1] = if v > 0.0 { 4096.0 / v } else { 0.0 };
        }
        md.wb.set(mul);
      }
      T::HasselbladMarker => {
        if md.make.is_empty() {
          md.make = "Hasselblad".into();
        }
      }
      T::CFAPattern => {
        let data = entry.as_bytes().unwrap_or_default();
        cfa.len = data.len().min(16);
        cfa.pattern[..cfa.len].copy_from_slice(&data[..cfa.len]);
        let mut seen = 0_u32;
        let mut colors = 0;
        for p in &cfa.pattern[..cfa.len] {
          let bit = 1_u32.checked_shl(*p as u32).unwrap_or(0);
          colors += (seen & bit == 0) as usize;
          seen |= bit;
        }
        match seen {
          0o70 => cfa.plane_colors[..3].copy_from_slice(&[3, 4, 5]),
          0o72 => cfa.plane_colors.copy_from_slice(&[5, 3, 4, 1]),
          _ => {}
        }
        md.colors = Some(colors);
        md.filters = Some(cfa.filters(colors));
      }
      T::KodakIfd => {
        if let Some(subs) = ifd.sub_ifds().get(raw_tag) {
          for sub in subs {
            apply_kodak_ifd(buf, sub, md)?;
          }
        }
      }
      T::ExposureTime => md.shot.shutter = Some(entry.force_f32(0)),
      T::FNumber => md.shot.aperture = Some(entry.force_f32(0)),
      T::ExifIFDPointer => {
        if let Some(subs) = ifd.sub_ifds().get(raw_tag) {
          for sub in subs {
            exif::apply_exif(buf, sub, md)?;
          }
        }
      }
      T::GPSInfo => {
        if let Some(subs) = ifd.sub_ifds().get(raw_tag) {
          for sub in subs {
            exif::apply_gps(sub, md);
          }
        }
      }
      T::FocalLength => md.shot.focal_len = Some(entry.force_f32(0)),
      T::ImageNumber => md.shot.shot_order = Some(entry.force_u32(0)),
      T::DNGVersion => {
        md.dng_version = (0..4).fold(0, |v, i| (v << 8) + entry.force_u32(i));
        if md.make.is_empty() {
          md.make = String::from("DNG");
        }
        md.is_raw = true;
      }
      T::CFAPlaneColor => {
        let colors = (entry.count() as usize).min(4);
        for c in 0..colors {
          cfa.plane_colors[c] = entry.force_u32(c) as u8;
        }
        md.colors = Some(colors);
        md.filters = Some(cfa.filters(colors));
      }
      T::CFALayout => {
        if entry.force_u32(0) == 2 {
          md.fuji.fuji_width = 1;
          md.filters = Some(0x49494949);
        }
      }
      T::Linearization | T::LinearizationTable => linear_table(entry, md),
      T::BlackLevelRepeatDim => {
        blrr = entry.force_u32(0);
        blrc = entry.force_u32(1);
      }
      T::BlackLevels => black_levels(entry, blrr, blrc, md),
      T::BlackLevelDeltaH | T::BlackLevelDeltaV => {
        let n = entry.count() as usize;
        if n > 0 {
          let mean = (0..n).map(|i| entry.force_f64(i)).sum::<f64>() / n as f64;
          md.black = Some((md.black.unwrap_or(0) as f64 + mean + 0.5).max(0.0) as u32);
        }
      }
      T::WhiteLevel => md.maximum = Some(entry.force_u32(0)),
      T::DefaultScale => {
        let den = entry.force_f64(1);
        if den != 0.0 {
          md.pixel_aspect = Some(entry.force_f64(0) / den);
        }
      }
      T::ColorMatrix1 | T::ColorMatrix2 => {
        let colors = md.colors.unwrap_or(3).min(4);
        let mut cm = [[0.0; 3]; 4];
        for c in 0..colors {
          for j in 0..3 {
            cm[c][j] = entry.force_f64(c * 3 + j);
          }
        }
        color.cm = Some(cm);
      }
      T::CameraCalibration1 | T::CameraCalibration2 => {
        let colors = md.colors.unwrap_or(3).min(4);
        for i in 0..colors {
          for c in 0..colors {
            color.cc[i][c] = entry.force_f64(i * colors + c);
          }
        }
      }
      T::AnalogBalance => {
        for c in 0..md.colors.unwrap_or(3).min(4) {
          color.ab[c] = entry.force_f64(c);
        }
      }
      T::AsShotNeutral => {
        for c in 0..md.colors.unwrap_or(3).min(4) {
          color.asn[c] = entry.force_f64(c);
        }
      }
      T::AsShotWhiteXY => {
        let (x, y) = (entry.force_f64(0), entry.force_f64(1));
        color.xyz = [x / D65_WHITE[0], y / D65_WHITE[1], (1.0 - x - y) / D65_WHITE[2]];
      }
      T::DNGPrivateData => {
        if md.dng_version == 0 {
          let offset = entry_stream(buf, entry, endian).get_u32()?.wrapping_add(ifd.base);
          if let Err(err) = mrw::parse_minolta(buf, offset as usize, md) {
            warn!("TIFF: ignoring private MRW block at {}: {}", offset, err);
          }
        }
      }
      T::Cr2Slice => md.cr2_slice = Some([entry.force_u16(0), entry.force_u16(1), entry.force_u16(2)]),
      T::ActiveArea => {
        let (top, left) = (entry.force_u32(0), entry.force_u32(1));
        md.top_margin = Some(top);
        md.left_margin = Some(left);
        md.height = Some(entry.force_u32(2).saturating_sub(top));
        md.width = Some(entry.force_u32(3).saturating_sub(left));
      }
      T::MaskedAreas => {
        md.masked_areas = (0..entry.count() as usize / 4)
          .map(|i| [entry.force_u32(i * 4), entry.force_u32(i * 4 + 1), entry.force_u32(i * 4 + 2), entry.force_u32(i * 4 + 3)])
          .collect();
      }
      _ => {}
    }
  }

  if sony.length > 0 && depth == 0 {
    apply_sony_private(buf, &sony, endian, md)?;
  }
  color.apply(md.colors.unwrap_or(3).min(4), md);
  md.tiff_images[idx] = img;
  Ok(())
}

/// Payload offset of a directory. Directories without a bit depth may
/// point to a lossless JPEG stream, its frame header gives the geometry.
fn strip_offset(buf: &[u8], img: &mut TiffImage, entry: &Entry, base: u32, md: &mut MetadataBundle, depth: usize) -> Result<()> {
  img.offset = entry.force_u32(0).wrapping_add(base);
  if img.bps != 0 || img.offset == 0 {
    return Ok(());
  }
  let Some(data) = buf.get(img.offset as usize..) else {
    return Ok(());
  };
  if !data.starts_with(&[0xff, 0xd8]) {
    return Ok(());
  }
  match LjpegHeader::parse(data) {
    Ok(jh) => {
      img.compression = 6;
      img.width = jh.wide as u32;
      img.height = jh.high as u32;
      img.bps = jh.bits;
      img.samples = jh.clrs as u32;
      if !(jh.sraw != 0 || jh.clrs & 1 == 1) {
        img.width *= jh.clrs as u32;
      }
      let inner = img.offset + 12;
      if depth < MAX_NESTING && is_tiff(buf, inner as usize) {
        if let Err(err) = parse_nested(buf, inner, md, depth + 1) {
          debug!("TIFF: ignoring TIFF block inside JPEG stream at {}: {}", inner, err);
        }
      }
    }
    Err(err) => debug!("TIFF: no JPEG frame header at {}: {}", img.offset, err),
  }
  Ok(())
}

/// Tone curve of up to 4096 entries, the last value repeats
fn linear_table(entry: &Entry, md: &mut MetadataBundle) {
  let len = (entry.count() as usize).min(0x1000);
  if len == 0 {
    return;
  }
  let mut curve: Vec<u16> = (0..len).map(|i| entry.force_u16(i)).collect();
  curve.resize(0x1000, curve[len - 1]);
  md.maximum = Some(curve[0xfff] as u32);
  md.curve = Some(curve);
}

/// Sony ARW2 curve: five linear segments with slopes 1, 2, 4, 8 and 16
fn sony_curve(entry: &Entry, md: &mut MetadataBundle) {
  let mut knots = [0_usize, 0, 0, 0, 0, 4095];
  for c in 0..4 {
    knots[c + 1] = (entry.force_u32(c) as usize >> 2) & 0xfff;
  }
  let mut curve = md.curve.take().unwrap_or_default();
  for i in curve.len()..0x10000 {
    curve.push(i as u16);
  }
  for i in 0..5 {
    for j in knots[i] + 1..=knots[i + 1] {
      curve[j] = curve[j - 1].wrapping_add(1 << i);
    }
  }
  md.curve = Some(curve);
}

/// DNG BlackLevel, per CFA position when a repeat pattern is declared
fn black_levels(entry: &Entry, blrr: u32, blrc: u32, md: &mut MetadataBundle) {
  let black = entry.force_f64(0);
  let filters = md.filters.unwrap_or(0);
  if filters == 0 || filters == u32::MAX {
    md.black = Some(black.max(0.0) as u32);
    return;
  }
  let mut next = 1;
  let mut take = |cond: bool, fallback: f64| {
    if cond {
      next += 1;
      entry.force_f64(next - 1)
    } else {
      fallback
    }
  };
  let d1 = take(blrc == 2, black);
  let d2 = take(blrr == 2, black);
  let d3 = take(blrc == 2 && blrr == 2, d1);
  let mut cfa = CFA::from_filters(filters);
  if md.colors.unwrap_or(3) == 3 {
    cfa = cfa.split_greens();
  }
  for (c, d) in [black, d1, d2, d3].into_iter().enumerate() {
    let color = (cfa.filters() >> (c << 1) & 3) as usize;
    md.cblack[color] = d.max(0.0) as u32;
  }
  md.black = Some(0);
}

/// Decrypt the SR2 private directory and apply its tags. Offsets inside
/// the decrypted directory are absolute file offsets.
fn apply_sony_private(buf: &[u8], sony: &SonyPrivate, endian: Endian, md: &mut MetadataBundle) -> Result<()> {
  let (offset, length) = (sony.offset as usize, sony.length as usize);
  let src = buf
    .get(offset..offset.saturating_add(length))
    .ok_or_else(|| corrupt!("SR2: private block at {} with {} bytes is behind EOF ({} bytes)", offset, length, buf.len()))?;
  let mut plain = vec![0_u8; offset + length];
  plain[offset..].copy_from_slice(src);
  SonyDecrypt::new(sony.key).decrypt(&mut plain[offset..]);
  let mut walker = IfdWalker::new(&plain, DEFAULT_MAX_DEPTH, &[]);
  if let Some(ifd) = walker.parse_ifd(offset as u32, 0, endian, 0)? {
    debug!("SR2: {} private tags", ifd.entry_count());
    apply_directory(&plain, &ifd, md, 1)?;
    // The private directory is not an image candidate
    md.tiff_images.pop();
  }
  Ok(())
}

/// Kodak private directory, white balance and geometry
fn apply_kodak_ifd(buf: &[u8], ifd: &IFD, md: &mut MetadataBundle) -> Result<()> {
  const WB_TAGS: [u16; 7] = [64037, 64040, 64039, 64041, 0, 0, 64042];
  let mut wbi: i32 = -2;
  let mut wbtemp = 6500.0;
  let mut mul = [1.0_f64; 3];
  for (tag, entry) in ifd.entries() {
    let tag = *tag;
    match tag {
      1020 => wbi = entry.force_i32(0),
      1021 if entry.count() == 72 => {
        let mut s = entry_stream(buf, entry, ifd.endian);
        s.consume_bytes(40);
        let mut cam = md.wb.get();
        for m in cam.iter_mut().take(3) {
          *m = 2048.0 / s.get_u16()?.max(1) as f32;
        }
        md.wb.set(cam);
        wbi = -2;
      }
      2118 => wbtemp = entry.force_f64(0),
      2317 => linear_table(entry, md),
      6020 => md.shot.iso_speed = Some(entry.force_f32(0)),
      64013 => wbi = entry.force_u32(0) as u8 as i32,
      64019 => md.width = Some(entry.force_u32(0)),
      64020 => md.height = Some((entry.force_u32(0) + 1) & !1),
      _ => {}
    }
    if tag as i32 == 2130 + wbi {
      for (c, m) in mul.iter_mut().enumerate() {
        *m = entry.force_f64(c);
      }
    }
    if wbi >= 0 && tag as i32 == 2140 + wbi {
      let mut cam = md.wb.get();
      for c in 0..3 {
        let num: f64 = (0..4).map(|i| entry.force_f64(c * 4 + i) * (wbtemp / 100.0).powi(i as i32)).sum();
        if num * mul[c] != 0.0 {
          cam[c] = (2048.0 / (num * mul[c])) as f32;
        }
      }
      md.wb.set(cam);
    }
    if (0..7).contains(&wbi) && WB_TAGS[wbi as usize] == tag {
      let mut cam = md.wb.get();
      for (c, m) in cam.iter_mut().take(3).enumerate() {
        *m = entry.force_f32(c);
      }
      md.wb.set(cam);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;
  use crate::formats::tiff::{Rational, SRational, TiffWriter};

  fn write_tiff(build: impl FnOnce(&mut TiffWriter) -> crate::formats::tiff::Result<u32>) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut output = Cursor::new(Vec::new());
    let mut tiff = TiffWriter::new(&mut output)?;
    let ifd0 = build(&mut tiff)?;
    tiff.build(ifd0)?;
    Ok(output.into_inner())
  }

  #[test]
  fn geometry_and_strings() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = write_tiff(|tiff| {
      let mut dir = tiff.new_directory();
      dir.add_tag(TiffCommonTag::Make, "NIKON CORPORATION")?;
      dir.add_tag(TiffCommonTag::Model, "NIKON D200")?;
      dir.add_tag(TiffCommonTag::ImageWidth, [3904_u32])?;
      dir.add_tag(TiffCommonTag::ImageLength, [2616_u32])?;
      dir.add_tag(TiffCommonTag::BitsPerSample, [12_u16])?;
      dir.add_tag(TiffCommonTag::Compression, [34713_u16])?;
      dir.add_tag(TiffCommonTag::StripOffsets, [4096_u32])?;
      dir.add_tag(TiffCommonTag::Orientation, [6_u16])?;
      dir.add_tag(TiffCommonTag::DateTime, "2009:06:21 14:03:55")?;
      dir.build()
    })?;
    let mut md = MetadataBundle::new();
    parse_tiff(&buf, 0, &mut md)?;
    assert_eq!(md.make, "NIKON CORPORATION");
    assert_eq!(md.model, "NIKON D200");
    assert_eq!(md.tiff_images.len(), 1);
    let img = &md.tiff_images[0];
    assert_eq!((img.width, img.height, img.bps, img.compression), (3904, 2616, 12, 34713));
    assert_eq!(img.samples, 1);
    assert_eq!(img.offset, 4096);
    assert_eq!(img.flip, 6);
    assert!(md.timestamp.is_some());
    assert!(md.is_raw);
    Ok(())
  }

  #[test]
  fn converter_output_is_not_raw() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = write_tiff(|tiff| {
      let mut dir = tiff.new_directory();
      dir.add_tag(TiffCommonTag::Software, "Adobe Photoshop CS5")?;
      dir.build()
    })?;
    let mut md = MetadataBundle::new();
    parse_tiff(&buf, 0, &mut md)?;
    assert!(!md.is_raw);
    Ok(())
  }

  #[test]
  fn cfa_pattern_to_filters() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = write_tiff(|tiff| {
      let mut dir = tiff.new_directory();
      dir.add_tag(TiffCommonTag::CFARepeatPatternDim, [2_u16, 2])?;
      dir.add_tag(TiffCommonTag::CFAPattern, [0_u8, 1, 1, 2])?;
      dir.build()
    })?;
    let mut md = MetadataBundle::new();
    parse_tiff(&buf, 0, &mut md)?;
    assert_eq!(md.filters, Some(0x94949494));
    assert_eq!(md.colors, Some(3));
    Ok(())
  }

  #[test]
  fn dng_color_and_levels() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let matrix: Vec<SRational> = [10000, 0, 0, 0, 10000, 0, 0, 0, 10000].iter().map(|v| SRational::new(*v, 10000)).collect();
    let buf = write_tiff(|tiff| {
      let mut dir = tiff.new_directory();
      dir.add_tag(TiffCommonTag::DNGVersion, [1_u8, 4, 0, 0])?;
      dir.add_tag(TiffCommonTag::CFAPattern, [0_u8, 1, 1, 2])?;
      dir.add_tag(TiffCommonTag::BlackLevelRepeatDim, [2_u16, 2])?;
      dir.add_tag(TiffCommonTag::BlackLevels, [256_u16, 257, 258, 259])?;
      dir.add_tag(TiffCommonTag::WhiteLevel, [16383_u16])?;
      dir.add_tag(TiffCommonTag::ColorMatrix2, matrix)?;
      dir.add_tag(TiffCommonTag::AsShotNeutral, [Rational::new(1, 2), Rational::new(1, 1), Rational::new(4, 5)])?;
      dir.add_tag(TiffCommonTag::ActiveArea, [8_u32, 16, 1008, 1516])?;
      dir.build()
    })?;
    let mut md = MetadataBundle::new();
    parse_tiff(&buf, 0, &mut md)?;
    assert_eq!(md.dng_version, 0x01040000);
    assert_eq!(md.make, "DNG");
    assert_eq!(md.maximum, Some(16383));
    assert_eq!(md.black, Some(0));
    // RGGB: first green keeps index 1, the second green becomes 3
    assert_eq!(md.cblack, [256, 257, 259, 258]);
    let cam_xyz = md.cam_xyz.ok_or("no matrix")?;
    assert!((cam_xyz[1][1] - 1.0).abs() < 1e-9);
    assert!(cam_xyz[0][1].abs() < 1e-9);
    let wb = md.wb.get();
    assert!((wb[0] - 2.0).abs() < 1e-6);
    assert!((wb[2] - 1.25).abs() < 1e-6);
    assert_eq!((md.top_margin, md.left_margin, md.width, md.height), (Some(8), Some(16), Some(1500), Some(1000)));
    Ok(())
  }

  #[test]
  fn linearization_sets_maximum() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let table: Vec<u16> = (0..256).map(|v| v * 16).collect();
    let buf = write_tiff(|tiff| {
      let mut dir = tiff.new_directory();
      dir.add_tag(TiffCommonTag::LinearizationTable, table)?;
      dir.build()
    })?;
    let mut md = MetadataBundle::new();
    parse_tiff(&buf, 0, &mut md)?;
    let curve = md.curve.as_ref().ok_or("no curve")?;
    assert_eq!(curve.len(), 0x1000);
    assert_eq!(curve[255], 4080);
    assert_eq!(curve[4000], 4080);
    assert_eq!(md.maximum, Some(4080));
    Ok(())
  }

  /// Little endian entry with an inline value
  fn put_entry(buf: &mut Vec<u8>, tag: u16, typ: u16, count: u32, value: u32) {
    buf.extend_from_slice(&tag.to_le_bytes());
    buf.extend_from_slice(&typ.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
  }

  #[test]
  fn sony_private_directory() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let key = 0x0bad_cafe;
    let sr2 = 50_u32;
    let mut buf = vec![b'I', b'I', 42, 0, 8, 0, 0, 0];
    buf.extend_from_slice(&3_u16.to_le_bytes());
    put_entry(&mut buf, 29184, 4, 1, sr2);
    put_entry(&mut buf, 29185, 4, 1, 28);
    put_entry(&mut buf, 29217, 4, 1, key);
    buf.extend_from_slice(&0_u32.to_le_bytes());
    assert_eq!(buf.len(), sr2 as usize);
    // One SonyWb entry with its data right behind the directory
    buf.extend_from_slice(&1_u16.to_le_bytes());
    put_entry(&mut buf, 29443, 3, 4, sr2 + 18);
    buf.extend_from_slice(&0_u32.to_le_bytes());
    for v in [1024_u16, 2048, 1500, 1024] {
      buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend_from_slice(&[0, 0]);
    // The cipher is its own inverse
    SonyDecrypt::new(key).decrypt(&mut buf[sr2 as usize..]);

    let mut md = MetadataBundle::new();
    parse_tiff(&buf, 0, &mut md)?;
    assert_eq!(md.wb.get(), [2048.0, 1024.0, 1500.0, 1024.0]);
    assert_eq!(md.tiff_images.len(), 1);
    Ok(())
  }

  #[test]
  fn sony_private_block_behind_eof() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut buf = vec![b'I', b'I', 42, 0, 8, 0, 0, 0];
    buf.extend_from_slice(&2_u16.to_le_bytes());
    put_entry(&mut buf, 29184, 4, 1, 1000);
    put_entry(&mut buf, 29185, 4, 1, 64);
    buf.extend_from_slice(&0_u32.to_le_bytes());
    let mut md = MetadataBundle::new();
    let err = parse_tiff(&buf, 0, &mut md).map(|_| ()).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::CorruptMetadata);
    Ok(())
  }
}
