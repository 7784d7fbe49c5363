// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use thiserror::Error;

pub mod entry;
pub mod ifd;
pub mod reader;
pub mod value;
pub mod writer;

pub use entry::Entry;
pub use ifd::IFD;
pub use reader::TiffFile;
pub use value::{Rational, SRational, TiffAscii, Value};
pub use writer::{DirectoryWriter, TiffWriter, WriteAndSeek};

const TIFF_MAGIC: u16 = 42;

#[allow(clippy::upper_case_acronyms)]
pub enum CompressionMethod {
  None = 1,
}

impl From<CompressionMethod> for Value {
  fn from(value: CompressionMethod) -> Self {
    Value::Short(vec![value as u16])
  }
}

#[allow(clippy::upper_case_acronyms)]
pub enum PhotometricInterpretation {
  BlackIsZero = 1,
  RGB = 2,
  CFA = 32803,
}

impl From<PhotometricInterpretation> for Value {
  fn from(value: PhotometricInterpretation) -> Self {
    Value::Short(vec![value as u16])
  }
}

pub enum PlanarConfiguration {
  Chunky = 1,
}

impl From<PlanarConfiguration> for Value {
  fn from(value: PlanarConfiguration) -> Self {
    Value::Short(vec![value as u16])
  }
}

/// Type to represent resolution units
pub enum ResolutionUnit {
  None = 1,
  Inch = 2,
}

impl From<ResolutionUnit> for Value {
  fn from(value: ResolutionUnit) -> Self {
    Value::Short(vec![value as u16])
  }
}

/// Error variants for the TIFF layer
#[derive(Debug, Error)]
pub enum TiffError {
  /// Overflow of input, size constraints...
  #[error("Overflow error: {}", _0)]
  Overflow(String),

  #[error("General error: {}", _0)]
  General(String),

  /// Structure points outside of the file or is otherwise malformed
  #[error("Corrupt structure: {}", _0)]
  Corrupt(String),

  /// Error on internal cursor type
  #[error("I/O error: {:?}", _0)]
  Io(#[from] std::io::Error),
}

/// Result type for TIFF results
pub type Result<T> = std::result::Result<T, TiffError>;

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use crate::tags::TiffCommonTag;

  use super::*;

  #[test]
  fn write_and_read_back() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut output = Cursor::new(Vec::new());
    let mut tiff = TiffWriter::new(&mut output)?;

    let exif_offset = {
      let mut dir2 = tiff.new_directory();
      dir2.add_tag(33434_u16, Rational::new(1, 250))?;
      dir2.build()?
    };

    let mut dir = tiff.new_directory();
    dir.add_tag(TiffCommonTag::ExifIFDPointer, exif_offset)?;
    dir.add_tag(TiffCommonTag::ActiveArea, [9_u16, 10_u16, 11_u16, 12])?;
    dir.add_tag(TiffCommonTag::WhiteLevel, [11_u16])?;
    dir.add_tag(TiffCommonTag::BitsPerSample, [12_u32])?;
    dir.add_tag(TiffCommonTag::Artist, "AT")?;
    let ifd0 = dir.build()?;
    tiff.build(ifd0)?;

    let buf = output.into_inner();
    assert!(reader::is_tiff(&buf, 0));
    let file = TiffFile::parse(&buf, 0)?;
    let root = file.root_ifd().ok_or("no root")?;
    assert_eq!(root.entry_count(), 5);
    assert_eq!(root.get_entry(TiffCommonTag::WhiteLevel).map(|e| e.force_u32(0)), Some(11));
    assert_eq!(root.get_entry(TiffCommonTag::Artist).and_then(|e| e.as_string().map(String::from)), Some("AT".into()));
    let exposure = file.get_entry(33434_u16).ok_or("no exposure")?;
    assert!((exposure.force_f64(0) - 0.004).abs() < 1e-9);
    Ok(())
  }
}
