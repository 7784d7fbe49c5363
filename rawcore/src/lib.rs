// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Camera raw decoder. Identifies vendor raw containers by content,
//! walks their metadata trees, decodes the sensor payload into a
//! [`RawFrame`] and develops it into an RGB [`DecodedImage`].
//!
//! # Example
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::BufWriter;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let output = rawcore::decode_file("IMG_0001.CRW")?;
//!   println!("{} {}", output.metadata.make, output.metadata.model);
//!   let mut f = BufWriter::new(File::create("IMG_0001.ppm")?);
//!   rawcore::output::write_ppm(&mut f, &output.image)?;
//!   Ok(())
//! }
//! ```

#![deny(unstable_features)]

use std::io::Read;
use std::path::Path;

use thiserror::Error;

use formats::tiff::TiffError;

/// Build a [`RawError::CorruptMetadata`] from a format string
macro_rules! corrupt {
  ($($arg:tt)*) => {
    $crate::RawError::CorruptMetadata(format!($($arg)*))
  };
}

/// Build a [`RawError::BitstreamCorruption`] from a format string
macro_rules! bitstream_err {
  ($($arg:tt)*) => {
    $crate::RawError::BitstreamCorruption(format!($($arg)*))
  };
}

/// Build a [`RawError::UnsupportedVariant`] from a format string
macro_rules! unsupported {
  ($($arg:tt)*) => {
    $crate::RawError::UnsupportedVariant(format!($($arg)*))
  };
}

pub(crate) use bitstream_err;
pub(crate) use corrupt;
pub(crate) use unsupported;

pub mod bits;
pub mod cfa;
pub mod decoders;
pub mod decompressors;
pub mod develop;
pub(crate) mod envparams;
pub mod formats;
pub mod image;
pub mod imgop;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod pixarray;
pub mod pumps;
pub mod rawimage;
pub mod rawsource;
pub mod tags;

pub use cfa::CFA;
pub use decoders::{FileFormat, RawLayout};
pub use develop::DevelopParams;
pub use image::DecodedImage;
pub use metadata::ImageMetadata;
pub use pipeline::{DecodeOutput, Identification, Pipeline, PipelineState, Stage};
pub use rawimage::RawFrame;
pub use rawsource::RawSource;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error taxonomy of the decoder
#[derive(Debug, Error)]
pub enum RawError {
  /// No known signature matched the input
  #[error("Unrecognized format: {}", _0)]
  UnrecognizedFormat(String),

  /// Tag tree malformed or pointing out of bounds
  #[error("Corrupt metadata: {}", _0)]
  CorruptMetadata(String),

  /// A decoded sample is out of the valid range
  #[error("Bitstream corruption: {}", _0)]
  BitstreamCorruption(String),

  /// Input ended before all expected data was read
  #[error("Unexpected end of file: {}", _0)]
  UnexpectedEof(String),

  /// Format is known, but this sub-variant can't be decoded
  #[error("Unsupported variant: {}", _0)]
  UnsupportedVariant(String),

  /// No usable color matrix, only raised as warning by the pipeline
  #[error("Color profile missing: {}", _0)]
  ColorProfileMissing(String),

  #[error("I/O error: {}", _0)]
  Io(std::io::Error),

  /// Pipeline step requested out of order or after a failure
  #[error("Invalid pipeline state: {}", _0)]
  InvalidState(String),

  /// Error with the pipeline stage and the detected format attached
  #[error("{} failed on {} file: {}", stage, format, source)]
  Stage { stage: Stage, format: String, source: Box<RawError> },
}

/// Variant of [`RawError`] without payload, for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  UnrecognizedFormat,
  CorruptMetadata,
  BitstreamCorruption,
  UnexpectedEof,
  UnsupportedVariant,
  ColorProfileMissing,
  Io,
  InvalidState,
}

impl RawError {
  /// The taxonomy variant, looking through stage wrappers
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::UnrecognizedFormat(_) => ErrorKind::UnrecognizedFormat,
      Self::CorruptMetadata(_) => ErrorKind::CorruptMetadata,
      Self::BitstreamCorruption(_) => ErrorKind::BitstreamCorruption,
      Self::UnexpectedEof(_) => ErrorKind::UnexpectedEof,
      Self::UnsupportedVariant(_) => ErrorKind::UnsupportedVariant,
      Self::ColorProfileMissing(_) => ErrorKind::ColorProfileMissing,
      Self::Io(_) => ErrorKind::Io,
      Self::InvalidState(_) => ErrorKind::InvalidState,
      Self::Stage { source, .. } => source.kind(),
    }
  }

  /// Attach stage and format information. Errors that already carry
  /// a stage are returned unchanged.
  pub fn at_stage(self, stage: Stage, format: impl Into<String>) -> Self {
    match self {
      err @ Self::Stage { .. } => err,
      err => Self::Stage {
        stage,
        format: format.into(),
        source: Box::new(err),
      },
    }
  }

  pub fn with_io_error(path: impl AsRef<Path>, error: std::io::Error) -> Self {
    match error.kind() {
      std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEof(format!("{}: {}", path.as_ref().display(), error)),
      _ => Self::Io(std::io::Error::new(error.kind(), format!("{}: {}", path.as_ref().display(), error))),
    }
  }
}

impl From<std::io::Error> for RawError {
  fn from(err: std::io::Error) -> Self {
    match err.kind() {
      std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEof(err.to_string()),
      _ => Self::Io(err),
    }
  }
}

impl From<TiffError> for RawError {
  fn from(err: TiffError) -> Self {
    match err {
      TiffError::Corrupt(msg) => Self::CorruptMetadata(msg),
      TiffError::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEof(err.to_string()),
      TiffError::Io(err) => Self::Io(err),
      other => Self::CorruptMetadata(other.to_string()),
    }
  }
}

pub type Result<T> = std::result::Result<T, RawError>;

/// Decode and develop a raw file with default parameters
///
/// # Example
/// ```rust,ignore
/// let output = match rawcore::decode_file("path/to/your/file.RAW") {
///   Ok(val) => val,
///   Err(e) => ... some appropriate action when the file is unreadable ...
/// };
/// ```
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<DecodeOutput> {
  decode_file_with_params(path, &DevelopParams::default())
}

/// Decode and develop a raw file
pub fn decode_file_with_params<P: AsRef<Path>>(path: P, params: &DevelopParams) -> Result<DecodeOutput> {
  let source = RawSource::new(path.as_ref()).map_err(|err| RawError::with_io_error(path.as_ref(), err))?;
  Pipeline::new(source).develop(params)
}

/// Decode and develop from a readable stream. The stream is read
/// into memory first, the decoders need random access.
pub fn decode(reader: &mut dyn Read, params: &DevelopParams) -> Result<DecodeOutput> {
  let source = RawSource::from_reader(reader)?;
  Pipeline::new(source).develop(params)
}

/// Only sniff and parse metadata, no pixels are decoded
pub fn identify_file<P: AsRef<Path>>(path: P) -> Result<Identification> {
  let source = RawSource::new(path.as_ref()).map_err(|err| RawError::with_io_error(path.as_ref(), err))?;
  Pipeline::new(source).identify()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stage_wrapper_keeps_kind() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let err = RawError::CorruptMetadata("tag 0x100 out of bounds".into()).at_stage(Stage::Metadata, "TIFF");
    assert_eq!(err.kind(), ErrorKind::CorruptMetadata);
    let msg = err.to_string();
    assert!(msg.contains("TIFF"));
    assert!(msg.contains("out of bounds"));
    // A second wrap keeps the first stage
    let err = err.at_stage(Stage::Decode, "CRW");
    assert!(matches!(err, RawError::Stage { stage: Stage::Metadata, .. }));
    Ok(())
  }

  #[test]
  fn io_eof_maps_to_unexpected_eof() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let err: RawError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short").into();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    let err: RawError = TiffError::Corrupt("bad".into()).into();
    assert_eq!(err.kind(), ErrorKind::CorruptMetadata);
    Ok(())
  }
}
