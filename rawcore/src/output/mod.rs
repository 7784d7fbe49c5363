// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Serialization of developed images

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::formats::tiff::WriteAndSeek;
use crate::image::DecodedImage;
use crate::metadata::ImageMetadata;
use crate::Result;

pub mod icc;
pub mod ppm;
pub mod tiff;

pub use ppm::write_ppm;
pub use tiff::write_tiff;

/// Container for the developed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  /// PGM, PPM or PAM depending on the colors
  #[default]
  Ppm,
  Tiff,
}

impl OutputFormat {
  pub fn extension(&self) -> &'static str {
    match self {
      Self::Ppm => "ppm",
      Self::Tiff => "tiff",
    }
  }

  /// Guess from a file name, `None` for unknown extensions
  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
      "ppm" | "pgm" | "pam" | "pnm" => Some(Self::Ppm),
      "tif" | "tiff" => Some(Self::Tiff),
      _ => None,
    }
  }
}

impl fmt::Display for OutputFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.extension())
  }
}

/// Write `image` in the given container
pub fn write_image<W: WriteAndSeek + Send>(writer: &mut W, format: OutputFormat, image: &DecodedImage, md: &ImageMetadata) -> Result<()> {
  match format {
    OutputFormat::Ppm => write_ppm(writer, image),
    OutputFormat::Tiff => write_tiff(writer, image, md),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn format_from_extension() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert_eq!(OutputFormat::from_path(Path::new("a/IMG_0001.TIF")), Some(OutputFormat::Tiff));
    assert_eq!(OutputFormat::from_path(Path::new("out.pgm")), Some(OutputFormat::Ppm));
    assert_eq!(OutputFormat::from_path(Path::new("out")), None);
    Ok(())
  }
}
