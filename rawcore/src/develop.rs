// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! User tunables of the color pipeline

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{RawError, Result};

/// Interpolation used to fill the missing colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum DemosaicQuality {
  Bilinear,
  Vng,
  Ppg,
  #[default]
  Ahd,
}

impl DemosaicQuality {
  /// Numeric quality as used by the `-q` switch
  pub fn from_level(level: u32) -> Self {
    match level {
      0 => Self::Bilinear,
      1 => Self::Vng,
      2 => Self::Ppg,
      _ => Self::Ahd,
    }
  }
}

impl fmt::Display for DemosaicQuality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Bilinear => "bilinear",
      Self::Vng => "VNG",
      Self::Ppg => "PPG",
      Self::Ahd => "AHD",
    })
  }
}

/// Output color space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputColor {
  /// Camera colors, no matrix applied
  Raw,
  #[default]
  Srgb,
  Adobe,
  Wide,
  Prophoto,
  Xyz,
}

impl OutputColor {
  /// Numeric space as used by the `-o` switch
  pub fn from_level(level: u32) -> Option<Self> {
    Some(match level {
      0 => Self::Raw,
      1 => Self::Srgb,
      2 => Self::Adobe,
      3 => Self::Wide,
      4 => Self::Prophoto,
      5 => Self::Xyz,
      _ => return None,
    })
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Raw => "raw",
      Self::Srgb => "sRGB",
      Self::Adobe => "Adobe RGB (1998)",
      Self::Wide => "WideGamut D65",
      Self::Prophoto => "ProPhoto D65",
      Self::Xyz => "XYZ",
    }
  }

  /// Linear sRGB to this space
  pub fn matrix(&self) -> Option<[[f64; 3]; 3]> {
    use crate::imgop::matrix::*;
    match self {
      Self::Raw => None,
      Self::Srgb => Some(IDENTITY_MATRIX_3),
      Self::Adobe => Some(ADOBE_RGB),
      Self::Wide => Some(WIDE_RGB),
      Self::Prophoto => Some(PROPHOTO_RGB),
      Self::Xyz => Some(XYZ_RGB),
    }
  }
}

impl fmt::Display for OutputColor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Parameters of the color pipeline.
///
/// Defaults produce an 8 bit sRGB image with camera white balance,
/// AHD interpolation and clipped highlights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevelopParams {
  /// Bin each 2x2 block into one pixel instead of interpolating
  pub half_size: bool,
  /// Interpolate both greens as separate colors
  pub four_color_rgb: bool,
  /// Equalize the two green channels before interpolation
  pub green_matching: bool,
  /// Estimate white balance from the grey box
  pub use_auto_wb: bool,
  /// Use the white balance stored by the camera
  pub use_camera_wb: bool,
  /// User multipliers, red green blue green
  pub user_mul: Option<[f32; 4]>,
  /// Area for auto white balance: x, y, width, height
  pub greybox: [u32; 4],
  /// Override the black level
  pub user_black: Option<u32>,
  /// Override the saturation level
  pub user_sat: Option<u32>,
  /// 0 clip, 1 unclip, 2 blend, 3 to 9 rebuild
  pub highlight: u32,
  /// Wavelet denoise threshold, 0 disables
  pub threshold: f32,
  /// Median filter passes on the color differences
  pub med_passes: u32,
  pub quality: DemosaicQuality,
  pub output_color: OutputColor,
  /// 8 or 16
  pub output_bps: u32,
  /// Power and toe slope of the output curve
  pub gamma: [f64; 2],
  /// Brightness multiplier for the white point
  pub bright: f32,
  /// Use a fixed white point instead of the histogram percentile
  pub no_auto_bright: bool,
  /// Flip bits or a 0/90/180/270 rotation, replaces the file orientation
  pub user_flip: Option<i32>,
  /// Write raw values without interpolation or color conversion
  pub document_mode: bool,
  /// Keep the sensor geometry, no stretching to square pixels and no
  /// SuperCCD rotation
  pub no_stretch: bool,
  /// Dead pixel list, lines of `col row unix-time`
  pub bad_pixels: Option<PathBuf>,
  /// 16 bit PGM of the visible area to subtract
  pub dark_frame: Option<PathBuf>,
}

impl Default for DevelopParams {
  fn default() -> Self {
    Self {
      half_size: false,
      four_color_rgb: false,
      green_matching: false,
      use_auto_wb: false,
      use_camera_wb: true,
      user_mul: None,
      greybox: [0, 0, u32::MAX, u32::MAX],
      user_black: None,
      user_sat: None,
      highlight: 0,
      threshold: 0.0,
      med_passes: 0,
      quality: DemosaicQuality::default(),
      output_color: OutputColor::default(),
      output_bps: 8,
      gamma: [0.45, 4.5],
      bright: 1.0,
      no_auto_bright: false,
      user_flip: None,
      document_mode: false,
      no_stretch: false,
      bad_pixels: None,
      dark_frame: None,
    }
  }
}

impl DevelopParams {
  /// Load parameters from a TOML file, missing keys keep their default
  pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|err| RawError::with_io_error(path, err))?;
    Self::from_toml_str(&content).map_err(|err| match err {
      RawError::Io(err) => RawError::with_io_error(path, err),
      err => err,
    })
  }

  pub fn from_toml_str(content: &str) -> Result<Self> {
    let params: Self = toml::from_str(content).map_err(|err| RawError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())))?;
    params.validate()?;
    Ok(params)
  }

  /// Reject values the pipeline can't handle
  pub fn validate(&self) -> Result<()> {
    let invalid = |msg: String| Err(RawError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)));
    if self.output_bps != 8 && self.output_bps != 16 {
      return invalid(format!("output bits per sample must be 8 or 16, not {}", self.output_bps));
    }
    if self.highlight > 9 {
      return invalid(format!("highlight mode {} out of range 0..9", self.highlight));
    }
    if self.bright.is_nan() || self.bright <= 0.0 {
      return invalid(format!("brightness {} must be positive", self.bright));
    }
    if let Some(mul) = self.user_mul {
      if mul.iter().any(|m| *m < 0.0 || !m.is_finite()) {
        return invalid(format!("invalid user multipliers {:?}", mul));
      }
    }
    Ok(())
  }

  /// Flip bits from `user_flip`: degrees are converted, other values
  /// are taken as flip bits.
  pub fn user_flip_bits(&self) -> Option<u8> {
    self.user_flip.map(|flip| match flip {
      90 => 6,
      180 => 3,
      270 => 5,
      bits => (bits & 7) as u8,
    })
  }
}
