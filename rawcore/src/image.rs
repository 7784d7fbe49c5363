// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use image::{DynamicImage, ImageBuffer};

use crate::develop::OutputColor;
use crate::imgop::color::Histogram;
use crate::imgop::gamma::Gamma;

/// Final image, ready to be written.
///
/// Samples are interleaved, `colors` per pixel, row major. With 8 bits
/// per sample the values are in 0..=255 but still stored as `u16`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
  pub width: usize,
  pub height: usize,
  /// 1, 3 or 4
  pub colors: usize,
  /// 8 or 16
  pub bps: u32,
  pub pixels: Vec<u16>,
  /// Histogram of the linear values before the tone curve
  pub histogram: Histogram,
  /// Applied output curve
  pub gamma: Gamma,
  /// Linear 16 bit value mapped to full scale
  pub white: u32,
  pub output_color: OutputColor,
  /// Camera colors, no color space applies
  pub raw_color: bool,
  /// ICC profile of the output color space
  pub icc: Option<Vec<u8>>,
}

impl DecodedImage {
  /// Highest sample value for the bit depth
  pub fn maxval(&self) -> u32 {
    (1 << self.bps) - 1
  }

  pub fn row(&self, row: usize) -> &[u16] {
    let stride = self.width * self.colors;
    &self.pixels[row * stride..(row + 1) * stride]
  }

  /// Convert into an [`image`] crate buffer. Four color images become
  /// RGBA with the fourth color as alpha.
  pub fn to_dynamic_image(&self) -> Option<DynamicImage> {
    let (w, h) = (self.width as u32, self.height as u32);
    Some(match (self.colors, self.bps) {
      (1, 8) => DynamicImage::ImageLuma8(ImageBuffer::from_raw(w, h, self.pixels.iter().map(|v| *v as u8).collect())?),
      (3, 8) => DynamicImage::ImageRgb8(ImageBuffer::from_raw(w, h, self.pixels.iter().map(|v| *v as u8).collect())?),
      (4, 8) => DynamicImage::ImageRgba8(ImageBuffer::from_raw(w, h, self.pixels.iter().map(|v| *v as u8).collect())?),
      (1, _) => DynamicImage::ImageLuma16(ImageBuffer::from_raw(w, h, self.pixels.clone())?),
      (3, _) => DynamicImage::ImageRgb16(ImageBuffer::from_raw(w, h, self.pixels.clone())?),
      (4, _) => DynamicImage::ImageRgba16(ImageBuffer::from_raw(w, h, self.pixels.clone())?),
      _ => return None,
    })
  }
}
