// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Camera colors to output colors, histogram for the white point

use log::debug;
use rayon::prelude::*;

use crate::{develop::OutputColor, pixarray::Image4, CFA};

/// Number of histogram bins, each covers 8 values of 16 bit
pub const HISTOGRAM_BINS: usize = 0x2000;

/// Per channel histogram of the output values
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
  bins: Vec<[u32; 4]>,
}

impl Default for Histogram {
  fn default() -> Self {
    Self {
      bins: vec![[0; 4]; HISTOGRAM_BINS],
    }
  }
}

impl Histogram {
  /// Count all values of the first `colors` channels
  pub fn build(img: &Image4, colors: usize) -> Self {
    img
      .data
      .par_chunks(4096)
      .fold(Self::default, |mut hist, pixels| {
        for pix in pixels {
          for c in 0..colors {
            hist.bins[(pix[c] >> 3) as usize][c] += 1;
          }
        }
        hist
      })
      .reduce(Self::default, |mut a, b| {
        a.bins.iter_mut().zip(b.bins.iter()).for_each(|(x, y)| {
          for c in 0..4 {
            x[c] += y[c];
          }
        });
        a
      })
  }

  pub fn count(&self, c: usize, bin: usize) -> u32 {
    self.bins[bin][c]
  }

  /// Highest bin over all channels below which more than `perc`
  /// values are left. Returned in bin units.
  pub fn white_point(&self, colors: usize, perc: u32) -> u32 {
    let mut white = 0;
    for c in 0..colors {
      let mut total = 0;
      let mut val = HISTOGRAM_BINS as u32 - 1;
      while val > 32 {
        total += self.bins[val as usize][c];
        if total > perc {
          break;
        }
        val -= 1;
      }
      white = white.max(val);
    }
    white
  }
}

/// Result of the color conversion
#[derive(Debug, Clone)]
pub struct Converted {
  /// Channels in the output image
  pub colors: usize,
  /// Camera colors were kept, no profile applies
  pub raw_color: bool,
  pub histogram: Histogram,
}

/// Convert camera colors to `output` with the camera to sRGB matrix
/// `rgb_cam`. Camera colors are kept for monochrome images, in document
/// mode, for raw output or when the camera has no matrix. In document
/// mode each pixel keeps only its CFA value.
pub fn convert_to_rgb(img: &mut Image4, cfa: Option<&CFA>, colors: usize, rgb_cam: &[[f64; 4]; 3], raw_color: bool, output: OutputColor, document_mode: bool) -> Converted {
  let out_rgb = output.matrix();
  let raw_color = raw_color || colors == 1 || document_mode || out_rgb.is_none();
  match out_rgb {
    Some(out_rgb) if !raw_color => {
      let mut out_cam = [[0.0_f32; 4]; 3];
      for i in 0..3 {
        for j in 0..colors {
          out_cam[i][j] = (0..3).map(|k| out_rgb[i][k] * rgb_cam[k][j]).sum::<f64>() as f32;
        }
      }
      debug!("Converting to {} colorspace", output);
      img.data.par_iter_mut().for_each(|pix| {
        let mut out = [0.0_f32; 3];
        for c in 0..colors {
          for i in 0..3 {
            out[i] += out_cam[i][c] * pix[c] as f32;
          }
        }
        for c in 0..3 {
          pix[c] = (out[c] as i32).clamp(0, 65535) as u16;
        }
      });
    }
    _ => {
      debug!("Keeping camera colors");
      if let (true, Some(cfa)) = (document_mode, cfa) {
        let width = img.width.max(1);
        img.data.par_chunks_exact_mut(width).enumerate().for_each(|(row, buf)| {
          for (col, pix) in buf.iter_mut().enumerate() {
            pix[0] = pix[cfa.color_at(row, col)];
          }
        });
      }
    }
  }
  let histogram = Histogram::build(img, colors);
  let mut out_colors = colors;
  if colors == 4 && output != OutputColor::Raw {
    out_colors = 3;
  }
  if document_mode && cfa.is_some() {
    out_colors = 1;
  }
  Converted {
    colors: out_colors,
    raw_color,
    histogram,
  }
}
