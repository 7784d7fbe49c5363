// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Interpolation of the missing colors of a mosaic image.
//!
//! All methods work on an [`Image4`] where each pixel has only its CFA
//! color slot filled. The CFA slots are never modified, so passes read
//! from a snapshot of the image and rows can be processed in parallel.

pub mod ahd;
pub mod bilinear;
pub mod ppg;
pub mod vng;

use std::time::Instant;

use crate::{develop::DemosaicQuality, pixarray::Image4, CFA};

pub use ahd::Ahd;
pub use bilinear::Bilinear;
pub use ppg::Ppg;
pub use vng::Vng;

/// A demosaic method
pub trait Demosaic {
  fn name(&self) -> &'static str;

  /// Fill all `colors` slots of each pixel
  fn demosaic(&self, img: &mut Image4, cfa: &CFA, colors: usize);
}

/// Color at a position that may be up to 16 pixels outside the image
#[inline(always)]
pub(crate) fn fc(cfa: &CFA, row: isize, col: isize) -> usize {
  cfa.color_at((row + 16) as usize, (col + 16) as usize)
}

/// Pick the interpolation for a quality level. AHD and PPG only handle
/// three colors with greens on odd positions, everything else falls
/// back to VNG.
pub fn select(quality: DemosaicQuality, cfa: &CFA, colors: usize, xyz_cam: [[f32; 4]; 3]) -> Box<dyn Demosaic> {
  match quality {
    DemosaicQuality::Bilinear => Box::new(Bilinear),
    _ if colors > 3 => Box::new(Vng),
    DemosaicQuality::Vng => Box::new(Vng),
    DemosaicQuality::Ppg if cfa.is_2x2() => Box::new(Ppg),
    _ => Box::new(Ahd::new(xyz_cam)),
  }
}

/// Run a demosaic method and log the time it takes
pub fn run(method: &dyn Demosaic, img: &mut Image4, cfa: &CFA, colors: usize) {
  let now = Instant::now();
  method.demosaic(img, cfa, colors);
  log::debug!("{} interpolation of {}x{} took {:.5}s", method.name(), img.width, img.height, now.elapsed().as_secs_f32());
}

/// Average of the same colored neighbors for all pixels within
/// `border` of the edge.
pub fn border_interpolate(img: &mut Image4, cfa: &CFA, colors: usize, border: usize) {
  let (width, height) = (img.width, img.height);
  img.par_rows_with_snapshot(|row, buf, old| {
    let mut col = 0;
    while col < width {
      if col == border && row >= border && row + border < height && width > 2 * border {
        col = width - border;
      }
      let mut sum = [0_u32; 4];
      let mut count = [0_u32; 4];
      for y in row.saturating_sub(1)..(row + 2).min(height) {
        for x in col.saturating_sub(1)..(col + 2).min(width) {
          let f = cfa.color_at(y, x);
          sum[f] += old.at(y, x)[f] as u32;
          count[f] += 1;
        }
      }
      let f = cfa.color_at(row, col);
      for c in 0..colors {
        if c != f && count[c] > 0 {
          buf[col][c] = (sum[c] / count[c]) as u16;
        }
      }
      col += 1;
    }
  });
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  /// Mosaic of a flat colored surface
  pub(crate) fn flat_mosaic(cfa: &CFA, width: usize, height: usize, rgb: [u16; 3]) -> Image4 {
    let mut img = Image4::new(width, height);
    for row in 0..height {
      for col in 0..width {
        let c = cfa.color_at(row, col);
        img.at_mut(row, col)[c] = rgb[c];
      }
    }
    img
  }

  pub(crate) fn assert_flat(img: &Image4, rgb: [u16; 3], tolerance: i32) {
    for row in 0..img.height {
      for col in 0..img.width {
        let pix = img.at(row, col);
        for c in 0..3 {
          assert!((pix[c] as i32 - rgb[c] as i32).abs() <= tolerance, "pixel {},{} is {:?}", row, col, pix);
        }
      }
    }
  }

  #[test]
  fn border_fills_edges_only() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("RGGB");
    let mut img = flat_mosaic(&cfa, 12, 12, [100, 200, 300]);
    border_interpolate(&mut img, &cfa, 3, 2);
    assert_eq!(img.at(0, 0)[..3], [100, 200, 300]);
    assert_eq!(img.at(11, 6)[..3], [100, 200, 300]);
    // Inner pixels keep the single CFA value
    assert_eq!(img.at(5, 5)[..3], [0, 0, 300]);
    Ok(())
  }

  #[test]
  fn four_colors_use_vng() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("RGGB").split_greens();
    assert_eq!(select(DemosaicQuality::Ahd, &cfa, 4, [[0.0; 4]; 3]).name(), "VNG");
    assert_eq!(select(DemosaicQuality::Bilinear, &cfa, 4, [[0.0; 4]; 3]).name(), "Bilinear");
    assert_eq!(select(DemosaicQuality::Ppg, &CFA::new("RGGB"), 3, [[0.0; 4]; 3]).name(), "PPG");
    Ok(())
  }
}
