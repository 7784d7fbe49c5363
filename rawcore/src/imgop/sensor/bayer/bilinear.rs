// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use multiversion::multiversion;

use super::{border_interpolate, fc, Demosaic};
use crate::{pixarray::Image4, CFA};

/// Weighted average over the 3x3 neighborhood. Direct neighbors count
/// twice as much as diagonal ones.
#[derive(Default, Debug, Clone, Copy)]
pub struct Bilinear;

/// One neighbor sample of the 3x3 window
#[derive(Debug, Clone, Copy, Default)]
struct Tap {
  dy: isize,
  dx: isize,
  shift: u32,
  color: usize,
}

/// Taps and normalization for one position of the CFA pattern
#[derive(Debug, Clone, Default)]
struct Kernel {
  taps: Vec<Tap>,
  /// Missing color and its weight scaled by 256
  weights: Vec<(usize, u32)>,
}

fn build_kernels(cfa: &CFA, colors: usize) -> Vec<Kernel> {
  let mut kernels = Vec::with_capacity(16);
  for row in 0..8_isize {
    for col in 0..2_isize {
      let mut kernel = Kernel::default();
      let mut sum = [0_u32; 4];
      for dy in -1..=1_isize {
        for dx in -1..=1_isize {
          let shift = (dy == 0) as u32 + (dx == 0) as u32;
          if shift == 2 {
            continue;
          }
          let color = fc(cfa, row + dy, col + dx);
          kernel.taps.push(Tap { dy, dx, shift, color });
          sum[color] += 1 << shift;
        }
      }
      let f = fc(cfa, row, col);
      for c in (0..colors).filter(|c| *c != f) {
        kernel.weights.push((c, if sum[c] > 0 { 256 / sum[c] } else { 0 }));
      }
      kernels.push(kernel);
    }
  }
  kernels
}

#[multiversion(targets("x86_64+avx+avx2", "x86+sse", "aarch64+neon"))]
fn interpolate(img: &mut Image4, kernels: &[Kernel]) {
  let (width, height) = (img.width, img.height);
  img.par_rows_with_snapshot(|row, buf, old| {
    if row == 0 || row + 1 >= height {
      return;
    }
    for col in 1..width - 1 {
      let kernel = &kernels[(row & 7) * 2 + (col & 1)];
      let mut sum = [0_u32; 4];
      for tap in &kernel.taps {
        let y = (row as isize + tap.dy) as usize;
        let x = (col as isize + tap.dx) as usize;
        sum[tap.color] += (old.at(y, x)[tap.color] as u32) << tap.shift;
      }
      for &(c, weight) in &kernel.weights {
        buf[col][c] = ((sum[c] * weight) >> 8).min(u16::MAX as u32) as u16;
      }
    }
  });
}

impl Demosaic for Bilinear {
  fn name(&self) -> &'static str {
    "Bilinear"
  }

  fn demosaic(&self, img: &mut Image4, cfa: &CFA, colors: usize) {
    border_interpolate(img, cfa, colors, 1);
    if img.width < 3 || img.height < 3 {
      return;
    }
    let kernels = build_kernels(cfa, colors);
    interpolate(img, &kernels);
  }
}

#[cfg(test)]
mod tests {
  use super::super::tests::{assert_flat, flat_mosaic};
  use super::*;

  #[test]
  fn flat_surface_stays_flat() -> std::result::Result<(), Box<dyn std::error::Error>> {
    for pattern in ["RGGB", "BGGR", "GRBG", "GBRG"] {
      let cfa = CFA::new(pattern);
      let mut img = flat_mosaic(&cfa, 10, 8, [1000, 2000, 3000]);
      Bilinear.demosaic(&mut img, &cfa, 3);
      assert_flat(&img, [1000, 2000, 3000], 0);
    }
    Ok(())
  }

  #[test]
  fn green_is_average_of_direct_neighbors() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("RGGB");
    let mut img = flat_mosaic(&cfa, 6, 6, [1000, 2000, 3000]);
    // Direct green neighbors of the red pixel at 2,2
    img.at_mut(1, 2)[1] = 2400;
    img.at_mut(2, 1)[1] = 1600;
    Bilinear.demosaic(&mut img, &cfa, 3);
    assert_eq!(img.at(2, 2)[1], 2000);
    Ok(())
  }
}
