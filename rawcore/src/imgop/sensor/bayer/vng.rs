// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Threshold-based variable number of gradients.
//!
//! Eight gradients are computed around each pixel, numbered clockwise
//! from NW to W. The neighbors in all directions with a gradient below
//! the threshold are averaged. Works for any 2 column CFA pattern with
//! up to four colors.

use super::{bilinear::Bilinear, fc, Demosaic};
use crate::{pixarray::Image4, CFA};

#[derive(Default, Debug, Clone, Copy)]
pub struct Vng;

/// y1, x1, y2, x2, weight, gradient bits
#[rustfmt::skip]
const TERMS: [(i8, i8, i8, i8, u8, u8); 64] = [
  (-2,-2,0,-1,0,0x01), (-2,-2,0,0,1,0x01), (-2,-1,-1,0,0,0x01),
  (-2,-1,0,-1,0,0x02), (-2,-1,0,0,0,0x03), (-2,-1,0,1,1,0x01),
  (-2,0,0,-1,0,0x06), (-2,0,0,0,1,0x02), (-2,0,0,1,0,0x03),
  (-2,1,-1,0,0,0x04), (-2,1,0,-1,1,0x04), (-2,1,0,0,0,0x06),
  (-2,1,0,1,0,0x02), (-2,2,0,0,1,0x04), (-2,2,0,1,0,0x04),
  (-1,-2,-1,0,0,0x80), (-1,-2,0,-1,0,0x01), (-1,-2,1,-1,0,0x01),
  (-1,-2,1,0,1,0x01), (-1,-1,-1,1,0,0x88), (-1,-1,1,-2,0,0x40),
  (-1,-1,1,-1,0,0x22), (-1,-1,1,0,0,0x33), (-1,-1,1,1,1,0x11),
  (-1,0,-1,2,0,0x08), (-1,0,0,-1,0,0x44), (-1,0,0,1,0,0x11),
  (-1,0,1,-2,1,0x40), (-1,0,1,-1,0,0x66), (-1,0,1,0,1,0x22),
  (-1,0,1,1,0,0x33), (-1,0,1,2,1,0x10), (-1,1,1,-1,1,0x44),
  (-1,1,1,0,0,0x66), (-1,1,1,1,0,0x22), (-1,1,1,2,0,0x10),
  (-1,2,0,1,0,0x04), (-1,2,1,0,1,0x04), (-1,2,1,1,0,0x04),
  (0,-2,0,0,1,0x80), (0,-1,0,1,1,0x88), (0,-1,1,-2,0,0x40),
  (0,-1,1,0,0,0x11), (0,-1,2,-2,0,0x40), (0,-1,2,-1,0,0x20),
  (0,-1,2,0,0,0x30), (0,-1,2,1,1,0x10), (0,0,0,2,1,0x08),
  (0,0,2,-2,1,0x40), (0,0,2,-1,0,0x60), (0,0,2,0,1,0x20),
  (0,0,2,1,0,0x30), (0,0,2,2,1,0x10), (0,1,1,0,0,0x44),
  (0,1,1,2,0,0x10), (0,1,2,-1,1,0x40), (0,1,2,0,0,0x60),
  (0,1,2,1,0,0x20), (0,1,2,2,0,0x10), (1,-2,1,0,0,0x80),
  (1,-1,1,1,0,0x88), (1,0,1,2,0,0x08), (1,0,2,-1,0,0x40),
  (1,0,2,1,0,0x10),
];

/// Neighbor offsets for the eight directions
const CHOOD: [(isize, isize); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, 1), (1, 1), (1, 0), (1, -1), (0, -1)];

/// Difference of two same colored pixels that feeds some gradients
#[derive(Debug, Clone, Copy)]
struct GradTerm {
  y1: isize,
  x1: isize,
  y2: isize,
  x2: isize,
  color: usize,
  weight: u32,
  grads: u8,
}

/// Precalculated terms for one position of the pattern
#[derive(Debug, Clone, Default)]
struct Code {
  terms: Vec<GradTerm>,
  /// The pixel two steps away in this direction has our own color
  far: [bool; 8],
}

fn build_codes(cfa: &CFA) -> Vec<Code> {
  let mut codes = Vec::with_capacity(16);
  for row in 0..8_isize {
    for col in 0..2_isize {
      let mut code = Code::default();
      for &(y1, x1, y2, x2, weight, grads) in TERMS.iter() {
        let (y1, x1, y2, x2) = (y1 as isize, x1 as isize, y2 as isize, x2 as isize);
        let color = fc(cfa, row + y1, col + x1);
        if fc(cfa, row + y2, col + x2) != color {
          continue;
        }
        let diag = if fc(cfa, row, col + 1) == color && fc(cfa, row + 1, col) == color { 2 } else { 1 };
        if (y1 - y2).abs() == diag && (x1 - x2).abs() == diag {
          continue;
        }
        code.terms.push(GradTerm {
          y1,
          x1,
          y2,
          x2,
          color,
          weight: weight as u32,
          grads,
        });
      }
      let color = fc(cfa, row, col);
      for (g, &(y, x)) in CHOOD.iter().enumerate() {
        code.far[g] = fc(cfa, row + y, col + x) != color && fc(cfa, row + y * 2, col + x * 2) == color;
      }
      codes.push(code);
    }
  }
  codes
}

impl Demosaic for Vng {
  fn name(&self) -> &'static str {
    "VNG"
  }

  fn demosaic(&self, img: &mut Image4, cfa: &CFA, colors: usize) {
    Bilinear.demosaic(img, cfa, colors);
    let (width, height) = (img.width, img.height);
    if width < 5 || height < 5 {
      return;
    }
    let codes = build_codes(cfa);
    img.par_rows_with_snapshot(|row, buf, old| {
      if row < 2 || row + 2 >= height {
        return;
      }
      let at = |dy: isize, dx: isize, col: usize| old.at((row as isize + dy) as usize, (col as isize + dx) as usize);
      for col in 2..width - 2 {
        let code = &codes[(row & 7) * 2 + (col & 1)];
        let mut gval = [0_i32; 8];
        for term in &code.terms {
          let a = at(term.y1, term.x1, col)[term.color] as i32;
          let b = at(term.y2, term.x2, col)[term.color] as i32;
          let diff = (a - b).abs() << term.weight;
          for (g, val) in gval.iter_mut().enumerate() {
            if term.grads & (1 << g) != 0 {
              *val += diff;
            }
          }
        }
        let gmin = gval.iter().copied().min().unwrap_or(0);
        let gmax = gval.iter().copied().max().unwrap_or(0);
        if gmax == 0 {
          continue;
        }
        let thold = gmin + (gmax >> 1);
        let pix = *old.at(row, col);
        let color = cfa.color_at(row, col);
        let mut sum = [0_i32; 4];
        let mut num = 0;
        for (g, &(y, x)) in CHOOD.iter().enumerate() {
          if gval[g] > thold {
            continue;
          }
          for c in 0..colors {
            if c == color && code.far[g] {
              sum[c] += (pix[c] as i32 + at(y * 2, x * 2, col)[c] as i32) >> 1;
            } else {
              sum[c] += at(y, x, col)[c] as i32;
            }
          }
          num += 1;
        }
        for c in 0..colors {
          let mut t = pix[color] as i32;
          if c != color {
            t += (sum[c] - sum[color]) / num;
          }
          buf[col][c] = t.clamp(0, u16::MAX as i32) as u16;
        }
      }
    });
  }
}
