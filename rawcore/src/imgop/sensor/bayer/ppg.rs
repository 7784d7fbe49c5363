// SPDX-License-Identifier: LGPL-2.1
// Copyright 2022 Daniel Vogelbacher <daniel@chaospixel.com>

use multiversion::multiversion;

use super::{border_interpolate, Demosaic};
use crate::{cfa::CFA_COLOR_G, pixarray::Image4, CFA};

/// PPG demosaic
///
/// The PPG - Patterned Pixel Grouping - algorithm was developed by Chuan-kai Lin
/// Source on Internet Archive:
/// https://web.archive.org/web/20160923211135/https://sites.google.com/site/chklin/demosaic/
///
/// This is a simple algorithm but provides acceptable results. Only
/// usable for three colors in a 2x2 pattern.
#[derive(Default, Debug, Clone, Copy)]
pub struct Ppg;

impl Demosaic for Ppg {
  fn name(&self) -> &'static str {
    "PPG"
  }

  fn demosaic(&self, img: &mut Image4, cfa: &CFA, colors: usize) {
    border_interpolate(img, cfa, colors, 3);
    if img.width < 7 || img.height < 7 {
      return;
    }
    interpolate_green(img, cfa);
    interpolate_rb_at_green(img, cfa);
    interpolate_rb_at_non_green(img, cfa);
  }
}

#[inline(always)]
fn ulim(x: i32, y: i32, z: i32) -> i32 {
  if y < z {
    x.clamp(y, z)
  } else {
    x.clamp(z, y)
  }
}

#[inline(always)]
fn clip(v: i32) -> u16 {
  v.clamp(0, u16::MAX as i32) as u16
}

/// Fill in the green layer with gradients and pattern recognition
#[multiversion(targets("x86_64+avx+avx2", "x86+sse", "aarch64+neon"))]
fn interpolate_green(img: &mut Image4, cfa: &CFA) {
  let (width, height) = (img.width as isize, img.height as isize);
  img.par_rows_with_snapshot(|row, buf, old| {
    let row = row as isize;
    if row < 3 || row >= height - 3 {
      return;
    }
    let px = |dy: isize, dx: isize, col: isize, c: usize| old.at((row + dy) as usize, (col + dx) as usize)[c] as i32;
    let mut col = 3 + (cfa.color_at(row as usize, 3) & 1) as isize;
    let c = cfa.color_at(row as usize, col as usize);
    while col < width - 3 {
      let mut guess = [0_i32; 2];
      let mut diff = [0_i32; 2];
      // Horizontal then vertical
      for (i, (dy, dx)) in [(0, 1), (1, 0)].into_iter().enumerate() {
        let g = |k: isize| px(dy * k, dx * k, col, CFA_COLOR_G);
        let v = |k: isize| px(dy * k, dx * k, col, c);
        guess[i] = (g(-1) + v(0) + g(1)) * 2 - v(-2) - v(2);
        diff[i] = ((v(-2) - v(0)).abs() + (v(2) - v(0)).abs() + (g(-1) - g(1)).abs()) * 3 + ((g(3) - g(1)).abs() + (g(-3) - g(-1)).abs()) * 2;
      }
      let i = (diff[0] > diff[1]) as usize;
      let (dy, dx) = if i == 0 { (0, 1) } else { (1, 0) };
      let val = ulim(guess[i] >> 2, px(dy, dx, col, CFA_COLOR_G), px(-dy, -dx, col, CFA_COLOR_G));
      buf[col as usize][CFA_COLOR_G] = val as u16;
      col += 2;
    }
  });
}

/// Calculate red and blue for each green pixel
#[multiversion(targets("x86_64+avx+avx2", "x86+sse", "aarch64+neon"))]
fn interpolate_rb_at_green(img: &mut Image4, cfa: &CFA) {
  let (width, height) = (img.width as isize, img.height as isize);
  img.par_rows_with_snapshot(|row, buf, old| {
    let row = row as isize;
    if row < 1 || row >= height - 1 {
      return;
    }
    let px = |dy: isize, dx: isize, col: isize, c: usize| old.at((row + dy) as usize, (col + dx) as usize)[c] as i32;
    let mut col = 1 + (cfa.color_at(row as usize, 2) & 1) as isize;
    let first = cfa.color_at(row as usize, col as usize + 1);
    while col < width - 1 {
      let mut c = first;
      for (dy, dx) in [(0, 1), (1, 0)] {
        let val = (px(-dy, -dx, col, c) + px(dy, dx, col, c) + 2 * px(0, 0, col, CFA_COLOR_G) - px(-dy, -dx, col, CFA_COLOR_G) - px(dy, dx, col, CFA_COLOR_G)) >> 1;
        buf[col as usize][c] = clip(val);
        c = 2 - c;
      }
      col += 2;
    }
  });
}

/// Calculate blue for red pixels and vice versa
#[multiversion(targets("x86_64+avx+avx2", "x86+sse", "aarch64+neon"))]
fn interpolate_rb_at_non_green(img: &mut Image4, cfa: &CFA) {
  let (width, height) = (img.width as isize, img.height as isize);
  img.par_rows_with_snapshot(|row, buf, old| {
    let row = row as isize;
    if row < 1 || row >= height - 1 {
      return;
    }
    let px = |dy: isize, dx: isize, col: isize, c: usize| old.at((row + dy) as usize, (col + dx) as usize)[c] as i32;
    let mut col = 1 + (cfa.color_at(row as usize, 1) & 1) as isize;
    let c = 2 - cfa.color_at(row as usize, col as usize);
    while col < width - 1 {
      let mut guess = [0_i32; 2];
      let mut diff = [0_i32; 2];
      // Diagonals down-right and down-left
      for (i, (dy, dx)) in [(1, 1), (1, -1)].into_iter().enumerate() {
        let center = px(0, 0, col, CFA_COLOR_G);
        diff[i] = (px(-dy, -dx, col, c) - px(dy, dx, col, c)).abs()
          + (px(-dy, -dx, col, CFA_COLOR_G) - center).abs()
          + (px(dy, dx, col, CFA_COLOR_G) - center).abs();
        guess[i] = px(-dy, -dx, col, c) + px(dy, dx, col, c) + 2 * center - px(-dy, -dx, col, CFA_COLOR_G) - px(dy, dx, col, CFA_COLOR_G);
      }
      buf[col as usize][c] = if diff[0] != diff[1] {
        clip(guess[(diff[0] > diff[1]) as usize] >> 1)
      } else {
        clip((guess[0] + guess[1]) >> 2)
      };
      col += 2;
    }
  });
}
