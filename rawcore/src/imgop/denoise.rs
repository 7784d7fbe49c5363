// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Wavelet denoise on the sensor values and median filtering of the
//! color differences after interpolation.

use log::{debug, warn};
use rayon::prelude::*;

use super::Dim2;
use super::scale::Levels;
use crate::CFA;
use crate::pixarray::Image4;

/// Noise of each wavelet level relative to the first one
const NOISE: [f32; 8] = [0.8002, 0.2735, 0.1202, 0.0585, 0.0291, 0.0152, 0.0080, 0.0044];

/// Reflect `idx` into `0..size` without repeating the edge sample
fn mirror(idx: isize, size: usize) -> usize {
  let last = size as isize - 1;
  if last <= 0 {
    return 0;
  }
  let idx = idx.rem_euclid(2 * last);
  (if idx > last { 2 * last - idx } else { idx }) as usize
}

/// A trous B3 spline filter, mirrored at the edges
fn hat_transform(out: &mut [f32], base: &[f32], sc: usize) {
  let size = base.len();
  for (i, o) in out.iter_mut().enumerate().take(size) {
    let lo = if i >= sc { i - sc } else { mirror(i as isize - sc as isize, size) };
    let hi = if i + sc < size { i + sc } else { mirror((i + sc) as isize, size) };
    *o = 2.0 * base[i] + base[lo] + base[hi];
  }
}

fn soft_threshold(v: f32, thold: f32) -> f32 {
  if v < -thold {
    v + thold
  } else if v > thold {
    v - thold
  } else {
    0.0
  }
}

/// Denoise one channel in the square root domain. Five levels of
/// decomposition, each high pass band is soft thresholded.
fn denoise_plane(plane: Vec<f32>, width: usize, height: usize, threshold: f32) -> Vec<f32> {
  let size = width * height;
  let mut planes: [Vec<f32>; 3] = [plane, vec![0.0; size], vec![0.0; size]];
  let mut hpass = 0;
  let mut lpass = 0;
  for lev in 0..5 {
    lpass = (lev & 1) + 1;
    let sc = 1 << lev;
    let mut high = std::mem::take(&mut planes[hpass]);
    let mut low = std::mem::take(&mut planes[lpass]);

    low.par_chunks_exact_mut(width).zip(high.par_chunks_exact(width)).for_each(|(out, inp)| {
      hat_transform(out, inp, sc);
      out.iter_mut().for_each(|v| *v *= 0.25);
    });
    let columns: Vec<Vec<f32>> = (0..width)
      .into_par_iter()
      .map(|col| {
        let column: Vec<f32> = (0..height).map(|row| low[row * width + col]).collect();
        let mut out = vec![0.0; height];
        hat_transform(&mut out, &column, sc);
        out
      })
      .collect();
    for (col, column) in columns.iter().enumerate() {
      for (row, v) in column.iter().enumerate() {
        low[row * width + col] = v * 0.25;
      }
    }

    let thold = threshold * NOISE[lev];
    high.par_iter_mut().zip(low.par_iter()).for_each(|(h, l)| *h = soft_threshold(*h - l, thold));
    if hpass != 0 {
      planes[0].par_iter_mut().zip(high.par_iter()).for_each(|(acc, h)| *acc += h);
    }
    planes[hpass] = high;
    planes[lpass] = low;
    hpass = lpass;
  }
  let [base, p1, p2] = planes;
  let low = if lpass == 1 { p1 } else { p2 };
  base.into_par_iter().zip(low.into_par_iter()).map(|(b, l)| b + l).collect()
}

/// Wavelet denoise before scaling. Sensor values are scaled up to use
/// the full 16 bit range, `levels` is updated to match.
///
/// Mosaic images must be passed with each 2x2 block packed into one
/// pixel, `full` is the size of the unpacked image. The greens of both
/// rows are pulled closer together afterwards.
pub fn wavelet_denoise(img: &mut Image4, cfa: Option<&CFA>, full: Dim2, colors: usize, levels: &mut Levels, pre_mul: &[f64; 4], threshold: f32) {
  let (width, height) = (img.width, img.height);
  if width < 2 || height < 2 {
    warn!("Image of {}x{} is too small for wavelet denoise", width, height);
    return;
  }
  let mut scale = 1;
  while (levels.maximum << scale) < 0x10000 {
    scale += 1;
  }
  scale -= 1;
  levels.maximum <<= scale;
  levels.black <<= scale;
  levels.cblack.iter_mut().for_each(|c| *c <<= scale);
  debug!("Wavelet denoise with threshold {}, scale {}", threshold, scale);

  let nc = if colors == 3 && cfa.is_some() { 4 } else { colors };
  for c in 0..nc {
    let plane: Vec<f32> = img.data.par_iter().map(|p| 256.0 * (((p[c] as u32) << scale) as f64).sqrt() as f32).collect();
    let plane = denoise_plane(plane, width, height, threshold);
    img.data.par_iter_mut().zip(plane.par_iter()).for_each(|(p, v)| {
      p[c] = (v * v / 65536.0).clamp(0.0, 65535.0) as u16;
    });
  }

  if let (Some(cfa), 3) = (cfa, colors) {
    equalize_greens(img, cfa, full, levels, pre_mul, threshold);
  }
}

/// Each green is compared to the interpolation of the diagonal greens
/// of the other kind, differences below the threshold are removed.
fn equalize_greens(img: &mut Image4, cfa: &CFA, full: Dim2, levels: &Levels, pre_mul: &[f64; 4], threshold: f32) {
  let mut mul = [0.0_f32; 2];
  let mut blk = [0_f32; 2];
  for row in 0..2 {
    mul[row] = (0.125 * pre_mul[cfa.color_at(row + 1, 0) | 1] / pre_mul[cfa.color_at(row, 0) | 1]) as f32;
    blk[row] = levels.black_for(cfa.color_at(row, 0) | 1) as f32;
  }
  let thold = threshold / 512.0;
  // Photosite in unpacked coordinates
  let bayer = |img: &Image4, row: usize, col: usize| img.at(row >> 1, col >> 1)[cfa.color_at(row, col)] as f32;
  img.par_rows_with_snapshot(|prow, buf, old| {
    for row in [prow * 2, prow * 2 + 1] {
      if row == 0 || row + 1 >= full.h {
        continue;
      }
      let mut col = (cfa.color_at(row, 0) & 1) + 1;
      while col + 1 < full.w {
        let avg = (bayer(old, row - 1, col - 1) + bayer(old, row - 1, col + 1) + bayer(old, row + 1, col - 1) + bayer(old, row + 1, col + 1)
          - blk[!row & 1] * 4.0)
          * mul[row & 1]
          + (bayer(old, row, col) + blk[row & 1]) * 0.5;
        let avg = if avg < 0.0 { 0.0 } else { avg.sqrt() };
        let diff = soft_threshold(bayer(old, row, col).sqrt() - avg, thold);
        buf[col >> 1][cfa.color_at(row, col)] = ((avg + diff) * (avg + diff) + 0.5).clamp(0.0, 65535.0) as u16;
        col += 2;
      }
    }
  });
}

/// Median filter on R-G and B-G over a 3x3 window
pub fn median_filter(img: &mut Image4, passes: u32) {
  let (width, height) = (img.width, img.height);
  if width < 3 || height < 3 {
    return;
  }
  for pass in 1..=passes {
    debug!("Median filter pass {}", pass);
    for c in [0, 2] {
      img.par_rows_with_snapshot(|row, buf, old| {
        if row == 0 || row + 1 >= height {
          return;
        }
        for col in 1..width - 1 {
          let mut med = [0_i32; 9];
          let mut k = 0;
          for y in row - 1..=row + 1 {
            for x in col - 1..=col + 1 {
              let pix = old.at(y, x);
              med[k] = pix[c] as i32 - pix[1] as i32;
              k += 1;
            }
          }
          med.sort_unstable();
          buf[col][c] = (med[4] + buf[col][1] as i32).clamp(0, 65535) as u16;
        }
      });
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hat_mirrors_edges() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let base = [1.0, 2.0, 3.0, 4.0, 5.0];
    let mut out = [0.0; 5];
    hat_transform(&mut out, &base, 1);
    assert_eq!(out, [2.0 + 2.0 + 2.0, 4.0 + 1.0 + 3.0, 6.0 + 2.0 + 4.0, 8.0 + 3.0 + 5.0, 10.0 + 4.0 + 4.0]);
    Ok(())
  }

  #[test]
  fn wide_steps_on_short_lines() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Step 16 on 5 samples reflects more than once
    let base = [1.0, 2.0, 3.0, 4.0, 5.0];
    let mut out = [0.0; 5];
    hat_transform(&mut out, &base, 16);
    assert_eq!(mirror(-16, 5), 0);
    assert_eq!(mirror(16, 5), 0);
    assert_eq!(mirror(17, 5), 1);
    assert_eq!(mirror(5, 5), 3);
    assert_eq!(out[0], 2.0 + 1.0 + 1.0);
    assert_eq!(out[1], 4.0 + 2.0 + 2.0);
    let mut one = [0.0; 1];
    hat_transform(&mut one, &[7.0], 4);
    assert_eq!(one, [28.0]);
    Ok(())
  }

  #[test]
  fn small_packed_images_are_denoised() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // 24x24 blocks from a 48x48 sensor run all five levels
    let cfa = CFA::new("RGGB").split_greens();
    let mut img = Image4::new_with(vec![[900, 1600, 400, 1600]; 24 * 24], 24, 24);
    let mut levels = Levels {
      black: 0,
      cblack: [0; 4],
      maximum: 4095,
    };
    wavelet_denoise(&mut img, Some(&cfa), Dim2::new(48, 48), 3, &mut levels, &[2.0, 1.0, 1.5, 1.0], 100.0);
    assert!((img.at(0, 0)[0] as i32 - 900 * 16).abs() <= 16);
    assert!((img.at(23, 23)[2] as i32 - 400 * 16).abs() <= 16);
    Ok(())
  }

  #[test]
  fn flat_image_survives_denoise() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut img = Image4::new_with(vec![[1000, 1000, 1000, 0]; 32 * 32], 32, 32);
    let mut levels = Levels {
      black: 0,
      cblack: [0; 4],
      maximum: 4095,
    };
    wavelet_denoise(&mut img, None, Dim2::new(32, 32), 3, &mut levels, &[1.0; 4], 100.0);
    // 4095 is shifted by 4 bit to use the 16 bit range
    assert_eq!(levels.maximum, 4095 << 4);
    for pix in img.pixels() {
      assert!((pix[0] as i32 - 16000).abs() <= 16, "{:?}", pix);
    }
    Ok(())
  }

  #[test]
  fn equal_greens_stay_equal() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("RGGB").split_greens();
    // Packed blocks: R, G1, B, G3
    let mut img = Image4::new_with(vec![[900, 1600, 400, 1600]; 20 * 20], 20, 20);
    let mut levels = Levels {
      black: 0,
      cblack: [0; 4],
      maximum: 4095,
    };
    wavelet_denoise(&mut img, Some(&cfa), Dim2::new(40, 40), 3, &mut levels, &[2.0, 1.0, 1.5, 1.0], 50.0);
    let pix = img.at(10, 10);
    assert!((pix[1] as i32 - pix[3] as i32).abs() <= 2, "{:?}", pix);
    assert!((pix[1] as i32 - 1600 * 16).abs() <= 64, "{:?}", pix);
    Ok(())
  }

  #[test]
  fn median_removes_outlier() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut img = Image4::new_with(vec![[500, 500, 500, 0]; 25], 5, 5);
    img.at_mut(2, 2)[0] = 9000;
    median_filter(&mut img, 1);
    assert_eq!(img.at(2, 2)[0], 500);
    assert_eq!(img.at(2, 2)[2], 500);
    Ok(())
  }
}
