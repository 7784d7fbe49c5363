// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Geometry and tone of the final image

use log::debug;
use rayon::prelude::*;

use super::color::{Histogram, HISTOGRAM_BINS};
use super::gamma::Gamma;
use crate::pixarray::Image4;

/// Resample to square pixels. Aspects below one stretch the height,
/// above one the width. Linear interpolation between neighbors.
pub fn stretch(img: Image4, colors: usize, pixel_aspect: f64) -> Image4 {
  if pixel_aspect == 1.0 || !pixel_aspect.is_finite() || pixel_aspect <= 0.0 {
    return img;
  }
  let (width, height) = (img.width, img.height);
  let lerp = |a: &[u16; 4], b: &[u16; 4], frac: f64| {
    let mut out = [0_u16; 4];
    for c in 0..colors {
      out[c] = (a[c] as f64 * (1.0 - frac) + b[c] as f64 * frac + 0.5) as u16;
    }
    out
  };
  if pixel_aspect < 1.0 {
    let newdim = (height as f64 / pixel_aspect + 0.5) as usize;
    debug!("Stretching height from {} to {}", height, newdim);
    let mut out = Image4::new(width, newdim);
    out.data.par_chunks_exact_mut(width.max(1)).enumerate().for_each(|(row, buf)| {
      let rc = row as f64 * pixel_aspect;
      let c = (rc as usize).min(height - 1);
      let frac = rc - c as f64;
      let c1 = if c + 1 < height { c + 1 } else { c };
      for (col, pix) in buf.iter_mut().enumerate() {
        *pix = lerp(img.at(c, col), img.at(c1, col), frac);
      }
    });
    out
  } else {
    let newdim = (width as f64 * pixel_aspect + 0.5) as usize;
    debug!("Stretching width from {} to {}", width, newdim);
    let mut out = Image4::new(newdim, height);
    out.data.par_chunks_exact_mut(newdim.max(1)).enumerate().for_each(|(row, buf)| {
      for (col, pix) in buf.iter_mut().enumerate() {
        let rc = col as f64 / pixel_aspect;
        let c = (rc as usize).min(width - 1);
        let frac = rc - c as f64;
        let c1 = if c + 1 < width { c + 1 } else { c };
        *pix = lerp(img.at(row, c), img.at(row, c1), frac);
      }
    });
    out
  }
}

/// Turn a SuperCCD canvas by 45 degrees so the photosite diagonals
/// become rows. `fuji_width` is the rotated sensor width on the full
/// size canvas. Bilinear interpolation, positions beyond the canvas
/// stay zero.
pub fn fuji_rotate(img: Image4, colors: usize, fuji_width: usize, shrink: bool) -> Image4 {
  if fuji_width == 0 {
    return img;
  }
  let fuji_width = (fuji_width - 1 + shrink as usize) >> shrink as usize;
  let step = 0.5_f64.sqrt();
  let wide = (fuji_width as f64 / step) as usize;
  let high = (img.height.saturating_sub(fuji_width) as f64 / step) as usize;
  debug!("Rotating SuperCCD canvas {}x{} to {}x{}", img.width, img.height, wide, high);
  let (width, height) = (img.width, img.height);
  let mut out = Image4::new(wide, high);
  out.data.par_chunks_exact_mut(wide.max(1)).enumerate().for_each(|(row, buf)| {
    for (col, pix) in buf.iter_mut().enumerate() {
      let r = fuji_width as f64 + (row as f64 - col as f64) * step;
      let c = (row + col) as f64 * step;
      if r < 0.0 {
        continue;
      }
      let (ur, uc) = (r as usize, c as usize);
      if ur + 2 > height || uc + 2 > width {
        continue;
      }
      let (fr, fc) = ((r - ur as f64) as f32, (c - uc as f64) as f32);
      let (p00, p01) = (img.at(ur, uc), img.at(ur, uc + 1));
      let (p10, p11) = (img.at(ur + 1, uc), img.at(ur + 1, uc + 1));
      for i in 0..colors.min(4) {
        let top = p00[i] as f32 * (1.0 - fc) + p01[i] as f32 * fc;
        let bottom = p10[i] as f32 * (1.0 - fc) + p11[i] as f32 * fc;
        pix[i] = (top * (1.0 - fr) + bottom * fr) as u16;
      }
    }
  });
  out
}

/// Tone curve settings for the output
#[derive(Debug, Clone, Copy)]
pub struct ToneParams {
  pub gamma: [f64; 2],
  pub bright: f32,
  /// Skip the histogram white point
  pub fixed_white: bool,
}

/// Output curve and the 16 bit white point it maps to full scale.
/// Unless fixed, the white point is placed so that one percent of the
/// pixels are clipped.
pub fn output_curve(histogram: &Histogram, colors: usize, pixels: usize, tone: &ToneParams) -> (Vec<u16>, u32) {
  let perc = (pixels as f64 * 0.01) as u32;
  let t_white = if tone.fixed_white {
    HISTOGRAM_BINS as u32
  } else {
    histogram.white_point(colors, perc)
  };
  let white = ((t_white << 3) as f32 / tone.bright) as u32;
  debug!("Output white point {}", white);
  (Gamma::new(tone.gamma[0], tone.gamma[1]).table(true, white), white)
}

/// Apply the curve and the flip bits, producing interleaved samples
/// with `colors` channels. Flip bit 4 transposes, 2 mirrors rows and
/// 1 mirrors columns. 8 bit output keeps the upper byte of the curve.
pub fn flip_and_map(img: &Image4, colors: usize, flip: u8, curve: &[u16], bps: u32) -> (usize, usize, Vec<u16>) {
  let (iwidth, iheight) = (img.width, img.height);
  let (width, height) = if flip & 4 != 0 { (iheight, iwidth) } else { (iwidth, iheight) };
  let mut out = vec![0_u16; width * height * colors];
  out.par_chunks_exact_mut((width * colors).max(1)).enumerate().for_each(|(row, buf)| {
    for col in 0..width {
      let (mut r, mut c) = if flip & 4 != 0 { (col, row) } else { (row, col) };
      if flip & 2 != 0 {
        r = iheight - 1 - r;
      }
      if flip & 1 != 0 {
        c = iwidth - 1 - c;
      }
      let pix = img.at(r, c);
      for ch in 0..colors {
        let v = curve[pix[ch] as usize];
        buf[col * colors + ch] = if bps == 8 { v >> 8 } else { v };
      }
    }
  });
  (width, height, out)
}
