// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Sensor values to white balanced 16 bit values

use log::{debug, warn};
use rayon::prelude::*;

use crate::CFA;
use crate::develop::DevelopParams;
use crate::pixarray::Image4;
use crate::rawimage::RawFrame;

/// Black and saturation levels of the working image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Levels {
  pub black: u32,
  pub cblack: [u32; 4],
  pub maximum: u32,
}

impl Levels {
  pub fn from_frame(frame: &RawFrame) -> Self {
    Self {
      black: frame.black,
      cblack: frame.cblack,
      maximum: frame.maximum,
    }
  }

  /// Total black of a color
  pub fn black_for(&self, c: usize) -> u32 {
    self.black + self.cblack[c & 3]
  }
}

/// Replace zero photosites by the average of the non-zero photosites
/// of the same color within two pixels.
pub fn remove_zeroes(frame: &mut RawFrame) {
  if frame.is_full_color() {
    return;
  }
  let (top, left) = (frame.crop.p.y, frame.crop.p.x);
  let (height, width) = (frame.crop.d.h, frame.crop.d.w);
  let mut fixed = 0;
  for row in 0..height {
    for col in 0..width {
      if frame.at(top + row, left + col) != 0 {
        continue;
      }
      let color = frame.color_at(row, col);
      let (mut tot, mut n) = (0_u32, 0_u32);
      for r in row.saturating_sub(2)..(row + 3).min(height) {
        for c in col.saturating_sub(2)..(col + 3).min(width) {
          let v = frame.at(top + r, left + c);
          if frame.color_at(r, c) == color && v != 0 {
            tot += v as u32;
            n += 1;
          }
        }
      }
      if n > 0 {
        frame.data[(top + row) * frame.dim.w + left + col] = (tot / n) as u16;
        fixed += 1;
      }
    }
  }
  debug!("Replaced {} zero photosites", fixed);
}

/// Copy the visible area into a four slot image, each photosite in the
/// slot of its CFA color. With `half_size` each 2x2 block becomes one
/// pixel that carries all its colors. Full color frames keep their
/// components in order.
pub fn frame_to_image(frame: &RawFrame, half_size: bool) -> Image4 {
  let (top, left) = (frame.crop.p.y, frame.crop.p.x);
  let (height, width) = (frame.crop.d.h, frame.crop.d.w);
  if frame.is_full_color() {
    let cpp = frame.cpp.min(4);
    let mut img = Image4::new(width, height);
    img.data.par_chunks_exact_mut(width.max(1)).enumerate().for_each(|(row, buf)| {
      for (col, pix) in buf.iter_mut().enumerate() {
        pix[..cpp].copy_from_slice(&frame.pixel(top + row, left + col)[..cpp]);
      }
    });
    img
  } else if half_size {
    let (ih, iw) = (height.div_ceil(2), width.div_ceil(2));
    let mut img = Image4::new(iw, ih);
    img.data.par_chunks_exact_mut(iw).enumerate().for_each(|(irow, buf)| {
      for row in (irow * 2)..(irow * 2 + 2).min(height) {
        for col in 0..width {
          buf[col >> 1][frame.color_at(row, col)] = frame.at(top + row, left + col);
        }
      }
    });
    img
  } else {
    let mut img = Image4::new(width, height);
    img.data.par_chunks_exact_mut(width).enumerate().for_each(|(row, buf)| {
      for (col, pix) in buf.iter_mut().enumerate() {
        pix[frame.color_at(row, col)] = frame.at(top + row, left + col);
      }
    });
    img
  }
}

/// Average of the camera colors inside the grey box, skipping 8x8
/// blocks that come close to saturation. Returns multipliers that make
/// the average neutral. Without a valid pattern every pixel counts for
/// all four slots.
pub fn auto_white_balance(img: &Image4, cfa: &CFA, shrink: bool, levels: &Levels, greybox: [u32; 4]) -> Option<[f64; 4]> {
  let mosaic = cfa.is_valid();
  let shift = shrink as usize;
  let (height, width) = if shrink { (img.height * 2, img.width * 2) } else { (img.height, img.width) };
  let (x0, y0) = (greybox[0] as usize, greybox[1] as usize);
  let bottom = (y0.saturating_add(greybox[3] as usize)).min(height);
  let right = (x0.saturating_add(greybox[2] as usize)).min(width);
  let limit = levels.maximum.saturating_sub(25) as i64;
  let mut dsum = [0.0_f64; 8];
  for row in (y0..bottom).step_by(8) {
    'block: for col in (x0..right).step_by(8) {
      let mut sum = [0_u64; 8];
      for y in row..(row + 8).min(bottom) {
        for x in col..(col + 8).min(right) {
          let pix = img.at(y >> shift, x >> shift);
          let channels = if mosaic { cfa.color_at(y, x)..cfa.color_at(y, x) + 1 } else { 0..4 };
          for c in channels {
            let val = pix[c] as i64;
            if val > limit {
              continue 'block;
            }
            sum[c] += (val - levels.black_for(c) as i64).max(0) as u64;
            sum[c + 4] += 1;
          }
        }
      }
      for (d, s) in dsum.iter_mut().zip(sum) {
        *d += s as f64;
      }
    }
  }
  if dsum[..4].iter().all(|v| *v == 0.0) {
    return None;
  }
  let mut mul = [0.0; 4];
  for c in 0..4 {
    if dsum[c] != 0.0 {
      mul[c] = dsum[c + 4] / dsum[c];
    }
  }
  Some(mul)
}

/// Multipliers from the 8x8 white reference shot
pub fn white_sample_balance(white: &[[u16; 8]; 8], cfa: &CFA, levels: &Levels) -> Option<[f64; 4]> {
  let mut sum = [0_u32; 8];
  for (row, line) in white.iter().enumerate() {
    for (col, v) in line.iter().enumerate() {
      let c = cfa.color_at(row, col);
      let val = *v as i64 - levels.black_for(c) as i64;
      if val > 0 {
        sum[c] += val as u32;
      }
      sum[c + 4] += 1;
    }
  }
  if sum[..4].iter().any(|v| *v == 0) {
    return None;
  }
  let mut mul = [0.0; 4];
  for c in 0..4 {
    mul[c] = sum[c + 4] as f64 / sum[c] as f64;
  }
  Some(mul)
}

/// Camera side of the white balance decision
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraBalance<'a> {
  /// As shot multipliers, zero if unknown
  pub cam_mul: [f32; 4],
  /// Camera was set to auto white balance
  pub wants_auto: bool,
  pub white_sample: Option<&'a [[u16; 8]; 8]>,
}

/// Pick the channel multipliers. `pre_mul` holds the daylight
/// multipliers of the camera matrix and is the fallback.
pub fn select_multipliers(
  img: &Image4,
  cfa: &CFA,
  shrink: bool,
  colors: usize,
  levels: &Levels,
  camera: &CameraBalance,
  params: &DevelopParams,
  mut pre_mul: [f64; 4],
) -> [f64; 4] {
  if let Some(user) = params.user_mul.filter(|m| m[0] > 0.0) {
    pre_mul = user.map(|v| v as f64);
  }
  if params.use_auto_wb || (params.use_camera_wb && camera.wants_auto) {
    match auto_white_balance(img, cfa, shrink, levels, params.greybox) {
      Some(mul) => {
        for c in 0..4 {
          if mul[c] != 0.0 {
            pre_mul[c] = mul[c];
          }
        }
      }
      None => warn!("Auto white balance found no usable blocks"),
    }
  }
  if params.use_camera_wb && !camera.wants_auto {
    if let Some(mul) = camera.white_sample.and_then(|white| white_sample_balance(white, cfa, levels)) {
      pre_mul = mul;
    } else if camera.cam_mul[0] > 0.0 && camera.cam_mul[2] > 0.0 {
      pre_mul = camera.cam_mul.map(|v| v as f64);
    } else {
      warn!("Cannot use camera white balance");
    }
  }
  if pre_mul[1] == 0.0 {
    pre_mul[1] = 1.0;
  }
  if pre_mul[3] == 0.0 {
    pre_mul[3] = if colors < 4 { pre_mul[1] } else { 1.0 };
  }
  pre_mul
}

/// Subtract black and scale each channel so that saturation maps to
/// 0xffff. Multipliers are normalized to the largest one, or the
/// smallest one if highlights get clipped. Results are clamped, black
/// subtraction never goes below zero. Returns the normalized
/// multipliers.
pub fn scale_colors(img: &mut Image4, levels: &Levels, pre_mul: [f64; 4], highlight: u32) -> [f64; 4] {
  let maximum = levels.maximum.saturating_sub(levels.black).max(1);
  let dmin = pre_mul.iter().cloned().fold(f64::MAX, f64::min);
  let dmax = pre_mul.iter().cloned().fold(0.0, f64::max);
  let norm = if highlight == 0 { dmin } else { dmax };
  let pre_mul = pre_mul.map(|m| m / norm);
  let scale_mul = pre_mul.map(|m| m * 65535.0 / maximum as f64);
  let cblack: [i64; 4] = std::array::from_fn(|c| levels.black_for(c) as i64);
  debug!(
    "Scaling with darkness {}, saturation {}, multipliers {:?}",
    levels.black, levels.maximum, pre_mul
  );
  img.data.par_iter_mut().for_each(|pix| {
    for c in 0..4 {
      if pix[c] == 0 {
        continue;
      }
      let val = (pix[c] as i64 - cblack[c]).max(0) as f64 * scale_mul[c];
      pix[c] = val.clamp(0.0, 65535.0) as u16;
    }
  });
  pre_mul
}

/// Working colors after scaling. Either both greens are interpolated as
/// separate colors and mixed afterwards, or the second green is folded
/// into the first one here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
  pub colors: usize,
  /// None once every pixel carries all colors
  pub cfa: Option<CFA>,
  pub mix_green: bool,
}

pub fn pre_interpolate(img: &mut Image4, cfa: &CFA, colors: usize, half_size: bool, four_color_rgb: bool) -> Interpolation {
  if half_size {
    if colors == 3 {
      img.data.par_iter_mut().for_each(|pix| {
        if pix[3] != 0 {
          pix[1] = ((pix[1] as u32 + pix[3] as u32) >> 1) as u16;
        }
      });
    }
    return Interpolation { colors, cfa: None, mix_green: false };
  }
  if colors == 3 && cfa.unique_colors() == 4 {
    if four_color_rgb {
      return Interpolation {
        colors: 4,
        cfa: Some(*cfa),
        mix_green: true,
      };
    }
    img.data.par_chunks_exact_mut(img.width.max(1)).enumerate().for_each(|(row, buf)| {
      for (col, pix) in buf.iter_mut().enumerate() {
        if cfa.color_at(row, col) == 3 {
          pix[1] = pix[3];
          pix[3] = 0;
        }
      }
    });
    return Interpolation {
      colors: 3,
      cfa: Some(cfa.merge_greens()),
      mix_green: false,
    };
  }
  Interpolation {
    colors,
    cfa: Some(*cfa),
    mix_green: false,
  }
}

/// Spread a packed image back to full size, each photosite takes its
/// CFA color slot from the block it was binned into.
pub fn unshrink(packed: &Image4, cfa: &CFA, width: usize, height: usize) -> Image4 {
  let mut img = Image4::new(width, height);
  img.data.par_chunks_exact_mut(width.max(1)).enumerate().for_each(|(row, buf)| {
    for (col, pix) in buf.iter_mut().enumerate() {
      let c = cfa.color_at(row, col);
      pix[c] = packed.at(row >> 1, col >> 1)[c];
    }
  });
  img
}

/// Average both greens after four color interpolation
pub fn mix_green(img: &mut Image4) {
  img.data.par_iter_mut().for_each(|pix| {
    pix[1] = ((pix[1] as u32 + pix[3] as u32) >> 1) as u16;
    pix[3] = 0;
  });
}
