// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Treatment of clipped highlights after interpolation

use log::debug;
use rayon::prelude::*;

use crate::pixarray::Image4;

/// Opponent color transforms for three and four colors
const TRANS: [[[f32; 4]; 4]; 2] = [
  [[1.0, 1.0, 1.0, 0.0], [1.7320508, -1.7320508, 0.0, 0.0], [-1.0, -1.0, 2.0, 0.0], [0.0; 4]],
  [[1.0, 1.0, 1.0, 1.0], [1.0, -1.0, 1.0, -1.0], [1.0, 1.0, -1.0, -1.0], [1.0, -1.0, -1.0, 1.0]],
];
const ITRANS: [[[f32; 4]; 4]; 2] = [
  [[1.0, 0.8660254, -0.5, 0.0], [1.0, -0.8660254, -0.5, 0.0], [1.0, 0.0, 1.0, 0.0], [0.0; 4]],
  [[1.0, 1.0, 1.0, 1.0], [1.0, -1.0, 1.0, -1.0], [1.0, 1.0, -1.0, -1.0], [1.0, -1.0, -1.0, 1.0]],
];

/// Blend clipped pixels: keep the lightness of the unclipped values but
/// the hue of the clipped ones, so highlights fade to neutral.
pub fn blend_highlights(img: &mut Image4, colors: usize, pre_mul: &[f64; 4]) {
  if !(3..=4).contains(&colors) {
    return;
  }
  let clip = (0..colors).map(|c| (65535.0 * pre_mul[c]) as i64).min().unwrap_or(i64::MAX).min(65535) as f32;
  let trans = &TRANS[colors - 3];
  let itrans = &ITRANS[colors - 3];
  debug!("Blending highlights above {}", clip);
  img.data.par_iter_mut().for_each(|pix| {
    if !pix[..colors].iter().any(|v| *v as f32 > clip) {
      return;
    }
    let mut cam = [[0.0_f32; 4]; 2];
    for c in 0..colors {
      cam[0][c] = pix[c] as f32;
      cam[1][c] = cam[0][c].min(clip);
    }
    let mut lab = [[0.0_f32; 4]; 2];
    let mut sum = [0.0_f32; 2];
    for i in 0..2 {
      for c in 0..colors {
        lab[i][c] = (0..colors).map(|j| trans[c][j] * cam[i][j]).sum();
      }
      sum[i] = (1..colors).map(|c| lab[i][c] * lab[i][c]).sum();
    }
    let chratio = if sum[0] > 0.0 { (sum[1] / sum[0]).sqrt() } else { 0.0 };
    for c in 1..colors {
      lab[0][c] *= chratio;
    }
    for c in 0..colors {
      let v: f32 = (0..colors).map(|j| itrans[c][j] * lab[0][j]).sum();
      pix[c] = (v / colors as f32).clamp(0.0, 65535.0) as u16;
    }
  });
}

/// Neighbor directions of the map, clockwise from NW
const DIR: [(isize, isize); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, 1), (1, 1), (1, 0), (1, -1), (0, -1)];

/// Rebuild clipped channels from the ratio to the strongest channel in
/// unclipped areas nearby. `level` is the highlight mode 3 to 9, higher
/// values let the ratios spread further.
pub fn recover_highlights(img: &mut Image4, colors: usize, pre_mul: &[f64; 4], level: u32, shrink: bool) {
  let scale = 4 >> shrink as usize;
  let grow = 2.0_f32.powf(4.0 - level as f32);
  let hsat: [u32; 4] = std::array::from_fn(|c| (32000.0 * pre_mul[c]) as u32);
  let kc = (1..colors).fold(0, |kc, c| if pre_mul[kc] < pre_mul[c] { c } else { kc });
  let (high, wide) = (img.height / scale, img.width / scale);
  if high == 0 || wide == 0 {
    return;
  }
  debug!("Rebuilding highlights, level {}, key channel {}", level, kc);
  let width = img.width;
  for c in (0..colors).filter(|c| *c != kc) {
    if hsat[c] == 0 {
      continue;
    }
    // Ratio map over blocks that are fully clipped in this channel
    let mut map: Vec<f32> = (0..high * wide)
      .into_par_iter()
      .map(|i| {
        let (mrow, mcol) = (i / wide, i % wide);
        let (mut sum, mut wgt, mut count) = (0.0_f32, 0.0_f32, 0);
        for row in mrow * scale..(mrow + 1) * scale {
          for col in mcol * scale..(mcol + 1) * scale {
            let pixel = img.data[row * width + col];
            if pixel[c] as u32 / hsat[c] == 1 && pixel[kc] > 24000 {
              sum += pixel[c] as f32;
              wgt += pixel[kc] as f32;
              count += 1;
            }
          }
        }
        if count == scale * scale {
          sum / wgt
        } else {
          0.0
        }
      })
      .collect();

    let mut spread = (32.0 / grow) as u32;
    while spread > 0 {
      spread -= 1;
      for mrow in 0..high {
        for mcol in 0..wide {
          if map[mrow * wide + mcol] != 0.0 {
            continue;
          }
          let (mut sum, mut count) = (0.0_f32, 0_u32);
          for (d, (dy, dx)) in DIR.iter().enumerate() {
            let (y, x) = (mrow as isize + dy, mcol as isize + dx);
            if y < 0 || x < 0 || y as usize >= high || x as usize >= wide {
              continue;
            }
            let v = map[y as usize * wide + x as usize];
            if v > 0.0 {
              let w = 1 + (d & 1) as u32;
              sum += w as f32 * v;
              count += w;
            }
          }
          if count > 3 {
            map[mrow * wide + mcol] = -(sum + grow) / (count as f32 + grow);
          }
        }
      }
      let mut change = false;
      for v in map.iter_mut().filter(|v| **v < 0.0) {
        *v = -*v;
        change = true;
      }
      if !change {
        break;
      }
    }
    map.iter_mut().filter(|v| **v == 0.0).for_each(|v| *v = 1.0);

    img.data.par_chunks_exact_mut(width).enumerate().for_each(|(row, buf)| {
      let mrow = row / scale;
      if mrow >= high {
        return;
      }
      for (col, pixel) in buf.iter_mut().enumerate().take(wide * scale) {
        if pixel[c] as u32 / hsat[c] > 1 {
          let val = (pixel[kc] as f32 * map[mrow * wide + col / scale]) as i32;
          if (pixel[c] as i32) < val {
            pixel[c] = val.clamp(0, 65535) as u16;
          }
        }
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blend_leaves_unclipped_pixels() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut img = Image4::new_with(vec![[30000, 40000, 20000, 0], [65535, 65535, 30000, 0]], 2, 1);
    blend_highlights(&mut img, 3, &[1.0, 1.0, 1.0, 1.0]);
    assert_eq!(img.at(0, 0)[..3], [30000, 40000, 20000]);
    Ok(())
  }

  #[test]
  fn blend_neutral_clip_stays_neutral() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut img = Image4::new_with(vec![[65535, 65535, 65535, 0]], 1, 1);
    blend_highlights(&mut img, 3, &[0.5, 1.0, 0.8, 1.0]);
    let pix = img.at(0, 0);
    // Lightness of the unclipped values divided by the color count
    assert!((pix[0] as i32 - 65535).abs() <= 1);
    assert_eq!(pix[0], pix[1]);
    assert_eq!(pix[1], pix[2]);
    Ok(())
  }

  #[test]
  fn recover_uses_neighbor_ratio() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Green is the key channel, red clips at 32000 * 0.5
    let pre_mul = [0.5, 1.0, 0.5, 1.0];
    let mut img = Image4::new_with(vec![[16500, 30000, 10000, 0]; 16 * 16], 16, 16);
    for row in 0..16 {
      for col in 8..16 {
        img.at_mut(row, col)[..3].copy_from_slice(&[40000, 65000, 10000]);
      }
    }
    recover_highlights(&mut img, 3, &pre_mul, 5, false);
    // Red rebuilt from the ratio found left of the clipped area, which
    // grows slightly while spreading
    let red = img.at(8, 12)[0];
    assert!(red > 40000 && red < 45000, "red is {}", red);
    assert_eq!(img.at(8, 2)[0], 16500);
    Ok(())
  }
}
