// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Adaptive homogeneity-directed interpolation, based on the work of
//! Keigo Hirakawa, Thomas Parks and Paul Lee.
//!
//! For each tile the image is interpolated twice, once horizontally and
//! once vertically. Both results are converted to CIELab and for each
//! pixel the direction with the more homogeneous neighborhood wins.

use lazy_static::lazy_static;
use rayon::prelude::*;

use super::{border_interpolate, Demosaic};
use crate::{cfa::CFA_COLOR_G, pixarray::Image4, CFA};

/// Tile size
const TS: usize = 256;

lazy_static! {
  /// 64 times the CIELab f(t) function for 16 bit input
  static ref CBRT: Vec<f32> = (0..0x10000)
    .map(|i| {
      let r = i as f64 / 65535.0;
      (64.0 * if r > 0.008856 { r.powf(1.0 / 3.0) } else { 7.787 * r + 16.0 / 116.0 }) as f32
    })
    .collect();
}

#[inline(always)]
fn cbrt64(f: f32) -> f32 {
  if f <= 0.0 {
    CBRT[0]
  } else if f >= 65535.0 {
    CBRT[0xffff]
  } else {
    CBRT[f as usize]
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

#[derive(Debug, Clone, Copy)]
pub struct Ahd {
  /// Camera to XYZ, normalized to D65 white
  xyz_cam: [[f32; 4]; 3],
}

impl Ahd {
  pub fn new(xyz_cam: [[f32; 4]; 3]) -> Self {
    Self { xyz_cam }
  }
}

/// Result of one tile, rows and columns in image coordinates
struct TileOutput {
  top: usize,
  left: usize,
  width: usize,
  pixels: Vec<[u16; 3]>,
}

/// Scratch buffers of one tile
struct Tile<'a> {
  img: &'a Image4,
  cfa: &'a CFA,
  xyz_cam: &'a [[f32; 4]; 3],
  top: usize,
  left: usize,
  rgb: [Vec<[u16; 3]>; 2],
  lab: [Vec<[i16; 3]>; 2],
  homo: Vec<[u8; 2]>,
}

impl<'a> Tile<'a> {
  fn new(img: &'a Image4, cfa: &'a CFA, xyz_cam: &'a [[f32; 4]; 3], top: usize, left: usize) -> Self {
    Self {
      img,
      cfa,
      xyz_cam,
      top,
      left,
      rgb: [vec![[0; 3]; TS * TS], vec![[0; 3]; TS * TS]],
      lab: [vec![[0; 3]; TS * TS], vec![[0; 3]; TS * TS]],
      homo: vec![[0; 2]; TS * TS],
    }
  }

  #[inline(always)]
  fn px(&self, row: usize, col: usize, c: usize) -> i32 {
    self.img.at(row, col)[c] as i32
  }

  /// Green in horizontal and vertical direction for non-green pixels
  fn green_h_and_v(&mut self) {
    let (width, height) = (self.img.width, self.img.height);
    let (top, left) = (self.top, self.left);
    for row in top..(top + TS).min(height - 2) {
      let mut col = left + (self.cfa.color_at(row, left) & 1);
      let c = self.cfa.color_at(row, col);
      while col < (left + TS).min(width - 2) {
        let g = CFA_COLOR_G;
        let idx = (row - top) * TS + (col - left);
        let val = ((self.px(row, col - 1, g) + self.px(row, col, c) + self.px(row, col + 1, g)) * 2 - self.px(row, col - 2, c) - self.px(row, col + 2, c)) >> 2;
        self.rgb[0][idx][1] = ulim(val, self.px(row, col - 1, g), self.px(row, col + 1, g)) as u16;
        let val = ((self.px(row - 1, col, g) + self.px(row, col, c) + self.px(row + 1, col, g)) * 2 - self.px(row - 2, col, c) - self.px(row + 2, col, c)) >> 2;
        self.rgb[1][idx][1] = ulim(val, self.px(row - 1, col, g), self.px(row + 1, col, g)) as u16;
        col += 2;
      }
    }
  }

  /// Red and blue for one direction, then convert to CIELab
  fn rb_and_lab(&mut self, dir: usize) {
    let (width, height) = (self.img.width, self.img.height);
    let (top, left) = (self.top, self.left);
    let mut rgb = std::mem::take(&mut self.rgb[dir]);
    let mut lab = std::mem::take(&mut self.lab[dir]);
    let rg = |rgb: &[[u16; 3]], idx: usize| rgb[idx][1] as i32;
    for row in top + 1..(top + TS - 1).min(height - 3) {
      for col in left + 1..(left + TS - 1).min(width - 3) {
        let idx = (row - top) * TS + (col - left);
        let f = self.cfa.color_at(row, col);
        if f == CFA_COLOR_G {
          let c = self.cfa.color_at(row + 1, col);
          let t1 = 2 - c;
          let val = self.px(row, col, 1) + ((self.px(row, col - 1, t1) + self.px(row, col + 1, t1) - rg(&rgb, idx - 1) - rg(&rgb, idx + 1)) >> 1);
          rgb[idx][t1] = clip(val);
          let val = self.px(row, col, 1) + ((self.px(row - 1, col, c) + self.px(row + 1, col, c) - rg(&rgb, idx - TS) - rg(&rgb, idx + TS)) >> 1);
          rgb[idx][c] = clip(val);
        } else {
          let c = 2 - f;
          let val = rg(&rgb, idx)
            + ((self.px(row - 1, col - 1, c) + self.px(row - 1, col + 1, c) + self.px(row + 1, col - 1, c) + self.px(row + 1, col + 1, c)
              - rg(&rgb, idx - TS - 1)
              - rg(&rgb, idx - TS + 1)
              - rg(&rgb, idx + TS - 1)
              - rg(&rgb, idx + TS + 1)
              + 1)
              >> 2);
          rgb[idx][c] = clip(val);
        }
        rgb[idx][f] = self.img.at(row, col)[f];

        let mut xyz = [0.5_f32; 3];
        for c in 0..3 {
          for (i, v) in xyz.iter_mut().enumerate() {
            *v += self.xyz_cam[i][c] * rgb[idx][c] as f32;
          }
        }
        let xyz = xyz.map(cbrt64);
        lab[idx] = [(116.0 * xyz[1] - 16.0) as i16, (500.0 * (xyz[0] - xyz[1])) as i16, (200.0 * (xyz[1] - xyz[2])) as i16];
      }
    }
    self.rgb[dir] = rgb;
    self.lab[dir] = lab;
  }

  /// Count neighbors within the tolerance of luminance and chroma
  fn homogeneity_map(&mut self) {
    let (width, height) = (self.img.width, self.img.height);
    let (top, left) = (self.top, self.left);
    let offsets: [isize; 4] = [-1, 1, -(TS as isize), TS as isize];
    for row in top + 2..(top + TS - 2).min(height - 4) {
      for col in left + 2..(left + TS - 2).min(width - 4) {
        let idx = (row - top) * TS + (col - left);
        let mut ldiff = [[0_i64; 4]; 2];
        let mut abdiff = [[0_i64; 4]; 2];
        for dir in 0..2 {
          let lix = self.lab[dir][idx];
          for (i, off) in offsets.iter().enumerate() {
            let adj = self.lab[dir][(idx as isize + off) as usize];
            ldiff[dir][i] = (lix[0] as i64 - adj[0] as i64).abs();
            abdiff[dir][i] = (lix[1] as i64 - adj[1] as i64).pow(2) + (lix[2] as i64 - adj[2] as i64).pow(2);
          }
        }
        let leps = ldiff[0][0].max(ldiff[0][1]).min(ldiff[1][2].max(ldiff[1][3]));
        let abeps = abdiff[0][0].max(abdiff[0][1]).min(abdiff[1][2].max(abdiff[1][3]));
        for dir in 0..2 {
          self.homo[idx][dir] = (0..4).filter(|&i| ldiff[dir][i] <= leps && abdiff[dir][i] <= abeps).count() as u8;
        }
      }
    }
  }

  /// Choose the more homogeneous direction for each pixel
  fn combine(&self) -> TileOutput {
    let (width, height) = (self.img.width, self.img.height);
    let (top, left) = (self.top, self.left);
    let rows = top + 3..(top + TS - 3).min(height - 5);
    let cols = left + 3..(left + TS - 3).min(width - 5);
    let mut pixels = Vec::with_capacity(rows.len() * cols.len());
    for row in rows {
      for col in cols.clone() {
        let (tr, tc) = (row - top, col - left);
        let mut hm = [0_u32; 2];
        for i in tr - 1..=tr + 1 {
          for j in tc - 1..=tc + 1 {
            let h = self.homo[i * TS + j];
            hm[0] += h[0] as u32;
            hm[1] += h[1] as u32;
          }
        }
        let idx = tr * TS + tc;
        pixels.push(if hm[0] != hm[1] {
          self.rgb[(hm[1] > hm[0]) as usize][idx]
        } else {
          let (a, b) = (self.rgb[0][idx], self.rgb[1][idx]);
          [0, 1, 2].map(|c| ((a[c] as u32 + b[c] as u32) >> 1) as u16)
        });
      }
    }
    TileOutput {
      top: top + 3,
      left: left + 3,
      width: (left + TS - 3).min(width - 5).saturating_sub(left + 3),
      pixels,
    }
  }
}

impl Demosaic for Ahd {
  fn name(&self) -> &'static str {
    "AHD"
  }

  fn demosaic(&self, img: &mut Image4, cfa: &CFA, colors: usize) {
    border_interpolate(img, cfa, colors, 5);
    let (width, height) = (img.width, img.height);
    if width < 11 || height < 11 {
      return;
    }
    let tiles: Vec<(usize, usize)> = (2..height - 5)
      .step_by(TS - 6)
      .flat_map(|top| (2..width - 5).step_by(TS - 6).map(move |left| (top, left)))
      .collect();
    let source: &Image4 = img;
    let outputs: Vec<TileOutput> = tiles
      .into_par_iter()
      .map(|(top, left)| {
        let mut tile = Tile::new(source, cfa, &self.xyz_cam, top, left);
        tile.green_h_and_v();
        tile.rb_and_lab(0);
        tile.rb_and_lab(1);
        tile.homogeneity_map();
        tile.combine()
      })
      .collect();
    for out in outputs {
      if out.width == 0 {
        continue;
      }
      for (i, rgb) in out.pixels.chunks_exact(out.width).enumerate() {
        for (j, pix) in rgb.iter().enumerate() {
          img.at_mut(out.top + i, out.left + j)[..3].copy_from_slice(pix);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::tests::{assert_flat, flat_mosaic};
  use super::*;
  use crate::imgop::matrix::CameraColor;

  fn srgb_xyz_cam() -> [[f32; 4]; 3] {
    CameraColor::raw(3).xyz_cam().map(|row| row.map(|v| v as f32))
  }

  #[test]
  fn flat_surface_stays_flat() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("BGGR");
    let mut img = flat_mosaic(&cfa, 40, 30, [2500, 5000, 7500]);
    Ahd::new(srgb_xyz_cam()).demosaic(&mut img, &cfa, 3);
    assert_flat(&img, [2500, 5000, 7500], 1);
    Ok(())
  }

  #[test]
  fn tiles_cover_large_images() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("RGGB");
    let mut img = flat_mosaic(&cfa, 300, 20, [1000, 1000, 1000]);
    Ahd::new(srgb_xyz_cam()).demosaic(&mut img, &cfa, 3);
    // Columns around the tile seam at 252
    for col in 245..260 {
      assert_eq!(img.at(10, col)[..3], [1000, 1000, 1000]);
    }
    Ok(())
  }

  #[test]
  fn cbrt_table_limits() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert!((cbrt64(65535.0) - 64.0).abs() < 1e-3);
    assert!((cbrt64(-5.0) - 64.0 * 16.0 / 116.0).abs() < 1e-3);
    Ok(())
  }
}
