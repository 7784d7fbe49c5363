// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use serde::{Deserialize, Serialize};

use crate::CFA;
use crate::imgop::{Dim2, Point, Rect};

/// Image orientation as stored in TIFF tag 0x0112
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
  Normal,
  HorizontalFlip,
  Rotate180,
  VerticalFlip,
  Transpose,
  Rotate90,
  Transverse,
  Rotate270,
  #[default]
  Unknown,
}

impl Orientation {
  /// Convert a u16 from the IFD tag Orientation (0x0112) into its corresponding
  /// enum value
  pub fn from_u16(orientation: u16) -> Orientation {
    match orientation {
      1 => Orientation::Normal,
      2 => Orientation::HorizontalFlip,
      3 => Orientation::Rotate180,
      4 => Orientation::VerticalFlip,
      5 => Orientation::Transpose,
      6 => Orientation::Rotate90,
      7 => Orientation::Transverse,
      8 => Orientation::Rotate270,
      _ => Orientation::Unknown,
    }
  }

  /// Convert orientation to an image flip operation tuple. The first field is
  /// if x and y coordinates should be swapped (transposed). The second and
  /// third field is horizontal and vertical flipping respectively.
  pub fn to_flips(&self) -> (bool, bool, bool) {
    match *self {
      Orientation::Normal | Orientation::Unknown => (false, false, false),
      Orientation::VerticalFlip => (false, false, true),
      Orientation::HorizontalFlip => (false, true, false),
      Orientation::Rotate180 => (false, true, true),
      Orientation::Transpose => (true, false, false),
      Orientation::Rotate90 => (true, false, true),
      Orientation::Rotate270 => (true, true, false),
      Orientation::Transverse => (true, true, true),
    }
  }

  /// Does the opposite of to_flips()
  pub fn from_flips(flips: (bool, bool, bool)) -> Self {
    match flips {
      (false, false, false) => Orientation::Normal,
      (false, false, true) => Orientation::VerticalFlip,
      (false, true, false) => Orientation::HorizontalFlip,
      (false, true, true) => Orientation::Rotate180,
      (true, false, false) => Orientation::Transpose,
      (true, false, true) => Orientation::Rotate90,
      (true, true, false) => Orientation::Rotate270,
      (true, true, true) => Orientation::Transverse,
    }
  }

  /// Flip bit field: 4 swaps axes, 2 mirrors rows, 1 mirrors columns
  pub fn flip_bits(&self) -> u8 {
    let (t, h, v) = self.to_flips();
    (t as u8) << 2 | (v as u8) << 1 | h as u8
  }

  pub fn from_flip_bits(bits: u8) -> Self {
    Self::from_flips((bits & 4 != 0, bits & 1 != 0, bits & 2 != 0))
  }

  /// Orientation from a rotation in degrees, as some makers store it
  pub fn from_degrees(deg: i32) -> Self {
    match deg.rem_euclid(360) {
      90 => Orientation::Rotate90,
      180 => Orientation::Rotate180,
      270 => Orientation::Rotate270,
      _ => Orientation::Normal,
    }
  }

  /// Convert orientation to the Tiff Orientation value
  pub fn to_u16(&self) -> u16 {
    match *self {
      Orientation::Unknown => 0,
      Orientation::Normal => 1,
      Orientation::HorizontalFlip => 2,
      Orientation::Rotate180 => 3,
      Orientation::VerticalFlip => 4,
      Orientation::Transpose => 5,
      Orientation::Rotate90 => 6,
      Orientation::Transverse => 7,
      Orientation::Rotate270 => 8,
    }
  }
}

/// Sensor level samples for the full sensor area including masked
/// borders. Mosaic sensors store one sample per photosite, full color
/// payloads store `cpp` interleaved samples per pixel.
#[derive(Debug, Clone)]
pub struct RawFrame {
  pub dim: Dim2,
  pub data: Vec<u16>,
  /// Components per pixel, 1 for a color filter array
  pub cpp: usize,
  pub bps: u32,
  pub cfa: CFA,
  /// Number of distinct colors of the sensor (3 or 4)
  pub colors: usize,
  /// Global black level
  pub black: u32,
  /// Per channel black level on top of `black`
  pub cblack: [u32; 4],
  /// Saturation level
  pub maximum: u32,
  pub orientation: Orientation,
  /// Visible area inside the sensor area
  pub crop: Rect,
  pub pixel_aspect: f64,
  /// Non-zero for SuperCCD sensors stored 45 degrees rotated, the
  /// width of the rotated sensor in the frame
  pub fuji_width: usize,
}

impl RawFrame {
  /// Create a zero filled frame with visible area equal to the sensor area
  pub fn new(dim: Dim2, bps: u32, cfa: CFA) -> Self {
    Self::new_with_cpp(dim, bps, cfa, 1)
  }

  pub fn new_with_cpp(dim: Dim2, bps: u32, cfa: CFA, cpp: usize) -> Self {
    let cpp = cpp.max(1);
    Self {
      dim,
      data: vec![0; dim.w * dim.h * cpp],
      cpp,
      bps,
      cfa,
      colors: 3,
      black: 0,
      cblack: [0; 4],
      maximum: (1_u32 << bps.min(16)) - 1,
      orientation: Orientation::Normal,
      crop: Rect::new(Point::new(0, 0), dim),
      pixel_aspect: 1.0,
      fuji_width: 0,
    }
  }

  /// Frame carries full color pixels instead of a mosaic
  pub fn is_full_color(&self) -> bool {
    self.cpp > 1
  }

  pub fn width(&self) -> usize {
    self.dim.w
  }

  pub fn height(&self) -> usize {
    self.dim.h
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> u16 {
    self.data[row * self.dim.w + col]
  }

  /// All components of a pixel
  #[inline(always)]
  pub fn pixel(&self, row: usize, col: usize) -> &[u16] {
    let idx = (row * self.dim.w + col) * self.cpp;
    &self.data[idx..idx + self.cpp]
  }

  #[inline(always)]
  pub fn pixel_mut(&mut self, row: usize, col: usize) -> &mut [u16] {
    let idx = (row * self.dim.w + col) * self.cpp;
    &mut self.data[idx..idx + self.cpp]
  }

  /// Color index of a photosite in visible area coordinates
  #[inline(always)]
  pub fn color_at(&self, row: usize, col: usize) -> usize {
    self.cfa.color_at(row, col)
  }

  /// Total black for a color channel
  pub fn black_for(&self, color: usize) -> u32 {
    self.black + self.cblack[color & 3]
  }

  /// Copy of the visible area, row major, components interleaved
  pub fn visible(&self) -> Vec<u16> {
    if self.cpp == 1 {
      return crate::imgop::crop(&self.data, self.dim, self.crop);
    }
    let (top, left) = (self.crop.p.y, self.crop.p.x);
    let mut out = Vec::with_capacity(self.crop.d.w * self.crop.d.h * self.cpp);
    for row in top..top + self.crop.d.h {
      let start = (row * self.dim.w + left) * self.cpp;
      out.extend_from_slice(&self.data[start..start + self.crop.d.w * self.cpp]);
    }
    out
  }

  /// Average value of the masked photosites, per color and over all
  /// colors. Masked columns beside the visible rows are used, skipping the
  /// two outermost columns and two columns on each side of the visible
  /// area. Without such columns the rows above the visible area are used.
  /// Full color frames have no masked photosites.
  pub fn masked_black(&self) -> Option<([u32; 4], u32)> {
    if self.is_full_color() {
      return None;
    }
    let (top, left) = (self.crop.p.y, self.crop.p.x);
    let right = left + self.crop.d.w;
    let mut sum = [0_u64; 4];
    let mut count = [0_u64; 4];
    let add = |row: usize, col: usize, sum: &mut [u64; 4], count: &mut [u64; 4]| {
      // Color of masked photosites continues the visible pattern
      let c = self.cfa.color_at(row.wrapping_sub(top) & 15, col.wrapping_sub(left) & 15);
      sum[c] += self.at(row, col) as u64;
      count[c] += 1;
    };
    for row in top..(top + self.crop.d.h).min(self.dim.h) {
      for col in 2..self.dim.w {
        if col + 2 < left || col >= right + 2 {
          add(row, col, &mut sum, &mut count);
        }
      }
    }
    if count.iter().all(|c| *c == 0) {
      for row in 0..top.min(self.dim.h) {
        for col in 0..self.dim.w {
          add(row, col, &mut sum, &mut count);
        }
      }
    }
    let total: u64 = count.iter().sum();
    if total == 0 {
      return None;
    }
    let mut out = [0_u32; 4];
    for c in 0..4 {
      if count[c] > 0 {
        out[c] = (sum[c] / count[c]) as u32;
      }
    }
    Some((out, (sum.iter().sum::<u64>() / total) as u32))
  }

  /// Highest sample value in the visible area
  pub fn peak(&self) -> u16 {
    self.visible().into_iter().max().unwrap_or(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flip_bits_match_orientation() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert_eq!(Orientation::Rotate90.flip_bits(), 6);
    assert_eq!(Orientation::Rotate270.flip_bits(), 5);
    assert_eq!(Orientation::Rotate180.flip_bits(), 3);
    assert_eq!(Orientation::from_flip_bits(6), Orientation::Rotate90);
    assert_eq!(Orientation::from_degrees(-90), Orientation::Rotate270);
    Ok(())
  }

  #[test]
  fn masked_black_averages_per_color() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = RawFrame::new(Dim2::new(10, 4), 12, CFA::new("RGGB"));
    frame.crop = Rect::new(Point::new(2, 0), Dim2::new(4, 4));
    for row in 0..4 {
      for col in 8..10 {
        frame.data[row * 10 + col] = 64 + frame.cfa.color_at(row, col - 2) as u16;
      }
    }
    let (black, global) = frame.masked_black().ok_or("no masked area")?;
    assert_eq!(black[0], 64);
    assert_eq!(black[1], 65);
    assert_eq!(black[2], 66);
    assert_eq!(global, 65);
    Ok(())
  }

  #[test]
  fn full_color_pixels_are_interleaved() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = RawFrame::new_with_cpp(Dim2::new(3, 2), 14, CFA::default(), 3);
    assert_eq!(frame.data.len(), 18);
    frame.pixel_mut(1, 2).copy_from_slice(&[7, 8, 9]);
    assert_eq!(&frame.data[15..], &[7, 8, 9]);
    frame.crop = Rect::new(Point::new(1, 1), Dim2::new(2, 1));
    assert_eq!(frame.visible(), vec![0, 0, 0, 7, 8, 9]);
    assert_eq!(frame.peak(), 9);
    assert!(frame.masked_black().is_none());
    Ok(())
  }

  #[test]
  fn masked_black_falls_back_to_top_rows() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = RawFrame::new(Dim2::new(4, 4), 12, CFA::new("RGGB"));
    frame.crop = Rect::new(Point::new(0, 2), Dim2::new(4, 2));
    frame.data[..8].fill(100);
    let (_, global) = frame.masked_black().ok_or("no masked area")?;
    assert_eq!(global, 100);
    Ok(())
  }
}
