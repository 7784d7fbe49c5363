// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::fmt;

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

pub const CFA_COLOR_R: usize = 0;
pub const CFA_COLOR_G: usize = 1;
pub const CFA_COLOR_B: usize = 2;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, TryFromPrimitive)]
#[repr(usize)]
#[allow(non_camel_case_types)]
pub enum CFAColor {
  RED = 0,
  GREEN = 1,
  BLUE = 2,
  /// Second green or the fourth color of CMYG sensors
  EMERALD = 3,
  #[default]
  UNKNOWN = 255,
}

/// Representation of the color filter array pattern in raw cameras
///
/// The pattern is stored as a packed 32 bit descriptor covering a tile of
/// 8 rows by 2 columns, two bits per photosite. Bayer 2x2 tiles repeat
/// inside of it, some sensors use all 8 rows.
///
/// # Example
/// ```
/// use rawcore::CFA;
/// let cfa = CFA::new("RGGB");
/// assert_eq!(cfa.color_at(0,0), 0);
/// assert_eq!(cfa.color_at(0,1), 1);
/// assert_eq!(cfa.color_at(1,0), 1);
/// assert_eq!(cfa.color_at(1,1), 2);
/// ```
#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct CFA {
  filters: u32,
}

impl Default for CFA {
  fn default() -> Self {
    Self { filters: 0 }
  }
}

impl CFA {
  /// Create a new CFA from a string describing it. Each photosite is one of
  /// R/G/B/E for the colors 0/1/2/3, rows are concatenated. A 4 letter
  /// pattern is a 2x2 tile, a 16 letter pattern a tile of 8 rows by 2
  /// columns. Anything else gives an invalid (empty) CFA.
  pub fn new(patname: &str) -> CFA {
    let height = match patname.len() {
      4 => 2,
      16 => 8,
      _ => return CFA::default(),
    };
    let mut pattern = [[0u32; 2]; 8];
    for (i, c) in patname.bytes().enumerate() {
      pattern[i / 2][i % 2] = match c {
        b'R' => 0,
        b'G' => 1,
        b'B' => 2,
        b'E' => 3,
        _ => return CFA::default(),
      };
    }
    let mut filters = 0;
    for row in 0..8 {
      for col in 0..2 {
        filters |= pattern[row % height][col] << (((row << 1) | col) << 1);
      }
    }
    CFA { filters }
  }

  /// Wrap a packed filter descriptor.
  pub fn from_filters(filters: u32) -> CFA {
    CFA { filters }
  }

  /// Build a descriptor from a CFARepeatPattern of up to 16 photosites.
  /// `plen` is the pattern length, `colormap` maps the tag color codes
  /// to color indices.
  pub fn from_pattern(pattern: &[u8], colormap: &[u8; 256]) -> CFA {
    let plen = pattern.len().clamp(1, 16);
    let mut filters = 0u32;
    for i in (0..16).rev() {
      filters = (filters << 2) | (colormap[pattern[i % plen] as usize] as u32 & 3);
    }
    CFA { filters }
  }

  /// Packed descriptor.
  pub fn filters(&self) -> u32 {
    self.filters
  }

  /// Get the color index at the given position. Designed to be fast so it can be called
  /// from inner loops without performance issues.
  #[inline(always)]
  pub fn color_at(&self, row: usize, col: usize) -> usize {
    ((self.filters >> ((((row << 1) & 14) | (col & 1)) << 1)) & 3) as usize
  }

  pub fn cfa_color_at(&self, row: usize, col: usize) -> CFAColor {
    CFAColor::try_from(self.color_at(row, col)).unwrap_or_default()
  }

  /// Count of unique colors in pattern
  pub fn unique_colors(&self) -> usize {
    let mut seen = [false; 4];
    for i in 0..16 {
      seen[((self.filters >> (i * 2)) & 3) as usize] = true;
    }
    seen.iter().filter(|s| **s).count()
  }

  /// Pattern repeats every two rows
  pub fn is_2x2(&self) -> bool {
    self.filters != 0 && (0..4).all(|row| self.color_at(row, 0) == self.color_at(row + 2, 0) && self.color_at(row, 1) == self.color_at(row + 2, 1))
  }

  /// Distinguish the second green of each 2x2 tile as color 3. Used
  /// for four color interpolation of RGB sensors.
  pub fn split_greens(&self) -> CFA {
    let mut filters = self.filters;
    filters |= ((filters >> 2 & 0x22222222) | (filters << 2 & 0x88888888)) & filters << 1;
    CFA { filters }
  }

  /// Map color 3 back onto color 1.
  pub fn merge_greens(&self) -> CFA {
    let mut filters = self.filters;
    for shift in (0..32).step_by(2) {
      if (filters >> shift & 3) == 3 {
        filters ^= 2 << shift;
      }
    }
    CFA { filters }
  }

  /// Shift the pattern left and/or down. This is useful when cropping the image to get
  /// the equivalent pattern of the crop when it's not a multiple of the pattern size.
  ///
  /// # Example
  /// ```
  /// use rawcore::CFA;
  /// let cfa = CFA::new("RGGB");
  /// let shifted = cfa.shift(1,1);
  /// assert_eq!(shifted.color_at(0,0), 2);
  /// assert_eq!(shifted.color_at(0,1), 1);
  /// assert_eq!(shifted.color_at(1,0), 1);
  /// assert_eq!(shifted.color_at(1,1), 0);
  /// ```
  pub fn shift(&self, x: usize, y: usize) -> CFA {
    let mut filters = 0;
    for row in 0..8 {
      for col in 0..2 {
        filters |= (self.color_at(row + y, col + x) as u32) << (((row << 1) | col) << 1);
      }
    }
    CFA { filters }
  }

  /// Test if this is actually a valid CFA pattern
  ///
  /// # Example
  /// ```
  /// use rawcore::CFA;
  /// assert!(CFA::new("RGGB").is_valid());
  /// assert!(!CFA::new("").is_valid());
  /// ```
  pub fn is_valid(&self) -> bool {
    self.filters != 0
  }

  /// Short name of the pattern, like `RGGB`
  pub fn name(&self) -> String {
    if !self.is_valid() {
      return String::new();
    }
    let rows = if self.is_2x2() { 2 } else { 8 };
    let mut name = String::with_capacity(rows * 2);
    for row in 0..rows {
      for col in 0..2 {
        name.push(['R', 'G', 'B', 'E'][self.color_at(row, col)]);
      }
    }
    name
  }
}

impl fmt::Display for CFA {
  /// Convert the CFA back into a pattern string
  ///
  /// # Example
  /// ```
  /// use rawcore::CFA;
  /// let cfa = CFA::new("RGGB");
  /// assert_eq!(cfa.to_string(), "RGGB");
  /// assert_eq!(cfa.shift(1,1).to_string(), "BGGR");
  /// ```
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name())
  }
}

impl fmt::Debug for CFA {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "CFA {{ {} ({:#010x}) }}", self.name(), self.filters)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filters_roundtrip_for_known_patterns() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert_eq!(CFA::new("RGGB").filters(), 0x94949494);
    assert_eq!(CFA::new("BGGR").filters(), 0x16161616);
    assert_eq!(CFA::new("GRBG").filters(), 0x61616161);
    assert_eq!(CFA::new("GBRG").filters(), 0x49494949);
    assert_eq!(CFA::from_filters(0x94949494).to_string(), "RGGB");
    Ok(())
  }

  #[test]
  fn split_and_merge_greens() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("RGGB");
    let split = cfa.split_greens();
    assert_eq!(split.color_at(0, 1), 1);
    assert_eq!(split.color_at(1, 0), 3);
    assert_eq!(split.unique_colors(), 4);
    assert_eq!(split.merge_greens(), cfa);
    Ok(())
  }

  #[test]
  fn pattern_from_tag() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut map = [0u8; 256];
    map[0] = 0;
    map[1] = 1;
    map[2] = 2;
    let cfa = CFA::from_pattern(&[0, 1, 1, 2], &map);
    // A 4 entry pattern is interpreted as two rows of two
    assert_eq!(cfa.color_at(0, 0), 0);
    assert_eq!(cfa.color_at(1, 1), 2);
    Ok(())
  }
}
