// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

#[inline(always)]
pub fn clampbits(val: i32, bits: u32) -> u16 {
  let max = (1 << bits) - 1;
  if val < 0 {
    0
  } else if val > max {
    max as u16
  } else {
    val as u16
  }
}

/// Clip a value into the 16 bit range.
#[inline(always)]
pub fn clip16(val: i32) -> u16 {
  val.clamp(0, 0xffff) as u16
}

/// Clip a float into the 16 bit range, rounding to the nearest integer.
#[inline(always)]
pub fn clipf(val: f32) -> u16 {
  if val.is_nan() { 0 } else { val.round().clamp(0.0, 65535.0) as u16 }
}

#[inline(always)]
pub fn ulim(x: i32, y: i32, z: i32) -> i32 {
  if y < z { x.clamp(y, z) } else { x.clamp(z, y) }
}

/// Calculate the required bits to encode as many states.
pub fn log2ceil(mut states: usize) -> usize {
  let mut bits = 0;
  if states > 0 {
    states -= 1;
    loop {
      states >>= 1;
      bits += 1;
      if states == 0 {
        break;
      }
    }
  }
  bits
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endian {
  Big,
  #[default]
  Little,
}

impl Endian {
  /// Byte order as stored in a TIFF header ("II" or "MM").
  pub fn from_marker(marker: &[u8]) -> Option<Self> {
    match marker.get(0..2) {
      Some(b"II") => Some(Self::Little),
      Some(b"MM") => Some(Self::Big),
      _ => None,
    }
  }

  #[inline]
  pub fn big(&self) -> bool {
    matches!(*self, Self::Big)
  }

  #[inline]
  pub fn little(&self) -> bool {
    matches!(*self, Self::Little)
  }

  #[inline]
  pub fn read_u16(&self, buf: &[u8], offset: usize) -> u16 {
    match *self {
      Self::Big => BigEndian::read_u16(&buf[offset..]),
      Self::Little => LittleEndian::read_u16(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_i16(&self, buf: &[u8], offset: usize) -> i16 {
    self.read_u16(buf, offset) as i16
  }

  #[inline]
  pub fn read_u32(&self, buf: &[u8], offset: usize) -> u32 {
    match *self {
      Self::Big => BigEndian::read_u32(&buf[offset..]),
      Self::Little => LittleEndian::read_u32(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_i32(&self, buf: &[u8], offset: usize) -> i32 {
    self.read_u32(buf, offset) as i32
  }

  #[inline]
  pub fn read_f32(&self, buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(self.read_u32(buf, offset))
  }

  #[inline]
  pub fn read_f64(&self, buf: &[u8], offset: usize) -> f64 {
    match *self {
      Self::Big => BigEndian::read_f64(&buf[offset..]),
      Self::Little => LittleEndian::read_f64(&buf[offset..]),
    }
  }

  /// Checked variant of `read_u16`, returns `None` when the buffer is too short.
  #[inline]
  pub fn get_u16(&self, buf: &[u8], offset: usize) -> Option<u16> {
    buf.get(offset..offset.checked_add(2)?).map(|b| self.read_u16(b, 0))
  }

  /// Checked variant of `read_u32`, returns `None` when the buffer is too short.
  #[inline]
  pub fn get_u32(&self, buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset.checked_add(4)?).map(|b| self.read_u32(b, 0))
  }

  #[inline]
  pub fn write_u16(&self, buf: &mut [u8], n: u16) {
    match *self {
      Self::Big => BigEndian::write_u16(buf, n),
      Self::Little => LittleEndian::write_u16(buf, n),
    }
  }
}

#[allow(non_snake_case)]
#[inline]
pub fn BEu32(buf: &[u8], pos: usize) -> u32 {
  BigEndian::read_u32(&buf[pos..pos + 4])
}

#[allow(non_snake_case)]
#[inline]
pub fn LEu32(buf: &[u8], pos: usize) -> u32 {
  LittleEndian::read_u32(&buf[pos..pos + 4])
}

#[allow(non_snake_case)]
#[inline]
pub fn BEu16(buf: &[u8], pos: usize) -> u16 {
  BigEndian::read_u16(&buf[pos..pos + 2])
}

#[allow(non_snake_case)]
#[inline]
pub fn LEu16(buf: &[u8], pos: usize) -> u16 {
  LittleEndian::read_u16(&buf[pos..pos + 2])
}

/// Tone curve applied by some decoders to map stored codes
/// to linear sensor values (e.g. NEF curves, DNG linearization).
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
  table: Vec<u16>,
}

impl Default for LookupTable {
  fn default() -> Self {
    Self::identity()
  }
}

impl LookupTable {
  /// Identity curve covering the full 16 bit range
  pub fn identity() -> Self {
    Self {
      table: (0..=u16::MAX).collect(),
    }
  }

  /// Build a curve of exactly 0x10000 entries. Codes beyond the
  /// given table are mapped to its last value.
  pub fn new(table: &[u16]) -> Self {
    let last = table.last().copied().unwrap_or(0);
    let mut expanded = Vec::with_capacity(0x10000);
    expanded.extend_from_slice(&table[..table.len().min(0x10000)]);
    expanded.resize(0x10000, last);
    Self { table: expanded }
  }

  #[inline(always)]
  pub fn lookup(&self, value: u16) -> u16 {
    self.table[value as usize]
  }

  /// Value at a given index, used to derive the maximum of a curve.
  pub fn at(&self, idx: usize) -> u16 {
    self.table[idx.min(0xffff)]
  }

  pub fn is_identity(&self) -> bool {
    self.table.iter().enumerate().all(|(i, v)| i == *v as usize)
  }

  pub fn as_slice(&self) -> &[u16] {
    &self.table
  }

  pub fn as_mut_slice(&mut self) -> &mut [u16] {
    &mut self.table
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clampbits_limits() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert_eq!(clampbits(-5, 12), 0);
    assert_eq!(clampbits(5000, 12), 4095);
    assert_eq!(clampbits(100, 12), 100);
    Ok(())
  }

  #[test]
  fn lookup_table_expands_last_value() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let curve = LookupTable::new(&[0, 10, 20]);
    assert_eq!(curve.lookup(1), 10);
    assert_eq!(curve.lookup(5000), 20);
    assert!(LookupTable::identity().is_identity());
    Ok(())
  }

  #[test]
  fn checked_reads() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0x12, 0x34, 0x56];
    assert_eq!(Endian::Big.get_u16(&buf, 0), Some(0x1234));
    assert_eq!(Endian::Little.get_u16(&buf, 1), Some(0x5634));
    assert_eq!(Endian::Little.get_u32(&buf, 0), None);
    assert_eq!(Endian::from_marker(b"MM\0*"), Some(Endian::Big));
    Ok(())
  }
}
