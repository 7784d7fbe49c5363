// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Flat Huffman lookup tables
//!
//! A table covers all codes up to `bits` length. Each slot stores the
//! code length in the high byte and the leaf value in the low byte, so
//! a decode is a single peek, lookup and consume.

use std::fmt;

use crate::pumps::BitPump;
use crate::{Result, bitstream_err, corrupt};

#[derive(Clone)]
pub struct HuffTable {
  bits: u32,
  table: Vec<u16>,
}

impl HuffTable {
  /// Build from a JPEG style specification: 16 bytes with the number
  /// of codes per length 1..=16, followed by the leaf values.
  /// Returns the table and the number of bytes consumed.
  pub fn from_spec(spec: &[u8]) -> Result<(Self, usize)> {
    let counts = spec.get(0..16).ok_or_else(|| corrupt!("Huffman: specification shorter than 16 bytes"))?;
    let bits = match counts.iter().rposition(|c| *c != 0) {
      Some(p) => p as u32 + 1,
      None => return Err(corrupt!("Huffman: specification without codes")),
    };
    let nvals: usize = counts.iter().map(|c| *c as usize).sum();
    let values = spec
      .get(16..16 + nvals)
      .ok_or_else(|| corrupt!("Huffman: specification declares {} values, only {} bytes left", nvals, spec.len() - 16))?;
    let size = 1usize << bits;
    let mut table = vec![0_u16; size];
    let mut slot = 0;
    let mut vi = 0;
    for len in 1..=bits {
      for _ in 0..counts[len as usize - 1] {
        let fill = 1usize << (bits - len);
        for _ in 0..fill {
          if slot < size {
            table[slot] = (len as u16) << 8 | values[vi] as u16;
            slot += 1;
          }
        }
        vi += 1;
      }
    }
    Ok((Self { bits, table }, 16 + nvals))
  }

  /// Build from prefilled slots, indexed by the next `bits` bits of
  /// the stream
  pub fn from_slots(bits: u32, table: Vec<u16>) -> Self {
    debug_assert_eq!(table.len(), 1 << bits);
    Self { bits, table }
  }

  /// Table from a list of `len << 8 | value` entries, each filling
  /// `1 << (bits - len)` consecutive slots
  pub fn from_entries(bits: u32, entries: &[u16]) -> Self {
    let size = 1usize << bits;
    let mut table = Vec::with_capacity(size);
    for entry in entries {
      let len = (entry >> 8) as u32;
      let fill = 1usize << bits.saturating_sub(len);
      for _ in 0..fill {
        if table.len() < size {
          table.push(*entry);
        }
      }
    }
    table.resize(size, 0);
    Self { bits, table }
  }

  pub fn max_bits(&self) -> u32 {
    self.bits
  }

  /// Decode the next leaf value
  #[inline(always)]
  pub fn decode(&self, pump: &mut dyn BitPump) -> Result<u32> {
    let code = pump.peek_bits(self.bits) as usize;
    let entry = self.table[code];
    let len = (entry >> 8) as u32;
    if len == 0 {
      return Err(bitstream_err!("Huffman: invalid code {:#x} of {} bits", code, self.bits));
    }
    pump.consume_bits(len);
    Ok((entry & 0xff) as u32)
  }

  /// Decode a length code and the following difference bits.
  /// With `len16_full` unset a length of 16 is the special value
  /// -32768 without trailing bits.
  #[inline(always)]
  pub fn decode_diff(&self, pump: &mut dyn BitPump, len16_full: bool) -> Result<i32> {
    let len = self.decode(pump)?;
    if len == 16 && !len16_full {
      return Ok(-32768);
    }
    if len > 16 {
      return Err(bitstream_err!("Huffman: difference length {} exceeds 16 bits", len));
    }
    Ok(extend_diff(pump.get_bits(len), len))
  }
}

/// Sign recovery of a `len` bit difference: a leading zero bit marks
/// a negative value.
#[inline(always)]
pub fn extend_diff(bits: u32, len: u32) -> i32 {
  if len == 0 {
    return 0;
  }
  let diff = bits as i32;
  if diff & (1 << (len - 1)) == 0 { diff - ((1 << len) - 1) } else { diff }
}

impl fmt::Debug for HuffTable {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "HuffTable {{ bits: {}, slots: {} }}", self.bits, self.table.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pumps::BitPumpMSB;
  use bitstream_io::{BigEndian, BitWrite, BitWriter};

  const SPEC: [u8; 29] = [
    0, 1, 4, 2, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x04, 0x03, 0x05, 0x06, 0x02, 0x07, 0x01, 0x08, 0x09, 0x00, 0x0a, 0x0b, 0xff,
  ];

  #[test]
  fn spec_codes_decode() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (huff, used) = HuffTable::from_spec(&SPEC)?;
    assert_eq!(used, 29);
    assert_eq!(huff.max_bits(), 7);
    let mut buf = Vec::new();
    {
      let mut w = BitWriter::endian(&mut buf, BigEndian);
      // 00 -> 0x04, 1101 -> 0x01, 1111111 -> 0xff, 011 -> 0x05
      w.write::<2, u32>(0b00)?;
      w.write::<4, u32>(0b1101)?;
      w.write::<7, u32>(0b1111111)?;
      w.write::<3, u32>(0b011)?;
      w.byte_align()?;
    }
    let mut pump = BitPumpMSB::new(&buf);
    assert_eq!(huff.decode(&mut pump)?, 0x04);
    assert_eq!(huff.decode(&mut pump)?, 0x01);
    assert_eq!(huff.decode(&mut pump)?, 0xff);
    assert_eq!(huff.decode(&mut pump)?, 0x05);
    Ok(())
  }

  #[test]
  fn diff_sign_extension() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert_eq!(extend_diff(0b101, 3), 5);
    assert_eq!(extend_diff(0b010, 3), -5);
    assert_eq!(extend_diff(0, 1), -1);
    assert_eq!(extend_diff(0, 0), 0);
    Ok(())
  }

  #[test]
  fn unused_slot_is_corruption() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Only the code '0' is defined
    let huff = HuffTable::from_entries(2, &[1 << 8 | 3]);
    let buf = [0xff_u8; 4];
    let mut pump = BitPumpMSB::new(&buf);
    let err = huff.decode(&mut pump).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::BitstreamCorruption);
    Ok(())
  }
}
