// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use crate::bits::*;
use crate::{RawError, Result};

/// Number of zero-filled bytes a pump may consume past the end of
/// its buffer before the stream is considered truncated. Encoders
/// often leave a few bits unwritten at the very end of a payload.
const OVERRUN_SLACK: usize = 8;

/// Refill a 64 bit register from `buffer`, zero filling past the end.
/// Returns the number of bytes appended and how many of them were
/// zero padding.
#[inline(always)]
fn refill_bytes(buffer: &[u8], pos: usize, count: usize, mut emit: impl FnMut(u8)) -> usize {
  let mut zeros = 0;
  for i in 0..count {
    match buffer.get(pos + i) {
      Some(b) => emit(*b),
      None => {
        emit(0);
        zeros += 1;
      }
    }
  }
  zeros
}

#[derive(Debug, Copy, Clone)]
pub struct BitPumpLSB<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
  zeros: usize,
}

impl<'a> BitPumpLSB<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpLSB<'a> {
    BitPumpLSB {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
      zeros: 0,
    }
  }
}

#[derive(Debug, Copy, Clone)]
pub struct BitPumpMSB<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
  zeros: usize,
}

impl<'a> BitPumpMSB<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpMSB<'a> {
    BitPumpMSB {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
      zeros: 0,
    }
  }

  /// Byte position of the next unconsumed bit.
  #[inline(always)]
  pub fn get_pos(&self) -> usize {
    self.pos - ((self.nbits >> 3) as usize)
  }
}

/// MSB bit order over little endian 32 bit words.
#[derive(Debug, Copy, Clone)]
pub struct BitPumpMSB32<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
  zeros: usize,
}

impl<'a> BitPumpMSB32<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpMSB32<'a> {
    BitPumpMSB32 {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
      zeros: 0,
    }
  }

  #[inline(always)]
  pub fn get_pos(&self) -> usize {
    self.pos - ((self.nbits >> 3) as usize)
  }
}

/// MSB pump honoring JPEG byte stuffing: `0xFF 0x00` yields a single
/// `0xFF`, any other byte after `0xFF` is a marker and ends the stream.
#[derive(Debug, Copy, Clone)]
pub struct BitPumpJPEG<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
  finished: bool,
  zeros: usize,
}

impl<'a> BitPumpJPEG<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpJPEG<'a> {
    BitPumpJPEG {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
      finished: false,
      zeros: 0,
    }
  }

  /// Byte position after the last fetched byte.
  pub fn get_pos(&self) -> usize {
    self.pos
  }

  /// Drop all buffered bits, used at restart markers.
  pub fn reset(&mut self) {
    self.bits = 0;
    self.nbits = 0;
    self.finished = false;
  }

  /// Resume reading at a new byte offset.
  pub fn seek(&mut self, pos: usize) {
    self.reset();
    self.pos = pos;
  }
}

pub trait BitPump {
  fn peek_bits(&mut self, num: u32) -> u32;
  fn consume_bits(&mut self, num: u32);

  /// True when more zero padding has been consumed than a sane
  /// encoder would ever leave at the end of a payload.
  fn overrun(&self) -> bool;

  #[inline(always)]
  fn get_bits(&mut self, num: u32) -> u32 {
    if num == 0 {
      return 0;
    }

    let val = self.peek_bits(num);
    self.consume_bits(num);

    val
  }

  #[inline(always)]
  fn peek_ibits(&mut self, num: u32) -> i32 {
    self.peek_bits(num) as i32
  }

  #[inline(always)]
  fn get_ibits(&mut self, num: u32) -> i32 {
    self.get_bits(num) as i32
  }

  // Sign extend ibits
  #[inline(always)]
  fn get_ibits_sextended(&mut self, num: u32) -> i32 {
    let val = self.get_ibits(num);
    val.wrapping_shl(32 - num).wrapping_shr(32 - num)
  }

  /// Check point for decoders, called once per row or block.
  fn check_overrun(&self) -> Result<()> {
    if self.overrun() {
      Err(RawError::UnexpectedEof("bitstream ends before all samples were decoded".into()))
    } else {
      Ok(())
    }
  }
}

impl<'a> BitPump for BitPumpLSB<'a> {
  #[inline(always)]
  fn peek_bits(&mut self, num: u32) -> u32 {
    if num > self.nbits {
      let inbits: u64 = if self.pos + 4 <= self.buffer.len() {
        LEu32(self.buffer, self.pos) as u64
      } else {
        let mut word = 0u64;
        let mut shift = 0;
        self.zeros += refill_bytes(self.buffer, self.pos, 4, |b| {
          word |= (b as u64) << shift;
          shift += 8;
        });
        word
      };
      self.bits |= inbits << self.nbits;
      self.pos += 4;
      self.nbits += 32;
    }
    (self.bits & (0x0ffffffffu64 >> (32 - num))) as u32
  }

  #[inline(always)]
  fn consume_bits(&mut self, num: u32) {
    self.nbits -= num;
    self.bits >>= num;
  }

  fn overrun(&self) -> bool {
    self.zeros.saturating_sub((self.nbits >> 3) as usize) > OVERRUN_SLACK
  }
}

impl<'a> BitPump for BitPumpMSB<'a> {
  #[inline(always)]
  fn peek_bits(&mut self, num: u32) -> u32 {
    if num > self.nbits {
      let inbits: u64 = if self.pos + 4 <= self.buffer.len() {
        BEu32(self.buffer, self.pos) as u64
      } else {
        let mut word = 0u64;
        self.zeros += refill_bytes(self.buffer, self.pos, 4, |b| word = (word << 8) | b as u64);
        word
      };
      self.bits = (self.bits << 32) | inbits;
      self.pos += 4;
      self.nbits += 32;
    }
    (self.bits >> (self.nbits - num)) as u32 & (0xffffffffu64 >> (32 - num)) as u32
  }

  #[inline(always)]
  fn consume_bits(&mut self, num: u32) {
    self.nbits -= num;
    self.bits &= (1 << self.nbits) - 1;
  }

  fn overrun(&self) -> bool {
    self.zeros.saturating_sub((self.nbits >> 3) as usize) > OVERRUN_SLACK
  }
}

impl<'a> BitPump for BitPumpMSB32<'a> {
  #[inline(always)]
  fn peek_bits(&mut self, num: u32) -> u32 {
    if num > self.nbits {
      let inbits: u64 = if self.pos + 4 <= self.buffer.len() {
        LEu32(self.buffer, self.pos) as u64
      } else {
        let mut word = 0u64;
        let mut shift = 0;
        self.zeros += refill_bytes(self.buffer, self.pos, 4, |b| {
          word |= (b as u64) << shift;
          shift += 8;
        });
        word
      };
      self.bits = (self.bits << 32) | inbits;
      self.pos += 4;
      self.nbits += 32;
    }
    (self.bits >> (self.nbits - num)) as u32 & (0xffffffffu64 >> (32 - num)) as u32
  }

  #[inline(always)]
  fn consume_bits(&mut self, num: u32) {
    self.nbits -= num;
    self.bits &= (1 << self.nbits) - 1;
  }

  fn overrun(&self) -> bool {
    self.zeros.saturating_sub((self.nbits >> 3) as usize) > OVERRUN_SLACK
  }
}

impl<'a> BitPump for BitPumpJPEG<'a> {
  #[inline(always)]
  fn peek_bits(&mut self, num: u32) -> u32 {
    if num > self.nbits && !self.finished {
      if self.pos + 4 <= self.buffer.len() && !self.buffer[self.pos..self.pos + 4].contains(&0xff) {
        let inbits: u64 = BEu32(self.buffer, self.pos) as u64;
        self.bits = (self.bits << 32) | inbits;
        self.pos += 4;
        self.nbits += 32;
      } else {
        // Read 32 bits the hard way
        let mut read_bytes = 0;
        while read_bytes < 4 && !self.finished {
          let byte = match self.buffer.get(self.pos) {
            None => {
              self.finished = true;
              0
            }
            Some(0xff) => {
              if self.buffer.get(self.pos + 1) == Some(&0x00) {
                self.pos += 1; // Skip the extra byte used to mark 255
                0xff
              } else {
                self.finished = true;
                0
              }
            }
            Some(b) => *b,
          };
          if self.finished {
            break;
          }
          self.bits = (self.bits << 8) | (byte as u64);
          self.pos += 1;
          self.nbits += 8;
          read_bytes += 1;
        }
      }
    }
    if num > self.nbits && self.finished {
      // Stuff with zeroes to not fail to read
      self.bits <<= 32;
      self.nbits += 32;
      self.zeros += 4;
    }

    (self.bits >> (self.nbits - num)) as u32 & (0xffffffffu64 >> (32 - num)) as u32
  }

  #[inline(always)]
  fn consume_bits(&mut self, num: u32) {
    debug_assert!(num <= self.nbits);
    self.nbits -= num;
    self.bits &= (1 << self.nbits) - 1;
  }

  fn overrun(&self) -> bool {
    self.zeros.saturating_sub((self.nbits >> 3) as usize) > OVERRUN_SLACK
  }
}

/// Bounds checked byte reader for structured payloads
/// (JPEG segments, block headers, vendor tables).
#[derive(Debug, Copy, Clone)]
pub struct ByteStream<'a> {
  buffer: &'a [u8],
  pos: usize,
  endian: Endian,
}

impl<'a> ByteStream<'a> {
  pub fn new(src: &'a [u8], endian: Endian) -> ByteStream<'a> {
    ByteStream { buffer: src, pos: 0, endian }
  }

  pub fn endian(&self) -> Endian {
    self.endian
  }

  pub fn set_endian(&mut self, endian: Endian) {
    self.endian = endian;
  }

  #[inline(always)]
  pub fn remaining_bytes(&self) -> usize {
    self.buffer.len().saturating_sub(self.pos)
  }

  #[inline(always)]
  pub fn get_pos(&self) -> usize {
    self.pos
  }

  pub fn seek(&mut self, pos: usize) {
    self.pos = pos;
  }

  pub fn buffer(&self) -> &'a [u8] {
    self.buffer
  }

  /// Unread part of the buffer.
  pub fn remaining(&self) -> &'a [u8] {
    self.buffer.get(self.pos..).unwrap_or(&[])
  }

  fn eof(&self, n: usize) -> RawError {
    RawError::UnexpectedEof(format!("need {} bytes at offset {}, buffer has {}", n, self.pos, self.buffer.len()))
  }

  #[inline(always)]
  pub fn peek_u8(&self) -> Result<u8> {
    self.buffer.get(self.pos).copied().ok_or_else(|| self.eof(1))
  }

  #[inline(always)]
  pub fn get_u8(&mut self) -> Result<u8> {
    let val = self.peek_u8()?;
    self.pos += 1;
    Ok(val)
  }

  #[inline(always)]
  pub fn peek_u16(&self) -> Result<u16> {
    self.endian.get_u16(self.buffer, self.pos).ok_or_else(|| self.eof(2))
  }

  #[inline(always)]
  pub fn get_u16(&mut self) -> Result<u16> {
    let val = self.peek_u16()?;
    self.pos += 2;
    Ok(val)
  }

  #[inline(always)]
  pub fn peek_u32(&self) -> Result<u32> {
    self.endian.get_u32(self.buffer, self.pos).ok_or_else(|| self.eof(4))
  }

  #[inline(always)]
  pub fn get_u32(&mut self) -> Result<u32> {
    let val = self.peek_u32()?;
    self.pos += 4;
    Ok(val)
  }

  pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
    let buffer = self.buffer;
    let val = buffer.get(self.pos..self.pos + n).ok_or_else(|| self.eof(n))?;
    self.pos += n;
    Ok(val)
  }

  #[inline(always)]
  pub fn consume_bytes(&mut self, num: usize) {
    self.pos += num
  }

  /// Advance to the next JPEG marker and return the marker byte.
  pub fn skip_to_marker(&mut self) -> Result<u8> {
    loop {
      let byte = self.get_u8()?;
      if byte != 0xff {
        continue;
      }
      let marker = self.peek_u8()?;
      if marker != 0 && marker != 0xff {
        self.pos += 1;
        return Ok(marker);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bitstream_io::{BigEndian, BitWrite, BitWriter};

  #[test]
  fn msb_pump_reads_written_bits() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    {
      let mut w = BitWriter::endian(&mut buf, BigEndian);
      w.write::<12, u32>(0xabc)?;
      w.write::<3, u32>(0x5)?;
      w.write::<17, u32>(0x1_2345)?;
      w.byte_align()?;
    }
    let mut pump = BitPumpMSB::new(&buf);
    assert_eq!(pump.get_bits(12), 0xabc);
    assert_eq!(pump.get_bits(3), 0x5);
    assert_eq!(pump.get_bits(17), 0x1_2345);
    assert!(pump.check_overrun().is_ok());
    Ok(())
  }

  #[test]
  fn lsb_pump_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0b1010_0101u8, 0xff];
    let mut pump = BitPumpLSB::new(&buf);
    assert_eq!(pump.get_bits(4), 0b0101);
    assert_eq!(pump.get_bits(4), 0b1010);
    assert_eq!(pump.get_bits(8), 0xff);
    Ok(())
  }

  #[test]
  fn jpeg_pump_unstuffs_and_stops_at_marker() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0xff, 0x00, 0x12, 0xff, 0xd9, 0x55];
    let mut pump = BitPumpJPEG::new(&buf);
    assert_eq!(pump.get_bits(8), 0xff);
    assert_eq!(pump.get_bits(8), 0x12);
    // marker reached, zeros follow
    assert_eq!(pump.get_bits(8), 0x00);
    Ok(())
  }

  #[test]
  fn pump_detects_overrun() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0x11u8; 4];
    let mut pump = BitPumpMSB::new(&buf);
    for _ in 0..10 {
      pump.get_bits(16);
    }
    assert!(matches!(pump.check_overrun(), Err(RawError::UnexpectedEof(_))));
    Ok(())
  }

  #[test]
  fn bytestream_bounds() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0x00, 0x01, 0xff, 0xc4, 0x02];
    let mut bs = ByteStream::new(&buf, Endian::Big);
    assert_eq!(bs.get_u16()?, 1);
    assert_eq!(bs.skip_to_marker()?, 0xc4);
    assert_eq!(bs.get_u8()?, 2);
    assert!(bs.get_u8().is_err());
    Ok(())
  }
}
