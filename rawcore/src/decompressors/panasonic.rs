// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Panasonic RW2 payload
//!
//! The stream is read in blocks of 0x4000 bytes. Each block is rotated
//! by `load_flags` bytes and consumed from its end, 14 pixels at a time
//! with two interleaved predictors.

use crate::decompressors::payload;
use crate::rawimage::RawFrame;
use crate::{RawError, Result, bitstream_err};

const BLOCK: usize = 0x4000;

/// Default block rotation for RW2 files
pub const DEFAULT_LOAD_FLAGS: u32 = 0x2008;

struct PanaBits<'a> {
  src: &'a [u8],
  pos: usize,
  split: usize,
  buf: Vec<u8>,
  vbits: u32,
}

impl<'a> PanaBits<'a> {
  fn new(src: &'a [u8], load_flags: u32) -> Self {
    Self {
      src,
      pos: 0,
      split: (load_flags as usize).min(BLOCK),
      // One extra byte for the two byte window at the block end
      buf: vec![0; BLOCK + 1],
      vbits: 0,
    }
  }

  fn refill(&mut self) -> Result<()> {
    if self.pos >= self.src.len() {
      return Err(RawError::UnexpectedEof(format!("RW2: no data left for block at {}", self.pos)));
    }
    let tail = BLOCK - self.split;
    for i in 0..BLOCK {
      let dst = if i < tail { self.split + i } else { i - tail };
      self.buf[dst] = self.src.get(self.pos + i).copied().unwrap_or(0);
    }
    self.pos += BLOCK;
    Ok(())
  }

  fn get(&mut self, nbits: u32) -> Result<u32> {
    if self.vbits == 0 {
      self.refill()?;
    }
    self.vbits = self.vbits.wrapping_sub(nbits) & 0x1ffff;
    let byte = ((self.vbits >> 3) ^ 0x3ff0) as usize;
    let word = self.buf[byte] as u32 | (self.buf[byte + 1] as u32) << 8;
    Ok((word >> (self.vbits & 7)) & ((1 << nbits) - 1))
  }
}

/// Decode the visible rows of a RW2 payload. Rows start at the top of
/// the frame and span the full raw width.
pub fn decode_panasonic(file: &[u8], data_offset: usize, load_flags: u32, frame: &mut RawFrame) -> Result<()> {
  let raw_w = frame.width();
  let height = (frame.crop.p.y + frame.crop.d.h).min(frame.height());
  let width = (frame.crop.p.x + frame.crop.d.w).min(raw_w);
  let mut bits = PanaBits::new(payload(file, data_offset)?, load_flags);
  let mut pred = [0_i32; 2];
  let mut nonz = [0_u32; 2];
  let mut sh = 0_u32;
  for row in 0..height {
    for col in 0..raw_w {
      let i = col % 14;
      if i == 0 {
        pred = [0; 2];
        nonz = [0; 2];
      }
      if i % 3 == 2 {
        sh = 4 >> (3 - bits.get(2)?);
      }
      let p = &mut pred[i & 1];
      if nonz[i & 1] != 0 {
        let j = bits.get(8)? as i32;
        if j != 0 {
          *p -= 0x80 << sh;
          if *p < 0 || sh == 4 {
            *p &= !(-1 << sh);
          }
          *p += j << sh;
        }
      } else {
        nonz[i & 1] = bits.get(8)?;
        if nonz[i & 1] != 0 || i > 11 {
          *p = (nonz[i & 1] << 4 | bits.get(4)?) as i32;
        }
      }
      let val = pred[col & 1] as u16;
      if val > 4098 && col < width {
        return Err(bitstream_err!("RW2: sample {} at {}x{} is out of range", val, col, row));
      }
      frame.data[row * raw_w + col] = val;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CFA;
  use crate::imgop::Dim2;

  /// Places bit fields exactly where the reader will look for them
  struct PanaWriter {
    buf: Vec<u8>,
    vbits: u32,
  }

  impl PanaWriter {
    fn new() -> Self {
      Self {
        buf: vec![0; BLOCK + 1],
        vbits: 0,
      }
    }

    fn put(&mut self, nbits: u32, value: u32) {
      self.vbits = self.vbits.wrapping_sub(nbits) & 0x1ffff;
      let byte = ((self.vbits >> 3) ^ 0x3ff0) as usize;
      for k in 0..nbits {
        if value >> k & 1 == 1 {
          let pos = (self.vbits & 7) + k;
          self.buf[byte + (pos >> 3) as usize] |= 1 << (pos & 7);
        }
      }
    }

    /// File bytes for a block rotated by `load_flags`
    fn finish(&self, load_flags: usize) -> Vec<u8> {
      let mut out = self.buf[load_flags..BLOCK].to_vec();
      out.extend_from_slice(&self.buf[..load_flags]);
      out
    }
  }

  #[test]
  fn reader_takes_bytes_from_block_end() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut src = vec![0_u8; BLOCK];
    src[15] = 0xab;
    src[13] = 0x70;
    let mut bits = PanaBits::new(&src, 0);
    assert_eq!(bits.get(8)?, 0xab);
    assert_eq!(bits.get(8)?, 0);
    assert_eq!(bits.get(4)?, 0x7);
    Ok(())
  }

  #[test]
  fn block_of_fourteen_pixels() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut w = PanaWriter::new();
    for i in 0..14 {
      if i % 3 == 2 {
        w.put(2, 3);
      }
      match i {
        0 => {
          w.put(8, 0x10);
          w.put(4, 3);
        }
        1 => {
          w.put(8, 0x20);
          w.put(4, 5);
        }
        _ => w.put(8, 0),
      }
    }
    let file = w.finish(DEFAULT_LOAD_FLAGS as usize);
    let mut frame = RawFrame::new(Dim2::new(14, 1), 12, CFA::new("RGGB"));
    decode_panasonic(&file, 0, DEFAULT_LOAD_FLAGS, &mut frame)?;
    let expect: Vec<u16> = (0..14).map(|c| if c & 1 == 0 { 259 } else { 517 }).collect();
    assert_eq!(frame.data, expect);
    Ok(())
  }

  #[test]
  fn overflowing_prediction() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut w = PanaWriter::new();
    w.put(8, 0xff);
    w.put(4, 0xf);
    w.put(8, 0);
    // i == 2: shift 2 and a large step on top of 0xfff
    w.put(2, 2);
    w.put(8, 0xff);
    let file = w.finish(0);
    let mut frame = RawFrame::new(Dim2::new(14, 1), 12, CFA::new("RGGB"));
    let err = decode_panasonic(&file, 0, 0, &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::BitstreamCorruption);
    Ok(())
  }

  #[test]
  fn empty_payload_is_eof() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = RawFrame::new(Dim2::new(14, 1), 12, CFA::new("RGGB"));
    let err = decode_panasonic(&[0; 4], 4, 0, &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::UnexpectedEof);
    Ok(())
  }
}
