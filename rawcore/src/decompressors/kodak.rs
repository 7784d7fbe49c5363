// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Kodak 65000 compression
//!
//! Rows are split into blocks of up to 256 samples. Each block starts
//! with a nibble table of difference lengths. A block with an invalid
//! length is stored as raw 12 bit values instead.

use crate::bits::{Endian, LookupTable};
use crate::decompressors::{PaddedReader, payload};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err};

/// Decoded block content
enum Block {
  /// Differences to add to the running predictors
  Diff,
  /// Absolute sample values
  Raw,
}

/// Decode `bsize` values into `out`, which must hold `bsize` rounded up
/// to a multiple of eight.
fn decode_block(rd: &mut PaddedReader, endian: Endian, out: &mut [i32], bsize: usize) -> Block {
  let save = rd.pos();
  let bsize = (bsize + 3) & !3;
  let mut blen = [0_u8; 260];
  let mut i = 0;
  while i < bsize {
    let c = rd.byte();
    blen[i] = c & 15;
    blen[i + 1] = c >> 4;
    if blen[i] > 12 || blen[i + 1] > 12 {
      rd.seek(save);
      let mut i = 0;
      while i < bsize {
        let mut raw = [0_u16; 6];
        for r in raw.iter_mut() {
          let pair = [rd.byte(), rd.byte()];
          *r = endian.read_u16(&pair, 0);
        }
        out[i] = ((raw[0] >> 12) << 8 | (raw[2] >> 12) << 4 | raw[4] >> 12) as i32;
        out[i + 1] = ((raw[1] >> 12) << 8 | (raw[3] >> 12) << 4 | raw[5] >> 12) as i32;
        for j in 0..6 {
          out[i + 2 + j] = (raw[j] & 0xfff) as i32;
        }
        i += 8;
      }
      return Block::Raw;
    }
    i += 2;
  }
  let mut bitbuf: u64 = 0;
  let mut bits = 0_u32;
  if bsize & 7 == 4 {
    bitbuf = (rd.byte() as u64) << 8;
    bitbuf += rd.byte() as u64;
    bits = 16;
  }
  for (i, out) in out.iter_mut().enumerate().take(bsize) {
    let len = blen[i] as u32;
    if bits < len {
      for j in (0..32).step_by(8) {
        bitbuf += (rd.byte() as u64) << (bits + (j ^ 8));
      }
      bits += 32;
    }
    let diff = (bitbuf & (0xffff >> (16 - len))) as i32;
    bitbuf >>= len;
    bits -= len;
    *out = if len > 0 && diff & (1 << (len - 1)) == 0 { diff - ((1 << len) - 1) } else { diff };
  }
  Block::Diff
}

pub fn decode_kodak_65000(file: &[u8], data_offset: usize, endian: Endian, curve: &LookupTable, frame: &mut RawFrame) -> Result<()> {
  let mut rd = PaddedReader::new(payload(file, data_offset)?);
  let raw_w = frame.width();
  let (top, left) = (frame.crop.p.y, frame.crop.p.x);
  let height = frame.crop.d.h.min(frame.height().saturating_sub(top));
  let width = frame.crop.d.w.min(raw_w.saturating_sub(left));
  let mut buf = [0_i32; 264];
  for row in 0..height {
    for col in (0..width).step_by(256) {
      let mut pred = [0_i32; 2];
      let len = (width - col).min(256);
      let kind = decode_block(&mut rd, endian, &mut buf, len);
      for i in 0..len {
        let val = match kind {
          Block::Raw => buf[i],
          Block::Diff => {
            pred[i & 1] += buf[i];
            pred[i & 1]
          }
        };
        let out = curve.lookup(val as u16);
        if out >> 12 != 0 {
          return Err(bitstream_err!("Kodak: sample {} at {}x{} is out of range", out, col + i, row));
        }
        frame.data[(row + top) * raw_w + left + col + i] = out;
      }
      rd.check()?;
    }
  }
  Ok(())
}
