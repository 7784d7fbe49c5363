// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Phase One IIQ payloads: scrambled 16 bit words and the row
//! compressed format with per row offsets.

use crate::bits::{Endian, clip16};
use crate::decompressors::{payload, payload_exact};
use crate::metadata::PhaseOneInfo;
use crate::pumps::{BitPump, BitPumpMSB, BitPumpMSB32};
use crate::rawimage::RawFrame;
use crate::{RawError, Result, bitstream_err, corrupt};

/// Bit lengths selected by the unary prefix and one extra bit
const LENGTHS: [u32; 10] = [8, 7, 6, 9, 11, 10, 5, 12, 14, 13];

/// Uncompressed words. Formats 1 and 2 swap bits between neighboring
/// samples under a key stored in the header.
pub fn decode_phase_one(file: &[u8], data_offset: usize, endian: Endian, ph1: &PhaseOneInfo, frame: &mut RawFrame) -> Result<()> {
  let (w, h) = (frame.width(), frame.height());
  let src = payload_exact(file, data_offset, w * h * 2)?;
  for (out, inb) in frame.data.iter_mut().zip(src.chunks_exact(2)) {
    *out = endian.read_u16(inb, 0);
  }
  if ph1.format != 0 {
    let key_off = ph1.key_off as usize;
    let key = |pos: usize| {
      endian
        .get_u16(file, pos)
        .ok_or_else(|| RawError::UnexpectedEof(format!("IIQ: scramble key at {} is behind EOF", pos)))
    };
    let (akey, bkey) = (key(key_off)?, key(key_off + 2)?);
    let mask: u16 = if ph1.format == 1 { 0x5555 } else { 0x1354 };
    for pair in frame.data.chunks_exact_mut(2) {
      let a = pair[0] ^ akey;
      let b = pair[1] ^ bkey;
      pair[0] = (a & mask) | (b & !mask);
      pair[1] = (b & mask) | (a & !mask);
    }
  }
  Ok(())
}

/// Row compressed payload. Each row starts at its own offset and
/// alternates two predictors, one for even and one for odd columns.
pub fn decode_phase_one_compressed(file: &[u8], data_offset: usize, endian: Endian, ph1: &PhaseOneInfo, frame: &mut RawFrame) -> Result<()> {
  let (w, h) = (frame.width(), frame.height());
  let strip_offset = ph1.strip_offset as usize;
  let offsets = (0..h)
    .map(|row| {
      endian
        .get_u32(file, strip_offset + row * 4)
        .map(|o| o as usize)
        .ok_or_else(|| RawError::UnexpectedEof(format!("IIQ: offset of row {} is behind EOF", row)))
    })
    .collect::<Result<Vec<_>>>()?;
  let row_black = if ph1.black_off != 0 {
    let src = payload_exact(file, ph1.black_off as usize, h * 4)?;
    src.chunks_exact(2).map(|v| endian.read_i16(v, 0) as i32).collect()
  } else {
    vec![0; h * 2]
  };
  let curve: Vec<u16> = (0..256_u32).map(|i| (i as f64 * i as f64 / 3.969 + 0.5) as u16).collect();
  let split_col = ph1.split_col as usize;
  let mut line = vec![0_u16; w];
  for row in 0..h {
    let src = payload(file, data_offset + offsets[row])?;
    if endian.little() {
      decode_row(&mut BitPumpMSB32::new(src), &mut line, row)?;
    } else {
      decode_row(&mut BitPumpMSB::new(src), &mut line, row)?;
    }
    let out = &mut frame.data[row * w..(row + 1) * w];
    for (col, (o, v)) in out.iter_mut().zip(&line).enumerate() {
      let mut v = *v;
      if ph1.format == 5 && v < 256 {
        v = curve[v as usize];
      }
      *o = clip16(((v as i32) << 2) + row_black[row * 2 + (col >= split_col) as usize]);
    }
  }
  frame.black = ph1.t_black;
  frame.maximum = 0xfffc;
  Ok(())
}

fn decode_row<P: BitPump>(pump: &mut P, line: &mut [u16], row: usize) -> Result<()> {
  let w = line.len();
  let mut pred = [0_i32; 2];
  let mut len = [0_u32; 2];
  for col in 0..w {
    if col >= w & !7 {
      len = [14; 2];
    } else if col & 7 == 0 {
      for l in len.iter_mut() {
        let mut j = 0;
        while j < 5 && pump.get_bits(1) == 0 {
          j += 1;
        }
        if j > 0 {
          *l = LENGTHS[(j - 1) * 2 + pump.get_bits(1) as usize];
        }
      }
    }
    let (i, bits) = (col & 1, len[col & 1]);
    if bits == 14 {
      pred[i] = pump.get_bits(16) as i32;
    } else if bits == 0 {
      return Err(corrupt!("IIQ: row {} starts without a bit length", row));
    } else {
      pred[i] += pump.get_bits(bits) as i32 + 1 - (1 << (bits - 1));
    }
    if pred[i] >> 16 != 0 {
      return Err(bitstream_err!("IIQ: sample {} at {}x{} exceeds 16 bits", pred[i], col, row));
    }
    line[col] = pred[i] as u16;
  }
  pump.check_overrun()
}
