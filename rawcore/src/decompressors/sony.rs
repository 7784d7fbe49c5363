// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Sony ARW payloads and the SR2 block cipher

use rayon::prelude::*;

use crate::bits::{LEu16, LEu32, LookupTable};
use crate::decompressors::huffman::{HuffTable, extend_diff};
use crate::decompressors::{payload, payload_exact};
use crate::pumps::{BitPump, BitPumpMSB};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err};

/// Stream cipher protecting the SR2 private IFD.
/// Data is processed as big endian 32 bit words.
#[derive(Clone)]
pub struct SonyDecrypt {
  pad: [u32; 128],
  p: usize,
}

impl SonyDecrypt {
  pub fn new(mut key: u32) -> Self {
    let mut pad = [0_u32; 128];
    for v in pad.iter_mut().take(4) {
      key = key.wrapping_mul(48828125).wrapping_add(1);
      *v = key;
    }
    pad[3] = pad[3] << 1 | (pad[0] ^ pad[2]) >> 31;
    for p in 4..127 {
      pad[p] = (pad[p - 4] ^ pad[p - 2]) << 1 | (pad[p - 3] ^ pad[p - 1]) >> 31;
    }
    Self { pad, p: 127 }
  }

  /// Decrypt whole words of `data` in place, a trailing partial word is
  /// left untouched. Successive calls continue the key stream.
  pub fn decrypt(&mut self, data: &mut [u8]) {
    for word in data.chunks_exact_mut(4) {
      let p = self.p;
      self.pad[p & 127] = self.pad[(p + 1) & 127] ^ self.pad[(p + 65) & 127];
      let v = u32::from_be_bytes([word[0], word[1], word[2], word[3]]) ^ self.pad[p & 127];
      word.copy_from_slice(&v.to_be_bytes());
      self.p += 1;
    }
  }
}

/// Length/value entries of the ARW1 difference code
const ARW1_TABLE: [u16; 18] = [
  0xf11, 0xf10, 0xe0f, 0xd0e, 0xc0d, 0xb0c, 0xa0b, 0x90a, 0x809, 0x708, 0x607, 0x506, 0x405, 0x304, 0x303, 0x300, 0x202, 0x201,
];

/// ARW version 1: a single running sum, coded column by column from
/// the right edge, even rows first.
pub fn decode_arw1(file: &[u8], data_offset: usize, frame: &mut RawFrame) -> Result<()> {
  let huff = HuffTable::from_entries(15, &ARW1_TABLE);
  let (raw_w, raw_h) = (frame.width(), frame.height());
  if raw_h == 0 {
    return Ok(());
  }
  let mut pump = BitPumpMSB::new(payload(file, data_offset)?);
  let mut sum = 0_i32;
  for col in (0..raw_w).rev() {
    let mut row = 0;
    while row < raw_h + 1 {
      if row == raw_h {
        row = 1;
      }
      let len = huff.decode(&mut pump)?;
      sum += extend_diff(pump.get_bits(len), len);
      if sum >> 12 != 0 {
        return Err(bitstream_err!("ARW1: running sum {} at {}x{} is out of range", sum, col, row));
      }
      frame.data[row * raw_w + col] = sum as u16;
      row += 2;
    }
    pump.check_overrun()?;
  }
  Ok(())
}

fn arw2_row(input: &[u8], curve: &LookupTable, out: &mut [u16]) {
  let raw_w = out.len();
  // Blocks may peek one byte beyond the row
  let mut block = [0_u8; 18];
  let mut col = 0;
  let mut dp = 0;
  while col + 30 < raw_w {
    for (i, b) in block.iter_mut().enumerate() {
      *b = input.get(dp + i).copied().unwrap_or(0);
    }
    let val = LEu32(&block, 0);
    let max = 0x7ff & val;
    let min = 0x7ff & val >> 11;
    let imax = (0x0f & val >> 22) as usize;
    let imin = (0x0f & val >> 26) as usize;
    let mut sh = 0;
    while sh < 4 && (0x80 << sh) + min <= max {
      sh += 1;
    }
    let mut pix = [0_u32; 16];
    let mut bit = 30;
    for (i, p) in pix.iter_mut().enumerate() {
      *p = if i == imax {
        max
      } else if i == imin {
        min
      } else {
        let delta = (LEu16(&block, bit >> 3) as u32 >> (bit & 7)) & 0x7f;
        bit += 7;
        ((delta << sh) + min).min(0x7ff)
      };
    }
    for p in pix {
      if col < raw_w {
        out[col] = curve.at((p as usize) << 1) >> 2;
      }
      col += 2;
    }
    col -= if col & 1 == 1 { 1 } else { 31 };
    dp += 16;
  }
}

/// ARW version 2: rows of 32 pixel groups, each half coded as a block
/// of 16 bytes with minimum, maximum and 7 bit deltas.
pub fn decode_arw2(file: &[u8], data_offset: usize, curve: &LookupTable, frame: &mut RawFrame) -> Result<()> {
  let raw_w = frame.width();
  let height = (frame.crop.p.y + frame.crop.d.h).min(frame.height());
  let src = payload_exact(file, data_offset, raw_w * height)?;
  frame.data[..raw_w * height]
    .par_chunks_exact_mut(raw_w)
    .zip(src.par_chunks_exact(raw_w))
    .for_each(|(out, input)| arw2_row(input, curve, out));
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CFA;
  use crate::imgop::Dim2;
  use bitstream_io::{BigEndian, BitWrite, BitWriter};

  #[test]
  fn decrypt_continues_key_stream() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let plain: Vec<u8> = (0..64).collect();
    let mut once = plain.clone();
    SonyDecrypt::new(0x1234_5678).decrypt(&mut once);
    assert_ne!(once, plain);

    let mut split = plain.clone();
    let mut cipher = SonyDecrypt::new(0x1234_5678);
    cipher.decrypt(&mut split[..24]);
    cipher.decrypt(&mut split[24..]);
    assert_eq!(split, once);

    SonyDecrypt::new(0x1234_5678).decrypt(&mut once);
    assert_eq!(once, plain);
    Ok(())
  }

  #[test]
  fn arw1_column_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut file = Vec::new();
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      // +1, 0, +2, 0
      w.write::<3, u32>(0b111)?;
      w.write::<3, u32>(0b011)?;
      w.write::<4, u32>(0b1010)?;
      w.write::<3, u32>(0b011)?;
      w.byte_align()?;
    }
    file.extend_from_slice(&[0; 8]);
    let mut frame = RawFrame::new(Dim2::new(2, 2), 12, CFA::new("RGGB"));
    decode_arw1(&file, 0, &mut frame)?;
    assert_eq!(frame.data, vec![3, 1, 3, 1]);
    Ok(())
  }

  #[test]
  fn arw1_sum_out_of_range() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut file = Vec::new();
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      w.write::<15, u32>(0)?;
      w.write::<17, u32>(0x1_ffff)?;
    }
    file.extend_from_slice(&[0; 8]);
    let mut frame = RawFrame::new(Dim2::new(2, 2), 12, CFA::new("RGGB"));
    let err = decode_arw1(&file, 0, &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::BitstreamCorruption);
    Ok(())
  }

  #[test]
  fn arw2_block() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut v: u128 = 0x100 | 0x10 << 11 | 1 << 26;
    for k in 0..14 {
      v |= 5 << (30 + 7 * k);
    }
    let mut file = v.to_le_bytes().to_vec();
    file.extend_from_slice(&[0; 16]);
    let mut frame = RawFrame::new(Dim2::new(32, 1), 12, CFA::new("RGGB"));
    decode_arw2(&file, 0, &LookupTable::identity(), &mut frame)?;
    let even: Vec<u16> = frame.data.iter().step_by(2).copied().collect();
    let mut expect = vec![128, 8];
    expect.extend_from_slice(&[13; 14]);
    assert_eq!(even, expect);
    assert!(frame.data.iter().skip(1).step_by(2).all(|v| *v == 0));
    Ok(())
  }

  #[test]
  fn arw2_truncated() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = RawFrame::new(Dim2::new(32, 2), 12, CFA::new("RGGB"));
    let err = decode_arw2(&[0; 40], 0, &LookupTable::identity(), &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::UnexpectedEof);
    Ok(())
  }
}
