// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Olympus ORF compressed payload
//!
//! Every sample carries two low bits and a sign, followed by a unary
//! coded high part whose width adapts to the recent magnitude of the
//! same color. The difference is added to a gradient based prediction.

use crate::decompressors::huffman::HuffTable;
use crate::decompressors::payload;
use crate::pumps::{BitPump, BitPumpMSB};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err};

/// Leading zero count of a 12 bit code, 12 for all zeros
fn zero_run_table() -> HuffTable {
  let table = (0..4096_u32)
    .map(|code| {
      let lz = (code << 20).leading_zeros().min(12);
      if lz == 12 { 12 << 8 | 12 } else { ((lz + 1) << 8 | lz) as u16 }
    })
    .collect();
  HuffTable::from_slots(12, table)
}

fn predict(frame: &RawFrame, row: usize, col: usize) -> i32 {
  let raw_w = frame.width();
  let at = |r: usize, c: usize| frame.data[r * raw_w + c] as i32;
  match (row < 2, col < 2) {
    (true, true) => 0,
    (true, false) => at(row, col - 2),
    (false, true) => at(row - 2, col),
    (false, false) => {
      let w = at(row, col - 2);
      let n = at(row - 2, col);
      let nw = at(row - 2, col - 2);
      if (w < nw && nw < n) || (n < nw && nw < w) {
        if (w - nw).abs() > 32 || (n - nw).abs() > 32 { w + n - nw } else { (w + n) >> 1 }
      } else if (w - nw).abs() > (n - nw).abs() {
        w
      } else {
        n
      }
    }
  }
}

pub fn decode_olympus(file: &[u8], data_offset: usize, frame: &mut RawFrame) -> Result<()> {
  let huff = zero_run_table();
  let raw_w = frame.width();
  let height = frame.crop.d.h.min(frame.height());
  let width = frame.crop.d.w.min(raw_w);
  // Seven bytes of header in front of the bitstream
  let mut pump = BitPumpMSB::new(payload(file, data_offset + 7)?);
  for row in 0..height {
    let mut acarry = [[0_i32; 3]; 2];
    for col in 0..raw_w {
      let carry = &mut acarry[col & 1];
      let i = if carry[2] < 3 { 2 } else { 0 };
      let mut nbits = 2 + i;
      while nbits + i < 16 && (carry[0] as u16 as u32) >> (nbits + i) != 0 {
        nbits += 1;
      }
      let b = pump.get_bits(3);
      let low = (b & 3) as i32;
      let sign = if b & 4 != 0 { -1 } else { 0 };
      let mut high = huff.decode(&mut pump)?;
      if high == 12 {
        high = pump.get_bits(16 - nbits) >> 1;
      }
      carry[0] = ((high << nbits) | pump.get_bits(nbits)) as i32;
      let diff = (carry[0] ^ sign) + carry[1];
      carry[1] = (diff * 3 + carry[1]) >> 5;
      carry[2] = if carry[0] > 16 { 0 } else { carry[2] + 1 };
      if col >= width {
        continue;
      }
      let val = predict(frame, row, col) + ((diff << 2) | low);
      if val >> 12 != 0 {
        return Err(bitstream_err!("ORF: sample {} at {}x{} is out of range", val, col, row));
      }
      frame.data[row * raw_w + col] = val as u16;
    }
    pump.check_overrun()?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CFA;
  use crate::imgop::Dim2;
  use bitstream_io::{BigEndian, BitWrite, BitWriter};

  #[test]
  fn unary_table() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let huff = zero_run_table();
    let buf = [0b1010_0010_u8, 0, 0, 0, 0, 0, 0, 0];
    let mut pump = BitPumpMSB::new(&buf);
    assert_eq!(huff.decode(&mut pump)?, 0);
    assert_eq!(huff.decode(&mut pump)?, 1);
    assert_eq!(huff.decode(&mut pump)?, 3);
    assert_eq!(huff.decode(&mut pump)?, 12);
    Ok(())
  }

  #[test]
  fn low_bits_accumulate_along_row() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut file = vec![0_u8; 7];
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      // low 3, positive, high part 0, four zero bits
      for _ in 0..4 {
        w.write::<8, u32>(0b0111_0000)?;
      }
    }
    file.extend_from_slice(&[0; 8]);
    let mut frame = RawFrame::new(Dim2::new(4, 1), 12, CFA::new("RGGB"));
    decode_olympus(&file, 0, &mut frame)?;
    assert_eq!(frame.data, vec![3, 3, 6, 6]);
    Ok(())
  }

  #[test]
  fn escape_code_overflows() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut file = vec![0_u8; 7];
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      w.write::<3, u32>(0)?;
      w.write::<12, u32>(0)?;
      w.write::<12, u32>(0xfff)?;
      w.write::<4, u32>(0)?;
      w.byte_align()?;
    }
    file.extend_from_slice(&[0; 8]);
    let mut frame = RawFrame::new(Dim2::new(2, 1), 12, CFA::new("RGGB"));
    let err = decode_olympus(&file, 0, &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::BitstreamCorruption);
    Ok(())
  }
}
