// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Pentax PEF compressed payload
//!
//! Lossless JPEG style differences with a Huffman table stored in the
//! maker note, predicted like NEF data.

use crate::bits::Endian;
use crate::decompressors::huffman::HuffTable;
use crate::decompressors::payload;
use crate::pumps::{BitPump, BitPumpMSB, ByteStream};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err};

/// Build the 12 bit lookup table from the maker note block at `meta`
pub fn pentax_table(meta: &[u8], endian: Endian) -> Result<HuffTable> {
  let mut input = ByteStream::new(meta, endian);
  let depth = ((input.get_u16()? as usize) + 12) & 15;
  input.consume_bytes(12);
  let mut codes = [0_u16; 15];
  let mut lens = [0_u8; 15];
  for code in codes.iter_mut().take(depth) {
    *code = input.get_u16()?;
  }
  for len in lens.iter_mut().take(depth) {
    *len = input.get_u8()?;
  }
  let mut table = vec![0_u16; 4096];
  for c in 0..depth {
    let len = lens[c] as u32;
    let start = codes[c] as usize;
    let end = (start + (4096 >> len.min(12)) - 1) & 4095;
    for slot in table.iter_mut().take(end + 1).skip(start) {
      *slot = (len as u16) << 8 | c as u16;
    }
  }
  Ok(HuffTable::from_slots(12, table))
}

pub fn decode_pentax(file: &[u8], meta_offset: usize, data_offset: usize, endian: Endian, bps: u32, frame: &mut RawFrame) -> Result<()> {
  let huff = pentax_table(payload(file, meta_offset)?, endian)?;
  let (raw_w, raw_h) = (frame.width(), frame.height());
  let mut pump = BitPumpMSB::new(payload(file, data_offset)?);
  let mut vpred = [[0_u16; 2]; 2];
  let mut hpred = [0_u16; 2];
  for row in 0..raw_h {
    for col in 0..raw_w {
      let diff = huff.decode_diff(&mut pump, false)?;
      if col < 2 {
        let v = &mut vpred[row & 1][col];
        *v = v.wrapping_add(diff as u16);
        hpred[col] = *v;
      } else {
        hpred[col & 1] = hpred[col & 1].wrapping_add(diff as u16);
      }
      let val = hpred[col & 1];
      if bps < 16 && val >> bps != 0 {
        return Err(bitstream_err!("PEF: sample {} at {}x{} exceeds {} bits", val, col, row, bps));
      }
      frame.data[row * raw_w + col] = val;
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

  /// Two codes: '0' for length 0, '1' for a 4 bit difference
  fn meta_block() -> Vec<u8> {
    let mut meta = Vec::new();
    // (6 + 12) & 15 gives two codes
    meta.extend_from_slice(&6_u16.to_be_bytes());
    meta.extend_from_slice(&[0; 12]);
    meta.extend_from_slice(&0_u16.to_be_bytes());
    meta.extend_from_slice(&2048_u16.to_be_bytes());
    meta.extend_from_slice(&[1, 1]);
    meta
  }

  #[test]
  fn table_from_meta() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let huff = pentax_table(&meta_block(), Endian::Big)?;
    assert_eq!(huff.max_bits(), 12);
    let buf = [0b0100_0000_u8, 0, 0, 0];
    let mut pump = crate::pumps::BitPumpMSB::new(&buf);
    assert_eq!(huff.decode(&mut pump)?, 0);
    assert_eq!(huff.decode(&mut pump)?, 1);
    Ok(())
  }

  #[test]
  fn decode_with_range_check() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut file = meta_block();
    let data_offset = file.len();
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      // +1 for every sample: code '1' and difference bit '1'
      for _ in 0..4 {
        w.write::<2, u32>(0b11)?;
      }
      w.byte_align()?;
    }
    file.extend_from_slice(&[0; 8]);
    let mut frame = RawFrame::new(Dim2::new(2, 2), 12, CFA::new("RGGB"));
    decode_pentax(&file, 0, data_offset, Endian::Big, 12, &mut frame)?;
    assert_eq!(frame.data, vec![1, 1, 1, 1]);
    let err = decode_pentax(&file, 0, data_offset, Endian::Big, 0, &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::BitstreamCorruption);
    Ok(())
  }
}
