// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Nikon NEF compressed payload
//!
//! Huffman coded differences with two horizontal predictors per row and
//! two vertical predictors for the first columns. The meta block from
//! the maker note selects the tree, holds the initial predictors and an
//! optional tone curve.

use crate::bits::Endian;
use crate::decompressors::huffman::HuffTable;
use crate::decompressors::payload;
use crate::pumps::{BitPump, BitPumpMSB, ByteStream};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err};

const NIKON_TREE: [[u8; 32]; 6] = [
  // 12-bit lossy
  [
    0, 1, 5, 1, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 0, 5, 4, 3, 6, 2, 7, 1, 0, 8, 9, 11, 10, 12, 0, 0, 0,
  ],
  // 12-bit lossy after split
  [
    0, 1, 5, 1, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 0, 0x39, 0x5a, 0x38, 0x27, 0x16, 5, 4, 3, 2, 1, 0, 11, 12, 12, 0, 0,
  ],
  // 12-bit lossless
  [
    0, 1, 4, 2, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 4, 6, 3, 7, 2, 8, 1, 9, 0, 10, 11, 12, 0, 0, 0,
  ],
  // 14-bit lossy
  [
    0, 1, 4, 3, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 0, 5, 6, 4, 7, 8, 3, 9, 2, 1, 0, 10, 11, 12, 13, 14, 0,
  ],
  // 14-bit lossy after split
  [
    0, 1, 5, 1, 1, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 8, 0x5c, 0x4b, 0x3a, 0x29, 7, 6, 5, 4, 3, 2, 1, 0, 13, 14, 0,
  ],
  // 14-bit lossless
  [
    0, 1, 4, 2, 2, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 7, 6, 8, 5, 9, 4, 10, 3, 11, 12, 2, 0, 1, 13, 14, 0,
  ],
];

/// Offset of the split row inside the meta block
const SPLIT_OFFSET: usize = 562;

#[derive(Debug, Clone, Copy)]
pub struct NikonParams {
  /// Absolute offset of the maker note meta block
  pub meta_offset: usize,
  pub data_offset: usize,
  pub bps: u32,
  /// Byte order of the meta block
  pub endian: Endian,
}

/// Everything taken from the meta block
struct NikonMeta {
  tree: usize,
  vpred: [[u16; 2]; 2],
  curve: Vec<u16>,
  /// Exclusive upper limit of predicted values
  max: u32,
  split: usize,
}

fn read_meta(file: &[u8], p: &NikonParams) -> Result<NikonMeta> {
  let mut input = ByteStream::new(payload(file, p.meta_offset)?, p.endian);
  let ver0 = input.get_u8()?;
  let ver1 = input.get_u8()?;
  if ver0 == 0x49 || ver1 == 0x58 {
    input.consume_bytes(2110);
  }
  let mut tree = if ver0 == 0x46 { 2 } else { 0 };
  if p.bps == 14 {
    tree += 3;
  }
  let mut vpred = [[0_u16; 2]; 2];
  for v in vpred.iter_mut().flatten() {
    *v = input.get_u16()?;
  }
  let mut curve: Vec<u16> = (0..=u16::MAX).collect();
  let mut max = (1_u32 << p.bps.min(16)) & 0x7fff;
  let csize = input.get_u16()? as u32;
  let step = if csize > 1 { max / (csize - 1) } else { 0 };
  let mut split = 0;
  if ver0 == 0x44 && ver1 == 0x20 && step > 0 {
    for i in 0..csize {
      curve[((i * step) as usize).min(0xffff)] = input.get_u16()?;
    }
    for i in 0..max {
      let lo = (i - i % step) as usize;
      let hi = (lo + step as usize).min(0xffff);
      let r = i % step;
      curve[i as usize] = ((curve[lo] as u32 * (step - r) + curve[hi] as u32 * r) / step) as u16;
    }
    let mut at = ByteStream::new(payload(file, p.meta_offset + SPLIT_OFFSET)?, p.endian);
    split = at.get_u16()? as usize;
  } else if ver0 != 0x46 && csize <= 0x4001 {
    for v in curve.iter_mut().take(csize as usize) {
      *v = input.get_u16()?;
    }
    max = csize;
  }
  while max >= 2 && curve[max as usize - 2] == curve[max as usize - 1] {
    max -= 1;
  }
  log::debug!("NEF: version {:#x}/{:#x}, tree {}, curve size {}, max {}, split {}", ver0, ver1, tree, csize, max, split);
  Ok(NikonMeta {
    tree,
    vpred,
    curve,
    max,
    split,
  })
}

pub fn decode_nikon(file: &[u8], params: &NikonParams, frame: &mut RawFrame) -> Result<()> {
  let mut meta = read_meta(file, params)?;
  let (raw_w, raw_h) = (frame.width(), frame.height());
  let height = frame.crop.d.h.min(raw_h);
  let (mut huff, _) = HuffTable::from_spec(&NIKON_TREE[meta.tree])?;
  let mut pump = BitPumpMSB::new(payload(file, params.data_offset)?);
  let mut min = 0_u32;
  let mut hpred = [0_u16; 2];
  for row in 0..height {
    if meta.split > 0 && row == meta.split {
      huff = HuffTable::from_spec(&NIKON_TREE[(meta.tree + 1).min(5)])?.0;
      min = 16;
      meta.max += 32;
    }
    for col in 0..raw_w {
      let i = huff.decode(&mut pump)?;
      let len = i & 15;
      let shl = i >> 4;
      let diff = if len == 0 {
        0
      } else {
        let mut diff = (((pump.get_bits(len.saturating_sub(shl)) << 1) + 1) << shl >> 1) as i32;
        if diff & (1 << (len - 1)) == 0 {
          diff -= (1 << len) - (shl == 0) as i32;
        }
        diff
      };
      if col < 2 {
        let v = &mut meta.vpred[row & 1][col];
        *v = v.wrapping_add(diff as u16);
        hpred[col] = *v;
      } else {
        hpred[col & 1] = hpred[col & 1].wrapping_add(diff as u16);
      }
      let h = hpred[col & 1];
      if h.wrapping_add(min as u16) as u32 >= meta.max {
        return Err(bitstream_err!("NEF: predicted value {} in row {} is out of range", h, row));
      }
      frame.data[row * raw_w + col] = meta.curve[(h as i16).clamp(0, 0x3fff) as usize];
    }
    pump.check_overrun()?;
  }
  if meta.max >= 1 {
    frame.maximum = meta.curve[meta.max as usize - 1] as u32;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CFA;
  use crate::imgop::Dim2;
  use bitstream_io::{BigEndian, BitWrite, BitWriter};

  fn meta_block(ver0: u8, vpred: u16, curve: &[u16]) -> Vec<u8> {
    let mut meta = vec![ver0, 0x10];
    for _ in 0..4 {
      meta.extend_from_slice(&vpred.to_be_bytes());
    }
    meta.extend_from_slice(&(curve.len() as u16).to_be_bytes());
    for v in curve {
      meta.extend_from_slice(&v.to_be_bytes());
    }
    meta
  }

  #[test]
  fn lossless_zero_differences() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Lossless 12 bit tree: leaf 0 is coded as '11110' with no extra bits
    let mut file = meta_block(0x46, 100, &[]);
    let data_offset = file.len();
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      for _ in 0..8 {
        w.write::<5, u32>(0b11110)?;
      }
      w.byte_align()?;
    }
    file.extend_from_slice(&[0; 16]);
    let params = NikonParams {
      meta_offset: 0,
      data_offset,
      bps: 12,
      endian: Endian::Big,
    };
    let mut frame = RawFrame::new(Dim2::new(4, 2), 12, CFA::new("RGGB"));
    decode_nikon(&file, &params, &mut frame)?;
    assert!(frame.data.iter().all(|v| *v == 100));
    assert_eq!(frame.maximum, 0xfff);
    Ok(())
  }

  #[test]
  fn curve_from_meta_block() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let curve: Vec<u16> = (0..200).map(|v| v * 2).collect();
    let mut file = meta_block(0x44, 10, &curve);
    let data_offset = file.len();
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      // 12-bit lossy tree: leaf 0 is coded as '11110'
      for _ in 0..4 {
        w.write::<5, u32>(0b11110)?;
      }
      w.byte_align()?;
    }
    file.extend_from_slice(&[0; 16]);
    let params = NikonParams {
      meta_offset: 0,
      data_offset,
      bps: 12,
      endian: Endian::Big,
    };
    let mut frame = RawFrame::new(Dim2::new(2, 2), 12, CFA::new("RGGB"));
    decode_nikon(&file, &params, &mut frame)?;
    assert!(frame.data.iter().all(|v| *v == 20));
    assert_eq!(frame.maximum, 398);
    Ok(())
  }

  #[test]
  fn out_of_range_prediction() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut file = meta_block(0x46, 0x1000, &[]);
    let data_offset = file.len();
    {
      let mut w = BitWriter::endian(&mut file, BigEndian);
      for _ in 0..2 {
        w.write::<5, u32>(0b11110)?;
      }
      w.byte_align()?;
    }
    file.extend_from_slice(&[0; 16]);
    let params = NikonParams {
      meta_offset: 0,
      data_offset,
      bps: 12,
      endian: Endian::Big,
    };
    let mut frame = RawFrame::new(Dim2::new(2, 1), 12, CFA::new("RGGB"));
    let err = decode_nikon(&file, &params, &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::BitstreamCorruption);
    Ok(())
  }
}
