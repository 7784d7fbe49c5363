// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Canon CRW compressed payload
//!
//! Blocks of 64 differences, Huffman coded with one table for the
//! first coefficient and one for the rest. Optionally two low order bits
//! per sample are stored uncompressed in front of the payload.

use crate::decompressors::huffman::HuffTable;
use crate::decompressors::payload;
use crate::pumps::{BitPump, BitPumpJPEG};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err};

/// Compressed data starts here when there are no low bits
const CRW_DATA_START: usize = 540;

const FIRST_TREE: [[u8; 29]; 3] = [
  [
    0, 1, 4, 2, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x04, 0x03, 0x05, 0x06, 0x02, 0x07, 0x01, 0x08, 0x09, 0x00, 0x0a, 0x0b, 0xff,
  ],
  [
    0, 2, 2, 3, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0x03, 0x02, 0x04, 0x01, 0x05, 0x00, 0x06, 0x07, 0x09, 0x08, 0x0a, 0x0b, 0xff,
  ],
  [
    0, 0, 6, 3, 1, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x06, 0x05, 0x07, 0x04, 0x08, 0x03, 0x09, 0x02, 0x00, 0x0a, 0x01, 0x0b, 0xff,
  ],
];

const SECOND_TREE: [[u8; 180]; 3] = [
  [
    0, 2, 2, 2, 1, 4, 2, 1, 2, 5, 1, 1, 0, 0, 0, 139, 0x03, 0x04, 0x02, 0x05, 0x01, 0x06, 0x07, 0x08, 0x12, 0x13, 0x11, 0x14, 0x09, 0x15, 0x22,
    0x00, 0x21, 0x16, 0x0a, 0xf0, 0x23, 0x17, 0x24, 0x31, 0x32, 0x18, 0x19, 0x33, 0x25, 0x41, 0x34, 0x42, 0x35, 0x51, 0x36, 0x37, 0x38, 0x29,
    0x79, 0x26, 0x1a, 0x39, 0x56, 0x57, 0x28, 0x27, 0x52, 0x55, 0x58, 0x43, 0x76, 0x59, 0x77, 0x54, 0x61, 0xf9, 0x71, 0x78, 0x75, 0x96, 0x97,
    0x49, 0xb7, 0x53, 0xd7, 0x74, 0xb6, 0x98, 0x47, 0x48, 0x95, 0x69, 0x99, 0x91, 0xfa, 0xb8, 0x68, 0xb5, 0xb9, 0xd6, 0xf7, 0xd8, 0x67, 0x46,
    0x45, 0x94, 0x89, 0xf8, 0x81, 0xd5, 0xf6, 0xb4, 0x88, 0xb1, 0x2a, 0x44, 0x72, 0xd9, 0x87, 0x66, 0xd4, 0xf5, 0x3a, 0xa7, 0x73, 0xa9, 0xa8,
    0x86, 0x62, 0xc7, 0x65, 0xc8, 0xc9, 0xa1, 0xf4, 0xd1, 0xe9, 0x5a, 0x92, 0x85, 0xa6, 0xe7, 0x93, 0xe8, 0xc1, 0xc6, 0x7a, 0x64, 0xe1, 0x4a,
    0x6a, 0xe6, 0xb3, 0xf1, 0xd3, 0xa5, 0x8a, 0xb2, 0x9a, 0xba, 0x84, 0xa4, 0x63, 0xe5, 0xc5, 0xf3, 0xd2, 0xc4, 0x82, 0xaa, 0xda, 0xe4, 0xf2,
    0xca, 0x83, 0xa3, 0xa2, 0xc3, 0xea, 0xc2, 0xe2, 0xe3, 0xff, 0xff,
  ],
  [
    0, 2, 2, 1, 4, 1, 4, 1, 3, 3, 1, 0, 0, 0, 0, 140, 0x02, 0x03, 0x01, 0x04, 0x05, 0x12, 0x11, 0x06, 0x13, 0x07, 0x08, 0x14, 0x22, 0x09, 0x21,
    0x00, 0x23, 0x15, 0x31, 0x32, 0x0a, 0x16, 0xf0, 0x24, 0x33, 0x41, 0x42, 0x19, 0x17, 0x25, 0x18, 0x51, 0x34, 0x43, 0x52, 0x29, 0x35, 0x61,
    0x39, 0x71, 0x62, 0x36, 0x53, 0x26, 0x38, 0x1a, 0x37, 0x81, 0x27, 0x91, 0x79, 0x55, 0x45, 0x28, 0x72, 0x59, 0xa1, 0xb1, 0x44, 0x69, 0x54,
    0x58, 0xd1, 0xfa, 0x57, 0xe1, 0xf1, 0xb9, 0x49, 0x47, 0x63, 0x6a, 0xf9, 0x56, 0x46, 0xa8, 0x2a, 0x4a, 0x78, 0x99, 0x3a, 0x75, 0x74, 0x86,
    0x65, 0xc1, 0x76, 0xb6, 0x96, 0xd6, 0x89, 0x85, 0xc9, 0xf5, 0x95, 0xb4, 0xc7, 0xf7, 0x8a, 0x97, 0xb8, 0x73, 0xb7, 0xd8, 0xd9, 0x87, 0xa7,
    0x7a, 0x48, 0x82, 0x84, 0xea, 0xf4, 0xa6, 0xc5, 0x5a, 0x94, 0xa4, 0xc6, 0x92, 0xc3, 0x68, 0xb5, 0xc8, 0xe4, 0xe5, 0xe6, 0xe9, 0xa2, 0xa3,
    0xe3, 0xc2, 0x66, 0x67, 0x93, 0xaa, 0xd4, 0xd5, 0xe7, 0xf8, 0x88, 0x9a, 0xd7, 0x77, 0xc4, 0x64, 0xe2, 0x98, 0xa5, 0xca, 0xda, 0xe8, 0xf3,
    0xf6, 0xa9, 0xb2, 0xb3, 0xf2, 0xd2, 0x83, 0xba, 0xd3, 0xff, 0xff,
  ],
  [
    0, 0, 6, 2, 1, 3, 3, 2, 5, 1, 2, 2, 8, 10, 0, 117, 0x04, 0x05, 0x03, 0x06, 0x02, 0x07, 0x01, 0x08, 0x09, 0x12, 0x13, 0x14, 0x11, 0x15,
    0x0a, 0x16, 0x17, 0xf0, 0x00, 0x22, 0x21, 0x18, 0x23, 0x19, 0x24, 0x32, 0x31, 0x25, 0x33, 0x38, 0x37, 0x34, 0x35, 0x36, 0x39, 0x79, 0x57,
    0x58, 0x59, 0x28, 0x56, 0x78, 0x27, 0x41, 0x29, 0x77, 0x26, 0x42, 0x76, 0x99, 0x1a, 0x55, 0x98, 0x97, 0xf9, 0x48, 0x54, 0x96, 0x89, 0x47,
    0xb7, 0x49, 0xfa, 0x75, 0x68, 0xb6, 0x67, 0x69, 0xb9, 0xb8, 0xd8, 0x52, 0xd7, 0x88, 0xb5, 0x74, 0x51, 0x46, 0xd9, 0xf8, 0x3a, 0xd6, 0x87,
    0x45, 0x7a, 0x95, 0xd5, 0xf6, 0x86, 0xb4, 0xa9, 0x94, 0x53, 0x2a, 0xa8, 0x43, 0xf5, 0xf7, 0xd4, 0x66, 0xa7, 0x5a, 0x44, 0x8a, 0xc9, 0xe8,
    0xc8, 0xe7, 0x9a, 0x6a, 0x73, 0x4a, 0x61, 0xc7, 0xf4, 0xc6, 0x65, 0xe9, 0x72, 0xe6, 0x71, 0x91, 0x93, 0xa6, 0xda, 0x92, 0x85, 0x62, 0xf3,
    0xc5, 0xb2, 0xa4, 0x84, 0xba, 0x64, 0xa5, 0xb3, 0xd2, 0x81, 0xe5, 0xd3, 0xaa, 0xc4, 0xca, 0xf2, 0xb1, 0xe4, 0xd1, 0x83, 0x63, 0xea, 0xc3,
    0xe2, 0x82, 0xf1, 0xa3, 0xc2, 0xa1, 0xc1, 0xe3, 0xa2, 0xe1, 0xff, 0xff,
  ],
];

/// Huffman tables for a decoder table index, indices above 2 use table 2
pub fn crw_tables(table: usize) -> Result<[HuffTable; 2]> {
  let t = table.min(2);
  let (first, _) = HuffTable::from_spec(&FIRST_TREE[t])?;
  let (second, _) = HuffTable::from_spec(&SECOND_TREE[t])?;
  Ok([first, second])
}

/// Compressed data never contains 0xff followed by anything but 0x00,
/// so such a pair in the leading bytes marks uncompressed low bits.
pub fn has_lowbits(file: &[u8]) -> bool {
  let test = &file[..file.len().min(0x4000)];
  let mut ret = true;
  for i in CRW_DATA_START..test.len().saturating_sub(1) {
    if test[i] == 0xff {
      if test[i + 1] != 0 {
        return true;
      }
      ret = false;
    }
  }
  ret
}

/// Decode the whole sensor area of a CRW file. `file` is the complete file,
/// payload offsets are fixed by the format.
pub fn decode_crw(file: &[u8], table: usize, frame: &mut RawFrame) -> Result<()> {
  let huff = crw_tables(table)?;
  let (raw_w, raw_h) = (frame.width(), frame.height());
  let lowbits = has_lowbits(file);
  if !lowbits {
    frame.maximum = 0x3ff;
  }
  let start = CRW_DATA_START + if lowbits { raw_h * raw_w / 4 } else { 0 };
  let mut pump = BitPumpJPEG::new(payload(file, start)?);
  log::debug!("CRW: table {}, low bits {}, data at {}", table, lowbits, start);

  let mut pixel = vec![0_u16; raw_w * 8];
  let mut carry = 0_i32;
  let mut pnum = 0_usize;
  let mut base = [0_i32; 2];
  for row in (0..raw_h).step_by(8) {
    let nblocks = ((raw_h - row).min(8) * raw_w) >> 6;
    for block in 0..nblocks {
      let mut diffbuf = [0_i32; 64];
      let mut i = 0;
      while i < 64 {
        let leaf = huff[(i > 0) as usize].decode(&mut pump)?;
        if leaf == 0 && i > 0 {
          break;
        }
        if leaf != 0xff {
          i += (leaf >> 4) as usize;
          let len = leaf & 15;
          if len != 0 {
            let mut diff = pump.get_bits(len) as i32;
            if diff & (1 << (len - 1)) == 0 {
              diff -= (1 << len) - 1;
            }
            if i < 64 {
              diffbuf[i] = diff;
            }
          }
        }
        i += 1;
      }
      diffbuf[0] += carry;
      carry = diffbuf[0];
      for (i, diff) in diffbuf.iter().enumerate() {
        if pnum % raw_w == 0 {
          base = [512, 512];
        }
        pnum += 1;
        base[i & 1] += diff;
        let v = base[i & 1] as u16;
        if v >> 10 != 0 {
          return Err(bitstream_err!("CRW: sample {} in block {} of row {} exceeds 10 bits", v, block, row));
        }
        pixel[(block << 6) + i] = v;
      }
    }
    pump.check_overrun()?;

    if lowbits {
      let pos = 26 + row * raw_w / 4;
      let low = file
        .get(pos..pos + raw_w * 2)
        .ok_or_else(|| crate::RawError::UnexpectedEof(format!("CRW: low bits at {} are behind EOF", pos)))?;
      for (i, c) in low.iter().enumerate() {
        for (k, r) in (0..8).step_by(2).enumerate() {
          let p = &mut pixel[i * 4 + k];
          let mut val = (*p << 2) + ((*c as u16 >> r) & 3);
          if raw_w == 2672 && val < 512 {
            val += 2;
          }
          *p = val;
        }
      }
    }

    for r in 0..(raw_h - row).min(8) {
      frame.data[(row + r) * raw_w..(row + r + 1) * raw_w].copy_from_slice(&pixel[r * raw_w..(r + 1) * raw_w]);
    }
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
  fn tables_build() -> std::result::Result<(), Box<dyn std::error::Error>> {
    for t in 0..4 {
      let [first, second] = crw_tables(t)?;
      assert!(first.max_bits() <= 16);
      assert_eq!(second.max_bits(), 16);
    }
    Ok(())
  }

  #[test]
  fn lowbits_detection() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut file = vec![0_u8; 1024];
    assert!(has_lowbits(&file));
    file[600] = 0xff;
    assert!(!has_lowbits(&file));
    file[700] = 0xff;
    file[701] = 0x12;
    assert!(has_lowbits(&file));
    Ok(())
  }

  #[test]
  fn flat_block_decodes_to_base() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Table 0: leaf 0x00 of the first tree is '11110', the second
    // tree ends the block with leaf 0x00 coded as '111111011'.
    let mut file = vec![0_u8; CRW_DATA_START];
    let mut bits = Vec::new();
    {
      let mut w = BitWriter::endian(&mut bits, BigEndian);
      for _ in 0..2 {
        w.write::<5, u32>(0b11110)?;
        w.write::<9, u32>(0b111111011)?;
      }
      w.byte_align()?;
    }
    // A stuffed 0xff tells there are no low bits
    bits.push(0xff);
    bits.push(0x00);
    file.extend_from_slice(&bits);
    file.extend_from_slice(&[0_u8; 64]);
    let mut frame = RawFrame::new(Dim2::new(64, 2), 10, CFA::new("RGGB"));
    decode_crw(&file, 0, &mut frame)?;
    assert!(frame.data.iter().all(|v| *v == 512));
    assert_eq!(frame.maximum, 0x3ff);
    Ok(())
  }
}
