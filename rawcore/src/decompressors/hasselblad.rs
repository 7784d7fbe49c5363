// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Hasselblad 3FR: a lossless JPEG header followed by pairs of
//! Huffman coded lengths in 32 bit little endian words.

use crate::decompressors::huffman::extend_diff;
use crate::decompressors::ljpeg::LjpegHeader;
use crate::decompressors::payload;
use crate::pumps::{BitPump, BitPumpMSB32};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err};

/// Decode the full sensor area. Each row restarts both predictors at
/// `0x8000 + load_flags`, even and odd columns predict separately.
pub fn decode_hasselblad(src: &[u8], load_flags: u32, frame: &mut RawFrame) -> Result<()> {
  let hdr = LjpegHeader::parse(src)?;
  let table = hdr.table(0).ok_or_else(|| bitstream_err!("3FR: no Huffman table"))?;
  let mut pump = BitPumpMSB32::new(payload(src, hdr.data_offset)?);
  let w = frame.width();
  let start = 0x8000 + load_flags as i32;
  for line in frame.data.chunks_exact_mut(w) {
    let mut pred = [start; 2];
    for col in (0..w).step_by(2) {
      let len = [table.decode(&mut pump)?, table.decode(&mut pump)?];
      for c in 0..2 {
        if len[c] > 16 {
          return Err(bitstream_err!("3FR: difference length {} exceeds 16 bits", len[c]));
        }
        let mut diff = extend_diff(pump.get_bits(len[c]), len[c]);
        if diff == 65535 {
          diff = -32768;
        }
        pred[c] += diff;
        if col + c < w {
          line[col + c] = pred[c] as u16;
        }
      }
    }
  }
  pump.check_overrun()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CFA;
  use crate::decompressors::ljpeg::tests::{code_for, header};
  use crate::imgop::Dim2;
  use bitstream_io::{BigEndian, BitWrite, BitWriter};

  /// Entropy data for rows of (length, length, value, value) pairs
  fn encode(diffs: &[[i32; 2]]) -> Vec<u8> {
    let mut bits = Vec::new();
    {
      let mut w = BitWriter::endian(&mut bits, BigEndian);
      for pair in diffs {
        let lens = pair.map(|d| 32 - d.unsigned_abs().leading_zeros());
        for len in lens {
          let (code, clen) = code_for(len);
          w.write_var::<u32>(clen, code).unwrap();
        }
        for (d, len) in pair.iter().zip(lens) {
          if len > 0 {
            let v = if *d < 0 { (d + (1 << len) - 1) as u32 } else { *d as u32 };
            w.write_var::<u32>(len, v).unwrap();
          }
        }
      }
      w.byte_align().unwrap();
    }
    bits.resize(bits.len().next_multiple_of(4) + 8, 0);
    // Words are stored little endian, bits are read from the top
    for word in bits.chunks_exact_mut(4) {
      word.reverse();
    }
    bits
  }

  #[test]
  fn rows_restart_both_predictors() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut stream = header(4, 2, 1, 0x11, 16);
    stream.extend(encode(&[[5, -3], [100, -1], [0, 1], [-7, 2]]));
    let mut frame = RawFrame::new(Dim2::new(4, 2), 16, CFA::new("GBRG"));
    decode_hasselblad(&stream, 0, &mut frame)?;
    assert_eq!(&frame.data[..4], &[0x8005, 0x7ffd, 0x8069, 0x7ffc]);
    assert_eq!(&frame.data[4..], &[0x8000, 0x8001, 0x7ff9, 0x8003]);
    Ok(())
  }

  #[test]
  fn load_flags_shift_the_start_value() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut stream = header(2, 1, 1, 0x11, 16);
    stream.extend(encode(&[[0, 0]]));
    let mut frame = RawFrame::new(Dim2::new(2, 1), 16, CFA::new("GBRG"));
    decode_hasselblad(&stream, 256, &mut frame)?;
    assert_eq!(frame.data, vec![0x8100, 0x8100]);
    Ok(())
  }
}
