// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Uncompressed payloads: plain 16 bit words, bit packed rows and
//! a few vendor specific byte layouts.

use multiversion::multiversion;
use rayon::prelude::*;

use crate::CFA;
use crate::bits::{BEu16, Endian, LEu16, LookupTable};
use crate::decompressors::{PaddedReader, payload, payload_exact};
use crate::imgop::{Dim2, Point};
use crate::pumps::{BitPump, BitPumpMSB};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err, corrupt, unsupported};

/// Layout switches for bit packed payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackedParams {
  pub bps: u32,
  /// Bit 0: one pad byte after every 10 samples.
  /// Bit 1 and 2: interlaced fields, bit 2 seeks to the second field.
  /// Bits 3 and 4: bytes per fetch minus one, in little endian order.
  /// Bit 5: average masked columns as black level.
  /// Bit 6: swap neighboring columns.
  /// Bit 7: rows padded to an even number of bytes.
  pub load_flags: u32,
  /// Payload is a TIFF strip, used for field seeking
  pub tiff_compress: bool,
  /// Row stride in bytes when it is not derived from the frame width
  pub row_bytes: Option<usize>,
}

/// Decode a bit packed payload starting at `data_offset`. Only the rows of
/// the visible area are stored. Returns the black level estimate if
/// requested by the load flags.
pub fn decode_packed(file: &[u8], data_offset: usize, params: &PackedParams, frame: &mut RawFrame) -> Result<Option<u32>> {
  let bps = params.bps;
  if bps == 0 || bps > 16 {
    return Err(unsupported!("Packed: {} bits per sample", bps));
  }
  let lf = params.load_flags;
  let pwide = frame.width();
  let (top, left) = (frame.crop.p.y, frame.crop.p.x);
  let (width, height) = (frame.crop.d.w, frame.crop.d.h);

  let mut bwide = match params.row_bytes {
    Some(bytes) => bytes,
    None => {
      let bytes = pwide * bps as usize / 8;
      bytes + (bytes & (lf >> 7) as usize)
    }
  };
  if bwide * 8 < pwide * bps as usize {
    return Err(unsupported!("Packed: {} bytes per row can't hold {} samples of {} bits", bwide, pwide, bps));
  }
  let rbits = (bwide * 8 - pwide * bps as usize) as i32;
  if lf & 1 != 0 {
    bwide = bwide * 16 / 15;
  }
  let bite = 8 + (lf & 24) as i32;
  let half = (height + 1) >> 1;
  let swap = (lf >> 6 & 1) as usize;

  let src = payload(file, data_offset)?;
  let mut rd = PaddedReader::new(file);
  rd.seek(data_offset + top * bwide);

  let mut bitbuf: u64 = 0;
  let mut vbits: i32 = 0;
  let mut black: u64 = 0;
  let mut zero: u64 = 0;
  for irow in 0..height {
    let mut row = irow;
    if lf & 2 != 0 {
      row = irow % half * 2 + irow / half;
      if row == 1 && lf & 4 != 0 {
        vbits = 0;
        if params.tiff_compress {
          let field = (half * bwide + 2047) & !2047;
          rd.seek(data_offset + field);
        } else {
          rd.seek(file.len() >> 3 << 2);
        }
      }
    }
    let out_row = row + top;
    if out_row >= frame.height() {
      break;
    }
    for col in 0..pwide {
      vbits -= bps as i32;
      while vbits < 0 {
        bitbuf <<= bite;
        for i in (0..bite).step_by(8) {
          bitbuf |= (rd.byte() as u64) << i;
        }
        vbits += bite;
      }
      let val = (bitbuf << (64 - bps as i32 - vbits) >> (64 - bps)) as u16;
      let c = col ^ swap;
      if c < pwide {
        frame.data[out_row * pwide + c] = val;
      }
      if c.wrapping_sub(left) >= width && lf & 32 != 0 {
        black += val as u64;
        zero += (val == 0) as u64;
      }
      if lf & 1 != 0 && col % 10 == 9 && rd.byte() != 0 && col < width + left {
        return Err(bitstream_err!("Packed: non-zero pad byte in row {}", out_row));
      }
    }
    vbits -= rbits;
    rd.check()?;
  }
  log::debug!("Packed: decoded {} rows of {} samples from {} bytes", height, pwide, src.len());

  if lf & 32 != 0 && pwide > width {
    let count = ((pwide - width) * height) as u64;
    if zero * 4 > count {
      return Ok(Some(0));
    }
    return Ok(Some((black / count) as u32));
  }
  Ok(None)
}

/// Smallest bit count covering `maximum`
fn bits_for(maximum: u32) -> u32 {
  let mut bits = 1;
  while (1_u64 << bits) < maximum as u64 {
    bits += 1;
  }
  bits
}

#[multiversion(targets("x86_64+avx+avx2", "x86+sse", "aarch64+neon"))]
fn unpack_16(line: &mut [u16], src: &[u8], endian: Endian, shift: u32) {
  match endian {
    Endian::Big => {
      for (o, b) in line.iter_mut().zip(src.chunks_exact(2)) {
        *o = BEu16(b, 0) >> shift;
      }
    }
    Endian::Little => {
      for (o, b) in line.iter_mut().zip(src.chunks_exact(2)) {
        *o = LEu16(b, 0) >> shift;
      }
    }
  }
}

/// 16 bit words in file byte order, shifted right by `load_flags`.
/// Visible samples must fit into the bit depth of the frame maximum.
pub fn decode_unpacked(src: &[u8], endian: Endian, load_flags: u32, frame: &mut RawFrame) -> Result<()> {
  let (w, h) = (frame.width(), frame.height());
  let src = payload_exact(src, 0, w * h * 2)?;
  let shift = load_flags.min(15);
  frame
    .data
    .par_chunks_exact_mut(w)
    .zip(src.par_chunks_exact(w * 2))
    .for_each(|(line, inb)| unpack_16(line, inb, endian, shift));

  let bits = bits_for(frame.maximum);
  if bits < 16 {
    let crop = frame.crop;
    for row in crop.p.y..(crop.p.y + crop.d.h).min(h) {
      let line = &frame.data[row * w..(row + 1) * w];
      for col in crop.p.x..(crop.p.x + crop.d.w).min(w) {
        if line[col] >> bits != 0 {
          return Err(bitstream_err!("Unpacked: sample {} at {}x{} exceeds {} bits", line[col], col, row, bits));
        }
      }
    }
  }
  Ok(())
}

/// Average over the masked columns of the visible rows
fn right_margin_black(frame: &RawFrame) -> u32 {
  let (w, left, vw) = (frame.width(), frame.crop.p.x, frame.crop.d.w);
  let rows = frame.crop.p.y..(frame.crop.p.y + frame.crop.d.h).min(frame.height());
  if w <= vw + 1 {
    return 0;
  }
  let mut sum = 0_u64;
  for row in rows {
    for col in 0..w {
      if col.wrapping_sub(left) >= vw {
        sum += frame.at(row, col) as u64;
      }
    }
  }
  (sum / ((w - vw) * frame.crop.d.h) as u64) as u32
}

/// One byte per sample mapped through `curve`. The frame maximum
/// becomes `curve[0xff]`. Returns the black level of the masked columns.
pub fn decode_eight_bit(src: &[u8], curve: &LookupTable, frame: &mut RawFrame) -> Result<u32> {
  let (w, h) = (frame.width(), frame.height());
  let src = payload_exact(src, 0, w * h)?;
  frame.data.par_chunks_exact_mut(w).zip(src.par_chunks_exact(w)).for_each(|(line, inb)| {
    for (o, i) in line.iter_mut().zip(inb) {
      *o = curve.lookup(*i as u16);
    }
  });
  frame.maximum = curve.at(0xff) as u32;
  Ok(right_margin_black(frame))
}

/// Nokia: 4 samples of 10 bits in 5 bytes, the fifth byte holds the low
/// bits. Little endian files reverse each group of 4 bytes. Returns the
/// black level of the masked rows above the image.
pub fn decode_nokia(src: &[u8], endian: Endian, frame: &mut RawFrame) -> Result<u32> {
  let (w, h) = (frame.width(), frame.height());
  let dwide = w * 5 / 4;
  let src = payload_exact(src, 0, dwide * h)?;
  let rev = if endian == Endian::Little { 3 } else { 0 };
  let mut data = vec![0_u8; dwide + 8];
  let (top, vw) = (frame.crop.p.y, frame.crop.d.w.min(w));
  let mut black = 0_u64;
  for row in 0..h {
    let inb = &src[row * dwide..(row + 1) * dwide];
    for (c, d) in data.iter_mut().take(dwide).enumerate() {
      *d = inb.get(c ^ rev).copied().unwrap_or(0);
    }
    let line = &mut frame.data[row * w..(row + 1) * w];
    for (pix, dp) in line.chunks_mut(4).zip(data.chunks_exact(5)) {
      for (c, p) in pix.iter_mut().enumerate() {
        *p = (dp[c] as u16) << 2 | (dp[4] as u16 >> (c << 1) & 3);
      }
    }
    if row < top {
      black += line[..vw].iter().map(|v| *v as u64).sum::<u64>();
    }
  }
  frame.maximum = 0x3ff;
  if top > 0 && vw > 0 {
    return Ok((black / (top * vw) as u64) as u32);
  }
  Ok(0)
}

/// Uncompressed DNG strips: 16 bit words in file order or MSB packed
/// rows. Codes below 0x1000 pass the linearization curve.
pub fn decode_dng_uncompressed(src: &[u8], endian: Endian, bps: u32, curve: &LookupTable, frame: &mut RawFrame) -> Result<()> {
  let (w, h) = (frame.width(), frame.height());
  let linearize = |v: u16| if v < 0x1000 { curve.lookup(v) } else { v };
  match bps {
    16 => {
      let src = payload_exact(src, 0, w * h * 2)?;
      frame.data.par_chunks_exact_mut(w).zip(src.par_chunks_exact(w * 2)).for_each(|(line, inb)| {
        unpack_16(line, inb, endian, 0);
        line.iter_mut().for_each(|v| *v = linearize(*v));
      });
    }
    1..=15 => {
      let row_bytes = (w * bps as usize).div_ceil(8);
      let src = payload_exact(src, 0, row_bytes * h)?;
      frame.data.par_chunks_exact_mut(w).zip(src.par_chunks_exact(row_bytes)).for_each(|(line, inb)| {
        let mut pump = BitPumpMSB::new(inb);
        for v in line.iter_mut() {
          *v = linearize(pump.get_bits(bps) as u16);
        }
      });
    }
    _ => return Err(unsupported!("DNG: uncompressed data with {} bits per sample", bps)),
  }
  Ok(())
}

/// Payload split into separately addressed parts, one offset per tile
/// or per shot
#[derive(Debug, Clone, Default)]
pub struct TiledParams {
  pub offsets: Vec<usize>,
  /// Rows per tile
  pub tile_length: usize,
  /// Sample planes, stored one after another
  pub samples: usize,
  /// Stored sensor area, its width is the row stride
  pub raw_dim: Dim2,
  /// Origin of the visible area in the stored sensor area
  pub origin: Point,
  /// Pattern of the stored sensor area
  pub cfa: CFA,
}

/// Leaf tiled 16 bit payload. Tiles of `tile_length` rows follow each
/// other, first all tiles of plane 0, then those of the next planes.
/// The frame has the size of the visible area. Mosaic frames only read
/// the first plane, full color frames one plane per component.
pub fn decode_leaf_hdr(file: &[u8], endian: Endian, params: &TiledParams, frame: &mut RawFrame) -> Result<()> {
  let (w, h, cpp) = (frame.width(), frame.height(), frame.cpp);
  let planes = if cpp > 1 { params.samples.clamp(1, cpp) } else { 1 };
  let tile_length = params.tile_length.max(1);
  let stride = params.raw_dim.w * 2;
  let (top, left) = (params.origin.y, params.origin.x);
  let mut tile = 0;
  let mut pos = 0;
  for c in 0..planes {
    for r in 0..params.raw_dim.h {
      if r % tile_length == 0 {
        let offset = params.offsets.get(tile).ok_or_else(|| corrupt!("Leaf: plane {} needs tile {}, file has {}", c, tile, params.offsets.len()))?;
        pos = offset + 2 * left;
        tile += 1;
      }
      let row_pos = pos;
      pos += stride;
      let row = match r.checked_sub(top) {
        Some(row) if row < h => row,
        _ => continue,
      };
      let src = payload_exact(file, row_pos, w * 2)?;
      for col in 0..w {
        frame.data[(row * w + col) * cpp + c] = endian.read_u16(src, col * 2);
      }
    }
  }
  Ok(())
}

/// Sinar 4-shot: four full exposures, each shifted by one photosite.
/// Every visible pixel collects the color each shot saw at its place.
/// The frame must have three components and the visible size.
pub fn decode_sinar_4shot(file: &[u8], endian: Endian, params: &TiledParams, frame: &mut RawFrame) -> Result<()> {
  if params.offsets.len() != 4 || frame.cpp != 3 {
    return Err(corrupt!("Sinar: 4-shot needs 4 offsets and an RGB frame, got {} and {}", params.offsets.len(), frame.cpp));
  }
  let (w, h) = (frame.width(), frame.height());
  let (raw_w, raw_h) = (params.raw_dim.w, params.raw_dim.h);
  let cfa = params.cfa.merge_greens();
  for (shot, offset) in params.offsets.iter().enumerate() {
    let src = payload_exact(file, *offset, raw_w * raw_h * 2)?;
    for row in 0..raw_h {
      let r = row.wrapping_sub(params.origin.y + (shot >> 1 & 1));
      if r >= h {
        continue;
      }
      for col in 0..raw_w {
        let c = col.wrapping_sub(params.origin.x + (shot & 1));
        if c >= w {
          continue;
        }
        frame.data[(r * w + c) * 3 + cfa.color_at(row, col)] = endian.read_u16(src, (row * raw_w + col) * 2);
      }
    }
  }
  Ok(())
}
