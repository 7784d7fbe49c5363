// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Lossless JPEG (ITU T.81 process 14) as used by CR2 and DNG

use crate::bits::{Endian, LookupTable, clip16};
use crate::decompressors::huffman::HuffTable;
use crate::pumps::{BitPump, BitPumpJPEG, ByteStream};
use crate::rawimage::RawFrame;
use crate::{Result, bitstream_err, corrupt, unsupported};

enum Marker {
  SOF0 = 0xc0,
  SOF3 = 0xc3,
  DHT = 0xc4,
  SOI = 0xd8,
  SOS = 0xda,
  DRI = 0xdd,
}

fn m(marker: Marker) -> u8 {
  marker as u8
}

/// Frame and scan parameters up to the entropy coded data
#[derive(Debug, Clone)]
pub struct LjpegHeader {
  /// Sample precision after point transform
  pub bits: u32,
  pub high: usize,
  pub wide: usize,
  /// Components, interleaved per column
  pub clrs: usize,
  /// Predictor selection value 1..=7
  pub psv: u32,
  /// Samples per restart interval, 0 if none
  pub restart: usize,
  /// Canon small raw subsampling, 0 for plain files
  pub sraw: usize,
  /// Table per component
  tables: Vec<HuffTable>,
  /// Offset of the entropy coded data
  pub data_offset: usize,
}

impl LjpegHeader {
  pub fn parse(src: &[u8]) -> Result<Self> {
    let mut input = ByteStream::new(src, Endian::Big);
    if input.get_u8()? != 0xff || input.get_u8()? != m(Marker::SOI) {
      return Err(bitstream_err!("LJPEG: image did not start with SOI"));
    }
    let mut hdr = LjpegHeader {
      bits: 0,
      high: 0,
      wide: 0,
      clrs: 0,
      psv: 0,
      restart: 0,
      sraw: 0,
      tables: Vec::new(),
      data_offset: 0,
    };
    let mut huff: [Option<HuffTable>; 6] = Default::default();
    loop {
      let marker = input.skip_to_marker()?;
      let len = (input.get_u16()? as usize)
        .checked_sub(2)
        .ok_or_else(|| bitstream_err!("LJPEG: segment {:#x} with invalid length", marker))?;
      let data = input.get_bytes(len)?;
      let byte = |i: usize| data.get(i).copied().ok_or_else(|| bitstream_err!("LJPEG: segment {:#x} too short", marker));
      match marker {
        x if x == m(Marker::SOF3) || x == m(Marker::SOF0) => {
          if x == m(Marker::SOF3) {
            let sub = byte(7)? as usize;
            hdr.sraw = ((sub >> 4) * (sub & 15)).wrapping_sub(1) & 3;
          }
          hdr.bits = byte(0)? as u32;
          hdr.high = (byte(1)? as usize) << 8 | byte(2)? as usize;
          hdr.wide = (byte(3)? as usize) << 8 | byte(4)? as usize;
          hdr.clrs = byte(5)? as usize + hdr.sraw;
        }
        x if x == m(Marker::DHT) => {
          let mut pos = 0;
          while pos < data.len() && (data[pos] as usize) < 4 {
            let id = data[pos] as usize;
            let (table, used) = HuffTable::from_spec(&data[pos + 1..])?;
            huff[id] = Some(table);
            pos += 1 + used;
          }
        }
        x if x == m(Marker::SOS) => {
          let ns = byte(0)? as usize;
          hdr.psv = byte(1 + ns * 2)? as u32;
          hdr.bits = hdr.bits.saturating_sub(byte(3 + ns * 2)? as u32 & 15);
          hdr.data_offset = input.get_pos();
          break;
        }
        x if x == m(Marker::DRI) => {
          hdr.restart = (byte(0)? as usize) << 8 | byte(1)? as usize;
        }
        _ => {}
      }
    }

    if hdr.bits == 0 || hdr.bits > 16 {
      return Err(bitstream_err!("LJPEG: {} bits per sample", hdr.bits));
    }
    if hdr.wide == 0 || hdr.high == 0 || hdr.clrs == 0 || hdr.clrs > 6 {
      return Err(bitstream_err!("LJPEG: invalid frame {}x{} with {} components", hdr.wide, hdr.high, hdr.clrs));
    }
    // Components without an own table use the one of their predecessor
    for c in 0..5 {
      if huff[c + 1].is_none() {
        huff[c + 1] = huff[c].clone();
      }
    }
    // Small raw: all luma samples use the first table, chroma the second
    if hdr.sraw != 0 {
      for c in 0..4 {
        huff[2 + c] = huff[1].clone();
      }
      for c in 0..hdr.sraw {
        huff[1 + c] = huff[0].clone();
      }
    }
    hdr.tables = huff
      .into_iter()
      .take(hdr.clrs)
      .map(|t| t.ok_or_else(|| bitstream_err!("LJPEG: no Huffman table defined")))
      .collect::<Result<Vec<_>>>()?;
    log::debug!(
      "LJPEG: {}x{}, {} components, {} bits, predictor {}, restart {}",
      hdr.wide,
      hdr.high,
      hdr.clrs,
      hdr.bits,
      hdr.psv,
      hdr.restart
    );
    Ok(hdr)
  }

  /// Huffman table of a component
  pub fn table(&self, component: usize) -> Option<&HuffTable> {
    self.tables.get(component)
  }
}

/// Row by row decoder keeping the previous row for prediction
pub struct LjpegDecoder<'a> {
  hdr: LjpegHeader,
  src: &'a [u8],
  pump: BitPumpJPEG<'a>,
  rows: [Vec<u16>; 2],
  vpred: [i32; 6],
  /// DNG 1.0 files store 16 trailing bits for a length of 16
  len16_full: bool,
  jrow: usize,
}

impl<'a> LjpegDecoder<'a> {
  pub fn new(src: &'a [u8], dng_version: u32) -> Result<Self> {
    let hdr = LjpegHeader::parse(src)?;
    let n = hdr.wide * hdr.clrs;
    let data = src.get(hdr.data_offset..).unwrap_or(&[]);
    Ok(Self {
      pump: BitPumpJPEG::new(data),
      src: data,
      rows: [vec![0; n], vec![0; n]],
      vpred: [0; 6],
      len16_full: dng_version != 0 && dng_version < 0x1010000,
      jrow: 0,
      hdr,
    })
  }

  pub fn header(&self) -> &LjpegHeader {
    &self.hdr
  }

  /// Decode rows of `wide` columns instead of the frame width
  pub fn narrow(&mut self, wide: usize) {
    self.hdr.wide = wide.min(self.hdr.wide);
    let n = self.hdr.wide * self.hdr.clrs;
    self.rows = [vec![0; n], vec![0; n]];
  }

  /// Samples per row, all components interleaved
  pub fn row_len(&self) -> usize {
    self.hdr.wide * self.hdr.clrs
  }

  /// Skip past the next restart marker
  fn resync(&mut self) {
    let mut pos = self.pump.get_pos();
    while pos + 1 < self.src.len() {
      if self.src[pos] == 0xff && self.src[pos + 1] >> 4 == 0xd {
        pos += 2;
        break;
      }
      pos += 1;
    }
    self.pump.seek(pos);
  }

  /// Decode the next row
  pub fn next_row(&mut self) -> Result<&[u16]> {
    let jrow = self.jrow;
    let (wide, clrs, bits) = (self.hdr.wide, self.hdr.clrs, self.hdr.bits);
    let restart_row = if self.hdr.restart > 0 { (jrow * wide) % self.hdr.restart == 0 } else { jrow == 0 };
    if restart_row {
      self.vpred = [1 << (bits - 1); 6];
      if jrow > 0 {
        self.resync();
      }
    }
    let sraw = self.hdr.sraw;
    // Luma samples of small raw files chain through the whole row
    let mut spred = 0;
    let (a, b) = self.rows.split_at_mut(1);
    let (cur, prev) = if jrow & 1 == 0 { (&mut a[0], &b[0]) } else { (&mut b[0], &a[0]) };
    for col in 0..wide {
      for c in 0..clrs {
        let idx = col * clrs + c;
        let diff = self.hdr.tables[c].decode_diff(&mut self.pump, self.len16_full)?;
        let mut pred = if sraw != 0 && c <= sraw && (col | c) != 0 {
          spred
        } else if col > 0 {
          cur[idx - clrs] as i32
        } else {
          let p = self.vpred[c];
          self.vpred[c] += diff;
          p
        };
        if jrow > 0 && col > 0 {
          let up = prev[idx] as i32;
          let upleft = prev[idx - clrs] as i32;
          pred = match self.hdr.psv {
            1 => pred,
            2 => up,
            3 => upleft,
            4 => pred + up - upleft,
            5 => pred + ((up - upleft) >> 1),
            6 => up + ((pred - upleft) >> 1),
            7 => (pred + up) >> 1,
            _ => 0,
          };
        }
        let value = pred.wrapping_add(diff) as u16;
        if bits < 16 && value >> bits != 0 {
          return Err(bitstream_err!("LJPEG: sample {} in row {} exceeds {} bits", value, jrow, bits));
        }
        cur[idx] = value;
        if sraw != 0 && c <= sraw {
          spred = value as i32;
        }
      }
    }
    self.pump.check_overrun()?;
    self.jrow += 1;
    Ok(if jrow & 1 == 0 { &self.rows[0] } else { &self.rows[1] })
  }
}

/// Canon CR2 and similar single stream layouts
#[derive(Debug, Clone, Default)]
pub struct LosslessParams {
  /// Number of full slices, their width, width of the last slice
  pub slices: Option<[u16; 3]>,
  /// Fields stored as even rows then odd rows, bottom up
  pub interlaced: bool,
  /// Stream starts two columns early
  pub shift_columns: bool,
  pub curve: Option<LookupTable>,
}

pub fn decode_lossless(src: &[u8], params: &LosslessParams, frame: &mut RawFrame) -> Result<()> {
  if let Some(slices) = params.slices {
    if slices[0] > 15 {
      return Err(corrupt!("CR2: {} slices are too many", slices[0] as u32 + 1));
    }
    if slices[1] == 0 || slices[2] == 0 {
      return Err(corrupt!("CR2: zero slice width"));
    }
  }
  let mut dec = LjpegDecoder::new(src, 0)?;
  if dec.header().sraw != 0 {
    return Err(unsupported!("CR2: small raw stream needs the YCbCr decoder"));
  }
  let (jwide, jhigh, jbits) = (dec.row_len(), dec.header().high, dec.header().bits);
  let (raw_w, raw_h) = (frame.width() as i64, frame.height() as i64);
  let height = frame.crop.d.h as i64;
  let identity = LookupTable::identity();
  let curve = params.curve.as_ref().unwrap_or(&identity);

  let (mut row, mut col) = (0_i64, 0_i64);
  for jrow in 0..jhigh {
    let line = dec.next_row()?;
    if params.interlaced {
      let j = jrow as i64;
      row = if j & 1 != 0 { height - 1 - j / 2 } else { j / 2 };
    }
    for (jcol, v) in line.iter().enumerate() {
      let val = if jbits <= 12 { curve.lookup(v & 0xfff) } else { *v };
      if let Some(s) = params.slices {
        let (count, sw, lw) = (s[0] as i64, s[1] as i64, s[2] as i64);
        let mut jidx = (jrow * jwide + jcol) as i64;
        let mut i = jidx / (sw * jhigh as i64);
        let last = i >= count;
        if last {
          i = count;
        }
        jidx -= i * (sw * jhigh as i64);
        let w = if last { lw } else { sw };
        row = jidx / w;
        col = jidx % w + i * sw;
      }
      let (mut r, mut c) = (row, col);
      if params.shift_columns {
        c -= 2;
        if c < 0 {
          c += raw_w;
          r -= 1;
        }
      }
      if (0..raw_h).contains(&r) && (0..raw_w).contains(&c) {
        frame.data[(r * raw_w + c) as usize] = val;
      }
      col += 1;
      if col >= raw_w {
        col = 0;
        row += 1;
      }
    }
  }
  Ok(())
}

/// Canon small raw (sRAW, mRAW) parameters
#[derive(Debug, Clone, Default)]
pub struct SrawParams {
  /// Number of full slices, their width, width of the last slice
  pub slices: Option<[u16; 3]>,
  /// Width of the stored sensor area
  pub raw_width: usize,
  /// Channel multipliers, 1024 is unity
  pub sraw_mul: [u16; 4],
  pub unique_id: u32,
  /// Firmware version as `major * 1000000 + minor * 1000 + patch`
  pub firmware: u32,
}

/// Canon small raw: subsampled YCbCr in a lossless JPEG stream,
/// converted to full color RGB pixels. The frame must have three
/// components per pixel and the size of the visible area.
pub fn decode_sraw(src: &[u8], params: &SrawParams, frame: &mut RawFrame) -> Result<()> {
  if frame.cpp != 3 {
    return Err(corrupt!("CR2: small raw needs a three component frame, got {}", frame.cpp));
  }
  let mut dec = LjpegDecoder::new(src, 0)?;
  let (sraw, clrs) = (dec.header().sraw, dec.header().clrs);
  if sraw == 0 || clrs < 4 {
    return Err(bitstream_err!("CR2: stream with {} components is not a small raw", clrs));
  }
  let half = dec.header().wide >> 1;
  dec.narrow(half);
  let jwide = half * clrs;
  if jwide == 0 {
    return Err(bitstream_err!("CR2: small raw stream without columns"));
  }
  let (width, height) = (frame.width(), frame.height());
  let slices = params.slices.unwrap_or([0; 3]);
  let row_step = (clrs >> 1) - 1;

  // Y, Cb and Cr per pixel, chroma centered on zero
  let mut ycc = vec![[0_i32; 3]; width * height];
  let mut line: Vec<u16> = Vec::new();
  let (mut jcol, mut ecol) = (0, 0);
  for _ in 0..=slices[0] {
    let scol = ecol;
    ecol += slices[1] as usize * 2 / clrs;
    if slices[0] == 0 || ecol + 1 > params.raw_width {
      ecol = params.raw_width & !1;
    }
    for row in (0..height).step_by(row_step) {
      for col in (scol..ecol).step_by(2) {
        jcol %= jwide;
        if jcol == 0 {
          line.clear();
          line.extend_from_slice(dec.next_row()?);
        }
        if col < width {
          for c in 0..clrs - 2 {
            let (r, cc) = (row + (c >> 1), col + (c & 1));
            if r < height && cc < width {
              ycc[r * width + cc][0] = line[jcol + c] as i16 as i32;
            }
          }
          let pix = &mut ycc[row * width + col];
          pix[1] = line[jcol + clrs - 2] as i32 - 16384;
          pix[2] = line[jcol + clrs - 1] as i32 - 16384;
        }
        jcol += clrs;
      }
    }
  }

  // Chroma is only known at even columns and, for 4:2:0, even rows
  for row in 0..height {
    let base = row * width;
    if row & (sraw >> 1) != 0 {
      for col in (0..width).step_by(2) {
        for c in 1..3 {
          let up = ycc[base - width + col][c];
          ycc[base + col][c] = if row == height - 1 { up } else { (up + ycc[base + width + col][c] + 1) >> 1 };
        }
      }
    }
    for col in (1..width).step_by(2) {
      for c in 1..3 {
        let left = ycc[base + col - 1][c];
        ycc[base + col][c] = if col == width - 1 { left } else { (left + ycc[base + col + 1][c] + 1) >> 1 };
      }
    }
  }

  let newer_hue = params.unique_id >= 0x80000281 || (params.unique_id == 0x80000218 && params.firmware > 1000006);
  let hue = if newer_hue { (sraw << 1) as i32 } else { ((sraw + 1) << 2) as i32 };
  let mul = params.sraw_mul.map(|m| m as i32);
  for (out, pix) in frame.data.chunks_exact_mut(3).zip(&ycc) {
    let [mut y, cb, cr] = *pix;
    let rgb = if params.unique_id < 0x80000218 || params.unique_id == 0x80000285 {
      if params.unique_id < 0x80000218 {
        y = (y - 512) as i16 as i32;
      }
      [y + cr, y + ((-778 * cb - (cr << 11)) >> 12), y + cb]
    } else {
      // Sample storage is 16 bit wide
      let cb = ((cb << 2) + hue) as i16 as i32;
      let cr = ((cr << 2) + hue) as i16 as i32;
      [
        y + ((50 * cb + 22929 * cr) >> 14),
        y + ((-5640 * cb - 11751 * cr) >> 14),
        y + ((29040 * cb - 101 * cr) >> 14),
      ]
    };
    for c in 0..3 {
      out[c] = clip16((rgb[c] * mul[c]) >> 10);
    }
  }
  frame.maximum = 0x3fff;
  Ok(())
}

/// DNG lossless JPEG, either one stream or a grid of tiles
#[derive(Debug, Clone)]
pub struct DngTiles {
  /// Absolute offsets of all tiles, a single entry for untiled data
  pub offsets: Vec<usize>,
  pub tile_width: usize,
  pub tile_length: usize,
  pub dng_version: u32,
  /// Linearization curve for codes below 0x1000
  pub curve: Option<LookupTable>,
}

pub fn decode_dng_tiles(file: &[u8], tiles: &DngTiles, frame: &mut RawFrame) -> Result<()> {
  let (raw_w, raw_h) = (frame.width(), frame.height());
  let tile_width = tiles.tile_width.max(1);
  let identity = LookupTable::identity();
  let curve = tiles.curve.as_ref().unwrap_or(&identity);
  let (mut trow, mut tcol) = (0, 0);
  for offset in &tiles.offsets {
    if trow >= raw_h {
      break;
    }
    let src = file
      .get(*offset..)
      .ok_or_else(|| crate::RawError::UnexpectedEof(format!("DNG: tile offset {} is behind EOF", offset)))?;
    let mut dec = LjpegDecoder::new(src, tiles.dng_version)?;
    let (jhigh, jwide) = (dec.header().high, dec.row_len());
    let (mut row, mut col) = (0, 0);
    for _ in 0..jhigh {
      let line = dec.next_row()?;
      for v in &line[..jwide] {
        let (r, c) = (trow + row, tcol + col);
        if r < raw_h && c < raw_w {
          frame.data[r * raw_w + c] = if *v < 0x1000 { curve.lookup(*v) } else { *v };
        }
        col += 1;
        if col >= tile_width || col >= raw_w {
          col = 0;
          row += 1;
        }
      }
    }
    tcol += tile_width;
    if tcol >= raw_w {
      tcol = 0;
      trow += tiles.tile_length;
    }
  }
  Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::CFA;
  use crate::imgop::Dim2;
  use bitstream_io::{BigEndian, BitWrite, BitWriter};

  /// Table with a single code per difference length 0..=12,
  /// length n is coded as n one bits followed by a zero.
  const DHT: [u8; 29] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, //
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
  ];

  pub(crate) fn code_for(len: u32) -> (u32, u32) {
    if len == 0 { (0, 1) } else { (((1 << len) - 1) << 1, len + 1) }
  }

  /// Difference bits as coded by the test table, then the raw value
  pub(crate) fn write_diff(w: &mut BitWriter<&mut Vec<u8>, BigEndian>, diff: i32) {
    let len = 32 - diff.unsigned_abs().leading_zeros();
    let (code, clen) = code_for(len);
    w.write_var::<u32>(clen, code).unwrap();
    if len > 0 {
      let v = if diff < 0 { (diff + (1 << len) - 1) as u32 } else { diff as u32 };
      w.write_var::<u32>(len, v).unwrap();
    }
  }

  /// Complete stream around the given differences. `sampling` is the
  /// subsampling byte of the first component.
  fn stream(width: usize, height: usize, ncomp: usize, sampling: u8, bits: u32, diffs: &[i32]) -> Vec<u8> {
    let mut out = header(width, height, ncomp, sampling, bits);
    let mut bitbuf = Vec::new();
    {
      let mut w = BitWriter::endian(&mut bitbuf, BigEndian);
      for diff in diffs {
        write_diff(&mut w, *diff);
      }
      w.byte_align().unwrap();
    }
    for b in bitbuf {
      out.push(b);
      if b == 0xff {
        out.push(0);
      }
    }
    out.extend_from_slice(&[0xff, 0xd9]);
    out
  }

  /// Markers up to and including the scan header
  pub(crate) fn header(width: usize, height: usize, ncomp: usize, sampling: u8, bits: u32) -> Vec<u8> {
    let mut out = vec![0xff, 0xd8];
    out.extend_from_slice(&[0xff, 0xc4, 0, (2 + 1 + DHT.len()) as u8, 0]);
    out.extend_from_slice(&DHT);
    out.extend_from_slice(&[0xff, 0xc3, 0, (8 + 3 * ncomp) as u8, bits as u8]);
    out.extend_from_slice(&(height as u16).to_be_bytes());
    out.extend_from_slice(&(width as u16).to_be_bytes());
    out.push(ncomp as u8);
    for c in 0..ncomp {
      out.extend_from_slice(&[c as u8, if c == 0 { sampling } else { 0x11 }, 0]);
    }
    out.extend_from_slice(&[0xff, 0xda, 0, (6 + 2 * ncomp) as u8, ncomp as u8]);
    for c in 0..ncomp {
      out.extend_from_slice(&[c as u8, 0]);
    }
    out.extend_from_slice(&[1, 0, 0]);
    out
  }

  /// Encode samples with predictor 1 into a complete LJPEG stream
  pub(crate) fn encode(width: usize, height: usize, clrs: usize, bits: u32, samples: &[u16]) -> Vec<u8> {
    let n = width * clrs;
    let mut diffs = Vec::with_capacity(samples.len());
    for row in 0..height {
      for col in 0..width {
        for c in 0..clrs {
          let idx = row * n + col * clrs + c;
          let pred = if col > 0 {
            samples[idx - clrs] as i32
          } else if row > 0 {
            samples[idx - n] as i32
          } else {
            1 << (bits - 1)
          };
          diffs.push(samples[idx] as i32 - pred);
        }
      }
    }
    stream(width, height, clrs, 0x11, bits, &diffs)
  }

  /// Encode 4:2:2 small raw groups of Y1 Y2 Cb Cr, `groups` per row
  fn encode_sraw(groups: usize, height: usize, bits: u32, samples: &[u16]) -> Vec<u8> {
    let n = groups * 4;
    let mut diffs = Vec::with_capacity(samples.len());
    for row in 0..height {
      let mut spred = 0;
      for g in 0..groups {
        for c in 0..4 {
          let idx = row * n + g * 4 + c;
          let pred = if c <= 1 && (g | c) != 0 {
            spred
          } else if g > 0 {
            samples[idx - 4] as i32
          } else if row > 0 {
            samples[idx - n] as i32
          } else {
            1 << (bits - 1)
          };
          diffs.push(samples[idx] as i32 - pred);
          if c <= 1 {
            spred = samples[idx] as i32;
          }
        }
      }
    }
    stream(groups * 2, height, 3, 0x21, bits, &diffs)
  }

  #[test]
  fn small_raw_is_converted_to_rgb() -> std::result::Result<(), Box<dyn std::error::Error>> {
    #[rustfmt::skip]
    let samples = [
      16000, 16010, 16484, 16334, 16020, 16030, 16384, 16384,
      16100, 16100, 16384, 16384, 16100, 16100, 16384, 16384,
    ];
    let stream = encode_sraw(2, 2, 15, &samples);
    let hdr = LjpegHeader::parse(&stream)?;
    assert_eq!((hdr.sraw, hdr.clrs), (1, 4));
    let mut frame = RawFrame::new_with_cpp(Dim2::new(4, 2), 15, CFA::default(), 3);
    let params = SrawParams {
      raw_width: 4,
      sraw_mul: [1024; 4],
      unique_id: 0x80000285,
      ..Default::default()
    };
    decode_sraw(&stream, &params, &mut frame)?;
    assert_eq!(frame.pixel(0, 0), &[15950, 16006, 16100]);
    // Odd columns average the chroma of their neighbours
    assert_eq!(frame.pixel(0, 1), &[15985, 16013, 16060]);
    assert_eq!(frame.pixel(0, 3), &[16030; 3]);
    assert_eq!(frame.pixel(1, 2), &[16100; 3]);
    assert_eq!(frame.maximum, 0x3fff);
    Ok(())
  }

  #[test]
  fn small_raw_stream_is_rejected_by_plain_decoder() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let stream = encode_sraw(1, 1, 15, &[16384; 4]);
    let mut frame = RawFrame::new(Dim2::new(2, 1), 15, CFA::new("RGGB"));
    assert!(decode_lossless(&stream, &LosslessParams::default(), &mut frame).is_err());
    Ok(())
  }

  #[test]
  fn decode_two_component_stream() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let samples: Vec<u16> = (0..4 * 3 * 2).map(|i| (i * 97 % 4096) as u16).collect();
    let stream = encode(3, 4, 2, 12, &samples);
    let mut frame = RawFrame::new(Dim2::new(6, 4), 12, CFA::new("RGGB"));
    decode_lossless(&stream, &LosslessParams::default(), &mut frame)?;
    assert_eq!(frame.data, samples);
    Ok(())
  }

  #[test]
  fn cr2_slices_fill_column_bands() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Two slices of 2 columns over a 4x2 frame
    let samples: Vec<u16> = vec![1, 2, 3, 4, 5, 6, 7, 8];
    let stream = encode(4, 2, 1, 12, &samples);
    let mut frame = RawFrame::new(Dim2::new(4, 2), 12, CFA::new("RGGB"));
    let params = LosslessParams {
      slices: Some([1, 2, 2]),
      ..Default::default()
    };
    decode_lossless(&stream, &params, &mut frame)?;
    assert_eq!(frame.data, vec![1, 2, 5, 6, 3, 4, 7, 8]);
    Ok(())
  }

  #[test]
  fn too_many_slices() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = RawFrame::new(Dim2::new(4, 2), 12, CFA::new("RGGB"));
    let params = LosslessParams {
      slices: Some([16, 2, 2]),
      ..Default::default()
    };
    let err = decode_lossless(&[0xff, 0xd8], &params, &mut frame).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::CorruptMetadata);
    Ok(())
  }

  #[test]
  fn truncated_stream_is_eof() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let samples: Vec<u16> = (0..64 * 64).map(|i| (i * 31 % 4096) as u16).collect();
    let stream = encode(64, 64, 1, 12, &samples);
    let cut = &stream[..stream.len() / 3];
    let mut frame = RawFrame::new(Dim2::new(64, 64), 12, CFA::new("RGGB"));
    let err = decode_lossless(cut, &LosslessParams::default(), &mut frame).err().ok_or("no error")?;
    assert!(matches!(err.kind(), crate::ErrorKind::UnexpectedEof | crate::ErrorKind::BitstreamCorruption));
    Ok(())
  }

  #[test]
  fn dng_tiles_are_placed() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let left: Vec<u16> = vec![10, 11, 12, 13];
    let right: Vec<u16> = vec![20, 21, 22, 23];
    let t0 = encode(2, 2, 1, 12, &left);
    let t1 = encode(2, 2, 1, 12, &right);
    let mut file = t0.clone();
    file.extend_from_slice(&t1);
    let tiles = DngTiles {
      offsets: vec![0, t0.len()],
      tile_width: 2,
      tile_length: 2,
      dng_version: 0x1040000,
      curve: None,
    };
    let mut frame = RawFrame::new(Dim2::new(4, 2), 12, CFA::new("RGGB"));
    decode_dng_tiles(&file, &tiles, &mut frame)?;
    assert_eq!(frame.data, vec![10, 11, 20, 21, 12, 13, 22, 23]);
    Ok(())
  }
}
