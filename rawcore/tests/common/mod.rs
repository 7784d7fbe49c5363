// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Builders for small synthetic raw files.
//!
//! The files are written with the TIFF writer of the crate, so they are
//! in native byte order.

#![allow(dead_code)]

use std::io::Cursor;

use rawcore::formats::tiff::{DirectoryWriter, SRational, TiffWriter};
use rawcore::tags::TiffCommonTag;

pub type TestResult<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

pub(crate) fn init_test_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal DNG with an RGGB mosaic and 16 bit uncompressed strips
#[derive(Debug, Clone)]
pub(crate) struct SyntheticDng {
  pub width: u32,
  pub height: u32,
  pub samples: Vec<u16>,
  pub black: Option<u16>,
  pub white: u16,
  /// Row major 3x3, scaled by 10000
  pub color_matrix: Option<[i32; 9]>,
  pub as_shot_neutral: Option<[f64; 3]>,
  /// Overrides the strip offset written into the file
  pub strip_offset: Option<u32>,
}

impl SyntheticDng {
  /// Image with every sample set to `value`
  pub fn uniform(width: u32, height: u32, value: u16) -> Self {
    Self::from_fn(width, height, |_, _| value)
  }

  pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u16) -> Self {
    let samples = (0..height).flat_map(|row| (0..width).map(move |col| (row, col))).map(|(row, col)| f(row, col)).collect();
    Self {
      width,
      height,
      samples,
      black: None,
      white: u16::MAX,
      color_matrix: None,
      as_shot_neutral: None,
      strip_offset: None,
    }
  }

  pub fn white(mut self, white: u16) -> Self {
    self.white = white;
    self
  }

  pub fn black(mut self, black: u16) -> Self {
    self.black = Some(black);
    self
  }

  pub fn color_matrix(mut self, matrix: [i32; 9]) -> Self {
    self.color_matrix = Some(matrix);
    self
  }

  pub fn neutral(mut self, neutral: [f64; 3]) -> Self {
    self.as_shot_neutral = Some(neutral);
    self
  }

  fn payload(&self) -> Vec<u8> {
    self.samples.iter().flat_map(|v| v.to_ne_bytes()).collect()
  }

  fn tags(&self, dir: &mut DirectoryWriter<'_, '_>, offset: u32) -> rawcore::formats::tiff::Result<()> {
    let (w, h) = (self.width, self.height);
    dir.add_tag(TiffCommonTag::Make, "Test")?;
    dir.add_tag(TiffCommonTag::Model, "Sensor")?;
    dir.add_tag(TiffCommonTag::ImageWidth, [w])?;
    dir.add_tag(TiffCommonTag::ImageLength, [h])?;
    dir.add_tag(TiffCommonTag::BitsPerSample, [16_u16])?;
    dir.add_tag(TiffCommonTag::Compression, [1_u16])?;
    dir.add_tag(TiffCommonTag::StripOffsets, [self.strip_offset.unwrap_or(offset)])?;
    dir.add_tag(TiffCommonTag::StripByteCounts, [w * h * 2])?;
    dir.add_tag(TiffCommonTag::CFARepeatPatternDim, [2_u16, 2])?;
    dir.add_tag(TiffCommonTag::CFAPattern, [0_u8, 1, 1, 2])?;
    dir.add_tag(TiffCommonTag::DNGVersion, [1_u8, 4, 0, 0])?;
    dir.add_tag(TiffCommonTag::WhiteLevel, [self.white])?;
    if let Some(black) = self.black {
      dir.add_tag(TiffCommonTag::BlackLevels, [black])?;
    }
    if let Some(matrix) = self.color_matrix {
      let matrix: Vec<SRational> = matrix.iter().map(|v| SRational::new(*v, 10000)).collect();
      dir.add_tag(TiffCommonTag::ColorMatrix1, matrix)?;
    }
    if let Some(neutral) = self.as_shot_neutral {
      let neutral: Vec<f64> = neutral.to_vec();
      dir.add_tag(TiffCommonTag::AsShotNeutral, neutral)?;
    }
    Ok(())
  }

  pub fn build(&self) -> TestResult<Vec<u8>> {
    let payload = self.payload();
    tiff_with(&payload, |dir, offset| self.tags(dir, offset))
  }

  /// Same file, but the strips point right behind the end of it
  pub fn build_without_payload(&self) -> TestResult<Vec<u8>> {
    let len = self.build()?.len() as u32;
    let mut truncated = self.clone();
    truncated.strip_offset = Some(len);
    let buf = truncated.build()?;
    assert_eq!(buf.len() as u32, len, "strip offset must not change the file size");
    Ok(buf)
  }
}

/// Plain TIFF with a 14 bit mosaic, no DNG tags
pub(crate) fn plain_tiff_14bit(width: u32, height: u32, samples: &[u16]) -> TestResult<Vec<u8>> {
  let payload: Vec<u8> = samples.iter().flat_map(|v| v.to_ne_bytes()).collect();
  tiff_with(&payload, |dir, offset| {
    dir.add_tag(TiffCommonTag::Make, "Test")?;
    dir.add_tag(TiffCommonTag::Model, "Plain")?;
    dir.add_tag(TiffCommonTag::ImageWidth, [width])?;
    dir.add_tag(TiffCommonTag::ImageLength, [height])?;
    dir.add_tag(TiffCommonTag::BitsPerSample, [14_u16])?;
    dir.add_tag(TiffCommonTag::Compression, [1_u16])?;
    dir.add_tag(TiffCommonTag::SamplesPerPixel, [1_u16])?;
    dir.add_tag(TiffCommonTag::StripOffsets, [offset])?;
    dir.add_tag(TiffCommonTag::StripByteCounts, [width * height * 2])?;
    Ok(())
  })
}

fn tiff_with(payload: &[u8], tags: impl FnOnce(&mut DirectoryWriter<'_, '_>, u32) -> rawcore::formats::tiff::Result<()>) -> TestResult<Vec<u8>> {
  let mut output = Cursor::new(Vec::new());
  let mut tiff = TiffWriter::new(&mut output)?;
  let offset = tiff.write_data(payload)?;
  let ifd0 = {
    let mut dir = tiff.new_directory();
    tags(&mut dir, offset)?;
    dir.build()?
  };
  tiff.build(ifd0)?;
  Ok(output.into_inner())
}

/// Rewrite the value count of `tag` in the root directory
pub(crate) fn patch_entry_count(buf: &mut [u8], tag: u16, count: u32) -> TestResult {
  let read_u16 = |buf: &[u8], at: usize| u16::from_ne_bytes([buf[at], buf[at + 1]]);
  let ifd = u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
  let entries = read_u16(buf, ifd) as usize;
  for i in 0..entries {
    let entry = ifd + 2 + 12 * i;
    if read_u16(buf, entry) == tag {
      buf[entry + 4..entry + 8].copy_from_slice(&count.to_ne_bytes());
      return Ok(());
    }
  }
  Err(format!("tag {} not in root directory", tag).into())
}

/// Byte order mark and root offset, nothing else
pub(crate) fn tiff_header_only() -> Vec<u8> {
  #[cfg(target_endian = "little")]
  let header = b"II*\0\x08\0\0\0".to_vec();
  #[cfg(not(target_endian = "little"))]
  let header = b"MM\0*\0\0\0\x08".to_vec();
  header
}

/// Canon CIFF heap with top level records only
pub(crate) struct CiffBuilder {
  data: Vec<u8>,
  records: Vec<(u16, u32, u32)>,
}

impl CiffBuilder {
  pub fn new() -> Self {
    Self {
      data: Vec::new(),
      records: Vec::new(),
    }
  }

  pub fn record(mut self, typ: u16, value: &[u8]) -> Self {
    self.records.push((typ, value.len() as u32, self.data.len() as u32));
    self.data.extend_from_slice(value);
    self
  }

  /// Raw image dimensions, record 0x1031
  pub fn sensor(self, width: u16, height: u16) -> Self {
    let info: Vec<u8> = [0_u16, width, height, 0, 0, 0, 0, 0].iter().flat_map(|v| v.to_le_bytes()).collect();
    self.record(0x1031, &info)
  }

  pub fn finish(self) -> Vec<u8> {
    let mut buf = b"II\x1a\0\0\0HEAPCCDR".to_vec();
    buf.resize(26, 0);
    let table = self.data.len() as u32;
    buf.extend_from_slice(&self.data);
    buf.extend_from_slice(&(self.records.len() as u16).to_le_bytes());
    for (typ, len, off) in self.records {
      buf.extend_from_slice(&typ.to_le_bytes());
      buf.extend_from_slice(&len.to_le_bytes());
      buf.extend_from_slice(&off.to_le_bytes());
    }
    buf.extend_from_slice(&table.to_le_bytes());
    buf
  }
}

/// Textured mosaic, so interpolation has something to do
pub(crate) fn texture(row: u32, col: u32) -> u16 {
  let base = 2000 + ((row * 37 + col * 91) % 400) as u16 * 20;
  match (row & 1, col & 1) {
    (0, 0) => base,
    (1, 1) => base / 2,
    _ => base + 1500,
  }
}
