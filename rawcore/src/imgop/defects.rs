// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Sensor defect correction from user supplied files: a list of dead
//! photosites and a dark frame taken with the lens cap on.

use std::path::Path;

use log::debug;

use crate::rawimage::RawFrame;
use crate::{RawError, Result};

/// One entry of a dead pixel list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadPixel {
  pub col: usize,
  pub row: usize,
  /// Unix time the pixel died, entries newer than the shot are skipped
  pub since: i64,
}

/// Parse lines of `col row time`. Text after `#` is a comment, lines
/// without three numbers are ignored.
pub fn parse_bad_pixels(content: &str) -> Vec<BadPixel> {
  content
    .lines()
    .filter_map(|line| {
      let line = line.split('#').next().unwrap_or_default();
      let mut fields = line.split_whitespace().map(|f| f.parse::<i64>());
      match (fields.next(), fields.next(), fields.next()) {
        (Some(Ok(col)), Some(Ok(row)), Some(Ok(since))) if col >= 0 && row >= 0 => Some(BadPixel {
          col: col as usize,
          row: row as usize,
          since,
        }),
        _ => None,
      }
    })
    .collect()
}

pub fn load_bad_pixels(path: &Path) -> Result<Vec<BadPixel>> {
  let content = std::fs::read_to_string(path).map_err(|err| RawError::with_io_error(path, err))?;
  Ok(parse_bad_pixels(&content))
}

/// Replace listed photosites by the average of the nearest photosites
/// of the same color, searching one pixel around first, then two.
/// Positions are in visible area coordinates. Returns the number of
/// fixed photosites.
pub fn fix_bad_pixels(frame: &mut RawFrame, pixels: &[BadPixel], timestamp: i64) -> usize {
  if frame.is_full_color() {
    return 0;
  }
  let (top, left) = (frame.crop.p.y, frame.crop.p.x);
  let (height, width) = (frame.crop.d.h, frame.crop.d.w);
  let mut fixed = 0;
  for bad in pixels {
    if bad.col >= width || bad.row >= height || bad.since > timestamp {
      continue;
    }
    let color = frame.color_at(bad.row, bad.col);
    let (mut tot, mut n) = (0_u32, 0_u32);
    for rad in 1..3 {
      if n > 0 {
        break;
      }
      for r in bad.row.saturating_sub(rad)..(bad.row + rad + 1).min(height) {
        for c in bad.col.saturating_sub(rad)..(bad.col + rad + 1).min(width) {
          if (r, c) != (bad.row, bad.col) && frame.color_at(r, c) == color {
            tot += frame.at(top + r, left + c) as u32;
            n += 1;
          }
        }
      }
    }
    if n > 0 {
      frame.data[(top + bad.row) * frame.dim.w + left + bad.col] = (tot / n) as u16;
      debug!("Fixed dead pixel at {}x{}", bad.col, bad.row);
      fixed += 1;
    }
  }
  fixed
}

/// Samples of a 16 bit binary PGM, which must match the visible area
/// and use the full 16 bit range
pub fn parse_dark_frame(buf: &[u8], width: usize, height: usize) -> std::result::Result<Vec<u16>, String> {
  if !buf.starts_with(b"P5") {
    return Err("not a valid PGM file".into());
  }
  let mut dim = [0_usize; 3];
  let (mut nd, mut number, mut comment) = (0, false, false);
  let mut pos = 2;
  while nd < 3 && pos < buf.len() {
    let c = buf[pos];
    pos += 1;
    match c {
      b'#' => comment = true,
      b'\n' => comment = false,
      _ => {}
    }
    if comment {
      continue;
    }
    if c.is_ascii_digit() {
      number = true;
      dim[nd] = dim[nd].saturating_mul(10).saturating_add((c - b'0') as usize);
    } else if number {
      nd += 1;
      number = false;
    }
  }
  if nd < 3 {
    return Err("not a valid PGM file".into());
  }
  if dim != [width, height, 65535] {
    return Err(format!("{}x{} PGM with maximum {} doesn't match the {}x{} image", dim[0], dim[1], dim[2], width, height));
  }
  let samples = buf.get(pos..pos + width * height * 2).ok_or("PGM file is truncated")?;
  Ok(samples.chunks_exact(2).map(|v| u16::from_be_bytes([v[0], v[1]])).collect())
}

pub fn load_dark_frame(path: &Path, width: usize, height: usize) -> Result<Vec<u16>> {
  let buf = std::fs::read(path).map_err(|err| RawError::with_io_error(path, err))?;
  parse_dark_frame(&buf, width, height)
    .map_err(|msg| RawError::with_io_error(path, std::io::Error::new(std::io::ErrorKind::InvalidData, msg)))
}

/// Subtract the dark frame from the visible area. The dark frame
/// carries the black level, so black is cleared and the saturation
/// lowered by it.
pub fn subtract_dark_frame(frame: &mut RawFrame, dark: &[u16]) {
  let (top, left) = (frame.crop.p.y, frame.crop.p.x);
  let width = frame.crop.d.w;
  let stride = frame.dim.w;
  for (row, dark_row) in dark.chunks_exact(width.max(1)).take(frame.crop.d.h).enumerate() {
    let start = (top + row) * stride + left;
    for (v, d) in frame.data[start..start + width].iter_mut().zip(dark_row) {
      *v = v.saturating_sub(*d);
    }
  }
  frame.maximum = frame.maximum.saturating_sub(frame.black);
  frame.black = 0;
  frame.cblack = [0; 4];
}
