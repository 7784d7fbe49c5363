// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Fujifilm RAF container
//!
//! Fixed big endian header with offsets to an embedded JPEG (carrying
//! Exif), a private record directory and the CFA payload, which itself
//! may start with a TIFF structure.

use crate::bits::BEu32;
use crate::{RawError, Result, corrupt};

pub const RAF_MAGIC: &[u8] = b"FUJIFILM";

/// Record directories with more entries are garbage
pub const MAX_RECORDS: u32 = 255;

pub fn is_raf(buf: &[u8]) -> bool {
  buf.starts_with(RAF_MAGIC)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RafRecord {
  pub tag: u16,
  /// Absolute offset of the record data
  pub offset: usize,
  pub len: usize,
}

impl RafRecord {
  pub fn data<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
    buf.get(self.offset..self.offset + self.len).unwrap_or(&[])
  }
}

#[derive(Debug, Clone)]
pub struct RafFile {
  pub jpeg_offset: u32,
  pub jpeg_length: u32,
  pub dir_offset: u32,
  /// Offset of the CFA block
  pub cfa_offset: u32,
  pub records: Vec<RafRecord>,
}

impl RafFile {
  pub fn parse(buf: &[u8]) -> Result<RafFile> {
    if !is_raf(buf) {
      return Err(corrupt!("RAF: missing magic"));
    }
    if buf.len() < 104 {
      return Err(RawError::UnexpectedEof(format!("RAF: header needs 104 bytes, file has {}", buf.len())));
    }
    let jpeg_offset = BEu32(buf, 84);
    let jpeg_length = BEu32(buf, 88);
    let dir_offset = BEu32(buf, 92);
    let cfa_offset = BEu32(buf, 100);
    if cfa_offset as usize >= buf.len() {
      return Err(RawError::UnexpectedEof(format!("RAF: CFA offset {} is behind EOF ({} bytes)", cfa_offset, buf.len())));
    }
    let records = Self::parse_records(buf, dir_offset as usize)?;
    Ok(RafFile {
      jpeg_offset,
      jpeg_length,
      dir_offset,
      cfa_offset,
      records,
    })
  }

  fn parse_records(buf: &[u8], offset: usize) -> Result<Vec<RafRecord>> {
    let entries = buf
      .get(offset..offset + 4)
      .map(|b| BEu32(b, 0))
      .ok_or_else(|| corrupt!("RAF: record directory at {} is behind EOF", offset))?;
    let mut records = Vec::new();
    if entries > MAX_RECORDS {
      log::warn!("RAF: directory claims {} records, ignoring it", entries);
      return Ok(records);
    }
    let mut pos = offset + 4;
    for _ in 0..entries {
      let head = buf.get(pos..pos + 4).ok_or_else(|| corrupt!("RAF: record header at {} is behind EOF", pos))?;
      let tag = u16::from_be_bytes([head[0], head[1]]);
      let len = u16::from_be_bytes([head[2], head[3]]) as usize;
      if pos + 4 + len > buf.len() {
        return Err(corrupt!("RAF: record {:#x} declares {} bytes at {}, file has only {}", tag, len, pos + 4, buf.len()));
      }
      records.push(RafRecord { tag, offset: pos + 4, len });
      pos += 4 + len;
    }
    Ok(records)
  }
}
