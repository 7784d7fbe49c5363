// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Canon CIFF heap container (CRW files)
//!
//! A heap is a block of value data followed by a record table. The last
//! four bytes of a heap point to the table, relative to the heap start.
//! Records with a sub-heap type contain nested heaps.

use std::collections::HashSet;

use log::{debug, warn};

use crate::bits::Endian;
use crate::{RawError, Result, corrupt};

/// Heaps with more records are garbage
pub const MAX_RECORDS: u16 = 100;

/// Nesting limit for sub-heaps
pub const MAX_DEPTH: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum CiffTag {
  ColorInfo1 = 0x0032,
  MakeModel = 0x080a,
  Artist = 0x0810,
  ShotInfo = 0x102a,
  ColorInfo2 = 0x102c,
  WhiteSample = 0x1030,
  SensorInfo = 0x1031,
  WhiteBalance = 0x10a9,
  CaptureTime = 0x180e,
  ImageInfo = 0x1810,
  ExposureInfo = 0x1818,
  DecoderTable = 0x1835,
  RawData = 0x2005,
  JpegImage = 0x2007,
  FocalLength = 0x5029,
  ShotNumber = 0x5817,
  SerialNumber = 0x5834,
}

impl From<CiffTag> for u16 {
  fn from(tag: CiffTag) -> Self {
    tag as u16
  }
}

/// Sub-heaps are marked by storage type 0x2800 or 0x3000
pub fn is_subheap(typ: u16) -> bool {
  (((typ >> 8) + 8) | 8) == 0x38
}

/// Check for `HEAPCCDR` after the byte order mark and header length
pub fn is_ciff(buf: &[u8]) -> bool {
  buf.len() >= 14 && &buf[6..14] == b"HEAPCCDR" && Endian::from_marker(buf).is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiffRecord {
  /// Full 16 bit record type including storage bits
  pub typ: u16,
  /// Value length, or the inline value for in-record types
  pub len: u32,
  /// Absolute file offset of the value data
  pub offset: usize,
  /// Nesting level of the heap containing this record
  pub depth: usize,
}

impl CiffRecord {
  /// Value data, empty if out of file bounds
  pub fn data<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
    buf.get(self.offset..self.offset.saturating_add(self.len as usize)).unwrap_or(&[])
  }

  /// Data starting at the record offset until end of file
  pub fn tail<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
    buf.get(self.offset..).unwrap_or(&[])
  }

  /// Value stored inside the record itself
  pub fn is_inline(&self) -> bool {
    self.typ & 0x4000 != 0
  }
}

/// All records of a CIFF file, flattened in traversal order:
/// records of a sub-heap come before the record that contains it.
#[derive(Debug, Clone)]
pub struct CiffFile {
  pub endian: Endian,
  pub header_len: u32,
  pub records: Vec<CiffRecord>,
}

impl CiffFile {
  pub fn parse(buf: &[u8]) -> Result<CiffFile> {
    if !is_ciff(buf) {
      return Err(corrupt!("CIFF: missing HEAPCCDR signature"));
    }
    let endian = Endian::from_marker(buf).ok_or_else(|| corrupt!("CIFF: invalid byte order mark"))?;
    let header_len = endian.read_u32(buf, 2);
    if header_len as usize >= buf.len() {
      return Err(RawError::UnexpectedEof(format!("CIFF: header length {} exceeds file size {}", header_len, buf.len())));
    }
    let mut walker = HeapWalker {
      buf,
      endian,
      visited: HashSet::new(),
      records: Vec::new(),
    };
    walker.parse_heap(header_len as usize, buf.len() - header_len as usize, 0)?;
    debug!("CIFF: {} records", walker.records.len());
    Ok(CiffFile {
      endian,
      header_len,
      records: walker.records,
    })
  }

  /// Last record with the given type, storage bits ignored
  pub fn find(&self, tag: CiffTag) -> Option<&CiffRecord> {
    self.records.iter().rev().find(|rec| rec.typ & 0x3fff == tag as u16 & 0x3fff)
  }
}

struct HeapWalker<'a> {
  buf: &'a [u8],
  endian: Endian,
  visited: HashSet<usize>,
  records: Vec<CiffRecord>,
}

impl<'a> HeapWalker<'a> {
  fn parse_heap(&mut self, offset: usize, length: usize, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
      warn!("CIFF: heap nesting deeper than {} at offset {}, skipping", MAX_DEPTH, offset);
      return Ok(());
    }
    if !self.visited.insert(offset) {
      warn!("CIFF: heap at offset {} was already visited, skipping", offset);
      return Ok(());
    }
    let end = offset
      .checked_add(length)
      .filter(|end| *end <= self.buf.len() && length >= 4)
      .ok_or_else(|| corrupt!("CIFF: heap at {} with length {} is out of bounds", offset, length))?;
    let table = offset + self.endian.read_u32(self.buf, end - 4) as usize;
    let nrecs = self
      .endian
      .get_u16(self.buf, table)
      .ok_or_else(|| corrupt!("CIFF: record table at {} is behind EOF", table))?;
    if nrecs > MAX_RECORDS {
      warn!("CIFF: heap at {} claims {} records, ignoring it", offset, nrecs);
      return Ok(());
    }
    for i in 0..nrecs as usize {
      let pos = table + 2 + i * 10;
      let raw = self
        .buf
        .get(pos..pos + 10)
        .ok_or_else(|| corrupt!("CIFF: record {} at {} is behind EOF", i, pos))?;
      let typ = self.endian.read_u16(raw, 0);
      let len = self.endian.read_u32(raw, 2);
      let rec = CiffRecord {
        typ,
        len,
        offset: offset + self.endian.read_u32(raw, 6) as usize,
        depth,
      };
      if typ & 0x4000 == 0 && rec.offset as u64 + len as u64 > self.buf.len() as u64 {
        return Err(corrupt!(
          "CIFF: record {:#06x} declares {} bytes at {}, file has only {} bytes",
          typ,
          len,
          rec.offset,
          self.buf.len()
        ));
      }
      if is_subheap(typ) {
        if let Err(err) = self.parse_heap(rec.offset, len as usize, depth + 1) {
          warn!("CIFF: ignoring broken sub-heap {:#06x}: {}", typ, err);
        }
      }
      self.records.push(rec);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Heap with a make/model record and a nested heap holding a sensor info record
  fn sample_ciff() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"II");
    buf.extend_from_slice(&26_u32.to_le_bytes());
    buf.extend_from_slice(b"HEAPCCDR");
    buf.resize(26, 0);
    // Root heap starts at 26
    let root = buf.len();
    buf.extend_from_slice(b"Canon\0PowerShot G2\0\0");
    // Sub-heap at root+20: 6 bytes data + table(2 + 10) + 4
    let sub = buf.len();
    buf.extend_from_slice(&[0, 0, 0xf0, 0x0a, 0x28, 0x07]);
    buf.extend_from_slice(&1_u16.to_le_bytes());
    buf.extend_from_slice(&0x1031_u16.to_le_bytes());
    buf.extend_from_slice(&6_u32.to_le_bytes());
    buf.extend_from_slice(&0_u32.to_le_bytes());
    buf.extend_from_slice(&6_u32.to_le_bytes());
    let sub_len = buf.len() - sub;
    // Root table
    let table = buf.len() - root;
    buf.extend_from_slice(&2_u16.to_le_bytes());
    buf.extend_from_slice(&0x080a_u16.to_le_bytes());
    buf.extend_from_slice(&20_u32.to_le_bytes());
    buf.extend_from_slice(&0_u32.to_le_bytes());
    buf.extend_from_slice(&0x300a_u16.to_le_bytes());
    buf.extend_from_slice(&(sub_len as u32).to_le_bytes());
    buf.extend_from_slice(&((sub - root) as u32).to_le_bytes());
    buf.extend_from_slice(&(table as u32).to_le_bytes());
    buf
  }

  #[test]
  fn parse_nested_heaps() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = sample_ciff();
    let ciff = CiffFile::parse(&buf)?;
    let types: Vec<u16> = ciff.records.iter().map(|r| r.typ).collect();
    assert_eq!(types, vec![0x080a, 0x1031, 0x300a]);
    let make = ciff.find(CiffTag::MakeModel).ok_or("no make")?;
    assert!(make.data(&buf).starts_with(b"Canon\0PowerShot G2"));
    let sensor = ciff.find(CiffTag::SensorInfo).ok_or("no sensor info")?;
    assert_eq!(sensor.depth, 1);
    assert_eq!(Endian::Little.read_u16(sensor.data(&buf), 2), 2800);
    Ok(())
  }

  #[test]
  fn record_past_eof_is_corrupt() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut buf = sample_ciff();
    // Patch the make/model length to something huge
    let table = buf.len() - 4;
    let table_off = 26 + Endian::Little.read_u32(&buf, table) as usize;
    buf[table_off + 4..table_off + 8].copy_from_slice(&0x00ff_ffff_u32.to_le_bytes());
    let err = CiffFile::parse(&buf).map(|_| ()).err().ok_or("no error")?;
    assert_eq!(err.kind(), crate::ErrorKind::CorruptMetadata);
    Ok(())
  }
}
