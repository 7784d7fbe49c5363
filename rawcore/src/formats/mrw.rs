// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Minolta MRW container: a chain of tagged blocks followed by the
//! raw payload.

use crate::bits::Endian;
use crate::{RawError, Result, corrupt};

pub const TAG_PRD: u32 = 0x00505244;
pub const TAG_WBG: u32 = 0x00574247;
pub const TAG_TTW: u32 = 0x00545457;

pub fn is_mrw(buf: &[u8]) -> bool {
  buf.len() >= 8 && &buf[0..4] == b"\0MRM"
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrwBlock {
  pub tag: u32,
  /// Absolute offset of the block data
  pub offset: usize,
  pub len: usize,
}

impl MrwBlock {
  pub fn data<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
    buf.get(self.offset..self.offset + self.len).unwrap_or(&[])
  }
}

#[derive(Debug, Clone)]
pub struct MrwFile {
  pub endian: Endian,
  /// Start of the raw payload after the block chain
  pub data_offset: usize,
  pub blocks: Vec<MrwBlock>,
}

impl MrwFile {
  /// Parse the block chain of a MRW header located at `base`
  pub fn parse(buf: &[u8], base: usize) -> Result<MrwFile> {
    let head = buf
      .get(base..base + 8)
      .ok_or_else(|| RawError::UnexpectedEof(format!("MRW: header at {} is behind EOF", base)))?;
    if &head[0..3] != b"\0MR" {
      return Err(corrupt!("MRW: missing MRM signature"));
    }
    // Byte order is encoded in the fourth byte: 'M' or 'I'
    let endian = if head[3] == b'I' { Endian::Little } else { Endian::Big };
    let data_offset = base + endian.read_u32(head, 4) as usize + 8;
    if data_offset > buf.len() {
      return Err(RawError::UnexpectedEof(format!("MRW: payload offset {} is behind EOF ({} bytes)", data_offset, buf.len())));
    }
    let mut blocks = Vec::new();
    let mut pos = base + 8;
    while pos + 8 <= data_offset {
      let tag = u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
      let len = endian.read_u32(buf, pos + 4) as usize;
      if pos + 8 + len > buf.len() {
        return Err(corrupt!("MRW: block {:#x} declares {} bytes at {}, file has only {}", tag, len, pos + 8, buf.len()));
      }
      blocks.push(MrwBlock { tag, offset: pos + 8, len });
      pos += 8 + len;
    }
    Ok(MrwFile { endian, data_offset, blocks })
  }

  pub fn block(&self, tag: u32) -> Option<&MrwBlock> {
    self.blocks.iter().find(|b| b.tag == tag)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_block_chain() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"\0MRM");
    buf.extend_from_slice(&24_u32.to_be_bytes());
    buf.extend_from_slice(b"\0PRD");
    buf.extend_from_slice(&16_u32.to_be_bytes());
    buf.extend_from_slice(&[0; 8]);
    buf.extend_from_slice(&1544_u16.to_be_bytes());
    buf.extend_from_slice(&2056_u16.to_be_bytes());
    buf.extend_from_slice(&[0; 4]);
    buf.extend_from_slice(&[0; 16]);
    let mrw = MrwFile::parse(&buf, 0)?;
    assert_eq!(mrw.endian, Endian::Big);
    assert_eq!(mrw.data_offset, 32);
    let prd = mrw.block(TAG_PRD).ok_or("no PRD")?;
    assert_eq!(Endian::Big.read_u16(prd.data(&buf), 8), 1544);
    Ok(())
  }
}
