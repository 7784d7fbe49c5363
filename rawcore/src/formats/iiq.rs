// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Phase One IIQ container
//!
//! A block starting with `IIII` or `MMMM` somewhere in the first 32
//! bytes, followed by the "Raw" magic and the offset of a directory of
//! 16 byte entries. All offsets are relative to the block start.

use crate::bits::Endian;
use crate::{RawError, Result, corrupt};

/// Magic following the byte order mark, as read in block order
const RAW_MAGIC: u32 = 0x526177;

/// Directories with more entries are garbage
const MAX_ENTRIES: u32 = 512;

/// Offset of a Phase One block in the file header
pub fn find_iiq(buf: &[u8]) -> Option<usize> {
  let head = &buf[..buf.len().min(32)];
  let pos = head.windows(4).position(|w| w == b"MMMM").or_else(|| head.windows(4).position(|w| w == b"IIII"))?;
  let endian = Endian::from_marker(&buf[pos..])?;
  let magic = endian.get_u32(buf, pos + 4)?;
  (magic >> 8 == RAW_MAGIC).then_some(pos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IiqEntry {
  pub tag: u32,
  pub typ: u32,
  pub len: u32,
  /// Value or offset relative to the block start
  pub data: u32,
  /// Absolute offset of the data field itself
  pub data_pos: usize,
}

#[derive(Debug, Clone)]
pub struct IiqFile {
  /// Block start, all offsets are relative to it
  pub base: usize,
  pub endian: Endian,
  pub entries: Vec<IiqEntry>,
}

impl IiqFile {
  pub fn parse(buf: &[u8], base: usize) -> Result<IiqFile> {
    let endian = buf
      .get(base..)
      .and_then(Endian::from_marker)
      .ok_or_else(|| corrupt!("IIQ: no byte order mark at {}", base))?;
    let u32_at = |pos: usize| endian.get_u32(buf, pos).ok_or_else(|| RawError::UnexpectedEof(format!("IIQ: header field at {} is behind EOF", pos)));
    if u32_at(base + 4)? >> 8 != RAW_MAGIC {
      return Err(corrupt!("IIQ: missing Raw magic at {}", base + 4));
    }
    let dir = base + u32_at(base + 8)? as usize;
    let count = u32_at(dir)?;
    if count > MAX_ENTRIES {
      return Err(corrupt!("IIQ: directory claims {} entries", count));
    }
    let entries = (0..count as usize)
      .map(|i| {
        let pos = dir + 8 + i * 16;
        Ok(IiqEntry {
          tag: u32_at(pos)?,
          typ: u32_at(pos + 4)?,
          len: u32_at(pos + 8)?,
          data: u32_at(pos + 12)?,
          data_pos: pos + 12,
        })
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(IiqFile { base, endian, entries })
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  /// Little endian block at `base` with the given entries, each value
  /// stored inline
  pub(crate) fn block(base: usize, entries: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut buf = vec![0_u8; base];
    buf.extend_from_slice(b"IIII");
    buf.extend_from_slice(&(RAW_MAGIC << 8 | 0x30).to_le_bytes());
    buf.extend_from_slice(&16_u32.to_le_bytes());
    buf.extend_from_slice(&[0; 4]);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    buf.extend_from_slice(&[0; 4]);
    for (tag, typ, data) in entries {
      for v in [*tag, *typ, 4, *data] {
        buf.extend_from_slice(&v.to_le_bytes());
      }
    }
    buf
  }

  #[test]
  fn directory_entries() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = block(0, &[(0x108, 4, 640), (0x109, 4, 480)]);
    assert_eq!(find_iiq(&buf), Some(0));
    let iiq = IiqFile::parse(&buf, 0)?;
    assert_eq!(iiq.endian, Endian::Little);
    assert_eq!(iiq.entries.len(), 2);
    assert_eq!(iiq.entries[1].tag, 0x109);
    assert_eq!(iiq.entries[1].data, 480);
    assert_eq!(iiq.entries[0].data_pos, 24 + 12);
    Ok(())
  }

  #[test]
  fn byte_order_mark_without_magic() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut buf = b"IIII".to_vec();
    buf.resize(64, 0);
    assert_eq!(find_iiq(&buf), None);
    assert!(IiqFile::parse(&buf, 0).is_err());
    Ok(())
  }
}
