// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{Entry, Result, TiffError, Value};
use crate::{bits::Endian, tags::TiffTag};

/// IFDs with more entries are not TIFF directories but garbage.
pub const MAX_IFD_ENTRIES: u16 = 512;

/// Default limit for nested sub-IFDs.
pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IFD {
  /// Absolute offset of this directory
  pub offset: u32,
  /// Base that entry offsets are relative to
  pub base: u32,
  pub next_ifd: u32,
  pub entries: BTreeMap<u16, Entry>,
  pub endian: Endian,
  pub sub: HashMap<u16, Vec<IFD>>,
}

/// Walks IFD trees and guarantees termination on malformed input:
/// every directory offset is visited at most once and nesting is
/// limited to `max_depth`.
#[derive(Debug)]
pub struct IfdWalker<'a> {
  buf: &'a [u8],
  visited: HashSet<u64>,
  max_depth: usize,
  sub_tags: Vec<u16>,
}

impl<'a> IfdWalker<'a> {
  pub fn new(buf: &'a [u8], max_depth: usize, sub_tags: &[u16]) -> Self {
    Self {
      buf,
      visited: HashSet::new(),
      max_depth,
      sub_tags: sub_tags.to_vec(),
    }
  }

  pub fn buf(&self) -> &'a [u8] {
    self.buf
  }

  /// Mark an offset as visited, returns false if it was seen before.
  pub fn visit(&mut self, abs_offset: u64) -> bool {
    self.visited.insert(abs_offset)
  }

  /// Parse a chain of IFDs starting at `offset` (relative to `base`).
  /// Errors in the first directory are fatal, later chain members
  /// are dropped with a warning.
  pub fn parse_chain(&mut self, offset: u32, base: u32, endian: Endian, max_chain: usize) -> Result<Vec<IFD>> {
    let mut chain = Vec::new();
    let mut next = offset;
    while next != 0 {
      if chain.len() >= max_chain {
        debug!("IFD chain limit of {} reached", max_chain);
        break;
      }
      match self.parse_ifd(next, base, endian, 0) {
        Ok(Some(ifd)) => {
          next = ifd.next_ifd;
          chain.push(ifd);
        }
        Ok(None) => break,
        Err(err) if chain.is_empty() => return Err(err),
        Err(err) => {
          warn!("Ignoring broken IFD in chain at offset {}: {}", next, err);
          break;
        }
      }
    }
    Ok(chain)
  }

  /// Parse a single directory. Returns `None` if the offset was already
  /// visited or the depth limit is exceeded.
  pub fn parse_ifd(&mut self, offset: u32, base: u32, endian: Endian, depth: usize) -> Result<Option<IFD>> {
    if depth > self.max_depth {
      warn!("Sub-IFD nesting deeper than {} at offset {}, skipping", self.max_depth, offset);
      return Ok(None);
    }
    let abs = base as u64 + offset as u64;
    if !self.visit(abs) {
      warn!("IFD at offset {} was already visited, skipping", abs);
      return Ok(None);
    }
    let pos = abs as usize;
    let entry_count = endian
      .get_u16(self.buf, pos)
      .ok_or_else(|| TiffError::Corrupt(format!("IFD offset {} is behind EOF", abs)))?;
    if entry_count > MAX_IFD_ENTRIES {
      return Err(TiffError::Corrupt(format!("IFD at {} claims {} entries", abs, entry_count)));
    }

    let mut entries = BTreeMap::new();
    let mut sub_offsets: Vec<(u16, Vec<u32>)> = Vec::new();
    for i in 0..entry_count as usize {
      let entry = Entry::parse(self.buf, pos + 2 + i * 12, base, endian)?;
      if self.sub_tags.contains(&entry.tag) {
        match &entry.value {
          Value::Long(offsets) => sub_offsets.push((entry.tag, offsets.clone())),
          Value::Short(offsets) => sub_offsets.push((entry.tag, offsets.iter().map(|v| *v as u32).collect())),
          Value::Undefined(_) | Value::Unknown(_, _) => {
            // Inline directory, the data offset is the IFD
            if let Some(off) = entry.offset() {
              sub_offsets.push((entry.tag, vec![(off as u64).saturating_sub(base as u64) as u32]));
            }
          }
          val => {
            log::info!("Found IFD offset tag, but type mismatch: {}. Ignoring SubIFD parsing for tag {:#x}", val.value_type_name(), entry.tag);
          }
        }
      }
      // Duplicates: last one wins
      entries.insert(entry.tag, entry);
    }

    // Some TIFF writers skip the next ifd pointer
    let next_ifd = endian.get_u32(self.buf, pos + 2 + entry_count as usize * 12).unwrap_or(0);

    let mut sub = HashMap::new();
    for (tag, offsets) in sub_offsets {
      let mut ifds = Vec::new();
      for off in offsets {
        match self.parse_ifd(off, base, endian, depth + 1) {
          Ok(Some(ifd)) => ifds.push(ifd),
          Ok(None) => {}
          Err(err) => {
            warn!("Error while processing TIFF sub-IFD for tag {:#x}, ignoring it: {}", tag, err);
          }
        }
      }
      sub.insert(tag, ifds);
    }

    Ok(Some(IFD {
      offset: abs as u32,
      base,
      next_ifd,
      entries,
      endian,
      sub,
    }))
  }
}

impl IFD {
  pub fn sub_ifds(&self) -> &HashMap<u16, Vec<IFD>> {
    &self.sub
  }

  pub fn entry_count(&self) -> u16 {
    self.entries.len() as u16
  }

  pub fn next_ifd(&self) -> u32 {
    self.next_ifd
  }

  pub fn entries(&self) -> &BTreeMap<u16, Entry> {
    &self.entries
  }

  pub fn has_entry<T: TiffTag>(&self, tag: T) -> bool {
    self.get_entry(tag).is_some()
  }

  pub fn get_entry<T: TiffTag>(&self, tag: T) -> Option<&Entry> {
    self.entries.get(&tag.into())
  }

  pub fn get_entry_subs<T: TiffTag>(&self, tag: T) -> Option<&Entry> {
    // Sorted for deterministic lookups
    let mut keys: Vec<&u16> = self.sub.keys().collect();
    keys.sort();
    for key in keys {
      for ifd in &self.sub[key] {
        if let Some(entry) = ifd.get_entry_recursive(tag) {
          return Some(entry);
        }
      }
    }
    None
  }

  pub fn get_entry_recursive<T: TiffTag>(&self, tag: T) -> Option<&Entry> {
    self.entries.get(&tag.into()).or_else(|| self.get_entry_subs(tag))
  }

  /// This IFD and all nested sub-IFDs, depth first.
  pub fn flatten(&self) -> Vec<&IFD> {
    let mut list = vec![self];
    let mut keys: Vec<&u16> = self.sub.keys().collect();
    keys.sort();
    for key in keys {
      for ifd in &self.sub[key] {
        list.extend(ifd.flatten());
      }
    }
    list
  }

  pub fn dump(&self, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    out.push(format!("IFD entries: {}", self.entries.len()));
    for (tag, entry) in &self.entries {
      out.push(format!(
        "{:#06x} {:>9} [{}] {}",
        tag,
        entry.type_name(),
        entry.count(),
        entry.value.visual_rep(limit)
      ));
    }
    for (tag, subs) in &self.sub {
      for ifd in subs {
        out.push(format!("SubIFD({:#x})", tag));
        out.extend(ifd.dump(limit).into_iter().map(|line| format!("   {}", line)));
      }
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ifd_with_self_reference() -> Vec<u8> {
    // Header + IFD at 8 with one SubIFDs entry pointing back at 8
    let mut buf = vec![0x49, 0x49, 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00];
    buf.extend_from_slice(&1_u16.to_le_bytes());
    buf.extend_from_slice(&330_u16.to_le_bytes());
    buf.extend_from_slice(&4_u16.to_le_bytes());
    buf.extend_from_slice(&1_u32.to_le_bytes());
    buf.extend_from_slice(&8_u32.to_le_bytes());
    // next IFD points to itself as well
    buf.extend_from_slice(&8_u32.to_le_bytes());
    buf
  }

  #[test]
  fn self_referencing_ifd_terminates() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = ifd_with_self_reference();
    let mut walker = IfdWalker::new(&buf, DEFAULT_MAX_DEPTH, &[330]);
    let chain = walker.parse_chain(8, 0, Endian::Little, 16)?;
    assert_eq!(chain.len(), 1);
    assert!(chain[0].sub_ifds().get(&330).map(|v| v.is_empty()).unwrap_or(false));
    Ok(())
  }

  #[test]
  fn depth_limit_stops_nesting() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // A ladder of IFDs, each pointing to the next through SubIFDs
    let levels = 12;
    let mut buf = vec![0x49, 0x49, 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00];
    for i in 0..levels {
      let next = 8 + (i + 1) * 18;
      buf.extend_from_slice(&1_u16.to_le_bytes());
      buf.extend_from_slice(&330_u16.to_le_bytes());
      buf.extend_from_slice(&4_u16.to_le_bytes());
      buf.extend_from_slice(&1_u32.to_le_bytes());
      buf.extend_from_slice(&(next as u32).to_le_bytes());
      buf.extend_from_slice(&0_u32.to_le_bytes());
    }
    let mut walker = IfdWalker::new(&buf, 3, &[330]);
    let chain = walker.parse_chain(8, 0, Endian::Little, 16)?;
    let depth = chain[0].flatten().len();
    assert_eq!(depth, 4);
    Ok(())
  }
}
