// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Fujifilm RAF header records and embedded TIFF blocks

use log::{debug, trace};

use super::{LoaderHint, MetadataBundle, tiff};
use crate::Result;
use crate::bits::Endian;
use crate::formats::raf::RafFile;
use crate::formats::tiff::reader::is_tiff;
use crate::pumps::ByteStream;

/// Parse the record directory, then the TIFF blocks in the CFA
/// section and behind the JPEG preview header.
pub fn parse_raf(buf: &[u8], md: &mut MetadataBundle) -> Result<RafFile> {
  let raf = RafFile::parse(buf)?;
  for rec in &raf.records {
    let mut s = ByteStream::new(rec.data(buf), Endian::Big);
    match rec.tag {
      0x100 => {
        md.raw_height = Some(s.get_u16()? as u32);
        md.raw_width = Some(s.get_u16()? as u32);
      }
      0x121 => {
        md.height = Some(s.get_u16()? as u32);
        let width = s.get_u16()? as u32;
        md.width = Some(if width == 4284 { width + 3 } else { width });
      }
      0x130 => {
        md.fuji.layout = (s.get_u8()? >> 7) as u32;
        md.loader = Some(if s.get_u8()? & 8 != 0 { LoaderHint::Unpacked } else { LoaderHint::FujiPacked });
      }
      0x2ff0 => {
        let mut mul = [0.0; 4];
        for c in 0..4 {
          mul[c ^ 1] = s.get_u16()? as f32;
        }
        md.wb.set(mul);
      }
      0xc000 => {
        s.set_endian(Endian::Little);
        md.width = Some(s.get_u32()?);
        md.height = Some(s.get_u32()?);
      }
      tag => trace!("RAF: skipping record {:#x}", tag),
    }
  }
  let layout = md.fuji.layout;
  md.height = md.height.map(|h| h << layout);
  md.width = md.width.map(|w| w >> layout);

  md.data_offset = Some(raf.cfa_offset);
  for offset in [raf.cfa_offset, raf.jpeg_offset.saturating_add(12)] {
    if is_tiff(buf, offset as usize) {
      tiff::parse_tiff(buf, offset, md)?;
    } else {
      debug!("RAF: no TIFF block at {}", offset);
    }
  }
  Ok(raf)
}
