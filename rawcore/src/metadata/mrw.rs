// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Minolta MRW blocks

use log::debug;

use super::{MetadataBundle, tiff};
use crate::Result;
use crate::formats::mrw::{MrwFile, TAG_PRD, TAG_TTW, TAG_WBG};
use crate::pumps::ByteStream;

/// Parse the MRW block chain at `base`. Also used for MRW blocks stored
/// as DNG private data.
pub fn parse_minolta(buf: &[u8], base: usize, md: &mut MetadataBundle) -> Result<MrwFile> {
  let mrw = MrwFile::parse(buf, base)?;
  let (mut high, mut wide) = (0, 0);
  for block in &mrw.blocks {
    let mut s = ByteStream::new(block.data(buf), mrw.endian);
    match block.tag {
      TAG_PRD => {
        s.seek(8);
        high = s.get_u16()? as u32;
        wide = s.get_u16()? as u32;
      }
      TAG_WBG => {
        s.seek(4);
        let i = if md.model == "DiMAGE A200" { 3 } else { 0 };
        let mut mul = [0.0; 4];
        for c in 0..4 {
          mul[c ^ (c >> 1) ^ i] = s.get_u16()? as f32;
        }
        md.wb.set(mul);
      }
      TAG_TTW => {
        tiff::parse_tiff(buf, block.offset as u32, md)?;
        md.data_offset = Some(mrw.data_offset as u32);
      }
      tag => debug!("MRW: skipping block {:#x}", tag),
    }
  }
  md.raw_height = Some(high);
  md.raw_width = Some(wide);
  Ok(mrw)
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;
  use crate::formats::tiff::TiffWriter;
  use crate::tags::TiffCommonTag;

  #[test]
  fn blocks_with_embedded_tiff() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut tiff = Cursor::new(Vec::new());
    {
      let mut writer = TiffWriter::new(&mut tiff)?;
      let mut dir = writer.new_directory();
      dir.add_tag(TiffCommonTag::Make, "Minolta Co., Ltd.")?;
      dir.add_tag(TiffCommonTag::Model, "DiMAGE A200")?;
      let ifd0 = dir.build()?;
      writer.build(ifd0)?;
    }
    let tiff = tiff.into_inner();

    let mut blocks = Vec::new();
    blocks.extend_from_slice(b"\0TTW");
    blocks.extend_from_slice(&(tiff.len() as u32).to_be_bytes());
    blocks.extend_from_slice(&tiff);
    blocks.extend_from_slice(b"\0PRD");
    blocks.extend_from_slice(&16_u32.to_be_bytes());
    blocks.extend_from_slice(&[0; 8]);
    blocks.extend_from_slice(&1544_u16.to_be_bytes());
    blocks.extend_from_slice(&2056_u16.to_be_bytes());
    blocks.extend_from_slice(&[0; 4]);
    blocks.extend_from_slice(b"\0WBG");
    blocks.extend_from_slice(&12_u32.to_be_bytes());
    blocks.extend_from_slice(&[0; 4]);
    for v in [256_u16, 300, 400, 256] {
      blocks.extend_from_slice(&v.to_be_bytes());
    }
    let mut buf = b"\0MRM".to_vec();
    buf.extend_from_slice(&(blocks.len() as u32).to_be_bytes());
    buf.extend_from_slice(&blocks);
    buf.extend_from_slice(&[0; 16]);

    let mut md = MetadataBundle::new();
    parse_minolta(&buf, 0, &mut md)?;
    assert_eq!(md.model, "DiMAGE A200");
    assert_eq!((md.raw_height, md.raw_width), (Some(1544), Some(2056)));
    assert_eq!(md.data_offset, Some(8 + blocks.len() as u32));
    // A200 order is G B R G
    assert_eq!(md.wb.get(), [400.0, 256.0, 300.0, 256.0]);
    Ok(())
  }
}
