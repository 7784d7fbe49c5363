// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Phase One IIQ directory values

use log::trace;

use super::{LoaderHint, MetadataBundle, PhaseOneInfo};
use crate::formats::iiq::IiqFile;
use crate::imgop::matrix::cmatrix_from_romm;
use crate::{RawError, Result};

/// Flip bits by the rotation code of tag 0x100
const FLIPS: [u8; 4] = [0, 6, 5, 3];

/// Parse the Phase One block at `base`
pub fn parse_phase_one(buf: &[u8], base: usize, md: &mut MetadataBundle) -> Result<IiqFile> {
  let iiq = IiqFile::parse(buf, base)?;
  let endian = iiq.endian;
  let float_at = |pos: usize| {
    endian
      .get_u32(buf, pos)
      .map(f32::from_bits)
      .ok_or_else(|| RawError::UnexpectedEof(format!("IIQ: value at {} is behind EOF", pos)))
  };
  let mut ph1 = PhaseOneInfo::default();
  let mut split_col = 0;
  let mut model = String::new();
  for entry in &iiq.entries {
    let data = entry.data;
    let at = base + data as usize;
    match entry.tag {
      0x100 => md.flip = Some(FLIPS[data as usize & 3]),
      0x106 => {
        let mut romm_cam = [[0.0; 3]; 3];
        for i in 0..9 {
          romm_cam[i / 3][i % 3] = float_at(at + i * 4)? as f64;
        }
        md.cmatrix = Some(cmatrix_from_romm(&romm_cam));
      }
      0x107 => {
        let mut mul = [0.0; 4];
        for (c, m) in mul.iter_mut().take(3).enumerate() {
          *m = float_at(at + c * 4)?;
        }
        md.wb.set(mul);
      }
      0x108 => md.raw_width = Some(data),
      0x109 => md.raw_height = Some(data),
      0x10a => md.left_margin = Some(data),
      0x10b => md.top_margin = Some(data),
      0x10c => md.width = Some(data),
      0x10d => md.height = Some(data),
      0x10e => ph1.format = data,
      0x10f => md.data_offset = Some(data + base as u32),
      0x110 => md.meta_offset = Some(data + base as u32),
      0x112 => ph1.key_off = entry.data_pos as u32,
      0x21c => ph1.strip_offset = data + base as u32,
      0x21d => ph1.t_black = data,
      0x222 => split_col = data,
      0x223 => ph1.black_off = data + base as u32,
      0x301 => {
        model = MetadataBundle::cstr(buf.get(at..(at + 63).min(buf.len())).unwrap_or_default());
        if let Some(pos) = model.find(" camera") {
          model.truncate(pos);
        }
      }
      tag => trace!("IIQ: skipping tag {:#x}", tag),
    }
  }
  ph1.split_col = split_col.saturating_sub(md.left_margin.unwrap_or(0));
  md.loader = Some(if ph1.format < 3 { LoaderHint::PhaseOne } else { LoaderHint::PhaseOneCompressed });
  md.maximum = Some(0xffff);
  md.make = "Phase One".into();
  md.model = if !model.is_empty() {
    model
  } else {
    match md.raw_height {
      Some(2060) => "LightPhase",
      Some(2682) => "H 10",
      Some(4128) => "H 20",
      Some(5488) => "H 25",
      _ => "",
    }
    .into()
  };
  md.phase_one = Some(ph1);
  Ok(iiq)
}
