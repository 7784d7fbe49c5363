// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Minimal ICC v2 display profile for the output color spaces

use byteorder::{BigEndian, ByteOrder};

use crate::develop::OutputColor;
use crate::imgop::gamma::Gamma;
use crate::imgop::matrix::{XYZD50_SRGB, multiply, pseudo_inverse};

const HEADER_SIZE: usize = 128;

const SIG_RGB: u32 = 0x52474220;
const SIG_XYZ: u32 = 0x58595a20;
const SIG_TEXT: u32 = 0x74657874;
const SIG_DESC: u32 = 0x64657363;
const SIG_CURV: u32 = 0x63757276;

/// Tag signature and data size
const TAGS: [(u32, usize); 10] = [
  (0x63707274, 36), // cprt
  (0x64657363, 40), // desc
  (0x77747074, 20), // wtpt
  (0x626b7074, 20), // bkpt
  (0x72545243, 14), // rTRC
  (0x67545243, 14), // gTRC
  (0x62545243, 14), // bTRC
  (0x7258595a, 20), // rXYZ
  (0x6758595a, 20), // gXYZ
  (0x6258595a, 20), // bXYZ
];

/// Header words: version 2.1, display class, PCS XYZ, D50 illuminant
const HEADER: [u32; 20] = [
  0, 0, 0x2100000, 0x6d6e7472, SIG_RGB, SIG_XYZ, 0, 0, 0, 0x61637370, 0, 0, 0x6e6f6e65, 0, 0, 0, 0, 0xf6d6, 0x10000, 0xd32d,
];

/// D50 white in s15Fixed16
const D50_WHITE: [u32; 3] = [0xf351, 0x10000, 0x116cc];

const COPYRIGHT: &str = "auto-generated by rawcore";

fn put_str(buf: &mut [u8], off: usize, s: &str, room: usize) {
  let bytes = s.as_bytes();
  let n = bytes.len().min(room.saturating_sub(1));
  buf[off..off + n].copy_from_slice(&bytes[..n]);
}

/// Build the profile for `output`, with the tone curve described by a
/// single gamma value. Raw output has no profile, but gets an sRGB one
/// if asked for.
pub fn build_profile(output: OutputColor, gamma: &Gamma) -> Vec<u8> {
  let tag_table = HEADER_SIZE + 4 + 12 * TAGS.len();
  let mut offsets = [0_usize; TAGS.len()];
  let mut size = tag_table;
  for (i, (_, len)) in TAGS.iter().enumerate() {
    offsets[i] = size;
    size += (len + 3) & !3;
  }
  let mut buf = vec![0_u8; size];

  for (i, word) in HEADER.iter().enumerate() {
    BigEndian::write_u32(&mut buf[i * 4..], *word);
  }
  BigEndian::write_u32(&mut buf[0..], size as u32);
  if output == OutputColor::Xyz {
    BigEndian::write_u32(&mut buf[16..], SIG_XYZ);
  }

  BigEndian::write_u32(&mut buf[HEADER_SIZE..], TAGS.len() as u32);
  for (i, (sig, len)) in TAGS.iter().enumerate() {
    let entry = HEADER_SIZE + 4 + 12 * i;
    BigEndian::write_u32(&mut buf[entry..], *sig);
    BigEndian::write_u32(&mut buf[entry + 4..], offsets[i] as u32);
    BigEndian::write_u32(&mut buf[entry + 8..], *len as u32);
    let type_sig = match i {
      0 => SIG_TEXT,
      1 => SIG_DESC,
      _ => SIG_XYZ,
    };
    BigEndian::write_u32(&mut buf[offsets[i]..], type_sig);
  }

  put_str(&mut buf, offsets[0] + 8, COPYRIGHT, TAGS[0].1 - 8);
  let name = output.name();
  BigEndian::write_u32(&mut buf[offsets[1] + 8..], name.len() as u32 + 1);
  put_str(&mut buf, offsets[1] + 12, name, TAGS[1].1 - 12);
  for (i, v) in D50_WHITE.iter().enumerate() {
    BigEndian::write_u32(&mut buf[offsets[2] + 8 + 4 * i..], *v);
  }

  // u8Fixed8 gamma in the upper half of the last word
  let curve = ((256.0 / gamma.g[5] + 0.5) as i16 as u32) << 16;
  for off in &offsets[4..7] {
    BigEndian::write_u32(&mut buf[*off..], SIG_CURV);
    BigEndian::write_u32(&mut buf[off + 8..], 1);
    BigEndian::write_u32(&mut buf[off + 12..], curve);
  }

  let out_rgb = output.matrix().unwrap_or(crate::imgop::matrix::IDENTITY_MATRIX_3);
  let colorants = multiply(&XYZD50_SRGB, &pseudo_inverse(out_rgb));
  for j in 0..3 {
    for i in 0..3 {
      let v = (colorants[i][j] * 65536.0 + 0.5) as i32;
      BigEndian::write_i32(&mut buf[offsets[7 + j] + 8 + 4 * i..], v);
    }
  }
  buf
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn srgb_profile_layout() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let icc = build_profile(OutputColor::Srgb, &Gamma::default());
    assert_eq!(icc.len(), 476);
    assert_eq!(BigEndian::read_u32(&icc[0..]), 476);
    assert_eq!(&icc[36..40], b"acsp");
    assert_eq!(&icc[16..20], b"RGB ");
    assert_eq!(BigEndian::read_u32(&icc[128..]), 10);
    // desc carries the color space name
    let desc = BigEndian::read_u32(&icc[128 + 4 + 12 + 4..]) as usize;
    assert_eq!(&icc[desc..desc + 4], b"desc");
    assert_eq!(&icc[desc + 12..desc + 16], b"sRGB");
    // sRGB colorants are the D50 adapted primaries
    let rxyz = BigEndian::read_u32(&icc[128 + 4 + 12 * 7 + 4..]) as usize;
    let x = BigEndian::read_i32(&icc[rxyz + 8..]) as f64 / 65536.0;
    assert!((x - XYZD50_SRGB[0][0]).abs() < 1e-4);
    Ok(())
  }

  #[test]
  fn xyz_profile_uses_xyz_space() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let icc = build_profile(OutputColor::Xyz, &Gamma::default());
    assert_eq!(&icc[16..20], b"XYZ ");
    let trc = BigEndian::read_u32(&icc[128 + 4 + 12 * 4 + 4..]) as usize;
    assert_eq!(&icc[trc..trc + 4], b"curv");
    assert!(BigEndian::read_u16(&icc[trc + 12..]) > 256);
    Ok(())
  }
}
