// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Format detection and the set of payload decoders.
//!
//! [`FileFormat::sniff`] looks at the first bytes of a file, [`identify`]
//! walks the metadata and resolves a [`RawLayout`]. The layout carries the
//! selected [`RawDecoder`] variant, which turns the payload into a
//! [`RawFrame`].

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bits::{Endian, LookupTable};
use crate::cfa::CFA;
use crate::decompressors::ljpeg::{DngTiles, LosslessParams, SrawParams, decode_dng_tiles, decode_lossless, decode_sraw};
use crate::decompressors::nikon::{NikonParams, decode_nikon};
use crate::decompressors::packed::{
  PackedParams, TiledParams, decode_dng_uncompressed, decode_eight_bit, decode_leaf_hdr, decode_nokia, decode_packed, decode_sinar_4shot, decode_unpacked,
};
use crate::decompressors::{crw, hasselblad, kodak, olympus, panasonic, payload, pentax, phaseone, sony};
use crate::formats::ciff::is_ciff;
use crate::formats::iiq::find_iiq;
use crate::formats::mrw::is_mrw;
use crate::formats::raf::is_raf;
use crate::imgop::{Dim2, Point, Rect};
use crate::metadata::PhaseOneInfo;
use crate::rawimage::{Orientation, RawFrame};
use crate::{RawError, Result, unsupported};

pub mod camera;
pub mod identify;

pub use camera::{CameraProfile, lookup_profile, profiles};
pub use identify::{Identified, identify};

/// Container families, detected by content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
  /// Plain TIFF structure: DNG, NEF, CR2, ARW, PEF, SRW and others
  Tiff,
  /// Olympus TIFF variant with its own magic
  Orf,
  /// Panasonic TIFF variant with its own magic
  Rw2,
  /// Canon heap file (CRW)
  Ciff,
  /// Fujifilm RAF
  Raf,
  /// Phase One IIQ, possibly behind a TIFF header
  PhaseOne,
  /// Minolta MRW
  Mrw,
  /// Nokia raw dumps
  Nokia,
  /// JPEG with an Exif block
  Jpeg,
  /// Sensor dump without header, known by its file size
  Headerless,
}

/// Signatures of formats that are known, but not decoded
const UNSUPPORTED_SIGNATURES: [(usize, &[u8], &str); 10] = [
  (0, b"FOVb", "Sigma Foveon X3F"),
  (4, b"RED1", "RED R3D"),
  (0, b"ARRI", "ARRI raw"),
  (0, b"RIFF", "RIFF/AVI container"),
  (0, b"DSC-Image", "Rollei d530flex"),
  (0, b"PWAD", "Sinar IA"),
  (0, b"qktk", "Apple QuickTake 100"),
  (0, b"qktn", "Apple QuickTake 150"),
  (25, b"ARECOYK", "Contax N Digital"),
  (0, b"PXN", "Logitech Fotoman"),
];

impl FileFormat {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Tiff => "TIFF",
      Self::Orf => "ORF",
      Self::Rw2 => "RW2",
      Self::Ciff => "CRW",
      Self::Raf => "RAF",
      Self::PhaseOne => "IIQ",
      Self::Mrw => "MRW",
      Self::Nokia => "NOKIA",
      Self::Jpeg => "JPEG",
      Self::Headerless => "headerless",
    }
  }

  /// Detect the container by the first bytes and, for headerless
  /// files, the file size.
  pub fn sniff(buf: &[u8]) -> Result<FileFormat> {
    let head = &buf[..buf.len().min(32)];
    if find_iiq(buf).is_some() {
      return Ok(Self::PhaseOne);
    }
    if let Some(endian) = Endian::from_marker(head) {
      if is_ciff(buf) {
        return Ok(Self::Ciff);
      }
      if let Some(magic) = endian.get_u16(head, 2) {
        match magic {
          42 => return Ok(Self::Tiff),
          // "RO", "RS" and "OR" as read in the file byte order
          0x4f52 | 0x5352 => return Ok(Self::Orf),
          0x0055 => return Ok(Self::Rw2),
          _ => debug!("Sniff: byte order mark with unknown magic {:#06x}", magic),
        }
      }
    }
    if head.starts_with(&[0xff, 0xd8, 0xff, 0xe1]) && head.get(6..10) == Some(b"Exif") {
      return Ok(Self::Jpeg);
    }
    if is_raf(buf) {
      return Ok(Self::Raf);
    }
    if head.starts_with(b"NOKIARAW") || head.starts_with(b"\0\x01\0\x01\0@") {
      return Ok(Self::Nokia);
    }
    if is_mrw(buf) {
      return Ok(Self::Mrw);
    }
    for (offset, sig, name) in UNSUPPORTED_SIGNATURES {
      if head.get(offset..offset + sig.len()) == Some(sig) {
        return Err(unsupported!("{} is not supported", name));
      }
    }
    if identify::headerless_model(buf.len()).is_some() {
      return Ok(Self::Headerless);
    }
    Err(RawError::UnrecognizedFormat(format!(
      "no known signature in header {:02x?} ({} bytes)",
      &head[..head.len().min(16)],
      buf.len()
    )))
  }
}

impl fmt::Display for FileFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Payload decoders. One variant per payload layout, selected once
/// during identification.
#[derive(Debug, Clone)]
pub enum RawDecoder {
  /// 16 bit words, shifted right by `shift`
  Unpacked { shift: u32 },
  Packed(PackedParams),
  /// One byte per sample through the tone curve
  EightBit,
  Nokia,
  LosslessJpeg(LosslessParams),
  DngLossless(DngTiles),
  DngUncompressed { bps: u32 },
  CanonCrw { table: usize },
  NikonCompressed { meta_offset: usize },
  Pentax { meta_offset: usize },
  Panasonic { load_flags: u32 },
  Olympus,
  SonyArw,
  SonyArw2,
  Kodak65000,
  /// Canon small raw, YCbCr converted to RGB pixels
  CanonSraw(SrawParams),
  PhaseOne(PhaseOneInfo),
  PhaseOneCompressed(PhaseOneInfo),
  Hasselblad { load_flags: u32 },
  /// Leaf tiles, one plane after another
  LeafHdr(TiledParams),
  /// Four shifted exposures merged into RGB pixels
  Sinar4Shot(TiledParams),
}

impl RawDecoder {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Unpacked { .. } => "unpacked",
      Self::Packed(_) => "packed",
      Self::EightBit => "eight bit",
      Self::Nokia => "nokia",
      Self::LosslessJpeg(_) => "lossless jpeg",
      Self::DngLossless(_) => "dng lossless",
      Self::DngUncompressed { .. } => "dng uncompressed",
      Self::CanonCrw { .. } => "canon crw",
      Self::NikonCompressed { .. } => "nikon compressed",
      Self::Pentax { .. } => "pentax",
      Self::Panasonic { .. } => "panasonic",
      Self::Olympus => "olympus",
      Self::SonyArw => "sony arw",
      Self::SonyArw2 => "sony arw2",
      Self::Kodak65000 => "kodak 65000",
      Self::CanonSraw(_) => "canon sraw",
      Self::PhaseOne(_) => "phase one",
      Self::PhaseOneCompressed(_) => "phase one compressed",
      Self::Hasselblad { .. } => "hasselblad",
      Self::LeafHdr(_) => "leaf hdr",
      Self::Sinar4Shot(_) => "sinar 4-shot",
    }
  }

  /// Decode the payload of `file` into a frame shaped by `layout`
  pub fn decode(&self, file: &[u8], layout: &RawLayout) -> Result<RawFrame> {
    let mut frame = layout.new_frame();
    let off = layout.data_offset;
    let curve = layout.curve_table();
    debug!("Decoding {}x{} sensor area with {} decoder at {}", layout.raw_dim.w, layout.raw_dim.h, self.name(), off);
    match self {
      Self::Unpacked { shift } => decode_unpacked(payload(file, off)?, layout.endian, *shift, &mut frame)?,
      Self::Packed(params) => {
        if let Some(black) = decode_packed(file, off, params, &mut frame)? {
          frame.black = black;
        }
      }
      Self::EightBit => {
        let black = decode_eight_bit(payload(file, off)?, &curve, &mut frame)?;
        if black > 0 {
          frame.black = black;
        }
      }
      Self::Nokia => {
        let black = decode_nokia(payload(file, off)?, layout.endian, &mut frame)?;
        frame.black += black;
      }
      Self::LosslessJpeg(params) => decode_lossless(payload(file, off)?, params, &mut frame)?,
      Self::DngLossless(tiles) => decode_dng_tiles(file, tiles, &mut frame)?,
      Self::DngUncompressed { bps } => decode_dng_uncompressed(payload(file, off)?, layout.endian, *bps, &curve, &mut frame)?,
      Self::CanonCrw { table } => crw::decode_crw(file, *table, &mut frame)?,
      Self::NikonCompressed { meta_offset } => {
        let params = NikonParams {
          meta_offset: *meta_offset,
          data_offset: off,
          bps: layout.bps,
          endian: layout.endian,
        };
        decode_nikon(file, &params, &mut frame)?
      }
      Self::Pentax { meta_offset } => pentax::decode_pentax(file, *meta_offset, off, layout.endian, layout.bps, &mut frame)?,
      Self::Panasonic { load_flags } => panasonic::decode_panasonic(file, off, *load_flags, &mut frame)?,
      Self::Olympus => olympus::decode_olympus(file, off, &mut frame)?,
      Self::SonyArw => sony::decode_arw1(file, off, &mut frame)?,
      Self::SonyArw2 => sony::decode_arw2(file, off, &curve, &mut frame)?,
      Self::Kodak65000 => kodak::decode_kodak_65000(file, off, layout.endian, &curve, &mut frame)?,
      Self::CanonSraw(params) => decode_sraw(payload(file, off)?, params, &mut frame)?,
      Self::PhaseOne(ph1) => phaseone::decode_phase_one(file, off, layout.endian, ph1, &mut frame)?,
      Self::PhaseOneCompressed(ph1) => phaseone::decode_phase_one_compressed(file, off, layout.endian, ph1, &mut frame)?,
      Self::Hasselblad { load_flags } => hasselblad::decode_hasselblad(payload(file, off)?, *load_flags, &mut frame)?,
      Self::LeafHdr(params) => decode_leaf_hdr(file, layout.endian, params, &mut frame)?,
      Self::Sinar4Shot(params) => decode_sinar_4shot(file, layout.endian, params, &mut frame)?,
    }
    Ok(match &layout.super_ccd {
      Some(sccd) => sccd.place(&frame),
      None => frame,
    })
  }
}

/// Everything needed to decode and interpret the sensor payload
#[derive(Debug, Clone)]
pub struct RawLayout {
  /// Full sensor area as stored
  pub raw_dim: Dim2,
  /// Visible area inside the sensor area
  pub crop: Rect,
  /// Pattern relative to the visible area origin
  pub cfa: CFA,
  pub colors: usize,
  pub bps: u32,
  pub data_offset: usize,
  pub decoder: RawDecoder,
  pub endian: Endian,
  pub orientation: Orientation,
  pub maximum: u32,
  pub black: u32,
  pub cblack: [u32; 4],
  pub pixel_aspect: f64,
  /// Tone curve applied by some decoders, identity if empty
  pub curve: Option<Vec<u16>>,
  /// XYZ to camera matrix, from the file or the profile table
  pub cam_xyz: Option<[[f64; 3]; 4]>,
  /// Zero samples are dead pixels
  pub zero_is_bad: bool,
  /// Components per decoded pixel, 1 for mosaic payloads
  pub cpp: usize,
  pub super_ccd: Option<SuperCcd>,
}

/// Fujifilm SuperCCD sensors store their photosites 45 degrees
/// rotated. The payload is decoded in its stored shape, then every
/// stored row is placed along a diagonal of a larger canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperCcd {
  /// Width of the rotated sensor in canvas pixels
  pub fuji_width: usize,
  /// Stored rows hold two canvas diagonals
  pub layout: u32,
  /// Size of the canvas, the frame size after placement
  pub canvas: Dim2,
}

impl SuperCcd {
  /// Canvas position of a photosite of the stored visible area
  pub fn canvas_pos(&self, row: usize, col: usize) -> Option<(usize, usize)> {
    let fw = self.fuji_width as isize;
    let (row, col) = (row as isize, col as isize);
    let (r, c) = if self.layout != 0 {
      (fw - 1 - col + (row >> 1), col + ((row + 1) >> 1))
    } else {
      (fw - 1 + row - (col >> 1), row + ((col + 1) >> 1))
    };
    (r >= 0 && c >= 0 && (r as usize) < self.canvas.h && (c as usize) < self.canvas.w).then_some((r as usize, c as usize))
  }

  /// Move the visible area of a stored frame onto the canvas
  pub fn place(&self, stored: &RawFrame) -> RawFrame {
    let mut out = RawFrame::new(self.canvas, stored.bps, stored.cfa);
    out.colors = stored.colors;
    out.black = stored.black;
    out.cblack = stored.cblack;
    out.maximum = stored.maximum;
    out.orientation = stored.orientation;
    out.pixel_aspect = stored.pixel_aspect;
    out.fuji_width = self.fuji_width;
    let (top, left) = (stored.crop.p.y, stored.crop.p.x);
    for row in 0..stored.crop.d.h {
      for col in 0..stored.crop.d.w {
        if let Some((r, c)) = self.canvas_pos(row, col) {
          out.data[r * self.canvas.w + c] = stored.at(top + row, left + col);
        }
      }
    }
    out
  }
}

impl RawLayout {
  /// Zero filled frame with geometry, pattern and levels of this layout
  pub fn new_frame(&self) -> RawFrame {
    let mut frame = RawFrame::new_with_cpp(self.raw_dim, self.bps, self.cfa, self.cpp);
    frame.crop = self.crop;
    frame.colors = self.colors;
    frame.black = self.black;
    frame.cblack = self.cblack;
    frame.maximum = self.maximum;
    frame.orientation = self.orientation;
    frame.pixel_aspect = self.pixel_aspect;
    frame
  }

  pub fn curve_table(&self) -> LookupTable {
    match &self.curve {
      Some(curve) if !curve.is_empty() => LookupTable::new(curve),
      _ => LookupTable::identity(),
    }
  }

  /// Width and height of the visible area
  pub fn visible_dim(&self) -> Dim2 {
    match &self.super_ccd {
      Some(sccd) => sccd.canvas,
      None => self.crop.d,
    }
  }

  /// Size of the decoded frame
  pub fn frame_dim(&self) -> Dim2 {
    match &self.super_ccd {
      Some(sccd) => sccd.canvas,
      None => self.raw_dim,
    }
  }

  /// Crop rectangle clipped to the sensor area
  pub(crate) fn clipped_crop(raw: Dim2, top: usize, left: usize, width: usize, height: usize) -> Rect {
    let left = left.min(raw.w);
    let top = top.min(raw.h);
    Rect::new(Point::new(left, top), Dim2::new(width.min(raw.w - left), height.min(raw.h - top)))
  }
}
