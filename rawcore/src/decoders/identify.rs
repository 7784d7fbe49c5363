// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Turns container metadata into a [`RawLayout`].
//!
//! The container parsers fill a [`MetadataBundle`]. The rules here pick
//! the raw image among all TIFF directories, normalize make and model
//! names and apply the per vendor corrections for sensor geometry,
//! CFA pattern and payload layout.

use log::{debug, warn};

use super::camera::{CameraProfile, lookup_profile};
use super::{FileFormat, RawDecoder, RawLayout, SuperCcd};
use crate::bits::{Endian, LookupTable};
use crate::cfa::CFA;
use crate::decompressors::ljpeg::{DngTiles, LjpegHeader, LosslessParams, SrawParams};
use crate::decompressors::packed::{PackedParams, TiledParams};
use crate::formats::iiq::find_iiq;
use crate::formats::tiff::reader::is_tiff;
use crate::imgop::gamma::gamma_curve;
use crate::imgop::{Dim2, Point, Rect};
use crate::metadata::{LoaderHint, MetadataBundle, ciff, mrw, phaseone, raf, tiff};
use crate::rawimage::Orientation;
use crate::{Result, corrupt, unsupported};

/// Result of the identification: parsed metadata plus the decoding plan
#[derive(Debug, Clone)]
pub struct Identified {
  pub format: FileFormat,
  pub md: MetadataBundle,
  pub layout: RawLayout,
}

/// Vendor names that replace any make string containing them
const CORP: [&str; 17] = [
  "Canon",
  "NIKON",
  "EPSON",
  "KODAK",
  "Kodak",
  "OLYMPUS",
  "PENTAX",
  "MINOLTA",
  "Minolta",
  "Konica",
  "CASIO",
  "Sinar",
  "Phase One",
  "SAMSUNG",
  "Mamiya",
  "MOTOROLA",
  "LEICA",
];

/// Panasonic sensor areas: raw width, raw height, left, top, width and
/// height corrections
const PANA_AREAS: [(u32, u32, u32, u32, i32, i32); 23] = [
  (3130, 1743, 4, 0, -6, 0),
  (3130, 2055, 4, 0, -6, 0),
  (3130, 2319, 4, 0, -6, 0),
  (3170, 2103, 18, 0, -42, 20),
  (3170, 2367, 18, 13, -42, -21),
  (3177, 2367, 0, 0, -1, 0),
  (3304, 2458, 0, 0, -1, 0),
  (3330, 2463, 9, 0, -5, 0),
  (3330, 2479, 9, 0, -17, 4),
  (3370, 1899, 15, 0, -44, 20),
  (3370, 2235, 15, 0, -44, 20),
  (3370, 2511, 15, 10, -44, -21),
  (3690, 2751, 3, 0, -8, -3),
  (3710, 2751, 0, 0, -3, 0),
  (3724, 2450, 0, 0, 0, -2),
  (3770, 2487, 17, 0, -44, 19),
  (3770, 2799, 17, 15, -44, -19),
  (3880, 2170, 6, 0, -6, 0),
  (4060, 3018, 0, 0, 0, -2),
  (4290, 2391, 3, 0, -8, -1),
  (4330, 2439, 17, 15, -44, -19),
  (4508, 2962, 0, 0, -3, -4),
  (4508, 3330, 0, 0, -3, -6),
];

/// Payload decoder as selected by the rules, before its parameters
/// are known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loader {
  Unpacked,
  Packed,
  EightBit,
  Nokia,
  LosslessJpeg,
  DngUncompressed,
  DngLossless,
  CanonCrw,
  Nikon,
  Pentax,
  Panasonic,
  Olympus,
  SonyArw,
  SonyArw2,
  Kodak65000,
  CanonSraw,
  PhaseOne,
  PhaseOneCompressed,
  Hasselblad,
  LeafHdr,
  Sinar4Shot,
  Unsupported(&'static str),
}

impl Loader {
  /// Decoders that write the visible area only, skipping the margins
  fn writes_visible_area(&self) -> bool {
    matches!(self, Loader::CanonSraw | Loader::LeafHdr | Loader::Sinar4Shot)
  }
}

/// Stored shape of a SuperCCD payload and the rotated sensor width
#[derive(Debug, Clone, Copy)]
struct RotatedSensor {
  fuji_width: u32,
  layout: u32,
  /// Top, left, width and height of the stored visible area
  stored: (u32, u32, u32, u32),
}

/// Where a headerless payload starts
#[derive(Debug, Clone, Copy)]
enum Offset {
  At(u32),
  /// Last bytes of the file
  Tail,
}

/// Sensor dump known by its file size
#[derive(Debug, Clone, Copy)]
struct Headerless {
  fsize: usize,
  make: &'static str,
  model: &'static str,
  raw: (u32, u32),
  visible: (u32, u32),
  /// Top and left margin
  margins: (u32, u32),
  loader: Loader,
  bps: u32,
  load_flags: u32,
  filters: Option<u32>,
  maximum: u32,
  black: u32,
  endian: Endian,
  flip: u8,
  offset: Offset,
  gamma: bool,
}

impl Headerless {
  const fn camera(fsize: usize, make: &'static str, model: &'static str, raw: (u32, u32), loader: Loader) -> Self {
    Self {
      fsize,
      make,
      model,
      raw,
      visible: raw,
      margins: (0, 0),
      loader,
      bps: 0,
      load_flags: 0,
      filters: None,
      maximum: 0,
      black: 0,
      endian: Endian::Big,
      flip: 0,
      offset: Offset::At(0),
      gamma: false,
    }
  }

  /// PowerShot models writing 10 bit packed dumps
  const fn powershot(fsize: usize, model: &'static str, raw: (u32, u32), visible: (u32, u32), margins: (u32, u32)) -> Self {
    let mut cam = Self::camera(fsize, "Canon", model, raw, Loader::Packed);
    cam.visible = visible;
    cam.margins = margins;
    cam.bps = 10;
    cam.load_flags = 40;
    cam
  }

  const fn visible(mut self, visible: (u32, u32)) -> Self {
    self.visible = visible;
    self
  }

  const fn margins(mut self, top: u32, left: u32) -> Self {
    self.margins = (top, left);
    self
  }

  const fn bps(mut self, bps: u32, load_flags: u32) -> Self {
    self.bps = bps;
    self.load_flags = load_flags;
    self
  }

  const fn filters(mut self, filters: u32) -> Self {
    self.filters = Some(filters);
    self
  }

  const fn maximum(mut self, maximum: u32) -> Self {
    self.maximum = maximum;
    self
  }

  const fn black(mut self, black: u32) -> Self {
    self.black = black;
    self
  }

  const fn little(mut self) -> Self {
    self.endian = Endian::Little;
    self
  }

  const fn flip(mut self, flip: u8) -> Self {
    self.flip = flip;
    self
  }

  const fn offset(mut self, offset: Offset) -> Self {
    self.offset = offset;
    self
  }

  const fn gamma(mut self) -> Self {
    self.gamma = true;
    self
  }
}

#[rustfmt::skip]
const HEADERLESS: [Headerless; 35] = [
  Headerless::powershot(5298000, "PowerShot SD300", (2400, 1766), (2344, 1752), (12, 12)),
  Headerless::powershot(6553440, "PowerShot A460", (2664, 1968), (2616, 1960), (4, 4)),
  Headerless::powershot(6653280, "PowerShot A530", (2672, 1992), (2620, 1984), (6, 10)),
  Headerless::powershot(6573120, "PowerShot A610", (2672, 1968), (2616, 1960), (8, 12)),
  Headerless::powershot(9219600, "PowerShot A620", (3152, 2340), (3112, 2328), (12, 36)),
  Headerless::powershot(9243240, "PowerShot A470", (3152, 2346), (3096, 2328), (6, 12)),
  Headerless::powershot(10341600, "PowerShot A720 IS", (3336, 2480), (3298, 2472), (5, 6)),
  Headerless::powershot(10383120, "PowerShot A630", (3344, 2484), (3288, 2472), (6, 12)),
  Headerless::powershot(12945240, "PowerShot A640", (3736, 2772), (3672, 2760), (6, 12)),
  Headerless::powershot(15636240, "PowerShot A650", (4104, 3048), (4032, 3024), (12, 48)),
  Headerless::powershot(7710960, "PowerShot S3 IS", (2888, 2136), (2840, 2128), (8, 44)),
  Headerless::camera(15467760, "Canon", "PowerShot SX110 IS", (3720, 2772), Loader::Packed).visible((3684, 2760)).margins(12, 6).bps(12, 40),
  Headerless::camera(15534576, "Canon", "PowerShot SX120 IS", (3728, 2778), Loader::Packed).visible((3664, 2742)).margins(18, 16).bps(12, 40).filters(0x49494949),
  Headerless::camera(19131120, "Canon", "PowerShot SX220 HS", (4168, 3060), Loader::Packed).visible((4072, 3043)).bps(12, 8),
  Headerless::camera(21936096, "Canon", "PowerShot SX30 IS", (4464, 3276), Loader::Packed).visible((4366, 3254)).margins(10, 25).bps(12, 40).filters(0x16161616),
  Headerless::camera(307200, "Generic", "640x480", (640, 480), Loader::EightBit).gamma(),
  Headerless::camera(311696, "ST Micro", "STV680 VGA", (644, 484), Loader::EightBit).flip(2).filters(0x16161616).black(16),
  Headerless::camera(786432, "AVT", "F-080C", (1024, 768), Loader::EightBit),
  Headerless::camera(1447680, "AVT", "F-145C", (1392, 1040), Loader::EightBit),
  Headerless::camera(1920000, "AVT", "F-201C", (1600, 1200), Loader::EightBit),
  Headerless::camera(5067304, "AVT", "F-510C", (2588, 1958), Loader::EightBit).maximum(0xfff0).offset(Offset::Tail),
  Headerless::camera(5067316, "AVT", "F-510C", (2588, 1958), Loader::EightBit).maximum(0xfff0).offset(Offset::Tail),
  Headerless::camera(10134608, "AVT", "F-510C", (2588, 1958), Loader::Unpacked).maximum(0xfff0).offset(Offset::Tail),
  Headerless::camera(10134620, "AVT", "F-510C", (2588, 1958), Loader::Unpacked).maximum(0xfff0).offset(Offset::Tail),
  Headerless::camera(16157136, "AVT", "F-810C", (3272, 2469), Loader::Unpacked).maximum(0xfff0),
  Headerless::camera(1409024, "Sony", "XCD-SX910CR", (1376, 1024), Loader::EightBit).visible((1375, 1024)).filters(0x49494949).maximum(0x3ff),
  Headerless::camera(2818048, "Sony", "XCD-SX910CR", (1376, 1024), Loader::Unpacked).visible((1375, 1024)).filters(0x49494949).maximum(0x3ff),
  Headerless::camera(3884928, "Micron", "2010", (1608, 1207), Loader::Unpacked).little().filters(0x16161616).offset(Offset::At(3212)).maximum(0x3ff),
  Headerless::camera(6624000, "Pixelink", "A782", (2208, 3000), Loader::EightBit).filters(0x61616161).maximum(0xffc0),
  Headerless::camera(13248000, "Pixelink", "A782", (2208, 3000), Loader::Unpacked).filters(0x61616161).maximum(0xffc0),
  Headerless::camera(3840000, "Foculus", "531C", (1600, 1200), Loader::Unpacked).filters(0x49494949),
  Headerless::camera(9994240, "ptGrey", "GRAS-50S5C", (2440, 2048), Loader::Unpacked).filters(0x49494949).little().maximum(0xfffc),
  Headerless::camera(10075968, "JaiPulnix", "BB-500CL", (2448, 2058), Loader::Unpacked).filters(0x94949494).little().maximum(0x3fff),
  Headerless::camera(10108896, "JaiPulnix", "BB-500GE", (2456, 2058), Loader::Unpacked).filters(0x94949494).little().maximum(0x3fff),
  Headerless::camera(10036800, "SVS", "SVS625CL", (2448, 2050), Loader::Unpacked).filters(0x94949494).little().maximum(0x0fff),
];

/// Make and model of a headerless file of `fsize` bytes
pub fn headerless_model(fsize: usize) -> Option<(&'static str, &'static str)> {
  if fsize == 0 {
    return None;
  }
  HEADERLESS.iter().find(|h| h.fsize == fsize).map(|h| (h.make, h.model))
}

/// Mutable identification state, the fields of a [`RawLayout`] while
/// the rules are applied
#[derive(Debug, Clone)]
struct Geometry {
  raw_width: u32,
  raw_height: u32,
  width: u32,
  height: u32,
  top: u32,
  left: u32,
  bps: u32,
  /// None until a pattern is known
  filters: Option<u32>,
  colors: usize,
  maximum: u32,
  black: Option<u32>,
  load_flags: u32,
  loader: Option<Loader>,
  data_offset: u32,
  endian: Endian,
  tiff_compress: u32,
  tiff_flip: u8,
  flip: Option<u8>,
  zero_is_bad: bool,
  pixel_aspect: f64,
  is_raw: bool,
  curve: Option<Vec<u16>>,
  /// Model name of a profile to use when the own name has none
  profile_alias: Option<String>,
  cblack: [u32; 4],
  cam_xyz: Option<[[f64; 3]; 4]>,
  /// Components per decoded pixel
  cpp: usize,
  /// Samples per pixel of the raw TIFF image
  samples: u32,
  tile_width: u32,
  tile_length: u32,
  tile_offsets: Vec<u32>,
  /// RAF payload in rotated SuperCCD order
  fuji_rotated: bool,
  rotated: Option<RotatedSensor>,
}

impl Geometry {
  fn from_metadata(md: &MetadataBundle, endian: Endian) -> Self {
    let loader = md.loader.map(|hint| match hint {
      LoaderHint::Panasonic => Loader::Panasonic,
      LoaderHint::Olympus => Loader::Olympus,
      LoaderHint::SonyArw => Loader::SonyArw,
      LoaderHint::Packed => Loader::Packed,
      LoaderHint::Unpacked => Loader::Unpacked,
      LoaderHint::FujiPacked => Loader::Unpacked,
      LoaderHint::PhaseOne => Loader::PhaseOne,
      LoaderHint::PhaseOneCompressed => Loader::PhaseOneCompressed,
    });
    Self {
      raw_width: md.raw_width.unwrap_or(0),
      raw_height: md.raw_height.unwrap_or(0),
      width: md.width.unwrap_or(0),
      height: md.height.unwrap_or(0),
      top: md.top_margin.unwrap_or(0),
      left: md.left_margin.unwrap_or(0),
      bps: 0,
      filters: md.filters,
      colors: md.colors.unwrap_or(3),
      maximum: md.maximum.unwrap_or(0),
      black: md.black,
      load_flags: md.load_flags.unwrap_or(0),
      loader,
      data_offset: md.data_offset.unwrap_or(0),
      endian,
      tiff_compress: 0,
      tiff_flip: 0,
      flip: md.flip,
      zero_is_bad: false,
      pixel_aspect: md.pixel_aspect.unwrap_or(1.0),
      is_raw: md.is_raw,
      curve: md.curve.clone(),
      profile_alias: None,
      cblack: md.cblack,
      cam_xyz: None,
      cpp: 1,
      samples: 1,
      tile_width: 0,
      tile_length: 0,
      tile_offsets: Vec::new(),
      fuji_rotated: md.loader == Some(LoaderHint::FujiPacked),
      rotated: None,
    }
  }

  /// Replace the visible area
  fn area(&mut self, height: u32, width: u32, top: u32, left: u32) {
    self.height = height;
    self.width = width;
    self.top = top;
    self.left = left;
  }

  /// Margins that shrink the visible area, `trim` extra rows at the bottom
  fn margins(&mut self, top: u32, left: u32, trim: u32) {
    self.top = top;
    self.left = left;
    self.height = self.height.saturating_sub(trim + top);
    self.width = self.width.saturating_sub(left);
  }

  fn unsupported(&mut self, what: &'static str) {
    self.loader = Some(Loader::Unsupported(what));
  }
}

/// Parse all metadata of `buf` and resolve the raw layout
pub fn identify(buf: &[u8], format: FileFormat) -> Result<Identified> {
  let mut md = MetadataBundle::new();
  let (endian, headerless) = parse_container(buf, format, &mut md)?;
  normalize_names(&mut md);
  if !md.is_raw {
    return Err(unsupported!("{} {} file holds no raw data", md.make, md.model));
  }

  let mut g = Geometry::from_metadata(&md, endian);
  match format {
    FileFormat::Tiff | FileFormat::Orf | FileFormat::Rw2 | FileFormat::Raf => apply_tiff(&md, &mut g),
    FileFormat::Nokia => g.loader = Some(Loader::Nokia),
    FileFormat::Jpeg => {
      return Err(unsupported!("{} {} JPEG file without raw payload", md.make, md.model));
    }
    _ => {}
  }
  if let Some(cam) = headerless {
    apply_headerless(&cam, buf.len(), &mut g);
  }
  if !g.is_raw {
    return Err(unsupported!("no raw image in {} {} {} file", md.make, md.model, format));
  }
  if g.height == 0 {
    g.height = g.raw_height;
  }
  if g.width == 0 {
    g.width = g.raw_width;
  }
  if md.fuji.fuji_width != 0 {
    // DNG of a SuperCCD sensor, stored row by row of the rotated sensor
    let fuji_width = g.raw_width.div_ceil(2);
    g.rotated = Some(RotatedSensor {
      fuji_width,
      layout: 0,
      stored: (g.top, g.left, g.raw_width.saturating_sub(g.left), g.raw_height.saturating_sub(g.top)),
    });
    g.width = g.height + fuji_width;
    g.height = g.width - 1;
    g.pixel_aspect = 1.0;
  }
  common_sizes(&md, &mut g);

  if md.dng_version != 0 {
    dng_rules(&md, &mut g);
  } else {
    if headerless.is_none() {
      vendor_rules(&mut md, &mut g, buf, format);
    }
    if md.model.is_empty() {
      md.model = format!("{}x{}", g.width, g.height);
    }
    if g.filters.is_none() {
      g.filters = Some(0x94949494);
    }
    let profile = lookup_profile(&md.make, &md.model).or_else(|| g.profile_alias.as_deref().and_then(|alias| lookup_profile(&md.make, alias)));
    apply_profile(profile, &mut g);
  }

  let layout = finish(&md, g, format)?;
  debug!(
    "Identified {} {} ({}): {}x{} sensor, crop {:?}, {} bps, {} decoder",
    md.make,
    md.model,
    format,
    layout.raw_dim.w,
    layout.raw_dim.h,
    layout.crop,
    layout.bps,
    layout.decoder.name()
  );
  Ok(Identified { format, md, layout })
}

/// Run the container parser. Returns the payload byte order and the
/// headerless entry for headerless files.
fn parse_container(buf: &[u8], format: FileFormat, md: &mut MetadataBundle) -> Result<(Endian, Option<Headerless>)> {
  let endian = match format {
    FileFormat::Tiff | FileFormat::Orf | FileFormat::Rw2 => tiff::parse_tiff(buf, 0, md)?.endian,
    FileFormat::Ciff => {
      let ciff = ciff::parse_ciff(buf, md)?;
      md.data_offset = Some(ciff.header_len);
      ciff.endian
    }
    FileFormat::Raf => {
      let file = raf::parse_raf(buf, md)?;
      // Payload follows the byte order of the Exif block
      [file.jpeg_offset.saturating_add(12), file.cfa_offset]
        .into_iter()
        .map(|offset| offset as usize)
        .find(|offset| is_tiff(buf, *offset))
        .and_then(|offset| buf.get(offset..offset + 2))
        .and_then(Endian::from_marker)
        .unwrap_or(Endian::Big)
    }
    FileFormat::Mrw => mrw::parse_minolta(buf, 0, md)?.endian,
    FileFormat::PhaseOne => {
      let base = find_iiq(buf).ok_or_else(|| corrupt!("IIQ: no Phase One block in the header"))?;
      // A TIFF wrapper only adds Exif values, the block has the geometry
      if base != 0 && is_tiff(buf, 0) {
        tiff::parse_tiff(buf, 0, md)?;
      }
      phaseone::parse_phase_one(buf, base, md)?.endian
    }
    FileFormat::Nokia => parse_nokia(buf, md)?,
    FileFormat::Jpeg => {
      let data_offset = 4 + Endian::Big.get_u16(buf, 4).unwrap_or(0) as usize;
      if buf.get(data_offset).is_some_and(|b| *b != 0xff) {
        tiff::parse_tiff(buf, 12, md)?;
      }
      Endian::Big
    }
    FileFormat::Headerless => {
      let cam = HEADERLESS
        .iter()
        .find(|h| h.fsize == buf.len() && h.fsize != 0)
        .copied()
        .ok_or_else(|| unsupported!("no headerless camera with {} bytes", buf.len()))?;
      md.make = cam.make.to_string();
      md.model = cam.model.to_string();
      return Ok((cam.endian, Some(cam)));
    }
  };
  Ok((endian, None))
}

/// Nokia raw dumps, two header variants
fn parse_nokia(buf: &[u8], md: &mut MetadataBundle) -> Result<Endian> {
  let short = || crate::RawError::UnexpectedEof(format!("Nokia header needs more than {} bytes", buf.len()));
  if buf.starts_with(b"NOKIARAW") {
    let e = Endian::Little;
    md.make = "NOKIA".into();
    md.model = "X2".into();
    let data_offset = e.get_u32(buf, 300).ok_or_else(short)?;
    let size = e.get_u32(buf, 304).ok_or_else(short)?;
    let width = e.get_u16(buf, 308).ok_or_else(short)? as u32;
    let height = e.get_u16(buf, 310).ok_or_else(short)? as u32;
    let payload = width * 5 / 4 * height;
    md.data_offset = Some(data_offset.wrapping_add(size).wrapping_sub(payload));
    md.width = Some(width);
    md.height = Some(height);
    md.filters = Some(0x61616161);
    Ok(e)
  } else {
    let e = Endian::Big;
    let field = |range: std::ops::Range<usize>| buf.get(range).map(MetadataBundle::cstr).ok_or_else(short);
    md.make = field(6..14)?;
    md.model = field(14..22)?;
    md.model2 = field(22..38)?;
    md.data_offset = Some(e.get_u16(buf, 38).ok_or_else(short)? as u32);
    md.raw_width = Some(e.get_u16(buf, 42).ok_or_else(short)? as u32);
    md.raw_height = Some(e.get_u16(buf, 44).ok_or_else(short)? as u32);
    md.filters = Some(0x61616161);
    Ok(e)
  }
}

/// Simplify vendor names and strip them from the model name
fn normalize_names(md: &mut MetadataBundle) {
  if let Some(corp) = CORP.iter().find(|corp| md.make.contains(*corp)) {
    md.make = corp.to_string();
  }
  if md.make.starts_with("KODAK") {
    for suffix in [" DIGITAL CAMERA", " Digital Camera", "FILE VERSION"] {
      if let Some(pos) = md.model.find(suffix) {
        md.model.truncate(pos);
        break;
      }
    }
  }
  md.make = md.make.trim_end().to_string();
  md.model = md.model.trim_end().to_string();
  let n = md.make.len();
  if n > 0 && md.model.len() > n && md.model.is_char_boundary(n) && md.model[..n].eq_ignore_ascii_case(&md.make) && md.model.as_bytes()[n] == b' ' {
    md.model = md.model[n + 1..].to_string();
  }
  for prefix in ["FinePix ", "Digital Camera "] {
    if let Some(rest) = md.model.strip_prefix(prefix) {
      md.model = rest.to_string();
    }
  }
}

/// Select the raw image among the TIFF directories and its decoder
fn apply_tiff(md: &MetadataBundle, g: &mut Geometry) {
  let mut area = g.raw_width as u64 * g.raw_height as u64;
  let mut raw = None;
  let mut max_bps = 0;
  for img in &md.tiff_images {
    max_bps = max_bps.max(img.bps);
    let pixels = img.width as u64 * img.height as u64;
    if (img.compression != 6 || img.samples != 3) && (img.width | img.height) < 0x10000 && pixels > area {
      area = pixels;
      raw = Some(img);
    }
  }
  if let Some(flip) = md.tiff_images.iter().map(|img| img.flip).find(|flip| *flip != 0) {
    g.tiff_flip = flip;
  }
  let Some(img) = raw else {
    debug!("TIFF: no raw image candidate among {} directories", md.tiff_images.len());
    return;
  };
  g.raw_width = img.width;
  g.raw_height = img.height;
  g.bps = img.bps;
  g.tiff_compress = img.compression;
  g.samples = img.samples.max(1);
  g.tile_width = img.tile_width;
  g.tile_length = img.tile_length;
  g.tile_offsets = img.tile_offsets.clone();
  if g.loader != Some(Loader::SonyArw) {
    g.data_offset = img.offset;
  }
  debug!("TIFF: raw image {}x{}, {} bps, compression {}", img.width, img.height, img.bps, img.compression);

  if g.loader.is_none() && img.tile_offsets.len() == 4 && img.compression <= 1 {
    // One tile per shot
    g.loader = Some(Loader::Sinar4Shot);
    g.cpp = 3;
  }
  if g.loader.is_none() {
    let (w, h, bytes) = (img.width as u64, img.height as u64, img.bytes as u64);
    let mut by_depth = false;
    match img.compression {
      32767 => {
        if bytes == w * h {
          g.bps = 12;
          g.loader = Some(Loader::SonyArw2);
        } else if bytes * 8 != w * h * g.bps as u64 {
          g.raw_height += 8;
          g.loader = Some(Loader::SonyArw);
        } else {
          g.load_flags = 80;
          by_depth = true;
        }
      }
      32769 => {
        g.load_flags += 1;
        by_depth = true;
      }
      32770 | 32773 => by_depth = true,
      0 | 1 => {
        if bytes * 5 == w * h * 8 {
          g.load_flags = 81;
          g.bps = 12;
        }
        by_depth = true;
      }
      6 | 7 | 99 => g.loader = Some(Loader::LosslessJpeg),
      262 => g.unsupported("Kodak 262 compression"),
      34713 => g.loader = Some(Loader::Nikon),
      65535 => g.loader = Some(Loader::Pentax),
      65000 => match img.photometric {
        32803 => g.loader = Some(Loader::Kodak65000),
        2 | 6 => g.unsupported("Kodak RGB and YCbCr compression"),
        _ => {}
      },
      32867 => {}
      other => {
        debug!("TIFF: compression {} is not raw data", other);
        g.is_raw = false;
      }
    }
    if by_depth {
      match g.bps {
        8 => g.loader = Some(Loader::EightBit),
        12 => {
          if img.photometric == 2 {
            g.load_flags = 6;
          }
          g.loader = Some(Loader::Packed);
        }
        14 => {
          g.load_flags = 0;
          g.loader = Some(Loader::Unpacked);
        }
        16 => g.loader = Some(Loader::Unpacked),
        _ => {}
      }
    }
  }

  if md.dng_version == 0 {
    let kodak = md.make.contains("KODAK") || md.make.contains("Kodak");
    if (img.samples == 3 && img.bytes != 0 && g.bps != 14 && g.bps != 2048 && img.compression != 32770)
      || (g.bps == 8 && !kodak && !md.model2.contains("DEBUG RAW"))
    {
      debug!("TIFF: largest image is a preview");
      g.is_raw = false;
    }
  } else if max_bps > 16 {
    debug!("DNG: floating point or wide samples are not supported");
    g.is_raw = false;
  }
}

fn apply_headerless(cam: &Headerless, fsize: usize, g: &mut Geometry) {
  g.raw_width = cam.raw.0;
  g.raw_height = cam.raw.1;
  g.width = cam.visible.0;
  g.height = cam.visible.1;
  g.top = cam.margins.0;
  g.left = cam.margins.1;
  g.loader = Some(cam.loader);
  g.bps = cam.bps;
  g.load_flags = cam.load_flags;
  g.filters = cam.filters;
  g.maximum = cam.maximum;
  if cam.black != 0 {
    g.black = Some(cam.black);
  }
  g.endian = cam.endian;
  if cam.flip != 0 {
    g.flip = Some(cam.flip);
  }
  g.data_offset = match cam.offset {
    Offset::At(offset) => offset,
    Offset::Tail => {
      let per_sample = if cam.loader == Loader::EightBit { 1 } else { 2 };
      (fsize as u64).saturating_sub(cam.raw.0 as u64 * cam.raw.1 as u64 * per_sample) as u32
    }
  };
  if cam.gamma {
    g.curve = Some(gamma_curve(0.45, 4.5, 1, 255));
  }
  g.zero_is_bad = cam.make == "Canon" && cam.raw.0 > 1600;
}

/// Size fixes shared by several vendors
fn common_sizes(md: &MetadataBundle, g: &mut Geometry) {
  let model = md.model.as_str();
  match (g.height, g.width) {
    // Pentax K10D and Samsung GX10
    (2624, 3936) => {
      g.height = 2616;
      g.width = 3896;
    }
    // Pentax K20D and Samsung GX20
    (3136, 4864) => {
      g.height = 3124;
      g.width = 4688;
      g.filters = Some(0x16161616);
    }
    // Ricoh GX200
    (3014, 4096) => g.width = 4014,
    _ => {}
  }
  if g.width == 4352 && (model == "K-r" || model == "K-x") {
    g.width = 4309;
    g.filters = Some(0x16161616);
  }
  if g.width >= 4960 && model == "K-5" {
    g.left = 10;
    g.width = 4950;
    g.filters = Some(0x16161616);
  }
  if g.width == 4736 && model == "K-7" {
    g.area(3122, 4684, 2, g.left);
    g.filters = Some(0x16161616);
  }
  if g.width == 7424 && model == "645D" {
    g.area(5502, 7328, 29, 48);
    g.filters = Some(0x61616161);
  }
}

fn dng_rules(md: &MetadataBundle, g: &mut Geometry) {
  let filters = match g.filters {
    None | Some(u32::MAX) => 0,
    Some(filters) => filters,
  };
  g.filters = Some(filters);
  if filters == 0 {
    g.unsupported("linear (demosaiced) or monochrome DNG");
    return;
  }
  g.cam_xyz = md.cam_xyz;
  g.loader = match g.tiff_compress {
    1 => Some(Loader::DngUncompressed),
    7 => Some(Loader::DngLossless),
    34892 => Some(Loader::Unsupported("lossy DNG")),
    other => {
      debug!("DNG: compression {} is not supported", other);
      Some(Loader::Unsupported("DNG compression"))
    }
  };
}

/// PowerShot models with a fixed sensor area and 10 bit packed payload
fn powershot_a5(model: &str, g: &mut Geometry) -> bool {
  match model {
    "PowerShot A5" | "PowerShot A5 Zoom" => {
      g.height = 773;
      g.width = 960;
      g.raw_width = 992;
      g.pixel_aspect = 256.0 / 235.0;
      g.filters = Some(0x1e4e1e4e);
    }
    "PowerShot A50" => {
      g.height = 968;
      g.width = 1290;
      g.raw_width = 1320;
      g.filters = Some(0x1b4e4b1e);
    }
    "PowerShot Pro70" => {
      g.height = 1024;
      g.width = 1552;
      g.filters = Some(0x1e4b4e1b);
    }
    _ => return false,
  }
  g.colors = 4;
  g.bps = 10;
  g.loader = Some(Loader::Packed);
  g.load_flags = 40;
  g.zero_is_bad = g.raw_width > 1600;
  true
}

/// Canon sensor areas, keyed by the raw width
fn canon_rules(md: &MetadataBundle, g: &mut Geometry) {
  let uid = md.unique_id;
  let alias = |g: &mut Geometry, id: u32, model: &str| {
    if uid == id {
      g.profile_alias = Some(model.to_string());
    }
  };
  match g.raw_width {
    2144 => {
      g.area(1550, 2088, 8, 4);
      if md.model == "PowerShot G1" {
        g.colors = 4;
        g.filters = Some(0xb4b4b4b4);
      }
    }
    2224 => g.area(1448, 2176, 6, 48),
    2376 => g.area(1720, 2312, 6, 12),
    2672 => g.area(1960, 2616, 6, 12),
    3152 => {
      g.area(2056, 3088, 12, 64);
      alias(g, 0x80000170, "EOS 300D");
    }
    3160 => g.area(2328, 3112, 12, 44),
    3344 => g.area(2472, 3288, 6, 4),
    3516 => {
      g.margins(14, 42, 0);
      alias(g, 0x80000189, "EOS 350D");
    }
    3596 => g.margins(12, 74, 0),
    3744 => {
      if uid > 0x2720000 {
        g.area(2760, 3684, 12, 52);
      } else {
        g.area(2760, 3684, 16, 8);
      }
    }
    3944 => g.area(2602, 3908, 18, 30),
    3948 => {
      g.margins(18, 42, 2);
      alias(g, 0x80000236, "EOS 400D");
      alias(g, 0x80000254, "EOS 1000D");
    }
    3984 => g.margins(20, 76, 2),
    4104 => g.area(3024, 4032, 12, 48),
    4152 => g.margins(12, 192, 0),
    4160 => g.area(3048, 4048, 11, 104),
    4312 => {
      g.margins(18, 22, 2);
      alias(g, 0x80000176, "EOS 450D");
    }
    4352 => {
      g.margins(18, 62, 0);
      alias(g, 0x80000288, "EOS 1100D");
    }
    4476 => g.margins(34, 90, 0),
    4480 => {
      g.area(3326, 4432, 10, 12);
      g.filters = Some(0x49494949);
    }
    4496 => g.area(3316, 4404, 50, 80),
    4832 => {
      g.margins(if uid == 0x80000261 { 51 } else { 26 }, 62, 0);
      alias(g, 0x80000252, "EOS 500D");
    }
    5108 => g.margins(13, 98, 0),
    5120 => {
      let height = g.height.saturating_sub(45);
      g.area(height, 4916, 45, 142);
    }
    5344 => {
      if uid == 0x80000269 {
        g.margins(100, 126, 2);
        alias(g, 0x80000269, "EOS-1D X");
      } else {
        g.margins(51, 142, 0);
        alias(g, 0x80000270, "EOS 550D");
        alias(g, 0x80000286, "EOS 600D");
      }
    }
    5360 | 5792 => g.margins(51, 158, 0),
    5712 => g.area(3752, 5640, 20, 62),
    5920 => g.area(3870, 5796, 80, 122),
    other => debug!("Canon: no sensor area for raw width {}", other),
  }
}

/// Nikon sensor areas by model. Returns false for unknown models.
fn nikon_rules(md: &mut MetadataBundle, g: &mut Geometry, file: &[u8]) -> bool {
  let model = md.model.clone();
  match model.as_str() {
    "D1" => {
      let mut wb = md.wb.get();
      wb[0] *= 256.0 / 527.0;
      wb[2] *= 256.0 / 317.0;
      md.wb.set(wb);
    }
    "D1X" => {
      g.width = g.width.saturating_sub(4);
      g.pixel_aspect = 0.5;
    }
    "D40X" | "D60" | "D80" | "D3000" => {
      g.height = g.height.saturating_sub(3);
      g.width = g.width.saturating_sub(4);
    }
    "D3" | "D3S" | "D700" => {
      g.width = g.width.saturating_sub(4);
      g.left = 2;
    }
    "D3100" => {
      g.width = g.width.saturating_sub(28);
      g.left = 6;
    }
    "D5000" | "D90" => g.width = g.width.saturating_sub(42),
    "D5100" | "D7000" => g.width = g.width.saturating_sub(44),
    "D3200" | "D800" => g.width = g.width.saturating_sub(46),
    "D4" => {
      g.width = g.width.saturating_sub(52);
      g.left = 2;
    }
    m if m.starts_with("D40") || m.starts_with("D50") || m.starts_with("D70") => g.width = g.width.saturating_sub(1),
    "D100" => {
      if g.tiff_compress == 34713 && !nikon_is_compressed(file, g.data_offset as usize) {
        g.loader = Some(Loader::Packed);
        g.load_flags |= 1;
        g.width += 3;
        g.raw_width = g.width + 3;
      }
    }
    "D200" => {
      g.left = 1;
      g.width = g.width.saturating_sub(4);
      g.filters = Some(0x94949494);
    }
    m if m.starts_with("D2H") => {
      g.left = 6;
      g.width = g.width.saturating_sub(14);
    }
    m if m.starts_with("D2X") => g.width = g.width.saturating_sub(if g.width == 3264 { 32 } else { 8 }),
    m if m.starts_with("D300") => g.width = g.width.saturating_sub(32),
    m if m.starts_with("COOLPIX P") => {
      g.load_flags = 24;
      g.filters = Some(0x94949494);
      if m.as_bytes().get(9) == Some(&b'7') && md.shot.iso_speed.unwrap_or(0.0) >= 400.0 {
        g.black = Some(255);
      }
    }
    m if m.starts_with("1 ") => g.height = g.height.saturating_sub(2),
    _ => return false,
  }
  true
}

/// Uncompressed D100 files have zero padding every 16 bytes
fn nikon_is_compressed(file: &[u8], data_offset: usize) -> bool {
  file.get(data_offset..).unwrap_or_default().iter().take(256).skip(15).step_by(16).any(|b| *b != 0)
}

fn fuji_rules(md: &mut MetadataBundle, g: &mut Geometry) {
  if md.model.get(7..) == Some("S2Pro") {
    md.model = "S2Pro".into();
    g.height = 2144;
    g.width = 2880;
    g.flip = Some(6);
  } else if g.loader != Some(Loader::Packed) {
    g.maximum = 0x3e00;
  }
  g.top = (g.raw_height.saturating_sub(g.height) >> 2) << 1;
  g.left = (g.raw_width.saturating_sub(g.width) >> 2) << 1;
  if g.width == 3328 {
    g.width = 3262;
    g.left = 34;
  }
  if md.model == "X10" || md.model == "X-S1" {
    g.filters = Some(0x16161616);
  }
  if md.model == "X-Pro1" {
    g.unsupported("Fujifilm X-Trans sensor");
  }
  if g.fuji_rotated {
    let layout = md.fuji.layout;
    let fuji_width = g.width >> (layout == 0) as u32;
    g.rotated = Some(RotatedSensor {
      fuji_width,
      layout,
      stored: (g.top, g.left, fuji_width << (layout == 0) as u32, g.height),
    });
    g.width = (g.height >> layout) + fuji_width;
    g.height = g.width - 1;
    g.pixel_aspect = 1.0;
    if fuji_width & 1 == 0 {
      g.filters = Some(0x49494949);
    }
  }
}

/// Canon small raw: full color pixels of the visible size
fn canon_sraw_rules(g: &mut Geometry) {
  match g.width {
    3344 => g.width -= 72,
    3872 => g.width -= 6,
    _ => {}
  }
  g.filters = Some(0);
  g.colors = 3;
  g.cpp = 3;
  g.maximum = 0x3fff;
  g.loader = Some(Loader::CanonSraw);
}

fn hasselblad_rules(md: &mut MetadataBundle, g: &mut Geometry) {
  if g.loader == Some(Loader::LosslessJpeg) {
    g.loader = Some(Loader::Hasselblad);
  }
  match g.raw_width {
    7262 => {
      g.area(5444, 7248, 4, 7);
      g.filters = Some(0x61616161);
    }
    7410 => {
      g.area(5502, 7328, 4, 41);
      g.filters = Some(0x61616161);
    }
    9044 => {
      g.area(6716, 8964, 8, 40);
      g.load_flags = 256;
      g.black = Some(g.black.unwrap_or(0) + 256);
      g.maximum = 0x8101;
    }
    4090 => {
      md.model = "V96C".into();
      g.margins(6, 3, 0);
      g.width = g.width.saturating_sub(7);
      g.filters = Some(0x61616161);
    }
    _ => {}
  }
}

fn sinar_rules(g: &mut Geometry) {
  if g.loader.is_none() {
    g.loader = Some(Loader::Unpacked);
  }
  g.maximum = 0x3fff;
}

fn leaf_rules(md: &mut MetadataBundle, g: &mut Geometry, file: &[u8]) {
  g.maximum = 0x3fff;
  let ljpeg = file.get(g.data_offset as usize..).and_then(|src| LjpegHeader::parse(src).ok());
  if ljpeg.is_some_and(|hdr| hdr.bits == 15) {
    g.maximum = 0x1fff;
  }
  if g.samples > 1 {
    g.filters = Some(0);
    g.cpp = g.samples.min(4) as usize;
    g.maximum = 0xffff;
  }
  if g.samples > 1 || (g.tile_length != 0 && g.tile_length < g.raw_height) {
    g.loader = Some(Loader::LeafHdr);
    g.raw_width = g.tile_width;
  }
  if (g.width | g.height) == 2048 && g.samples > 1 {
    md.model = "DCB2".into();
    g.area(2028, 2022, 10, 16);
  } else if g.width == 2116 {
    md.model = "Valeo 6".into();
    g.area(g.height.saturating_sub(60), 2116 - 110, 30, 55);
    g.filters = Some(0x49494949);
  } else if g.width == 3171 {
    md.model = "Valeo 6".into();
    g.area(g.height.saturating_sub(48), 3171 - 48, 24, 24);
    g.filters = Some(0x16161616);
  }
}

fn minolta_rules(md: &mut MetadataBundle, g: &mut Geometry) {
  g.loader = Some(Loader::Unpacked);
  g.maximum = 0xfff;
  let model = md.model.clone();
  if model.starts_with("DiMAGE A") {
    if model == "DiMAGE A200" {
      g.filters = Some(0x49494949);
    }
    g.bps = 12;
    g.loader = Some(Loader::Packed);
  } else if model.starts_with("ALPHA") || model.starts_with("DYNAX") || model.starts_with("MAXXUM") {
    // Regional names share the profile of the DYNAX model
    let skip = if model.starts_with('M') { 7 } else { 6 };
    g.profile_alias = Some(format!("DYNAX {}", model.get(skip..).unwrap_or_default()));
    g.loader = Some(Loader::Packed);
  } else if model.starts_with("DiMAGE G") {
    match model.as_bytes().get(8) {
      Some(b'4') => {
        g.height = 1716;
        g.width = 2304;
      }
      Some(b'5') => {
        g.height = 1956;
        g.width = 2607;
        g.raw_width = 2624;
      }
      Some(b'6') => {
        g.height = 2136;
        g.width = 2848;
      }
      _ => {}
    }
    g.data_offset += 14;
    g.filters = Some(0x61616161);
    g.maximum = 0x3df;
    g.endian = Endian::Big;
  }
}

fn panasonic_rules(md: &MetadataBundle, g: &mut Geometry, fsize: usize) {
  if g.raw_width < 1 {
    g.is_raw = false;
    return;
  }
  if g.loader.is_none() {
    let row_bytes = (g.raw_width * 8 / 7) as usize;
    if row_bytes > 0 && fsize.saturating_sub(g.data_offset as usize) / row_bytes == g.raw_height as usize {
      g.loader = Some(Loader::Panasonic);
    } else {
      g.loader = Some(Loader::Unpacked);
      g.load_flags = 4;
    }
  }
  g.zero_is_bad = true;
  g.height = (g.height + 12).min(g.raw_height);
  for (rw, rh, left, top, dw, dh) in PANA_AREAS {
    if g.raw_width == rw && g.raw_height == rh {
      g.left = left;
      g.top = top;
      g.width = g.width.saturating_add_signed(dw);
      g.height = g.height.saturating_add_signed(dh);
    }
  }
  let index = (md.filters.unwrap_or(u32::MAX).wrapping_sub(1) ^ (g.left & 1) ^ (g.top << 1)) & 3;
  g.filters = Some(0x01010101 * [0x94, 0x61, 0x49, 0x16][index as usize]);
}

fn olympus_rules(md: &MetadataBundle, g: &mut Geometry) {
  g.height += g.height & 1;
  g.filters = md.exif_cfa;
  if g.width == 4100 {
    g.width -= 4;
  }
  if g.width == 4080 {
    g.width -= 24;
  }
  let unpacked = g.loader == Some(Loader::Unpacked);
  if unpacked {
    g.load_flags = 4;
  }
  g.bps = 12;
  match md.model.as_str() {
    "E-300" | "E-500" => {
      g.width = g.width.saturating_sub(20);
      if unpacked {
        g.maximum = 0xfc3;
        g.cblack = [0; 4];
      }
    }
    "E-330" => {
      g.width = g.width.saturating_sub(30);
      if unpacked {
        g.maximum = 0xf79;
      }
    }
    _ => {}
  }
}

fn sony_rules(md: &MetadataBundle, g: &mut Geometry) {
  if md.make == "SONY" && g.raw_width == 3984 {
    g.profile_alias = Some("DSC-R1".into());
    g.width = 3925;
    g.endian = Endian::Big;
  } else if md.make == "SONY" && g.raw_width == 6048 {
    g.width = g.width.saturating_sub(24);
  } else if md.model == "DSLR-A100" {
    if g.width == 3880 {
      g.height = g.height.saturating_sub(1);
      g.raw_width += 1;
      g.width = g.raw_width;
    } else {
      g.endian = Endian::Big;
      g.load_flags = 2;
    }
    g.filters = Some(0x61616161);
  } else if md.model == "DSLR-A350" {
    g.height = g.height.saturating_sub(4);
  } else if md.model == "DSC-F828" || md.model == "DSC-V3" {
    g.unsupported("Sony SRF and four color layouts");
  }
}

fn kodak_rules(md: &MetadataBundle, g: &mut Geometry) {
  if g.filters.is_none() {
    g.filters = Some(0x61616161);
  }
  let model = md.model.as_str();
  if model.starts_with("NC2000") || model.starts_with("DCS460") || ["EOSDCS3B", "EOSDCS1", "DCS420"].contains(&model) {
    g.width = g.width.saturating_sub(4);
    g.left = 2;
  }
  if ["DCS460A", "DCS660M", "DCS760M"].contains(&model) {
    g.unsupported("monochrome Kodak DCS");
  }
}

/// Per vendor corrections for non-DNG files
fn vendor_rules(md: &mut MetadataBundle, g: &mut Geometry, file: &[u8], format: FileFormat) {
  let is_canon = md.make == "Canon";
  if is_canon {
    g.loader = Some(if format == FileFormat::Ciff { Loader::CanonCrw } else { Loader::LosslessJpeg });
  }
  if md.make == "NIKON" {
    if g.loader.is_none() {
      g.loader = Some(Loader::Packed);
    }
    if md.model.starts_with('E') {
      g.load_flags |= ((g.data_offset == 0) as u32) << 2 | 2;
    }
  }
  if md.make == "CASIO" {
    g.loader = Some(Loader::Packed);
    g.maximum = 0xf7f;
  }

  let model = md.model.clone();
  if is_canon && g.bps == 15 {
    canon_sraw_rules(g);
  } else if model == "PowerShot 600" {
    g.unsupported("Canon PowerShot 600 layout");
  } else if powershot_a5(&model, g) {
  } else if model == "PowerShot Pro90 IS" {
    g.width = 1896;
    g.colors = 4;
    g.filters = Some(0xb4b4b4b4);
  } else if is_canon {
    canon_rules(md, g);
  } else if nikon_rules(md, g, file) {
  } else if md.make == "FUJIFILM" {
    fuji_rules(md, g);
  } else if md.make.eq_ignore_ascii_case("MINOLTA") {
    minolta_rules(md, g);
  } else if model == "*ist D" {
    g.loader = Some(Loader::Unpacked);
  } else if model == "*ist DS" {
    g.height = g.height.saturating_sub(2);
  } else if md.make == "LEICA" || md.make == "Panasonic" {
    panasonic_rules(md, g, file.len());
  } else if md.make == "OLYMPUS" {
    olympus_rules(md, g);
  } else if md.make.eq_ignore_ascii_case("SONY") {
    sony_rules(md, g);
  } else if md.make.eq_ignore_ascii_case("KODAK") {
    kodak_rules(md, g);
  } else if md.make == "Hasselblad" {
    hasselblad_rules(md, g);
  } else if md.make == "Sinar" {
    sinar_rules(g);
  } else if md.make == "Leaf" {
    leaf_rules(md, g, file);
  } else if md.make == "Phase One" {
    g.bps = 16;
  }
}

/// Firmware version from a string like "Firmware Version 1.0.7"
fn firmware_version(model2: &str) -> u32 {
  let digits = model2.trim_start_matches(|c: char| !c.is_ascii_digit());
  let mut version = [0_u32; 3];
  for (v, part) in version.iter_mut().zip(digits.split('.')) {
    let end = part.find(|c: char| !c.is_ascii_digit()).unwrap_or(part.len());
    match part[..end].parse() {
      Ok(n) => *v = n,
      Err(_) => break,
    }
    if end < part.len() {
      break;
    }
  }
  (version[0] * 1000 + version[1]) * 1000 + version[2]
}

fn apply_profile(profile: Option<&'static CameraProfile>, g: &mut Geometry) {
  let Some(profile) = profile else {
    return;
  };
  debug!("Using camera profile '{}'", profile.prefix);
  if profile.blackpoint != 0 {
    g.black = Some(profile.blackpoint);
  }
  if profile.whitepoint != 0 {
    g.maximum = profile.whitepoint;
  }
  if let Some(cam_xyz) = profile.cam_xyz() {
    g.cam_xyz = Some(cam_xyz);
  }
}

/// Defaults and the final decoder parameters
fn finish(md: &MetadataBundle, mut g: Geometry, format: FileFormat) -> Result<RawLayout> {
  if g.rotated.is_none() {
    g.raw_height = g.raw_height.max(g.height);
    g.raw_width = g.raw_width.max(g.width);
  }
  if g.bps == 0 {
    g.bps = 12;
  }
  if g.maximum == 0 {
    g.maximum = (1_u32 << g.bps.min(16)) - 1;
  }
  let loader = match g.loader {
    Some(loader) if g.is_raw && g.height > 0 && g.width > 0 => loader,
    _ => return Err(unsupported!("no raw image in {} {} {} file", md.make, md.model, format)),
  };
  // Multi-shot backs keep their pattern for merging the shots
  let shot_filters = g.filters.unwrap_or(0);
  let mut filters = if g.cpp > 1 { 0 } else { shot_filters };
  if filters == 0 && g.cpp == 1 {
    return Err(unsupported!("{} {}: sensor without color filter array", md.make, md.model));
  }
  if g.colors == 3 && filters != 0 {
    filters = CFA::from_filters(filters).split_greens().filters();
  }

  let mut raw_dim = Dim2::new(g.raw_width as usize, g.raw_height as usize);
  let mut crop;
  let mut super_ccd = None;
  if let Some(rot) = g.rotated {
    let (top, left, width, height) = rot.stored;
    crop = RawLayout::clipped_crop(raw_dim, top as usize, left as usize, width as usize, height as usize);
    super_ccd = Some(SuperCcd {
      fuji_width: rot.fuji_width as usize,
      layout: rot.layout,
      canvas: Dim2::new(g.width as usize, g.height as usize),
    });
  } else {
    if g.top + g.height > g.raw_height || g.left + g.width > g.raw_width {
      warn!(
        "Visible area {}x{}+{}+{} exceeds the {}x{} sensor, clipping",
        g.width, g.height, g.left, g.top, g.raw_width, g.raw_height
      );
    }
    crop = RawLayout::clipped_crop(raw_dim, g.top as usize, g.left as usize, g.width as usize, g.height as usize);
  }
  if loader.writes_visible_area() {
    raw_dim = Dim2::new(g.width as usize, g.height as usize);
    crop = Rect::new(Point::default(), raw_dim);
  }
  let flip = g.flip.unwrap_or(g.tiff_flip);
  let tiled = || TiledParams {
    offsets: if g.tile_offsets.is_empty() {
      vec![g.data_offset as usize]
    } else {
      g.tile_offsets.iter().map(|o| *o as usize).collect()
    },
    tile_length: if g.tile_length != 0 { g.tile_length as usize } else { g.raw_height as usize },
    samples: g.samples as usize,
    raw_dim: Dim2::new(g.raw_width as usize, g.raw_height as usize),
    origin: Point::new(g.left as usize, g.top as usize),
    cfa: CFA::from_filters(shot_filters),
  };

  let curve = g.curve.clone();
  let curve_table = curve.as_deref().map(LookupTable::new);
  let decoder = match loader {
    Loader::Unpacked => RawDecoder::Unpacked { shift: g.load_flags },
    Loader::Packed => RawDecoder::Packed(PackedParams {
      bps: g.bps,
      load_flags: g.load_flags,
      tiff_compress: g.tiff_compress != 0,
      row_bytes: None,
    }),
    Loader::EightBit => RawDecoder::EightBit,
    Loader::Nokia => RawDecoder::Nokia,
    Loader::LosslessJpeg => RawDecoder::LosslessJpeg(LosslessParams {
      slices: md.cr2_slice,
      interlaced: g.load_flags & 1 == 1,
      shift_columns: g.raw_width == 3984,
      curve: curve_table,
    }),
    Loader::DngUncompressed => RawDecoder::DngUncompressed { bps: g.bps },
    Loader::DngLossless => {
      let img = md.tiff_images.iter().find(|img| img.offset == g.data_offset && img.compression == 7);
      let (offsets, tile_width, tile_length) = match img {
        Some(img) if !img.tile_offsets.is_empty() && img.tile_width > 0 => {
          (img.tile_offsets.iter().map(|o| *o as usize).collect(), img.tile_width as usize, img.tile_length as usize)
        }
        _ => (vec![g.data_offset as usize], g.raw_width as usize, g.raw_height as usize),
      };
      RawDecoder::DngLossless(DngTiles {
        offsets,
        tile_width,
        tile_length,
        dng_version: md.dng_version,
        curve: curve_table,
      })
    }
    Loader::CanonCrw => RawDecoder::CanonCrw {
      table: md.tiff_compress.unwrap_or(0) as usize,
    },
    Loader::Nikon => RawDecoder::NikonCompressed {
      meta_offset: md.meta_offset.unwrap_or(0) as usize,
    },
    Loader::Pentax => RawDecoder::Pentax {
      meta_offset: md.meta_offset.unwrap_or(0) as usize,
    },
    Loader::Panasonic => RawDecoder::Panasonic { load_flags: g.load_flags },
    Loader::Olympus => RawDecoder::Olympus,
    Loader::SonyArw => RawDecoder::SonyArw,
    Loader::SonyArw2 => RawDecoder::SonyArw2,
    Loader::Kodak65000 => RawDecoder::Kodak65000,
    Loader::CanonSraw => RawDecoder::CanonSraw(SrawParams {
      slices: md.cr2_slice,
      raw_width: g.raw_width as usize,
      sraw_mul: md.sraw_mul,
      unique_id: md.unique_id,
      firmware: firmware_version(&md.model2),
    }),
    Loader::PhaseOne => RawDecoder::PhaseOne(md.phase_one.unwrap_or_default()),
    Loader::PhaseOneCompressed => RawDecoder::PhaseOneCompressed(md.phase_one.unwrap_or_default()),
    Loader::Hasselblad => RawDecoder::Hasselblad { load_flags: g.load_flags },
    Loader::LeafHdr => RawDecoder::LeafHdr(tiled()),
    Loader::Sinar4Shot => RawDecoder::Sinar4Shot(tiled()),
    Loader::Unsupported(what) => return Err(unsupported!("{} {}: {} is not supported", md.make, md.model, what)),
  };

  Ok(RawLayout {
    raw_dim,
    crop,
    cfa: CFA::from_filters(filters),
    colors: g.colors,
    bps: g.bps,
    data_offset: g.data_offset as usize,
    decoder,
    endian: g.endian,
    orientation: Orientation::from_flip_bits(flip),
    maximum: g.maximum,
    black: g.black.unwrap_or(0),
    cblack: g.cblack,
    pixel_aspect: g.pixel_aspect,
    curve,
    cam_xyz: g.cam_xyz,
    zero_is_bad: g.zero_is_bad,
    cpp: g.cpp,
    super_ccd,
  })
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;
  use crate::ErrorKind;
  use crate::formats::tiff::{DirectoryWriter, TiffWriter};
  use crate::tags::TiffCommonTag;

  /// TIFF with a single raw directory, payload stored behind the header
  fn raw_tiff(payload: &[u8], tags: impl FnOnce(&mut DirectoryWriter<'_, '_>, u32) -> crate::formats::tiff::Result<()>) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut output = Cursor::new(Vec::new());
    let mut tiff = TiffWriter::new(&mut output)?;
    let offset = tiff.write_data(payload)?;
    let ifd0 = {
      let mut dir = tiff.new_directory();
      tags(&mut dir, offset)?;
      dir.build()?
    };
    tiff.build(ifd0)?;
    Ok(output.into_inner())
  }

  #[test]
  fn nikon_packed_geometry() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (w, h) = (64_u32, 48_u32);
    let payload = vec![0_u8; (w * h * 12 / 8) as usize];
    let buf = raw_tiff(&payload, |dir, offset| {
      dir.add_tag(TiffCommonTag::Make, "NIKON CORPORATION")?;
      dir.add_tag(TiffCommonTag::Model, "NIKON D3")?;
      dir.add_tag(TiffCommonTag::ImageWidth, [w])?;
      dir.add_tag(TiffCommonTag::ImageLength, [h])?;
      dir.add_tag(TiffCommonTag::BitsPerSample, [12_u16])?;
      dir.add_tag(TiffCommonTag::Compression, [1_u16])?;
      dir.add_tag(TiffCommonTag::StripOffsets, [offset])?;
      dir.add_tag(TiffCommonTag::StripByteCounts, [w * h * 12 / 8])?;
      dir.add_tag(TiffCommonTag::Orientation, [8_u16])?;
      Ok(())
    })?;
    let id = identify(&buf, FileFormat::Tiff)?;
    assert_eq!(id.md.make, "NIKON");
    assert_eq!(id.md.model, "D3");
    let layout = &id.layout;
    assert_eq!(layout.raw_dim, Dim2::new(64, 48));
    // D3: width minus 4, left margin 2
    assert_eq!((layout.crop.p.x, layout.crop.d.w, layout.crop.d.h), (2, 60, 48));
    assert!(matches!(layout.decoder, RawDecoder::Packed(p) if p.bps == 12));
    assert_eq!(layout.maximum, 4095);
    assert_eq!(layout.orientation, Orientation::Rotate270);
    Ok(())
  }

  #[test]
  fn dng_uncompressed() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (w, h) = (32_u32, 32_u32);
    let payload = vec![0_u8; (w * h * 2) as usize];
    let buf = raw_tiff(&payload, |dir, offset| {
      dir.add_tag(TiffCommonTag::Make, "Test")?;
      dir.add_tag(TiffCommonTag::Model, "Sensor")?;
      dir.add_tag(TiffCommonTag::ImageWidth, [w])?;
      dir.add_tag(TiffCommonTag::ImageLength, [h])?;
      dir.add_tag(TiffCommonTag::BitsPerSample, [16_u16])?;
      dir.add_tag(TiffCommonTag::Compression, [1_u16])?;
      dir.add_tag(TiffCommonTag::StripOffsets, [offset])?;
      dir.add_tag(TiffCommonTag::StripByteCounts, [w * h * 2])?;
      dir.add_tag(TiffCommonTag::CFARepeatPatternDim, [2_u16, 2])?;
      dir.add_tag(TiffCommonTag::CFAPattern, [0_u8, 1, 1, 2])?;
      dir.add_tag(TiffCommonTag::DNGVersion, [1_u8, 4, 0, 0])?;
      dir.add_tag(TiffCommonTag::WhiteLevel, [1000_u16])?;
      Ok(())
    })?;
    let id = identify(&buf, FileFormat::Tiff)?;
    assert!(matches!(id.layout.decoder, RawDecoder::DngUncompressed { bps: 16 }));
    assert_eq!(id.layout.maximum, 1000);
    assert_eq!(id.layout.cfa.color_at(0, 0), 0);
    assert_eq!(id.layout.cfa.color_at(1, 1), 2);
    Ok(())
  }

  #[test]
  fn preview_only_tiff_is_rejected() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let payload = vec![0_u8; 64 * 48 * 3];
    let buf = raw_tiff(&payload, |dir, offset| {
      dir.add_tag(TiffCommonTag::Make, "Canon")?;
      dir.add_tag(TiffCommonTag::ImageWidth, [64_u32])?;
      dir.add_tag(TiffCommonTag::ImageLength, [48_u32])?;
      dir.add_tag(TiffCommonTag::BitsPerSample, [8_u16, 8, 8])?;
      dir.add_tag(TiffCommonTag::Compression, [1_u16])?;
      dir.add_tag(TiffCommonTag::StripOffsets, [offset])?;
      dir.add_tag(TiffCommonTag::SamplesPerPixel, [3_u16])?;
      dir.add_tag(TiffCommonTag::StripByteCounts, [64_u32 * 48 * 3])?;
      Ok(())
    })?;
    let err = identify(&buf, FileFormat::Tiff).err().ok_or("accepted a preview")?;
    assert_eq!(err.kind(), ErrorKind::UnsupportedVariant);
    Ok(())
  }

  #[test]
  fn headerless_by_size() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = vec![0x20_u8; 10134608];
    let id = identify(&buf, FileFormat::Headerless)?;
    assert_eq!((id.md.make.as_str(), id.md.model.as_str()), ("AVT", "F-510C"));
    let layout = &id.layout;
    assert!(matches!(layout.decoder, RawDecoder::Unpacked { .. }));
    assert_eq!(layout.data_offset, 10134608 - 2588 * 1958 * 2);
    assert_eq!(layout.maximum, 0xfff0);
    assert_eq!(layout.endian, Endian::Big);
    Ok(())
  }

  #[test]
  fn generic_vga_uses_gamma_curve() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = vec![0_u8; 307200];
    let id = identify(&buf, FileFormat::Headerless)?;
    assert!(matches!(id.layout.decoder, RawDecoder::EightBit));
    let curve = id.layout.curve.as_ref().ok_or("no curve")?;
    assert_eq!(curve[0], 0);
    assert!(curve[255] > 60000);
    Ok(())
  }

  #[test]
  fn nokia_header() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (w, h) = (64_u16, 48_u16);
    let mut buf = vec![0_u8; 64];
    buf[..6].copy_from_slice(b"\0\x01\0\x01\0@");
    buf[6..11].copy_from_slice(b"Nokia");
    buf[14..17].copy_from_slice(b"N95");
    buf[38..40].copy_from_slice(&64_u16.to_be_bytes());
    buf[42..44].copy_from_slice(&w.to_be_bytes());
    buf[44..46].copy_from_slice(&h.to_be_bytes());
    buf.resize(64 + w as usize * 5 / 4 * h as usize, 0);
    let id = identify(&buf, FileFormat::Nokia)?;
    assert_eq!(id.md.model, "N95");
    assert_eq!(id.layout.data_offset, 64);
    assert_eq!(id.layout.raw_dim, Dim2::new(64, 48));
    // GRBG
    assert_eq!(id.layout.cfa.color_at(0, 0), 1);
    assert_eq!(id.layout.cfa.color_at(1, 0), 2);
    Ok(())
  }

  #[test]
  fn names_are_normalized() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut md = MetadataBundle::new();
    md.make = "OLYMPUS IMAGING CORP.  ".into();
    md.model = "OLYMPUS E-300 ".into();
    normalize_names(&mut md);
    assert_eq!((md.make.as_str(), md.model.as_str()), ("OLYMPUS", "E-300"));
    md.make = "FUJIFILM".into();
    md.model = "FinePix S5600".into();
    normalize_names(&mut md);
    assert_eq!(md.model, "S5600");
    md.make = "EASTMAN KODAK COMPANY".into();
    md.model = "KODAK DCS Pro 14N DIGITAL CAMERA".into();
    normalize_names(&mut md);
    assert_eq!((md.make.as_str(), md.model.as_str()), ("KODAK", "DCS Pro 14N"));
    Ok(())
  }

  #[test]
  fn panasonic_area_and_pattern() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut md = MetadataBundle::new();
    md.make = "Panasonic".into();
    md.filters = Some(1);
    let mut g = Geometry::from_metadata(&md, Endian::Little);
    g.raw_width = 3724;
    g.raw_height = 2450;
    g.width = 3724;
    g.height = 2440;
    g.loader = Some(Loader::Panasonic);
    panasonic_rules(&md, &mut g, 0);
    assert_eq!(g.height, 2448);
    assert_eq!(g.filters, Some(0x94949494));
    assert!(g.zero_is_bad);
    Ok(())
  }

  #[test]
  fn canon_cr2_margins() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut md = MetadataBundle::new();
    md.make = "Canon".into();
    md.model = "EOS 450D".into();
    md.unique_id = 0x80000176;
    let mut g = Geometry::from_metadata(&md, Endian::Little);
    g.raw_width = 4312;
    g.raw_height = 2876;
    g.width = 4312;
    g.height = 2876;
    canon_rules(&md, &mut g);
    assert_eq!((g.top, g.left, g.width, g.height), (18, 22, 4290, 2856));
    assert_eq!(g.profile_alias.as_deref(), Some("EOS 450D"));
    Ok(())
  }

  #[test]
  fn small_dng_is_identified() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (w, h) = (16_u32, 8_u32);
    let payload = vec![0_u8; (w * h * 2) as usize];
    let buf = raw_tiff(&payload, |dir, offset| {
      dir.add_tag(TiffCommonTag::Make, "Test")?;
      dir.add_tag(TiffCommonTag::Model, "Tiny")?;
      dir.add_tag(TiffCommonTag::ImageWidth, [w])?;
      dir.add_tag(TiffCommonTag::ImageLength, [h])?;
      dir.add_tag(TiffCommonTag::BitsPerSample, [16_u16])?;
      dir.add_tag(TiffCommonTag::Compression, [1_u16])?;
      dir.add_tag(TiffCommonTag::StripOffsets, [offset])?;
      dir.add_tag(TiffCommonTag::StripByteCounts, [w * h * 2])?;
      dir.add_tag(TiffCommonTag::CFARepeatPatternDim, [2_u16, 2])?;
      dir.add_tag(TiffCommonTag::CFAPattern, [0_u8, 1, 1, 2])?;
      dir.add_tag(TiffCommonTag::DNGVersion, [1_u8, 4, 0, 0])?;
      Ok(())
    })?;
    let id = identify(&buf, FileFormat::Tiff)?;
    assert_eq!(id.layout.raw_dim, Dim2::new(16, 8));
    assert_eq!(id.layout.visible_dim(), Dim2::new(16, 8));
    Ok(())
  }

  #[test]
  fn phase_one_block() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = crate::formats::iiq::tests::block(
      0,
      &[
        (0x108, 4, 64),
        (0x109, 4, 48),
        (0x10c, 4, 64),
        (0x10d, 4, 48),
        (0x10e, 4, 3),
        (0x10f, 4, 512),
        (0x21c, 4, 256),
      ],
    );
    let id = identify(&buf, FileFormat::PhaseOne)?;
    assert_eq!(id.md.make, "Phase One");
    let layout = &id.layout;
    assert!(matches!(layout.decoder, RawDecoder::PhaseOneCompressed(ph1) if ph1.format == 3 && ph1.strip_offset == 256));
    assert_eq!((layout.bps, layout.maximum, layout.data_offset), (16, 0xffff, 512));
    assert_eq!(layout.raw_dim, Dim2::new(64, 48));
    Ok(())
  }

  #[test]
  fn canon_sraw_is_full_color() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut md = MetadataBundle::new();
    md.make = "Canon".into();
    md.model = "EOS 50D".into();
    md.model2 = "Firmware Version 1.0.7".into();
    let mut g = Geometry::from_metadata(&md, Endian::Little);
    g.raw_width = 3344;
    g.raw_height = 2224;
    g.width = 3344;
    g.height = 2224;
    g.bps = 15;
    vendor_rules(&mut md, &mut g, &[], FileFormat::Tiff);
    assert_eq!(g.loader, Some(Loader::CanonSraw));
    assert_eq!((g.width, g.cpp, g.maximum), (3272, 3, 0x3fff));
    let layout = finish(&md, g, FileFormat::Tiff)?;
    assert_eq!(layout.raw_dim, Dim2::new(3272, 2224));
    assert_eq!(layout.cpp, 3);
    assert!(!layout.cfa.is_valid());
    assert!(matches!(layout.decoder, RawDecoder::CanonSraw(ref p) if p.firmware == 1000007 && p.raw_width == 3344));
    Ok(())
  }

  #[test]
  fn firmware_versions() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert_eq!(firmware_version("Firmware Version 1.0.7"), 1000007);
    assert_eq!(firmware_version("Firmware 2.1"), 2001000);
    assert_eq!(firmware_version(""), 0);
    Ok(())
  }

  #[test]
  fn hasselblad_black_offset() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut md = MetadataBundle::new();
    md.make = "Hasselblad".into();
    let mut g = Geometry::from_metadata(&md, Endian::Little);
    g.raw_width = 9044;
    g.raw_height = 6732;
    g.loader = Some(Loader::LosslessJpeg);
    vendor_rules(&mut md, &mut g, &[], FileFormat::Tiff);
    assert_eq!(g.loader, Some(Loader::Hasselblad));
    assert_eq!((g.top, g.left, g.width, g.height), (8, 40, 8964, 6716));
    assert_eq!((g.load_flags, g.black, g.maximum), (256, Some(256), 0x8101));
    Ok(())
  }

  #[test]
  fn leaf_multi_sample_back() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut md = MetadataBundle::new();
    md.make = "Leaf".into();
    let mut g = Geometry::from_metadata(&md, Endian::Big);
    g.raw_width = 2048;
    g.raw_height = 2048;
    g.width = 2048;
    g.height = 2048;
    g.samples = 3;
    g.tile_width = 2048;
    g.tile_length = 2048;
    g.tile_offsets = vec![1000];
    leaf_rules(&mut md, &mut g, &[]);
    assert_eq!(md.model, "DCB2");
    assert_eq!((g.loader, g.cpp, g.maximum), (Some(Loader::LeafHdr), 3, 0xffff));
    let layout = finish(&md, g, FileFormat::Tiff)?;
    assert_eq!(layout.raw_dim, Dim2::new(2022, 2028));
    let RawDecoder::LeafHdr(params) = &layout.decoder else {
      return Err("not a Leaf decoder".into());
    };
    assert_eq!(params.offsets, vec![1000]);
    assert_eq!(params.origin, Point::new(16, 10));
    assert_eq!(params.raw_dim, Dim2::new(2048, 2048));
    Ok(())
  }

  #[test]
  fn raf_super_ccd_canvas() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut md = MetadataBundle::new();
    md.make = "FUJIFILM".into();
    md.model = "S5600".into();
    md.loader = Some(LoaderHint::FujiPacked);
    let mut g = Geometry::from_metadata(&md, Endian::Big);
    g.raw_width = 40;
    g.raw_height = 20;
    g.width = 32;
    g.height = 16;
    fuji_rules(&mut md, &mut g);
    assert_eq!((g.width, g.height), (32, 31));
    assert_eq!(g.filters, Some(0x49494949));
    let layout = finish(&md, g, FileFormat::Raf)?;
    assert_eq!(layout.raw_dim, Dim2::new(40, 20));
    assert_eq!((layout.crop.p, layout.crop.d), (Point::new(4, 2), Dim2::new(32, 16)));
    let sccd = layout.super_ccd.ok_or("no SuperCCD placement")?;
    assert_eq!((sccd.fuji_width, sccd.canvas), (16, Dim2::new(32, 31)));
    assert_eq!(layout.frame_dim(), Dim2::new(32, 31));
    Ok(())
  }
}
