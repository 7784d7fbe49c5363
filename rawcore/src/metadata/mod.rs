// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Metadata collected while walking the tag trees of a raw file.
//!
//! Handlers for each container write into a [`MetadataBundle`]. Tags may
//! come in any order and repeat, later values overwrite earlier ones,
//! except for white balance once it is locked by a handler that is known
//! to carry the as-shot multipliers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::bits::Endian;
use crate::formats::tiff::Entry;
use crate::pumps::ByteStream;
use crate::rawimage::Orientation;

pub mod ciff;
pub mod exif;
pub mod makernote;
pub mod mrw;
pub mod phaseone;
pub mod raf;
pub mod tiff;

/// Shot parameters, all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotInfo {
  pub iso_speed: Option<f32>,
  /// Exposure time in seconds
  pub shutter: Option<f32>,
  /// F-number
  pub aperture: Option<f32>,
  /// Focal length in mm
  pub focal_len: Option<f32>,
  pub shot_order: Option<u32>,
  pub serial: Option<u32>,
}

/// GPS position in decimal degrees
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsInfo {
  pub latitude: Option<f64>,
  pub longitude: Option<f64>,
  /// Altitude in meters, negative below sea level
  pub altitude: Option<f64>,
  pub timestamp: Option<String>,
  pub datestamp: Option<String>,
  pub map_datum: Option<String>,
}

impl GpsInfo {
  pub fn is_empty(&self) -> bool {
    self.latitude.is_none() && self.longitude.is_none() && self.altitude.is_none()
  }
}

/// White balance multipliers as shot.
///
/// A zero multiplier means unknown. Once locked, plain `set` calls
/// are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WhiteBalance {
  mul: [f32; 4],
  locked: bool,
  /// Camera asks for auto white balance
  auto: bool,
}

impl WhiteBalance {
  pub fn get(&self) -> [f32; 4] {
    self.mul
  }

  /// Red and blue are known, green defaults to 1
  pub fn is_set(&self) -> bool {
    self.mul[0] > 0.0 && self.mul[2] > 0.0
  }

  pub fn is_locked(&self) -> bool {
    self.locked
  }

  pub fn wants_auto(&self) -> bool {
    self.auto
  }

  pub fn request_auto(&mut self) {
    self.auto = true;
  }

  /// Set all four channels, last write wins
  pub fn set(&mut self, mul: [f32; 4]) {
    if !self.locked {
      self.mul = mul;
    }
  }

  pub fn set_channel(&mut self, c: usize, value: f32) {
    if !self.locked {
      self.mul[c & 3] = value;
    }
  }

  /// Set and prevent later overwrites
  pub fn set_locked(&mut self, mul: [f32; 4]) {
    if !self.locked {
      self.mul = mul;
      self.locked = true;
    }
  }

  /// Only set if no multipliers are known yet
  pub fn set_if_unset(&mut self, mul: [f32; 4]) {
    if !self.is_set() {
      self.set(mul);
    }
  }
}

/// Hints from tag handlers for the decoder selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderHint {
  Panasonic,
  Olympus,
  SonyArw,
  Packed,
  Unpacked,
  FujiPacked,
  /// Phase One, word swapped and keyed
  PhaseOne,
  /// Phase One, variable length differences
  PhaseOneCompressed,
}

/// One image directory of a TIFF structure, a raw or thumbnail candidate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TiffImage {
  pub width: u32,
  pub height: u32,
  pub bps: u32,
  pub compression: u32,
  pub photometric: u16,
  pub offset: u32,
  pub samples: u32,
  pub bytes: u32,
  /// Flip bits, 0 means unset
  pub flip: u8,
  pub tile_width: u32,
  pub tile_length: u32,
  /// Absolute tile offsets for tiled layouts
  pub tile_offsets: Vec<u32>,
}

/// Fuji specific layout information
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FujiInfo {
  pub layout: u32,
  /// Non-zero for 45 degree rotated SuperCCD sensors
  pub fuji_width: u32,
}

/// Phase One IIQ directory values needed by the payload decoders
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseOneInfo {
  pub format: u32,
  /// Absolute offset of the two unscramble keys
  pub key_off: u32,
  /// Black level of the compressed payload
  pub t_black: u32,
  /// First column using the right hand row black
  pub split_col: u32,
  /// Absolute offset of the row blacks, 0 if none
  pub black_off: u32,
  /// Absolute offset of the row offset table
  pub strip_offset: u32,
}

/// Durable subset of the metadata, handed to the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
  pub make: String,
  pub model: String,
  pub software: String,
  pub artist: String,
  pub description: String,
  pub timestamp: Option<NaiveDateTime>,
  pub shot: ShotInfo,
  pub gps: Option<GpsInfo>,
  pub orientation: Orientation,
}

/// Ephemeral parse state
#[derive(Debug, Clone, Default)]
pub struct MetadataBundle {
  pub make: String,
  pub model: String,
  pub model2: String,
  pub software: String,
  pub artist: String,
  pub description: String,
  pub timestamp: Option<NaiveDateTime>,
  pub shot: ShotInfo,
  pub gps: GpsInfo,

  /// Explicit orientation from maker specific tags
  pub flip: Option<u8>,
  pub wb: WhiteBalance,
  /// Channel scaling of DNG files without color matrix
  pub pre_mul: [f32; 4],
  /// XYZ to camera matrix, one row per camera color
  pub cam_xyz: Option<[[f64; 3]; 4]>,
  /// Camera to sRGB matrix from the maker note
  pub cmatrix: Option<[[f32; 3]; 3]>,
  pub dng_version: u32,
  /// False if the file was written by a raw converter
  pub is_raw: bool,

  pub black: Option<u32>,
  pub cblack: [u32; 4],
  pub maximum: Option<u32>,
  pub filters: Option<u32>,
  pub exif_cfa: Option<u32>,
  pub colors: Option<usize>,
  pub curve: Option<Vec<u16>>,
  pub pixel_aspect: Option<f64>,

  pub tiff_images: Vec<TiffImage>,
  /// Explicit payload offset set by container handlers
  pub data_offset: Option<u32>,
  pub meta_offset: Option<u32>,
  pub raw_width: Option<u32>,
  pub raw_height: Option<u32>,
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub top_margin: Option<u32>,
  pub left_margin: Option<u32>,
  /// Canon CR2 slices: count, width, width of last
  pub cr2_slice: Option<[u16; 3]>,
  /// CIFF decoder table index
  pub tiff_compress: Option<u32>,
  pub loader: Option<LoaderHint>,
  pub load_flags: Option<u32>,
  pub unique_id: u32,
  /// Canon small raw channel multipliers, 1024 is unity
  pub sraw_mul: [u16; 4],
  pub fuji: FujiInfo,
  pub phase_one: Option<PhaseOneInfo>,
  pub panasonic: bool,
  /// 8x8 block of a white reference shot (Canon CIFF)
  pub white_sample: Option<[[u16; 8]; 8]>,
  /// DNG masked areas: top, left, bottom, right
  pub masked_areas: Vec<[u32; 4]>,
}

impl MetadataBundle {
  pub fn new() -> Self {
    Self {
      is_raw: true,
      pre_mul: [1.0; 4],
      sraw_mul: [1024; 4],
      ..Default::default()
    }
  }

  /// Set a string field from raw bytes, NUL terminated
  pub fn cstr(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim_end().to_string()
  }

  /// Make matches a vendor prefix, case sensitive like the tags
  pub fn make_is(&self, prefix: &str) -> bool {
    self.make.starts_with(prefix)
  }

  pub fn make_contains(&self, needle: &str) -> bool {
    self.make.contains(needle)
  }

  pub fn into_image_metadata(&self, orientation: Orientation) -> ImageMetadata {
    ImageMetadata {
      make: self.make.clone(),
      model: self.model.clone(),
      software: self.software.clone(),
      artist: self.artist.clone(),
      description: self.description.clone(),
      timestamp: self.timestamp,
      shot: self.shot.clone(),
      gps: if self.gps.is_empty() { None } else { Some(self.gps.clone()) },
      orientation,
    }
  }
}

/// Reader at the value data of an entry, bounded only by the end of file
pub(crate) fn entry_stream<'a>(buf: &'a [u8], entry: &Entry, endian: Endian) -> ByteStream<'a> {
  let off = entry.offset().unwrap_or(buf.len()).min(buf.len());
  ByteStream::new(&buf[off..], endian)
}

/// String value of an entry, ASCII or raw bytes up to the first NUL
pub(crate) fn entry_string(entry: &Entry) -> String {
  match entry.as_string() {
    Some(s) => s.to_string(),
    None => entry.as_bytes().map(MetadataBundle::cstr).unwrap_or_default(),
  }
}

/// Parse an Exif style timestamp `YYYY:MM:DD HH:MM:SS`
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
  let s = s.trim_matches(char::from(0)).trim();
  NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S")
    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
    .ok()
}

/// Timestamp from seconds since the epoch
pub fn timestamp_from_unix(secs: u32) -> Option<NaiveDateTime> {
  chrono::DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.naive_utc())
}
