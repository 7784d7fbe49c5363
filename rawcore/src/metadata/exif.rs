// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Exif and GPS sub-directories

use log::{debug, trace, warn};

use super::{MetadataBundle, entry_stream, entry_string, makernote, parse_timestamp};
use crate::Result;
use crate::formats::tiff::{Entry, IFD};
use crate::tags::{ExifTag, GpsTag};

/// Apply the Exif directory. The makernote is parsed in place, it is
/// not part of the TIFF tree.
pub fn apply_exif(buf: &[u8], ifd: &IFD, md: &mut MetadataBundle) -> Result<()> {
  use ExifTag as T;
  let kodak = md.make_is("EASTMAN") && md.tiff_images.len() < 3;
  for (raw_tag, entry) in ifd.entries() {
    let Ok(tag) = T::try_from(*raw_tag) else {
      trace!("Exif: skipping tag {:#x}", raw_tag);
      continue;
    };
    match tag {
      T::ExposureTime => md.shot.shutter = Some(entry.force_f32(0)),
      T::FNumber => md.shot.aperture = Some(entry.force_f32(0)),
      T::ISOSpeedRatings => md.shot.iso_speed = Some(entry.force_f32(0)),
      T::DateTimeOriginal | T::CreateDate => {
        if let Some(ts) = parse_timestamp(&entry_string(entry)) {
          md.timestamp = Some(ts);
        }
      }
      T::ShutterSpeedValue => {
        let expo = -entry.force_f64(0);
        if expo < 128.0 {
          md.shot.shutter = Some(2_f64.powf(expo) as f32);
        }
      }
      T::ApertureValue => md.shot.aperture = Some(2_f64.powf(entry.force_f64(0) / 2.0) as f32),
      T::FocalLength => md.shot.focal_len = Some(entry.force_f32(0)),
      T::MakerNotes => {
        let Some(offset) = entry.offset() else { continue };
        if let Err(err) = makernote::parse_makernote(buf, offset, ifd.base, ifd.endian, md) {
          warn!("Exif: makernote at {} is unreadable: {}", offset, err);
        }
      }
      T::PixelXDimension if kodak => md.raw_width = Some(entry.force_u32(0)),
      T::PixelYDimension if kodak => md.raw_height = Some(entry.force_u32(0)),
      T::CFAPattern => exif_cfa(buf, entry, ifd, md)?,
      _ => {}
    }
  }
  Ok(())
}

/// Exif CFA pattern, only the 2x2 form is understood
fn exif_cfa(buf: &[u8], entry: &Entry, ifd: &IFD, md: &mut MetadataBundle) -> Result<()> {
  let mut s = entry_stream(buf, entry, ifd.endian);
  if s.get_u32()? != 0x20002 {
    debug!("Exif: CFA pattern is not 2x2");
    return Ok(());
  }
  let mut cfa = 0_u32;
  for c in (0..8).step_by(2) {
    cfa |= (s.get_u8()? as u32).wrapping_mul(0x01010101) << c;
  }
  md.exif_cfa = Some(cfa);
  Ok(())
}

/// Degrees, minutes and seconds to decimal degrees
fn degrees(entry: &Entry) -> f64 {
  entry.force_f64(0) + entry.force_f64(1) / 60.0 + entry.force_f64(2) / 3600.0
}

fn ref_char(entry: &Entry) -> u8 {
  match entry.as_string() {
    Some(s) => s.bytes().next().unwrap_or(0),
    None => entry.force_u32(0) as u8,
  }
}

/// Apply the GPS directory
pub fn apply_gps(ifd: &IFD, md: &mut MetadataBundle) {
  use GpsTag as T;
  let mut lat_sign = 1.0;
  let mut lon_sign = 1.0;
  let mut alt_sign = 1.0;
  let (mut lat, mut lon, mut alt) = (None, None, None);
  for (raw_tag, entry) in ifd.entries() {
    let Ok(tag) = T::try_from(*raw_tag) else {
      continue;
    };
    match tag {
      T::GPSLatitudeRef => lat_sign = if ref_char(entry) == b'S' { -1.0 } else { 1.0 },
      T::GPSLongitudeRef => lon_sign = if ref_char(entry) == b'W' { -1.0 } else { 1.0 },
      T::GPSAltitudeRef => alt_sign = if entry.force_u32(0) == 1 { -1.0 } else { 1.0 },
      T::GPSLatitude => lat = Some(degrees(entry)),
      T::GPSLongitude => lon = Some(degrees(entry)),
      T::GPSAltitude => alt = Some(entry.force_f64(0)),
      T::GPSTimeStamp => {
        md.gps.timestamp = Some(format!("{:02}:{:02}:{:02}", entry.force_u32(0), entry.force_u32(1), entry.force_f64(2) as u32));
      }
      T::GPSDateStamp => md.gps.datestamp = Some(entry_string(entry)),
      T::GPSMapDatum => md.gps.map_datum = Some(entry_string(entry)),
      _ => {}
    }
  }
  // References may follow the values
  md.gps.latitude = lat.map(|v| v * lat_sign).or(md.gps.latitude);
  md.gps.longitude = lon.map(|v| v * lon_sign).or(md.gps.longitude);
  md.gps.altitude = alt.map(|v| v * alt_sign).or(md.gps.altitude);
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;
  use crate::formats::tiff::{Rational, TiffWriter};
  use crate::metadata::tiff::parse_tiff;
  use crate::tags::TiffCommonTag;

  #[test]
  fn exif_and_gps_directories() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut output = Cursor::new(Vec::new());
    let mut tiff = TiffWriter::new(&mut output)?;
    let exif = {
      let mut dir = tiff.new_directory();
      dir.add_tag(ExifTag::ISOSpeedRatings, [400_u16])?;
      dir.add_tag(ExifTag::ExposureTime, [Rational::new(1, 250)])?;
      dir.add_tag(ExifTag::ApertureValue, [Rational::new(4, 1)])?;
      dir.add_tag(ExifTag::DateTimeOriginal, "2012:03:04 05:06:07")?;
      dir.add_tag_undefined(ExifTag::CFAPattern, vec![2, 0, 2, 0, 0, 1, 1, 2])?;
      dir.build()?
    };
    let gps = {
      let mut dir = tiff.new_directory();
      dir.add_tag(GpsTag::GPSLatitudeRef, "S")?;
      dir.add_tag(GpsTag::GPSLatitude, [Rational::new(33, 1), Rational::new(30, 1), Rational::new(0, 1)])?;
      dir.add_tag(GpsTag::GPSLongitudeRef, "E")?;
      dir.add_tag(GpsTag::GPSLongitude, [Rational::new(151, 1), Rational::new(15, 1), Rational::new(36, 1)])?;
      dir.add_tag(GpsTag::GPSAltitudeRef, [1_u8])?;
      dir.add_tag(GpsTag::GPSAltitude, [Rational::new(25, 2)])?;
      dir.build()?
    };
    let ifd0 = {
      let mut dir = tiff.new_directory();
      dir.add_tag(TiffCommonTag::Make, "Canon")?;
      dir.add_tag(TiffCommonTag::ExifIFDPointer, [exif])?;
      dir.add_tag(TiffCommonTag::GPSInfo, [gps])?;
      dir.build()?
    };
    tiff.build(ifd0)?;
    let buf = output.into_inner();

    let mut md = MetadataBundle::new();
    parse_tiff(&buf, 0, &mut md)?;
    assert_eq!(md.shot.iso_speed, Some(400.0));
    assert_eq!(md.shot.shutter, Some(1.0 / 250.0));
    assert_eq!(md.shot.aperture, Some(4.0));
    assert!(md.timestamp.is_some());
    // Byte value 0, 1, 1, 2 spread over all 16 positions
    assert_eq!(md.exif_cfa, Some(0x94949494));
    let lat = md.gps.latitude.ok_or("no latitude")?;
    let lon = md.gps.longitude.ok_or("no longitude")?;
    assert!((lat + 33.5).abs() < 1e-9);
    assert!((lon - 151.26).abs() < 1e-9);
    assert_eq!(md.gps.altitude, Some(-12.5));
    Ok(())
  }
}
