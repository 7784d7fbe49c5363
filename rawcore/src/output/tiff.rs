// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use crate::formats::tiff::{DirectoryWriter, Rational, TiffWriter, WriteAndSeek};
use crate::image::DecodedImage;
use crate::metadata::{GpsInfo, ImageMetadata};
use crate::tags::{ExifTag, GpsTag, TiffCommonTag};
use crate::Result;

const EXTRA_SAMPLES: u16 = 338;

/// Degrees as degrees, minutes and seconds
fn dms(value: f64) -> [Rational; 3] {
  let value = value.abs();
  let deg = value.trunc();
  let min = ((value - deg) * 60.0).trunc();
  let sec = (value - deg - min / 60.0) * 3600.0;
  [Rational::new(deg as u32, 1), Rational::new(min as u32, 1), Rational::new_f32(sec as f32, 1000)]
}

fn write_gps(dir: &mut DirectoryWriter, gps: &GpsInfo) -> Result<()> {
  dir.add_tag(GpsTag::GPSVersionID, [2_u8, 2, 0, 0])?;
  if let Some(lat) = gps.latitude {
    dir.add_tag(GpsTag::GPSLatitudeRef, if lat < 0.0 { "S" } else { "N" })?;
    dir.add_tag(GpsTag::GPSLatitude, dms(lat))?;
  }
  if let Some(lon) = gps.longitude {
    dir.add_tag(GpsTag::GPSLongitudeRef, if lon < 0.0 { "W" } else { "E" })?;
    dir.add_tag(GpsTag::GPSLongitude, dms(lon))?;
  }
  if let Some(alt) = gps.altitude {
    dir.add_tag(GpsTag::GPSAltitudeRef, (alt < 0.0) as u8)?;
    dir.add_tag(GpsTag::GPSAltitude, Rational::new_f32(alt.abs() as f32, 100))?;
  }
  if let Some(datum) = &gps.map_datum {
    dir.add_tag(GpsTag::GPSMapDatum, datum.as_str())?;
  }
  if let Some(date) = &gps.datestamp {
    dir.add_tag(GpsTag::GPSDateStamp, date.as_str())?;
  }
  Ok(())
}

/// Write a baseline TIFF, uncompressed, one strip. Shot information
/// goes into an Exif directory, the ICC profile into tag 34675.
pub fn write_tiff<W: WriteAndSeek + Send>(writer: &mut W, image: &DecodedImage, md: &ImageMetadata) -> Result<()> {
  let mut tiff = TiffWriter::new(writer)?;

  let data: Vec<u8> = if image.bps == 8 {
    image.pixels.iter().map(|v| *v as u8).collect()
  } else {
    image.pixels.iter().flat_map(|v| v.to_ne_bytes()).collect()
  };
  let strip_offset = tiff.write_data(&data)?;

  let exif_offset = {
    let mut exif = tiff.new_directory();
    exif.add_tag_undefined(ExifTag::ExifVersion, b"0220".to_vec())?;
    if let Some(shutter) = md.shot.shutter {
      exif.add_tag(ExifTag::ExposureTime, Rational::new_f32(shutter, 1_000_000))?;
    }
    if let Some(aperture) = md.shot.aperture {
      exif.add_tag(ExifTag::FNumber, Rational::new_f32(aperture, 10_000))?;
    }
    if let Some(iso) = md.shot.iso_speed {
      exif.add_tag(ExifTag::ISOSpeedRatings, iso.round().clamp(0.0, 65535.0) as u16)?;
    }
    if let Some(focal) = md.shot.focal_len {
      exif.add_tag(ExifTag::FocalLength, Rational::new_f32(focal, 10_000))?;
    }
    if let Some(ts) = md.timestamp {
      exif.add_tag(ExifTag::DateTimeOriginal, ts.format("%Y:%m:%d %H:%M:%S").to_string())?;
    }
    exif.build()?
  };
  let gps_offset = match &md.gps {
    Some(gps) if !gps.is_empty() => {
      let mut dir = tiff.new_directory();
      write_gps(&mut dir, gps)?;
      Some(dir.build()?)
    }
    _ => None,
  };

  let mut root = tiff.new_directory();
  root.add_tag(TiffCommonTag::NewSubFileType, 0_u32)?;
  root.add_tag(TiffCommonTag::ImageWidth, image.width as u32)?;
  root.add_tag(TiffCommonTag::ImageLength, image.height as u32)?;
  root.add_tag(TiffCommonTag::BitsPerSample, vec![image.bps as u16; image.colors])?;
  root.add_tag(TiffCommonTag::Compression, 1_u16)?;
  root.add_tag(TiffCommonTag::PhotometricInt, if image.colors > 1 { 2_u16 } else { 1 })?;
  if !md.description.is_empty() {
    root.add_tag(TiffCommonTag::ImageDescription, &md.description)?;
  }
  if !md.make.is_empty() {
    root.add_tag(TiffCommonTag::Make, &md.make)?;
  }
  if !md.model.is_empty() {
    root.add_tag(TiffCommonTag::Model, &md.model)?;
  }
  root.add_tag(TiffCommonTag::StripOffsets, strip_offset)?;
  root.add_tag(TiffCommonTag::SamplesPerPixel, image.colors as u16)?;
  root.add_tag(TiffCommonTag::RowsPerStrip, image.height as u32)?;
  root.add_tag(TiffCommonTag::StripByteCounts, data.len() as u32)?;
  root.add_tag(TiffCommonTag::XResolution, Rational::new(300, 1))?;
  root.add_tag(TiffCommonTag::YResolution, Rational::new(300, 1))?;
  root.add_tag(TiffCommonTag::PlanarConfig, 1_u16)?;
  root.add_tag(TiffCommonTag::ResolutionUnit, 2_u16)?;
  root.add_tag(TiffCommonTag::Software, format!("rawcore {}", env!("CARGO_PKG_VERSION")))?;
  if let Some(ts) = md.timestamp {
    root.add_tag(TiffCommonTag::DateTime, ts.format("%Y:%m:%d %H:%M:%S").to_string())?;
  }
  if !md.artist.is_empty() {
    root.add_tag(TiffCommonTag::Artist, &md.artist)?;
  }
  if image.colors > 3 {
    root.add_tag(EXTRA_SAMPLES, vec![0_u16; image.colors - 3])?;
  }
  root.add_tag(TiffCommonTag::ExifIFDPointer, exif_offset)?;
  if let Some(offset) = gps_offset {
    root.add_tag(TiffCommonTag::GPSInfo, offset)?;
  }
  if let Some(icc) = &image.icc {
    root.add_tag_undefined(TiffCommonTag::IccProfile, icc.clone())?;
  }
  let ifd0 = root.build()?;
  tiff.build(ifd0)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;
  use crate::develop::OutputColor;
  use crate::formats::tiff::TiffFile;
  use crate::imgop::color::Histogram;
  use crate::imgop::gamma::Gamma;
  use crate::metadata::ShotInfo;
  use crate::output::icc::build_profile;

  #[test]
  fn tags_and_pixels_read_back() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let image = DecodedImage {
      width: 3,
      height: 2,
      colors: 3,
      bps: 16,
      pixels: (0..18).map(|v| v * 1000).collect(),
      histogram: Histogram::default(),
      gamma: Gamma::default(),
      white: 0xffff,
      output_color: OutputColor::Srgb,
      raw_color: false,
      icc: Some(build_profile(OutputColor::Srgb, &Gamma::default())),
    };
    let md = ImageMetadata {
      make: "Canon".into(),
      model: "PowerShot G2".into(),
      shot: ShotInfo {
        shutter: Some(0.004),
        aperture: Some(2.8),
        ..Default::default()
      },
      gps: Some(GpsInfo {
        latitude: Some(-33.5),
        longitude: Some(151.25),
        ..Default::default()
      }),
      ..Default::default()
    };
    let mut out = Cursor::new(Vec::new());
    write_tiff(&mut out, &image, &md)?;
    let buf = out.into_inner();

    let file = TiffFile::parse(&buf, 0)?;
    let root = file.root_ifd().ok_or("no root")?;
    assert_eq!(root.get_entry(TiffCommonTag::ImageWidth).map(|e| e.force_u32(0)), Some(3));
    assert_eq!(root.get_entry(TiffCommonTag::SamplesPerPixel).map(|e| e.force_u32(0)), Some(3));
    assert_eq!(root.get_entry(TiffCommonTag::Make).and_then(|e| e.as_string().map(|s| s.to_string())), Some("Canon".to_string()));
    let icc = root.get_entry(TiffCommonTag::IccProfile).ok_or("no icc")?;
    assert_eq!(icc.count(), 476);
    let strip = root.get_entry(TiffCommonTag::StripOffsets).map(|e| e.force_u32(0) as usize).ok_or("no strip")?;
    let last = u16::from_ne_bytes([buf[strip + 34], buf[strip + 35]]);
    assert_eq!(last, 17000);
    Ok(())
  }

  #[test]
  fn dms_splits_degrees() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let [d, m, s] = dms(-33.5125);
    assert_eq!((d.n, m.n), (33, 30));
    assert!((s.as_f64() - 45.0).abs() < 0.01);
    Ok(())
  }
}
