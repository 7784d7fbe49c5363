// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! End to end development of synthetic files

mod common;

use std::io::Cursor;

use common::{CiffBuilder, SyntheticDng, TestResult, init_test_logger, texture};
use rawcore::develop::DemosaicQuality;
use rawcore::output::OutputFormat;
use rawcore::{DecodeOutput, DevelopParams, ErrorKind, FileFormat, Pipeline, PipelineState, RawSource};

fn develop(buf: &[u8], params: &DevelopParams) -> TestResult<DecodeOutput> {
  let mut pipeline = Pipeline::new(RawSource::new_from_slice(buf).with_path("synthetic.dng"));
  let output = pipeline.develop(params)?;
  assert_eq!(pipeline.state(), PipelineState::Demosaiced);
  Ok(output)
}

fn max_channel_spread(output: &DecodeOutput) -> u16 {
  output
    .image
    .pixels
    .chunks_exact(output.image.colors)
    .map(|px| px.iter().max().copied().unwrap_or(0) - px.iter().min().copied().unwrap_or(0))
    .max()
    .unwrap_or(0)
}

#[test]
fn uniform_mosaic_develops_to_gray() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::uniform(8, 8, 128).white(255).build()?;
  let params = DevelopParams {
    quality: DemosaicQuality::Bilinear,
    ..Default::default()
  };
  let output = develop(&buf, &params)?;
  assert_eq!(output.format, FileFormat::Tiff);
  assert_eq!((output.image.width, output.image.height, output.image.colors), (8, 8, 3));
  assert!(max_channel_spread(&output) <= 1, "gray input must stay gray");
  Ok(())
}

#[test]
fn every_quality_keeps_gray() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::uniform(32, 24, 3000).white(4095).build()?;
  for quality in [DemosaicQuality::Bilinear, DemosaicQuality::Vng, DemosaicQuality::Ppg, DemosaicQuality::Ahd] {
    let params = DevelopParams {
      quality,
      ..Default::default()
    };
    let output = develop(&buf, &params)?;
    assert_eq!((output.image.width, output.image.height), (32, 24), "{}", quality);
    assert!(max_channel_spread(&output) <= 1, "{} changed the gray", quality);
  }
  Ok(())
}

#[test]
fn decoding_twice_is_bit_identical() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::from_fn(64, 64, texture)
    .white(16383)
    .color_matrix([9000, -2000, -500, -4000, 12000, 2000, -1000, 2000, 6000])
    .neutral([0.5, 1.0, 0.8])
    .build()?;
  let params = DevelopParams::default();
  let first = develop(&buf, &params)?;
  let second = develop(&buf, &params)?;
  let digest = |out: &DecodeOutput| md5::compute(out.image.pixels.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>());
  assert_eq!(digest(&first), digest(&second));
  assert!(first.warnings.is_empty());
  Ok(())
}

#[test]
fn black_subtraction_clamps_at_zero() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::uniform(16, 16, 0).black(64).white(1023).build()?;
  let output = develop(&buf, &DevelopParams::default())?;
  assert!(output.image.pixels.iter().all(|v| *v == 0));
  Ok(())
}

#[test]
fn missing_matrix_is_a_warning() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::from_fn(16, 16, texture).white(16383).build()?;
  let output = develop(&buf, &DevelopParams::default())?;
  assert_eq!(output.warnings.len(), 1);
  assert_eq!(output.warnings[0].kind(), ErrorKind::ColorProfileMissing);
  assert!(output.image.raw_color);
  Ok(())
}

#[test]
fn half_size_and_sixteen_bit() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::from_fn(32, 16, texture).white(16383).build()?;
  let params = DevelopParams {
    half_size: true,
    output_bps: 16,
    ..Default::default()
  };
  let output = develop(&buf, &params)?;
  assert_eq!((output.image.width, output.image.height), (16, 8));
  assert_eq!(output.image.bps, 16);
  assert_eq!(output.image.pixels.len(), 16 * 8 * 3);
  Ok(())
}

#[test]
fn user_flip_swaps_dimensions() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::from_fn(24, 16, texture).white(16383).build()?;
  let params = DevelopParams {
    user_flip: Some(90),
    ..Default::default()
  };
  let output = develop(&buf, &params)?;
  assert_eq!((output.image.width, output.image.height), (16, 24));
  Ok(())
}

#[test]
fn identify_reports_declared_dimensions() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::uniform(40, 30, 100).white(4095).build()?;
  let id = Pipeline::new(RawSource::new_from_slice(&buf)).identify()?;
  assert_eq!((id.raw_width, id.raw_height), (40, 30));
  assert_eq!((id.width, id.height), (40, 30));
  assert_eq!(id.metadata.make, "Test");
  assert_eq!(id.cfa, "RGGB");
  assert_eq!(id.maximum, 4095);
  assert_eq!(id.decoder, "dng uncompressed");
  assert_eq!(id.md5.len(), 32);

  let yaml = serde_yaml::to_string(&id)?;
  assert!(yaml.contains("raw_width: 40"));
  assert!(yaml.contains("make: Test"));
  Ok(())
}

#[test]
fn identify_canon_heap() -> TestResult {
  init_test_logger();
  let buf = CiffBuilder::new()
    .record(0x080a, b"Canon\0Canon EOS 10D\0")
    .sensor(3152, 2068)
    .finish();
  let id = Pipeline::new(RawSource::new_from_slice(&buf)).identify()?;
  assert_eq!(id.format, FileFormat::Ciff);
  assert_eq!(id.metadata.make, "Canon");
  assert_eq!((id.raw_width, id.raw_height), (3152, 2068));
  assert_eq!((id.width, id.height), (3088, 2056));
  assert_eq!((id.top_margin, id.left_margin), (12, 64));
  assert_eq!(id.decoder, "canon crw");
  Ok(())
}

#[test]
fn netpbm_and_tiff_output() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::from_fn(16, 12, texture).white(16383).build()?;

  let mut pipeline = Pipeline::new(RawSource::new_from_slice(&buf));
  let output = pipeline.develop(&DevelopParams::default())?;
  let mut ppm = Cursor::new(Vec::new());
  pipeline.write(&output, OutputFormat::Ppm, &mut ppm)?;
  assert_eq!(pipeline.state(), PipelineState::Written);
  let ppm = ppm.into_inner();
  let header = b"P6\n16 12\n255\n";
  assert!(ppm.starts_with(header));
  assert_eq!(ppm.len(), header.len() + 16 * 12 * 3);

  let mut pipeline = Pipeline::new(RawSource::new_from_slice(&buf));
  let output = pipeline.develop(&DevelopParams::default())?;
  let mut tiff = Cursor::new(Vec::new());
  pipeline.write(&output, OutputFormat::Tiff, &mut tiff)?;
  let tiff = tiff.into_inner();
  assert!(tiff.starts_with(b"II*\0") || tiff.starts_with(b"MM\0*"));
  // Written files are valid input for format detection
  let mut reread = Pipeline::new(RawSource::new_from_slice(&tiff));
  assert_eq!(reread.sniff()?, FileFormat::Tiff);
  Ok(())
}

#[test]
fn decode_from_reader() -> TestResult {
  init_test_logger();
  let buf = SyntheticDng::uniform(8, 8, 500).white(1023).build()?;
  let output = rawcore::decode(&mut Cursor::new(buf), &DevelopParams::default())?;
  assert_eq!((output.image.width, output.image.height), (8, 8));
  Ok(())
}
