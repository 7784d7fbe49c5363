// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Drives a single file from the raw bytes to the written image.
//!
//! The state only moves forward. A failing step leaves the pipeline in
//! [`PipelineState::Failed`] and the error carries the stage and the
//! detected format.

use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::decoders::{FileFormat, Identified, identify};
use crate::develop::DevelopParams;
use crate::formats::tiff::WriteAndSeek;
use crate::image::DecodedImage;
use crate::imgop::develop::{ColorInfo, RawDevelop};
use crate::metadata::ImageMetadata;
use crate::output::{OutputFormat, write_image};
use crate::rawimage::RawFrame;
use crate::rawsource::RawSource;
use crate::{RawError, Result, corrupt};

/// Step of the pipeline, attached to errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
  Sniff,
  Metadata,
  Decode,
  Develop,
  Write,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Sniff => "format detection",
      Self::Metadata => "metadata parsing",
      Self::Decode => "raw decoding",
      Self::Develop => "development",
      Self::Write => "output",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Unopened,
  Sniffed,
  MetadataParsed,
  RawDecoded,
  Demosaiced,
  Written,
  /// Terminal, remaining steps are refused
  Failed(Stage),
}

/// What `identify` reports about a file, without decoding pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
  pub file: String,
  pub md5: String,
  pub format: FileFormat,
  pub metadata: ImageMetadata,
  pub raw_width: usize,
  pub raw_height: usize,
  pub width: usize,
  pub height: usize,
  pub top_margin: usize,
  pub left_margin: usize,
  /// Pattern name, empty for full color sensors
  pub cfa: String,
  pub colors: usize,
  pub bps: u32,
  pub decoder: String,
  pub black: u32,
  pub maximum: u32,
  pub camera_wb: [f32; 4],
  pub has_color_matrix: bool,
  pub pixel_aspect: f64,
}

/// Developed image with the metadata worth keeping
#[derive(Debug)]
pub struct DecodeOutput {
  pub format: FileFormat,
  pub image: DecodedImage,
  pub metadata: ImageMetadata,
  /// Recoverable problems, see [`crate::ErrorKind::ColorProfileMissing`]
  pub warnings: Vec<RawError>,
}

pub struct Pipeline {
  source: RawSource,
  state: PipelineState,
  format: Option<FileFormat>,
}

impl Pipeline {
  pub fn new(source: RawSource) -> Self {
    Self {
      source,
      state: PipelineState::Unopened,
      format: None,
    }
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  pub fn source(&self) -> &RawSource {
    &self.source
  }

  fn format_name(&self) -> &'static str {
    self.format.map(|f| f.name()).unwrap_or("unknown")
  }

  fn advance(&mut self, next: PipelineState) {
    debug!("{}: {:?} -> {:?} ({})", self.source.path().display(), self.state, next, self.format_name());
    self.state = next;
  }

  /// Steps must follow each other, a failed pipeline stays failed
  fn expect(&self, stage: Stage, state: PipelineState) -> Result<()> {
    if self.state == state {
      return Ok(());
    }
    Err(RawError::InvalidState(format!("{} requested in state {:?}", stage, self.state)))
  }

  fn fail(&mut self, stage: Stage, err: RawError) -> RawError {
    warn!("{}: {} failed: {}", self.source.path().display(), stage, err);
    self.state = PipelineState::Failed(stage);
    err.at_stage(stage, self.format_name())
  }

  fn run<T>(&mut self, stage: Stage, from: PipelineState, to: PipelineState, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
    self.expect(stage, from).map_err(|err| err.at_stage(stage, self.format_name()))?;
    match op(self) {
      Ok(val) => {
        self.advance(to);
        Ok(val)
      }
      Err(err) => Err(self.fail(stage, err)),
    }
  }

  /// Detect the container by content
  pub fn sniff(&mut self) -> Result<FileFormat> {
    self.run(Stage::Sniff, PipelineState::Unopened, PipelineState::Sniffed, |p| {
      let format = FileFormat::sniff(p.source.buf())?;
      p.format = Some(format);
      Ok(format)
    })
  }

  /// Walk the metadata and resolve the layout of the payload
  pub fn parse_metadata(&mut self) -> Result<Identified> {
    let format = match self.format {
      Some(format) => format,
      None => self.sniff()?,
    };
    self.run(Stage::Metadata, PipelineState::Sniffed, PipelineState::MetadataParsed, |p| identify(p.source.buf(), format))
  }

  /// Decode the sensor payload
  pub fn decode_raw(&mut self, id: &Identified) -> Result<RawFrame> {
    self.run(Stage::Decode, PipelineState::MetadataParsed, PipelineState::RawDecoded, |p| {
      let now = Instant::now();
      let frame = id.layout.decoder.decode(p.source.buf(), &id.layout)?;
      let expected = id.layout.frame_dim();
      if frame.dim != expected || frame.data.len() != frame.dim.w * frame.dim.h * frame.cpp {
        return Err(corrupt!(
          "decoded frame of {}x{} does not match the declared {}x{}",
          frame.dim.w,
          frame.dim.h,
          expected.w,
          expected.h
        ));
      }
      debug!("Raw decoding took {:.5}s", now.elapsed().as_secs_f32());
      Ok(frame)
    })
  }

  /// Sniff and parse metadata only
  pub fn identify(&mut self) -> Result<Identification> {
    let id = self.parse_metadata()?;
    let layout = &id.layout;
    Ok(Identification {
      file: self.source.path().display().to_string(),
      md5: hex::encode(self.source.digest().0),
      format: id.format,
      metadata: id.md.into_image_metadata(layout.orientation),
      raw_width: layout.raw_dim.w,
      raw_height: layout.raw_dim.h,
      width: layout.visible_dim().w,
      height: layout.visible_dim().h,
      top_margin: layout.crop.p.y,
      left_margin: layout.crop.p.x,
      cfa: if layout.colors == 3 { layout.cfa.merge_greens().name() } else { layout.cfa.name() },
      colors: layout.colors,
      bps: layout.bps,
      decoder: layout.decoder.name().to_string(),
      black: layout.black,
      maximum: layout.maximum,
      camera_wb: id.md.wb.get(),
      has_color_matrix: layout.cam_xyz.is_some() || id.md.cmatrix.is_some(),
      pixel_aspect: layout.pixel_aspect,
    })
  }

  /// Run all steps up to the developed image
  pub fn develop(&mut self, params: &DevelopParams) -> Result<DecodeOutput> {
    let id = self.parse_metadata()?;
    let frame = self.decode_raw(&id)?;
    let color = ColorInfo::new(&id.md, &id.layout);
    let developer = RawDevelop::new(params.clone());
    let developed = self.run(Stage::Develop, PipelineState::RawDecoded, PipelineState::Demosaiced, |_| developer.develop(frame, &color))?;
    info!(
      "{}: {} {} developed to {}x{}",
      self.source.path().display(),
      id.md.make,
      id.md.model,
      developed.image.width,
      developed.image.height
    );
    Ok(DecodeOutput {
      format: id.format,
      image: developed.image,
      metadata: id.md.into_image_metadata(id.layout.orientation),
      warnings: developed.warnings,
    })
  }

  /// Serialize a developed image, the last step
  pub fn write<W: WriteAndSeek + Send>(&mut self, output: &DecodeOutput, format: OutputFormat, writer: &mut W) -> Result<()> {
    self.run(Stage::Write, PipelineState::Demosaiced, PipelineState::Written, |_| {
      write_image(writer, format, &output.image, &output.metadata)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ErrorKind;

  #[test]
  fn unknown_bytes_fail_at_sniff() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = Pipeline::new(RawSource::new_from_slice(&[0x42; 100]));
    let err = pipeline.develop(&DevelopParams::default()).err().ok_or("decoded garbage")?;
    assert_eq!(err.kind(), ErrorKind::UnrecognizedFormat);
    assert!(matches!(err, RawError::Stage { stage: Stage::Sniff, .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed(Stage::Sniff));
    // No way back from a failure
    let err = pipeline.sniff().err().ok_or("failed pipeline restarted")?;
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(pipeline.state(), PipelineState::Failed(Stage::Sniff));
    Ok(())
  }

  #[test]
  fn steps_keep_their_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut tiff = b"II*\0\x08\0\0\0".to_vec();
    tiff.resize(64, 0);
    let mut pipeline = Pipeline::new(RawSource::new_from_slice(&tiff));
    assert_eq!(pipeline.sniff()?, FileFormat::Tiff);
    assert_eq!(pipeline.state(), PipelineState::Sniffed);
    let err = pipeline.sniff().err().ok_or("sniffed twice")?;
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(matches!(err, RawError::Stage { stage: Stage::Sniff, .. }));
    Ok(())
  }
}
