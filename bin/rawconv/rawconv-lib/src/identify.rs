// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::path::PathBuf;

use clap::ArgMatches;
use log::debug;
use rawcore::{Identification, Pipeline, RawSource};
use serde::Serialize;

use crate::{AppError, Result};

fn print_output<T: Serialize + ?Sized>(obj: &T, options: &ArgMatches) -> Result<()> {
  if options.get_flag("yaml") {
    let yaml = serde_yaml::to_string(obj)?;
    println!("{}", yaml);
  } else {
    let json = serde_json::to_string_pretty(obj)?;
    println!("{}", json);
  }
  Ok(())
}

/// Human readable summary, one block per file
pub fn summary(id: &Identification) -> String {
  let md = &id.metadata;
  let mut lines = vec![
    format!("Filename: {}", id.file),
    format!("Format: {} ({})", id.format.name(), id.decoder),
    format!("Camera: {} {}", md.make, md.model),
  ];
  if let Some(ts) = md.timestamp {
    lines.push(format!("Timestamp: {}", ts.format("%a %b %e %T %Y")));
  }
  if let Some(iso) = md.shot.iso_speed {
    lines.push(format!("ISO speed: {}", iso));
  }
  if let Some(shutter) = md.shot.shutter {
    if shutter > 0.0 && shutter < 1.0 {
      lines.push(format!("Shutter: 1/{:.1} sec", 1.0 / shutter));
    } else {
      lines.push(format!("Shutter: {:.1} sec", shutter));
    }
  }
  if let Some(aperture) = md.shot.aperture {
    lines.push(format!("Aperture: f/{:.1}", aperture));
  }
  if let Some(focal) = md.shot.focal_len {
    lines.push(format!("Focal length: {:.1} mm", focal));
  }
  lines.push(format!("Raw size: {} x {}", id.raw_width, id.raw_height));
  lines.push(format!("Image size: {} x {}", id.width, id.height));
  if !id.cfa.is_empty() {
    lines.push(format!("Filter pattern: {}", id.cfa));
  }
  lines.push(format!("Colors: {}, {} bits per sample", id.colors, id.bps));
  lines.push(format!("Black: {}, maximum: {}", id.black, id.maximum));
  let wb = id.camera_wb;
  lines.push(format!("Camera multipliers: {} {} {} {}", wb[0], wb[1], wb[2], wb[3]));
  if !id.has_color_matrix {
    lines.push("No color matrix, raw colors only".into());
  }
  lines.join("\n")
}

/// Entry point for Clap sub command `identify`
pub async fn identify(options: &ArgMatches) -> Result<()> {
  let files: Vec<&PathBuf> = options
    .get_many("FILE")
    .ok_or(AppError::InvalidCmdSwitch("FILE not available".into()))?
    .collect();
  let structured = options.get_flag("json") || options.get_flag("yaml");

  let mut failed = 0;
  let mut ids = Vec::with_capacity(files.len());
  for file in files {
    debug!("Identify {}", file.display());
    let result = RawSource::new(file)
      .map_err(AppError::from)
      .and_then(|source| Pipeline::new(source).identify().map_err(AppError::from));
    match result {
      Ok(id) if structured => ids.push(id),
      Ok(id) => println!("{}\n", summary(&id)),
      Err(err) => {
        eprintln!("{}: {}", file.display(), err);
        failed += 1;
      }
    }
  }
  if structured {
    print_output(&ids, options)?;
  }
  if failed > 0 {
    return Err(AppError::General(format!("{} files could not be identified", failed)));
  }
  Ok(())
}
