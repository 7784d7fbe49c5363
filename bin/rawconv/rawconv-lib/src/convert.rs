// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::ArgMatches;
use futures::future::join_all;
use log::debug;
use rawcore::DevelopParams;
use rawcore::develop::{DemosaicQuality, OutputColor};
use rawcore::output::OutputFormat;

use crate::filemap::{FileMap, MapMode};
use crate::jobs::Job;
use crate::jobs::develop::{DevelopJob, JobResult};
use crate::{AppError, Result};

const SUPPORTED_FILE_EXT: [&str; 23] = [
  "3FR", "ARW", "CR2", "CRW", "DCR", "DNG", "ERF", "IIQ", "KDC", "MEF", "MOS", "MRW", "NEF", "NRW", "ORF", "PEF", "RAF", "RAW", "RW2", "RWL", "SR2", "SRF", "SRW",
];

/// Files developed at the same time
const CONCURRENT_JOBS: usize = 8;

/// Entry point for Clap sub command `convert`
pub async fn convert(options: &ArgMatches) -> crate::Result<()> {
  let now = Instant::now();

  let params = develop_params(options)?;
  let output: &PathBuf = options.get_one("output").ok_or(AppError::InvalidCmdSwitch("OUTPUT not available".into()))?;
  let inputs: Vec<&PathBuf> = options
    .get_many("INPUT")
    .ok_or(AppError::InvalidCmdSwitch("INPUT not available".into()))?
    .collect();
  let format = options
    .get_one::<OutputFormat>("format")
    .copied()
    .or_else(|| OutputFormat::from_path(output))
    .unwrap_or_default();
  let recursive = options.get_flag("recursive");
  if options.get_flag("verbose") {
    eprintln!("Output format: {}, interpolation: {}, color space: {}", format, params.quality, params.output_color);
  }

  if inputs.len() > 1 && !output.is_dir() {
    return Err(AppError::InvalidCmdSwitch(format!(
      "Output '{}' must be an existing directory for multiple inputs",
      output.display()
    )));
  }

  let mut maps: Vec<FileMap> = Vec::new();
  for input in inputs {
    match MapMode::new(input, output, format.extension())? {
      // We have only one input file, so output must be a file, too.
      MapMode::File(map) => maps.push(map),
      MapMode::Dir(map) => {
        eprintln!("Scanning directory, please wait...");
        maps.extend(map.file_list(recursive, format.extension(), is_supported)?);
      }
    }
  }

  let jobs: Vec<DevelopJob> = maps
    .into_iter()
    .map(|map| DevelopJob {
      input: map.src,
      output: map.dest,
      replace: options.get_flag("replace"),
      format,
      params: params.clone(),
    })
    .collect();
  debug!("{} jobs, output format {}", jobs.len(), format);

  let mut results: Vec<JobResult> = Vec::new();
  for chunks in jobs.chunks(CONCURRENT_JOBS) {
    let mut temp: Vec<JobResult> = join_all(chunks.iter().map(|j| j.execute()))
      .await
      .into_iter()
      .map(|res| {
        println!("{}", res);
        res
      })
      .collect();
    results.append(&mut temp);
  }

  let total = results.len();
  let success = results.iter().filter(|j| j.error.is_none()).count();
  let failure = total - success;

  if failure == 0 {
    println!("Converted {}/{} files", success, total);
  } else {
    eprintln!("Converted {}/{} files, {} failed:", success, total, failure);
    for failed in results.iter().filter(|j| j.error.is_some()) {
      eprintln!("   {}", failed.job.input.display());
    }
  }
  println!("Total time: {:.2}s", now.elapsed().as_secs_f32());
  if failure > 0 {
    return Err(AppError::General(format!("{} of {} files failed", failure, total)));
  }
  Ok(())
}

/// Parameters from `--params`, overridden by the command line switches
pub fn develop_params(options: &ArgMatches) -> Result<DevelopParams> {
  let mut params = match options.get_one::<PathBuf>("params") {
    Some(path) => DevelopParams::from_toml_file(path)?,
    None => DevelopParams::default(),
  };
  if options.get_flag("half_size") {
    params.half_size = true;
  }
  if options.get_flag("four_color") {
    params.four_color_rgb = true;
  }
  if options.get_flag("green_matching") {
    params.green_matching = true;
  }
  if options.get_flag("auto_wb") {
    params.use_auto_wb = true;
  }
  if options.get_flag("no_camera_wb") {
    params.use_camera_wb = false;
  }
  if let Some(mul) = options.get_many::<f32>("mul") {
    let mul: Vec<f32> = mul.copied().collect();
    params.user_mul = Some([mul[0], mul[1], mul[2], mul[3]]);
  }
  if let Some(area) = options.get_many::<u32>("greybox") {
    let area: Vec<u32> = area.copied().collect();
    params.greybox = [area[0], area[1], area[2], area[3]];
  }
  if let Some(black) = options.get_one::<u32>("black") {
    params.user_black = Some(*black);
  }
  if let Some(sat) = options.get_one::<u32>("saturation") {
    params.user_sat = Some(*sat);
  }
  if let Some(mode) = options.get_one::<u32>("highlight") {
    params.highlight = *mode;
  }
  if let Some(threshold) = options.get_one::<f32>("threshold") {
    params.threshold = *threshold;
  }
  if let Some(passes) = options.get_one::<u32>("median") {
    params.med_passes = *passes;
  }
  if let Some(quality) = options.get_one::<u32>("quality") {
    params.quality = DemosaicQuality::from_level(*quality);
  }
  if let Some(space) = options.get_one::<OutputColor>("colorspace") {
    params.output_color = *space;
  }
  if options.get_flag("sixteen_bit") {
    params.output_bps = 16;
  }
  if let Some(gamma) = options.get_many::<f64>("gamma") {
    let gamma: Vec<f64> = gamma.copied().collect();
    params.gamma = [gamma[0], gamma[1]];
  }
  if let Some(bright) = options.get_one::<f32>("bright") {
    params.bright = *bright;
  }
  if options.get_flag("no_auto_bright") {
    params.no_auto_bright = true;
  }
  if let Some(flip) = options.get_one::<i32>("flip") {
    params.user_flip = Some(*flip);
  }
  if options.get_flag("document") {
    params.document_mode = true;
  }
  if options.get_flag("no_stretch") {
    params.no_stretch = true;
  }
  if let Some(path) = options.get_one::<PathBuf>("bad_pixels") {
    params.bad_pixels = Some(path.clone());
  }
  if let Some(path) = options.get_one::<PathBuf>("dark_frame") {
    params.dark_frame = Some(path.clone());
  }
  params.validate()?;
  Ok(params)
}

/// Check if file extension is a supported extension
fn is_supported(file: &Path) -> bool {
  match file.extension().map(|ext| ext.to_string_lossy().to_uppercase()) {
    Some(ext) => SUPPORTED_FILE_EXT.iter().any(|e| e.eq(&ext)),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::create_app;

  fn convert_matches(args: &[&str]) -> std::result::Result<ArgMatches, Box<dyn std::error::Error>> {
    let matches = create_app().try_get_matches_from(args)?;
    let (_, sc) = matches.subcommand().ok_or("no subcommand")?;
    Ok(sc.clone())
  }

  #[test]
  fn switches_override_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let sc = convert_matches(&["rawconv", "convert", "-q", "0", "-6", "-H", "2", "-g", "1", "1", "-t", "90", "-o", "out.tiff", "in.CR2"])?;
    let params = develop_params(&sc)?;
    assert_eq!(params.quality, DemosaicQuality::Bilinear);
    assert_eq!(params.output_bps, 16);
    assert_eq!(params.highlight, 2);
    assert_eq!(params.gamma, [1.0, 1.0]);
    assert_eq!(params.user_flip_bits(), Some(6));
    assert!(params.use_camera_wb);
    assert!(params.bad_pixels.is_none());
    Ok(())
  }

  #[test]
  fn correction_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let sc = convert_matches(&["rawconv", "convert", "-P", "dead.txt", "-K", "dark.pgm", "-o", "out.ppm", "in.RAF"])?;
    let params = develop_params(&sc)?;
    assert_eq!(params.bad_pixels, Some(PathBuf::from("dead.txt")));
    assert_eq!(params.dark_frame, Some(PathBuf::from("dark.pgm")));
    Ok(())
  }

  #[test]
  fn raw_extensions_only() {
    assert!(is_supported(Path::new("a/b/IMG_0001.cr2")));
    assert!(is_supported(Path::new("DSC_0001.NEF")));
    assert!(is_supported(Path::new("CF000123.IIQ")));
    assert!(!is_supported(Path::new("IMG_0001.JPG")));
    assert!(!is_supported(Path::new("README")));
  }
}
