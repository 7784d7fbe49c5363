// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use super::Job;
use crate::{AppError, Result};
use async_trait::async_trait;
use log::debug;
use rawcore::{DevelopParams, ErrorKind, Pipeline, RawSource, output::OutputFormat};
use std::{
  fmt::Display,
  fs::{File, create_dir_all, remove_file},
  io::BufWriter,
};
use std::{path::PathBuf, time::Instant};
use tokio::task::spawn_blocking;

/// Job for developing one raw file
#[derive(Debug, Clone)]
pub struct DevelopJob {
  pub input: PathBuf,
  pub output: PathBuf,
  pub replace: bool,
  pub format: OutputFormat,
  pub params: DevelopParams,
}

/// State of conversion
#[derive(Debug)]
pub struct JobResult {
  pub job: DevelopJob,
  pub duration: f32,
  /// Recoverable problems reported by the pipeline
  pub warnings: Vec<String>,
  pub error: Option<AppError>,
}

impl Display for JobResult {
  /// Pretty print the conversion state
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if let Some(error) = self.error.as_ref() {
      f.write_fmt(format_args!("Failed: '{}', {}", self.job.input.display(), error))?;
    } else {
      f.write_fmt(format_args!(
        "Converted '{}' => '{}' (in {:.2}s)",
        self.job.input.display(),
        self.job.output.display(),
        self.duration
      ))?;
      for warning in &self.warnings {
        f.write_fmt(format_args!("\n  Warning: {}", warning))?;
      }
    }
    Ok(())
  }
}

impl DevelopJob {
  fn internal_exec(&self) -> Result<JobResult> {
    if self.output.exists() && !self.replace {
      return Err(AppError::AlreadyExists(self.output.clone()));
    }
    let source = RawSource::new(&self.input)?;
    let mut pipeline = Pipeline::new(source);
    let developed = match pipeline.develop(&self.params) {
      Ok(developed) => developed,
      Err(err) => {
        if err.kind() == ErrorKind::UnsupportedVariant || err.kind() == ErrorKind::UnrecognizedFormat {
          log::error!("Unsupported file: \"{}\"\n{}", self.input.display(), err);
        } else {
          log::error!("Failed to decode file: {}", err);
        }
        return Err(err.into());
      }
    };

    if let Some(parent) = self.output.parent() {
      if !parent.as_os_str().is_empty() {
        create_dir_all(parent)?;
      }
    }
    let mut out = BufWriter::new(File::create(&self.output)?);
    if let Err(err) = pipeline.write(&developed, self.format, &mut out) {
      drop(out);
      if let Err(err) = remove_file(&self.output) {
        log::error!("Failed to delete output file after write error: {:?}", err);
      }
      return Err(err.into());
    }
    out.into_inner().map_err(|err| AppError::Io(err.into_error()))?;

    Ok(JobResult {
      job: self.clone(),
      duration: 0.0,
      warnings: developed.warnings.iter().map(|w| w.to_string()).collect(),
      error: None,
    })
  }
}

#[async_trait]
impl Job for DevelopJob {
  type Output = JobResult;

  async fn execute(&self) -> Self::Output {
    debug!("Job running: input: {:?}, output: {:?}", self.input, self.output);
    let now = Instant::now();
    let cp = self.clone();
    let handle = spawn_blocking(move || cp.internal_exec());
    match handle.await {
      Ok(Ok(mut stat)) => {
        stat.duration = now.elapsed().as_secs_f32();
        stat
      }
      Ok(Err(e)) => JobResult {
        job: self.clone(),
        duration: now.elapsed().as_secs_f32(),
        warnings: Vec::new(),
        error: Some(e),
      },
      Err(e) => JobResult {
        job: self.clone(),
        duration: now.elapsed().as_secs_f32(),
        warnings: Vec::new(),
        error: Some(AppError::General(format!("Join handle failed: {:?}", e))),
      },
    }
  }
}
