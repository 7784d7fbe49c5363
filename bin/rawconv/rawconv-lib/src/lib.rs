// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::path::PathBuf;

use rawcore::{ErrorKind, RawError};
use thiserror::Error;

pub mod app;
pub mod cameras;
pub mod convert;
pub mod filemap;
pub mod identify;
pub mod jobs;

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const PKG_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Error, Debug)]
pub enum AppError {
  #[error("{}", _0)]
  General(String),
  #[error("Invalid arguments: {}", _0)]
  InvalidCmdSwitch(String),
  #[error("I/O error: {}", _0)]
  Io(#[from] std::io::Error),
  #[error("Not found: {}", _0.display())]
  NotFound(PathBuf),
  #[error("Already exists: {}", _0.display())]
  AlreadyExists(PathBuf),
  #[error("Decoder failed: {}", _0)]
  DecoderFailed(String),
  #[error("Unsupported file: {}", _0)]
  UnsupportedFile(String),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for AppError {
  fn from(value: serde_json::Error) -> Self {
    anyhow::Error::new(value).into()
  }
}

impl From<serde_yaml::Error> for AppError {
  fn from(value: serde_yaml::Error) -> Self {
    anyhow::Error::new(value).into()
  }
}

impl From<RawError> for AppError {
  fn from(value: RawError) -> Self {
    match value.kind() {
      ErrorKind::UnrecognizedFormat | ErrorKind::UnsupportedVariant => Self::UnsupportedFile(value.to_string()),
      _ => Self::DecoderFailed(value.to_string()),
    }
  }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Version string shown by `--version` and written into output files
pub fn version() -> String {
  format!("{} {} (rawcore {})", PKG_NAME, PKG_VERSION, rawcore::VERSION)
}
