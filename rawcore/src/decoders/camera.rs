// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Static camera profiles: color matrix and sensor levels, looked up
//! by a "make model" prefix.

use lazy_static::lazy_static;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::envparams::rawcore_ignore_profiles;

pub static CAMERAS_TOML: &str = include_str!(concat!(env!("OUT_DIR"), "/cameras.toml"));

lazy_static! {
  static ref PROFILES: Vec<CameraProfile> = build_profile_table().unwrap_or_else(|err| {
    error!("Invalid camera profile database: {}", err);
    Vec::new()
  });
}

/// Profile entry, read-only for the whole process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraProfile {
  /// Matched against the start of "make model"
  pub prefix: String,
  /// Black level, 0 keeps the level from the file
  #[serde(default)]
  pub blackpoint: u32,
  /// Saturation level, 0 keeps the level from the file
  #[serde(default)]
  pub whitepoint: u32,
  /// XYZ to camera matrix scaled by 10000, 3 or 4 rows of 3
  #[serde(default)]
  pub color_matrix: Vec<i32>,
}

impl CameraProfile {
  /// XYZ to camera matrix, one row per camera color. None for
  /// profiles that only carry levels.
  pub fn cam_xyz(&self) -> Option<[[f64; 3]; 4]> {
    if self.color_matrix.first().copied().unwrap_or(0) == 0 {
      return None;
    }
    let mut cam_xyz = [[0.0; 3]; 4];
    for (i, v) in self.color_matrix.iter().take(12).enumerate() {
      cam_xyz[i / 3][i % 3] = *v as f64 / 10000.0;
    }
    Some(cam_xyz)
  }

  /// Number of camera colors covered by the matrix
  pub fn colors(&self) -> usize {
    if self.color_matrix.len() >= 12 { 4 } else { 3 }
  }
}

#[derive(Deserialize)]
struct ProfileFile {
  #[serde(default)]
  cameras: Vec<CameraProfile>,
}

fn build_profile_table() -> std::result::Result<Vec<CameraProfile>, toml::de::Error> {
  let table: ProfileFile = toml::from_str(CAMERAS_TOML)?;
  debug!("Loaded {} camera profiles", table.cameras.len());
  Ok(table.cameras)
}

/// All known profiles in lookup order
pub fn profiles() -> &'static [CameraProfile] {
  &PROFILES
}

/// First profile whose prefix matches "make model". Returns None if
/// profiles are disabled by `RAWCORE_IGNORE_PROFILES`.
pub fn lookup_profile(make: &str, model: &str) -> Option<&'static CameraProfile> {
  if rawcore_ignore_profiles() {
    debug!("Camera profiles disabled by environment");
    return None;
  }
  let name = format!("{} {}", make, model);
  PROFILES.iter().find(|p| name.starts_with(&p.prefix))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_is_loaded() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert!(profiles().len() > 300);
    assert!(profiles().iter().all(|p| !p.prefix.is_empty()));
    Ok(())
  }

  #[test]
  fn longest_prefix_listed_first() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let profile = lookup_profile("Canon", "EOS 5D Mark II").ok_or("no profile")?;
    assert_eq!(profile.prefix, "Canon EOS 5D Mark II");
    let profile = lookup_profile("Canon", "EOS 5D").ok_or("no profile")?;
    assert_eq!(profile.prefix, "Canon EOS 5D");
    Ok(())
  }

  #[test]
  fn matrix_scaling() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let profile = CameraProfile {
      prefix: "Test".into(),
      color_matrix: vec![10000, 0, 0, 0, 5000, 0, 0, 0, 2500],
      ..Default::default()
    };
    let m = profile.cam_xyz().ok_or("no matrix")?;
    assert_eq!(m[0], [1.0, 0.0, 0.0]);
    assert_eq!(m[1], [0.0, 0.5, 0.0]);
    assert_eq!(m[2], [0.0, 0.0, 0.25]);
    assert_eq!(profile.colors(), 3);
    assert!(CameraProfile::default().cam_xyz().is_none());
    Ok(())
  }

  #[test]
  fn unknown_camera() -> std::result::Result<(), Box<dyn std::error::Error>> {
    assert!(lookup_profile("Nobody", "Nothing 1").is_none());
    Ok(())
  }
}
