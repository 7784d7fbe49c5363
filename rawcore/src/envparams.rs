// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use log::warn;

pub(crate) fn rawcore_ignore_profiles() -> bool {
  match std::env::var("RAWCORE_IGNORE_PROFILES").map(|val| val.parse::<u32>()) {
    Ok(Ok(value)) => value == 1,
    Ok(Err(_)) => {
      warn!("Invalid value for RAWCORE_IGNORE_PROFILES");
      false
    }
    Err(_) => false,
  }
}

pub(crate) fn rawcore_max_ifd_depth() -> Option<usize> {
  match std::env::var("RAWCORE_MAX_IFD_DEPTH").map(|val| val.parse::<usize>()) {
    Ok(Ok(value)) => Some(value),
    Ok(Err(_)) => {
      warn!("Invalid value for RAWCORE_MAX_IFD_DEPTH");
      None
    }
    Err(_) => None,
  }
}
