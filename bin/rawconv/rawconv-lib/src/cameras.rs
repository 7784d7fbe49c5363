// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use clap::ArgMatches;
use itertools::Itertools;
use rawcore::decoders::profiles;

/// Print list of built-in camera profiles
pub async fn cameras(options: &ArgMatches) -> crate::Result<()> {
  let cameras = profiles();
  let max_name = cameras.iter().map(|c| c.prefix.len()).max().unwrap_or(0);

  let levels = |black: u32, white: u32| {
    [(black > 0).then(|| format!("black {}", black)), (white > 0).then(|| format!("white {}", white))]
      .into_iter()
      .flatten()
      .join(", ")
  };

  if options.get_flag("markdown") {
    println!("# Camera profiles\n");

    println!("| Camera       | Colors | Matrix  | Levels    |");
    println!("|--------------|--------|---------|-----------|");

    for cam in cameras.iter().sorted_by(|a, b| a.prefix.cmp(&b.prefix)) {
      let matrix = if cam.cam_xyz().is_some() { "✅ Yes" } else { "No" };
      println!("| {:max_name$} | {} | {} | {} |", cam.prefix, cam.colors(), matrix, levels(cam.blackpoint, cam.whitepoint));
    }
    println!();
  } else {
    println!("{:-<80}", "");
    println!("{} profiles", cameras.len());
    for cam in cameras.iter().sorted_by(|a, b| a.prefix.cmp(&b.prefix)) {
      let remarks = levels(cam.blackpoint, cam.whitepoint);
      if remarks.is_empty() {
        println!("{:max_name$}  {} colors", cam.prefix, cam.colors());
      } else {
        println!("{:max_name$}  {} colors  ({})", cam.prefix, cam.colors(), remarks);
      }
    }
    println!();
  }
  Ok(())
}
