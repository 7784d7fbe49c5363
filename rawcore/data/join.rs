// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

extern crate glob;
use self::glob::glob;
extern crate toml;
use toml::Value;

fn main() {
  join_cameras();
}

/// Concatenate all camera profile definitions into a single
/// TOML document with one `[[cameras]]` table per file section.
fn join_cameras() {
  let out_dir = env::var("OUT_DIR").expect("Missing ENV OUT_DIR");
  let dest_path = Path::new(&out_dir).join("cameras.toml");
  let mut out = File::create(dest_path).expect("Unable to create output file");

  println!("cargo:rerun-if-changed=data/cameras");

  let mut paths: Vec<_> = glob("./data/cameras/**/*.toml")
    .expect("Failed to read glob pattern")
    .map(|entry| entry.expect("Invalid glob entry"))
    .collect();
  paths.sort();

  for path in paths {
    let mut f = File::open(&path).expect("failed to open camera definition file");
    let mut toml = String::new();
    f.read_to_string(&mut toml).expect("Failed to read camera definition file");

    match toml.parse::<Value>() {
      Ok(value) => {
        if value.get("cameras").and_then(|c| c.as_array()).is_none() {
          panic!("Camera file {:?} contains no [[cameras]] tables", path);
        }
      }
      Err(e) => panic!("Error parsing {:?}: {:?}", path, e),
    };

    out.write_all(&toml.into_bytes()).expect("Failed to write");
    out.write_all(b"\n").expect("Failed to write");
  }
}
