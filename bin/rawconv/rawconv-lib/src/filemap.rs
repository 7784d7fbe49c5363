// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::{
  fs::{self, read_dir},
  path::{Path, PathBuf},
};

use log::warn;

use crate::{AppError, Result};

/// Input file and the output it is written to
#[derive(Debug, Clone, PartialEq)]
pub struct FileMap {
  pub src: PathBuf,
  pub dest: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DirMap {
  pub src: PathBuf,
  pub dest: PathBuf,
}

/// Process mode
#[derive(Debug, Clone)]
pub enum MapMode {
  File(FileMap),
  Dir(DirMap),
}

impl DirMap {
  /// Get file list of source/destination mapped files
  pub fn file_list<F>(&self, recursive: bool, extension: &str, filter: F) -> Result<Vec<FileMap>>
  where
    F: Fn(&Path) -> bool + Copy,
  {
    read_filtered_dir(&self.src, recursive, filter)?
      .into_iter()
      .map(|entry| self.make_mapping(&entry, extension))
      .collect()
  }

  /// Map `input` path to output, keeping sub directories
  fn make_mapping(&self, input: &Path, extension: &str) -> Result<FileMap> {
    let sub_location = input
      .strip_prefix(&self.src)
      .map_err(|_| AppError::General(format!("{} is not inside {}", input.display(), self.src.display())))?;
    Ok(FileMap {
      src: PathBuf::from(input),
      dest: self.dest.join(sub_location).with_extension(extension),
    })
  }
}

impl MapMode {
  /// Map one input to `output`. If `output` is an existing directory, files
  /// are placed inside it with `extension`.
  pub fn new(input: &Path, output: &Path, extension: &str) -> Result<MapMode> {
    if !input.exists() {
      return Err(AppError::NotFound(input.to_owned()));
    }
    let input_md = input.metadata()?;

    if input_md.is_file() {
      let dest = if output.is_dir() {
        let name = input.file_name().ok_or(AppError::General(format!("{} has no filename", input.display())))?;
        output.join(name).with_extension(extension)
      } else {
        output.to_owned()
      };
      Ok(MapMode::File(FileMap {
        src: input.canonicalize()?,
        dest,
      }))
    } else if input_md.is_dir() {
      if !output.exists() {
        return Err(AppError::NotFound(output.to_owned()));
      }
      if !output.metadata()?.is_dir() {
        return Err(AppError::InvalidCmdSwitch(format!(
          "Output '{}' must be a directory, because input is a directory",
          output.display()
        )));
      }
      Ok(MapMode::Dir(DirMap {
        src: input.canonicalize()?,
        dest: output.canonicalize()?,
      }))
    } else {
      Err(AppError::General(format!("Unable to determine type of {}", input.display())))
    }
  }
}

/// Read directory (optionally recursive) and filter entries
fn read_filtered_dir<F>(input: &Path, recursive: bool, filter: F) -> Result<Vec<PathBuf>>
where
  F: Fn(&Path) -> bool + Copy,
{
  let mut result = Vec::new();
  let dir = read_dir(input)?;
  for entry in dir {
    let entry = entry?;
    let in_md = fs::metadata(entry.path())?;
    if in_md.is_file() {
      if filter(&entry.path()) {
        result.push(entry.path());
      }
    } else if in_md.is_dir() {
      if recursive {
        result.extend(read_filtered_dir(&entry.path(), recursive, filter)?);
      }
    } else {
      // If we hit sockets, device files etc. just warn and ignore them.
      warn!("Unable to determine type of {}", entry.path().display());
    }
  }
  result.sort();
  Ok(result)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_into_directory_gets_new_extension() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("rawconv-filemap-{}", std::process::id()));
    fs::create_dir_all(dir.join("sub"))?;
    fs::write(dir.join("IMG_0001.CRW"), b"x")?;
    fs::write(dir.join("sub/IMG_0002.NEF"), b"x")?;
    fs::write(dir.join("notes.txt"), b"x")?;

    match MapMode::new(&dir.join("IMG_0001.CRW"), &dir, "ppm")? {
      MapMode::File(map) => assert_eq!(map.dest, dir.join("IMG_0001.ppm")),
      MapMode::Dir(_) => return Err("expected a file mapping".into()),
    }

    match MapMode::new(&dir, &dir, "tiff")? {
      MapMode::Dir(map) => {
        let is_raw = |p: &Path| p.extension().is_some_and(|e| e != "txt");
        assert_eq!(map.file_list(false, "tiff", is_raw)?.len(), 1);
        let list = map.file_list(true, "tiff", is_raw)?;
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|m| m.dest.ends_with("sub/IMG_0002.tiff")));
      }
      MapMode::File(_) => return Err("expected a directory mapping".into()),
    }
    fs::remove_dir_all(&dir)?;
    Ok(())
  }
}
