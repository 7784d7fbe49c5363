// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::{
  collections::BTreeMap,
  io::{Seek, SeekFrom, Write},
};

use byteorder::{NativeEndian, WriteBytesExt};

use crate::tags::TiffTag;

use super::{Entry, Result, TIFF_MAGIC, TiffError, Value};

/// Writes a TIFF file in native byte order
pub struct TiffWriter<'w> {
  ifd_location: u64,
  pub writer: &'w mut (dyn WriteAndSeek + Send),
}

pub trait WriteAndSeek: Write + Seek {}

impl<T> WriteAndSeek for T where T: Write + Seek {}

impl<'w> TiffWriter<'w> {
  pub fn new<T: WriteAndSeek + Send>(writer: &'w mut T) -> Result<Self> {
    let mut tmp = Self { writer, ifd_location: 0 };
    tmp.write_header()?;
    Ok(tmp)
  }

  pub fn new_directory(&mut self) -> DirectoryWriter<'_, 'w> {
    DirectoryWriter::new(self)
  }

  fn write_header(&mut self) -> Result<()> {
    #[cfg(target_endian = "little")]
    let boi: u8 = 0x49;
    #[cfg(not(target_endian = "little"))]
    let boi: u8 = 0x4d;

    self.writer.write_all(&[boi, boi])?;
    self.writer.write_u16::<NativeEndian>(TIFF_MAGIC)?;
    self.ifd_location = self.writer.stream_position()?;
    self.writer.write_u32::<NativeEndian>(0_u32)?;

    Ok(())
  }

  pub(crate) fn pad_word_boundary(&mut self) -> Result<()> {
    let pos = self.position()?;
    if pos % 4 != 0 {
      let padding = [0, 0, 0];
      let padd_len = 4 - (pos % 4);
      self.writer.write_all(&padding[..padd_len as usize])?;
    }
    Ok(())
  }

  /// Patch the header with the offset of IFD0 and finish the file.
  pub fn build(self, ifd0_offset: u32) -> Result<()> {
    let end = self.writer.stream_position()?;
    self.writer.seek(SeekFrom::Start(self.ifd_location))?;
    self.writer.write_u32::<NativeEndian>(ifd0_offset)?;
    self.writer.seek(SeekFrom::Start(end))?;
    Ok(())
  }

  pub fn position(&mut self) -> Result<u32> {
    let pos = self.writer.stream_position()?;
    u32::try_from(pos).map_err(|_| TiffError::Overflow(format!("TIFF offset {} exceeds 4 GiB", pos)))
  }

  /// Write a data block (e.g. strip data) at a word boundary and return its offset
  pub fn write_data(&mut self, data: &[u8]) -> Result<u32> {
    self.pad_word_boundary()?;
    let offset = self.position()?;
    self.writer.write_all(data)?;
    Ok(offset)
  }
}

pub struct DirectoryWriter<'a, 'w> {
  pub tiff: &'a mut TiffWriter<'w>,
  // We use BTreeMap to make sure tags are written in correct order
  entries: BTreeMap<u16, Entry>,
  next_ifd: u32,
}

impl<'a, 'w> DirectoryWriter<'a, 'w> {
  pub fn new(tiff: &'a mut TiffWriter<'w>) -> Self {
    Self {
      tiff,
      entries: BTreeMap::new(),
      next_ifd: 0,
    }
  }

  pub fn entry_count(&self) -> u16 {
    self.entries.len() as u16
  }

  /// Write all out-of-line values, then the directory itself.
  /// Returns the offset of the directory.
  pub fn build(mut self) -> Result<u32> {
    if self.entries.is_empty() {
      return Err(TiffError::General("IFD is empty, not allowed by TIFF specification".to_string()));
    }
    for entry in self.entries.values_mut() {
      if entry.value.byte_size() > 4 {
        self.tiff.pad_word_boundary()?;
        let offset = self.tiff.position()?;
        entry.value.write(self.tiff.writer)?;
        entry.embedded = Some(offset);
      } else {
        entry.embedded = Some(entry.value.as_embedded()?);
      }
    }

    self.tiff.pad_word_boundary()?;
    let offset = self.tiff.position()?;

    self.tiff.writer.write_u16::<NativeEndian>(self.entry_count())?;
    for (tag, entry) in &self.entries {
      self.tiff.writer.write_u16::<NativeEndian>(*tag)?;
      self.tiff.writer.write_u16::<NativeEndian>(entry.value_type())?;
      self.tiff.writer.write_u32::<NativeEndian>(entry.count())?;
      self.tiff.writer.write_u32::<NativeEndian>(entry.embedded.unwrap_or(0))?;
    }
    self.tiff.writer.write_u32::<NativeEndian>(self.next_ifd)?; // Next IFD

    Ok(offset)
  }

  pub fn add_tag<T: TiffTag, V: Into<Value>>(&mut self, tag: T, value: V) -> Result<()> {
    let tag: u16 = tag.into();
    self.entries.insert(
      tag,
      Entry {
        tag,
        value: value.into(),
        embedded: None,
      },
    );
    Ok(())
  }

  pub fn add_tag_undefined<T: TiffTag>(&mut self, tag: T, data: Vec<u8>) -> Result<()> {
    self.add_tag(tag, Value::Undefined(data))
  }

  pub fn write_data(&mut self, data: &[u8]) -> Result<u32> {
    self.tiff.write_data(data)
  }
}
