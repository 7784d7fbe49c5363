// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use log::trace;
use serde::{Deserialize, Serialize};

use crate::bits::Endian;

use super::value::type_size;
use super::{Rational, Result, SRational, TiffAscii, TiffError, Value};

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_SBYTE: u16 = 6;
const TYPE_UNDEFINED: u16 = 7;
const TYPE_SSHORT: u16 = 8;
const TYPE_SLONG: u16 = 9;
const TYPE_SRATIONAL: u16 = 10;
const TYPE_FLOAT: u16 = 11;
const TYPE_DOUBLE: u16 = 12;
const TYPE_IFD: u16 = 13;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
  pub tag: u16,
  pub value: Value,
  /// Absolute file offset of the value data for parsed entries,
  /// the embedded value or data offset once written.
  pub embedded: Option<u32>,
}

impl std::ops::Deref for Entry {
  type Target = Value;

  fn deref(&self) -> &Self::Target {
    &self.value
  }
}

impl Entry {
  pub fn value_type(&self) -> u16 {
    self.value.value_type()
  }

  pub fn count(&self) -> u32 {
    self.value.count() as u32
  }

  /// Absolute offset of the value data inside the file
  pub fn offset(&self) -> Option<usize> {
    self.embedded.map(|v| v as usize)
  }

  /// Parse the 12 byte entry at `pos`. Offsets stored in the entry are
  /// relative to `base`. Values that would extend past the end of `buf`
  /// are rejected as corrupt.
  pub fn parse(buf: &[u8], pos: usize, base: u32, endian: Endian) -> Result<Entry> {
    let header = buf
      .get(pos..pos + 12)
      .ok_or_else(|| TiffError::Corrupt(format!("IFD entry at {} is behind EOF ({} bytes)", pos, buf.len())))?;
    let tag = endian.read_u16(header, 0);
    let typ = endian.read_u16(header, 2);
    let count = endian.read_u32(header, 4);

    trace!("Tag: {:#x}, Typ: {:#x}, count: {}", tag, typ, count);

    let bytesize = count as u64 * type_size(typ) as u64;
    let offset: u64 = if bytesize <= 4 {
      (pos + 8) as u64
    } else {
      base as u64 + endian.read_u32(header, 8) as u64
    };

    if offset + bytesize > buf.len() as u64 {
      return Err(TiffError::Corrupt(format!(
        "Tag {:#x} declares {} bytes at offset {}, but file has only {} bytes",
        tag,
        bytesize,
        offset,
        buf.len()
      )));
    }
    let data = &buf[offset as usize..(offset + bytesize) as usize];
    let n = count as usize;

    let value = match typ {
      TYPE_BYTE => Value::Byte(data.to_vec()),
      TYPE_ASCII => Value::Ascii(TiffAscii::new_from_raw(data)),
      TYPE_SHORT => Value::Short((0..n).map(|i| endian.read_u16(data, i * 2)).collect()),
      TYPE_LONG | TYPE_IFD => Value::Long((0..n).map(|i| endian.read_u32(data, i * 4)).collect()),
      TYPE_RATIONAL => Value::Rational(
        (0..n)
          .map(|i| Rational::new(endian.read_u32(data, i * 8), endian.read_u32(data, i * 8 + 4)))
          .collect(),
      ),
      TYPE_SBYTE => Value::SByte(data.iter().map(|b| *b as i8).collect()),
      TYPE_UNDEFINED => Value::Undefined(data.to_vec()),
      TYPE_SSHORT => Value::SShort((0..n).map(|i| endian.read_i16(data, i * 2)).collect()),
      TYPE_SLONG => Value::SLong((0..n).map(|i| endian.read_i32(data, i * 4)).collect()),
      TYPE_SRATIONAL => Value::SRational(
        (0..n)
          .map(|i| SRational::new(endian.read_i32(data, i * 8), endian.read_i32(data, i * 8 + 4)))
          .collect(),
      ),
      TYPE_FLOAT => Value::Float((0..n).map(|i| endian.read_f32(data, i * 4)).collect()),
      TYPE_DOUBLE => Value::Double((0..n).map(|i| endian.read_f64(data, i * 8)).collect()),
      x => Value::Unknown(x, data.to_vec()),
    };

    Ok(Entry {
      tag,
      value,
      embedded: Some(offset as u32),
    })
  }

  pub fn type_name(&self) -> String {
    self.value.value_type_name()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_embedded_short() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // tag 0x0100, SHORT, count 1, value 640
    let buf = [0x00, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x80, 0x02, 0x00, 0x00];
    let entry = Entry::parse(&buf, 0, 0, Endian::Little)?;
    assert_eq!(entry.tag, 256);
    assert_eq!(entry.force_u32(0), 640);
    assert_eq!(entry.offset(), Some(8));
    Ok(())
  }

  #[test]
  fn oversized_count_is_corrupt() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // LONG with count 0x10000 pointing at offset 0
    let buf = [0x00, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
    let err = Entry::parse(&buf, 0, 0, Endian::Little);
    assert!(matches!(err, Err(TiffError::Corrupt(_))));
    Ok(())
  }
}
