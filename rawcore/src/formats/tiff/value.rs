// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::fmt::Display;

use byteorder::{NativeEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use super::{Result, TiffError, WriteAndSeek};

/// Type to represent tiff values of type `RATIONAL`
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Serialize, Deserialize)]
pub struct Rational {
  pub n: u32,
  pub d: u32,
}

impl Rational {
  pub fn new(n: u32, d: u32) -> Self {
    Self { n, d }
  }

  /// Approximate a float with a fixed denominator
  pub fn new_f32(n: f32, d: u32) -> Self {
    Self {
      n: (n * d as f32).round().max(0.0) as u32,
      d,
    }
  }

  pub fn as_f64(&self) -> f64 {
    if self.d == 0 { 0.0 } else { self.n as f64 / self.d as f64 }
  }
}

impl Display for Rational {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("{}/{}", self.n, self.d))
  }
}

/// Type to represent tiff values of type `SRATIONAL`
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Serialize, Deserialize)]
pub struct SRational {
  pub n: i32,
  pub d: i32,
}

impl SRational {
  pub fn new(n: i32, d: i32) -> Self {
    Self { n, d }
  }

  pub fn as_f64(&self) -> f64 {
    if self.d == 0 { 0.0 } else { self.n as f64 / self.d as f64 }
  }
}

impl Display for SRational {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("{}/{}", self.n, self.d))
  }
}

/// ASCII value, possibly containing multiple NUL separated strings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TiffAscii {
  strings: Vec<String>,
}

impl TiffAscii {
  pub fn new<T: AsRef<str>>(value: T) -> Self {
    Self {
      strings: vec![String::from(value.as_ref())],
    }
  }

  pub fn strings(&self) -> &Vec<String> {
    &self.strings
  }

  /// First string, with trailing whitespace removed
  pub fn first(&self) -> &str {
    self.strings.first().map(|s| s.trim_end()).unwrap_or_default()
  }

  pub fn count(&self) -> usize {
    self.as_vec_with_nul().len()
  }

  pub fn as_vec_with_nul(&self) -> Vec<u8> {
    let mut buf = Vec::new();
    for s in &self.strings {
      buf.extend_from_slice(s.as_bytes());
      buf.push(0);
    }
    buf
  }

  /// Decode raw bytes. Non UTF-8 bytes are replaced, parsing stops at
  /// the last NUL.
  pub fn new_from_raw(raw: &[u8]) -> Self {
    let trimmed = match raw.iter().rposition(|b| *b != 0) {
      Some(p) => &raw[..=p],
      None => &[][..],
    };
    let strings = trimmed.split(|b| *b == 0).map(|s| String::from_utf8_lossy(s).into_owned()).collect::<Vec<_>>();
    Self {
      strings: if strings.is_empty() { vec![String::new()] } else { strings },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
  /// 8-bit unsigned integer
  Byte(Vec<u8>),
  /// 8-bit byte that contains a 7-bit ASCII code; the last byte must be zero
  Ascii(TiffAscii),
  /// 16-bit unsigned integer
  Short(Vec<u16>),
  /// 32-bit unsigned integer
  Long(Vec<u32>),
  /// Fraction stored as two 32-bit unsigned integers
  Rational(Vec<Rational>),
  /// 8-bit signed integer
  SByte(Vec<i8>),
  /// 8-bit byte that may contain anything, depending on the field
  Undefined(Vec<u8>),
  /// 16-bit signed integer
  SShort(Vec<i16>),
  /// 32-bit signed integer
  SLong(Vec<i32>),
  /// Fraction stored as two 32-bit signed integers
  SRational(Vec<SRational>),
  /// 32-bit IEEE floating point
  Float(Vec<f32>),
  /// 64-bit IEEE floating point
  Double(Vec<f64>),
  /// Unknown type, wrapped in u8
  Unknown(u16, Vec<u8>),
}

impl Value {
  pub fn as_string(&self) -> Option<&str> {
    match self {
      Self::Ascii(v) => Some(v.first()),
      _ => None,
    }
  }

  /// Value at `idx` converted to u32, 0 if missing.
  /// Mirrors what most RAW writers expect from loosely typed tags.
  pub fn force_u32(&self, idx: usize) -> u32 {
    match self {
      Self::Byte(v) | Self::Undefined(v) | Self::Unknown(_, v) => v.get(idx).copied().unwrap_or(0) as u32,
      Self::Short(v) => v.get(idx).copied().unwrap_or(0) as u32,
      Self::Long(v) => v.get(idx).copied().unwrap_or(0),
      Self::SByte(v) => v.get(idx).copied().unwrap_or(0) as u32,
      Self::SShort(v) => v.get(idx).copied().unwrap_or(0) as u32,
      Self::SLong(v) => v.get(idx).copied().unwrap_or(0) as u32,
      Self::Rational(v) => v.get(idx).map(|r| r.as_f64() as u32).unwrap_or(0),
      Self::SRational(v) => v.get(idx).map(|r| r.as_f64() as u32).unwrap_or(0),
      Self::Float(v) => v.get(idx).copied().unwrap_or(0.0) as u32,
      Self::Double(v) => v.get(idx).copied().unwrap_or(0.0) as u32,
      Self::Ascii(_) => 0,
    }
  }

  pub fn force_u16(&self, idx: usize) -> u16 {
    self.force_u32(idx) as u16
  }

  pub fn force_i32(&self, idx: usize) -> i32 {
    match self {
      Self::SByte(v) => v.get(idx).copied().unwrap_or(0) as i32,
      Self::SShort(v) => v.get(idx).copied().unwrap_or(0) as i32,
      Self::SLong(v) => v.get(idx).copied().unwrap_or(0),
      _ => self.force_u32(idx) as i32,
    }
  }

  /// Value at `idx` converted to a float, rationals are divided.
  pub fn force_f64(&self, idx: usize) -> f64 {
    match self {
      Self::Rational(v) => v.get(idx).map(Rational::as_f64).unwrap_or(0.0),
      Self::SRational(v) => v.get(idx).map(SRational::as_f64).unwrap_or(0.0),
      Self::Float(v) => v.get(idx).copied().unwrap_or(0.0) as f64,
      Self::Double(v) => v.get(idx).copied().unwrap_or(0.0),
      Self::SByte(_) | Self::SShort(_) | Self::SLong(_) => self.force_i32(idx) as f64,
      _ => self.force_u32(idx) as f64,
    }
  }

  pub fn force_f32(&self, idx: usize) -> f32 {
    self.force_f64(idx) as f32
  }

  /// Raw bytes of byte-like values
  pub fn as_bytes(&self) -> Option<&[u8]> {
    match self {
      Self::Byte(v) | Self::Undefined(v) | Self::Unknown(_, v) => Some(v),
      _ => None,
    }
  }

  pub fn visual_rep(&self, limit: usize) -> String {
    fn join<T: Display>(v: &[T], limit: usize) -> String {
      v.iter().take(limit).map(|a| format!("{}", a)).collect::<Vec<String>>().join(" ")
    }
    match self {
      Self::Byte(v) | Self::Undefined(v) | Self::Unknown(_, v) => v.iter().take(limit).map(|a| format!("{:02X}", a)).collect::<Vec<String>>().join(" "),
      Self::Short(v) => join(v, limit),
      Self::Long(v) => join(v, limit),
      Self::Rational(v) => join(v, limit),
      Self::SByte(v) => join(v, limit),
      Self::SShort(v) => join(v, limit),
      Self::SLong(v) => join(v, limit),
      Self::SRational(v) => join(v, limit),
      Self::Float(v) => join(v, limit),
      Self::Double(v) => join(v, limit),
      Self::Ascii(v) => v.first().to_string(),
    }
  }

  pub fn count(&self) -> usize {
    match self {
      Self::Byte(v) => v.len(),
      Self::Ascii(v) => v.count(),
      Self::Short(v) => v.len(),
      Self::Long(v) => v.len(),
      Self::Rational(v) => v.len(),
      Self::SByte(v) => v.len(),
      Self::Undefined(v) => v.len(),
      Self::SShort(v) => v.len(),
      Self::SLong(v) => v.len(),
      Self::SRational(v) => v.len(),
      Self::Float(v) => v.len(),
      Self::Double(v) => v.len(),
      Self::Unknown(_, v) => v.len(),
    }
  }

  pub fn byte_size(&self) -> usize {
    self.count() * type_size(self.value_type())
  }

  /// Value packed into the 4 byte offset field of an IFD entry
  pub fn as_embedded(&self) -> Result<u32> {
    if self.count() == 0 {
      return Err(TiffError::General("Entry has count == 0".into()));
    }
    if self.byte_size() > 4 {
      return Err(TiffError::Overflow(format!("Value of {} bytes can't be embedded", self.byte_size())));
    }
    let mut buf = Vec::with_capacity(4);
    self.write(&mut std::io::Cursor::new(&mut buf))?;
    buf.resize(4, 0);
    Ok(u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]))
  }

  pub fn write(&self, w: &mut dyn WriteAndSeek) -> Result<()> {
    match self {
      Self::Byte(val) | Self::Undefined(val) | Self::Unknown(_, val) => {
        w.write_all(val)?;
      }
      Self::Ascii(val) => {
        w.write_all(&val.as_vec_with_nul())?;
      }
      Self::Short(val) => {
        for x in val {
          w.write_u16::<NativeEndian>(*x)?;
        }
      }
      Self::Long(val) => {
        for x in val {
          w.write_u32::<NativeEndian>(*x)?;
        }
      }
      Self::Rational(val) => {
        for x in val {
          w.write_u32::<NativeEndian>(x.n)?;
          w.write_u32::<NativeEndian>(x.d)?;
        }
      }
      Self::SByte(val) => {
        for x in val {
          w.write_i8(*x)?;
        }
      }
      Self::SShort(val) => {
        for x in val {
          w.write_i16::<NativeEndian>(*x)?;
        }
      }
      Self::SLong(val) => {
        for x in val {
          w.write_i32::<NativeEndian>(*x)?;
        }
      }
      Self::SRational(val) => {
        for x in val {
          w.write_i32::<NativeEndian>(x.n)?;
          w.write_i32::<NativeEndian>(x.d)?;
        }
      }
      Self::Float(val) => {
        for x in val {
          w.write_f32::<NativeEndian>(*x)?;
        }
      }
      Self::Double(val) => {
        for x in val {
          w.write_f64::<NativeEndian>(*x)?;
        }
      }
    }
    Ok(())
  }

  pub fn value_type(&self) -> u16 {
    match self {
      Self::Byte(_) => 1,
      Self::Ascii(_) => 2,
      Self::Short(_) => 3,
      Self::Long(_) => 4,
      Self::Rational(_) => 5,
      Self::SByte(_) => 6,
      Self::Undefined(_) => 7,
      Self::SShort(_) => 8,
      Self::SLong(_) => 9,
      Self::SRational(_) => 10,
      Self::Float(_) => 11,
      Self::Double(_) => 12,
      Self::Unknown(t, _) => *t,
    }
  }

  pub fn value_type_name(&self) -> String {
    match self {
      Self::Byte(_) => "BYTE".into(),
      Self::Ascii(_) => "ASCII".into(),
      Self::Short(_) => "SHORT".into(),
      Self::Long(_) => "LONG".into(),
      Self::Rational(_) => "RATIONAL".into(),
      Self::SByte(_) => "SBYTE".into(),
      Self::Undefined(_) => "UNDEF".into(),
      Self::SShort(_) => "SSHORT".into(),
      Self::SLong(_) => "SLONG".into(),
      Self::SRational(_) => "SRATIONAL".into(),
      Self::Float(_) => "FLOAT".into(),
      Self::Double(_) => "DOUBLE".into(),
      Self::Unknown(t, _) => format!("UNKNOWN ({})", t),
    }
  }
}

/// Byte size of a single element of the given TIFF type.
/// Unknown types are treated as bytes, IFD pointers (13) as longs.
pub fn type_size(typ: u16) -> usize {
  match typ {
    1 | 2 | 6 | 7 => 1,
    3 | 8 => 2,
    4 | 9 | 11 | 13 => 4,
    5 | 10 | 12 => 8,
    _ => 1,
  }
}

macro_rules! value_from {
  ($t:ty, $variant:ident) => {
    impl From<$t> for Value {
      fn from(value: $t) -> Self {
        Value::$variant(vec![value])
      }
    }

    impl From<&[$t]> for Value {
      fn from(value: &[$t]) -> Self {
        Value::$variant(value.to_vec())
      }
    }

    impl From<Vec<$t>> for Value {
      fn from(value: Vec<$t>) -> Self {
        Value::$variant(value)
      }
    }

    impl<const N: usize> From<[$t; N]> for Value {
      fn from(value: [$t; N]) -> Self {
        Value::$variant(value.to_vec())
      }
    }
  };
}

value_from!(u8, Byte);
value_from!(u16, Short);
value_from!(u32, Long);
value_from!(i16, SShort);
value_from!(i32, SLong);
value_from!(f32, Float);
value_from!(f64, Double);
value_from!(Rational, Rational);
value_from!(SRational, SRational);

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::Ascii(TiffAscii::new(value))
  }
}

impl From<&String> for Value {
  fn from(value: &String) -> Self {
    Value::Ascii(TiffAscii::new(value))
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::Ascii(TiffAscii::new(value))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ascii_from_raw_strips_padding() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let ascii = TiffAscii::new_from_raw(b"NIKON CORPORATION \0\0\0");
    assert_eq!(ascii.first(), "NIKON CORPORATION");
    Ok(())
  }

  #[test]
  fn embedded_short_pair() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let v = Value::from([1_u16, 2_u16]);
    let packed = v.as_embedded()?;
    let bytes = packed.to_ne_bytes();
    assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 1);
    assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), 2);
    assert!(Value::from([1_u32, 2_u32]).as_embedded().is_err());
    Ok(())
  }

  #[test]
  fn rational_forcing() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let v = Value::Rational(vec![Rational::new(1, 250), Rational::new(0, 0)]);
    assert!((v.force_f64(0) - 0.004).abs() < 1e-9);
    assert_eq!(v.force_f64(1), 0.0);
    assert_eq!(v.force_u32(5), 0);
    Ok(())
  }
}
