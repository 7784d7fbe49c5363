// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Canon CRW records

use log::debug;

use super::{MetadataBundle, timestamp_from_unix};
use crate::Result;
use crate::formats::ciff::{CiffFile, CiffRecord};
use crate::pumps::ByteStream;
use crate::rawimage::Orientation;

/// XOR key of the obfuscated white balance values
const WB_KEY: [u16; 2] = [0x410, 0x45f3];

/// Parse all heaps and apply their records in file order
pub fn parse_ciff(buf: &[u8], md: &mut MetadataBundle) -> Result<CiffFile> {
  let ciff = CiffFile::parse(buf)?;
  let mut wbi: i32 = -1;
  for rec in &ciff.records {
    let mut s = ByteStream::new(rec.tail(buf), ciff.endian);
    if let Err(err) = apply_record(&mut s, rec, buf, &mut wbi, md) {
      debug!("CIFF: record {:#06x} at {} is unreadable: {}", rec.typ, rec.offset, err);
    }
  }
  Ok(ciff)
}

fn apply_record(s: &mut ByteStream, rec: &CiffRecord, buf: &[u8], wbi: &mut i32, md: &mut MetadataBundle) -> Result<()> {
  match rec.typ {
    0x0810 => md.artist = MetadataBundle::cstr(&rec.data(buf)[..rec.data(buf).len().min(64)]),
    0x080a => {
      let data = rec.data(buf);
      md.make = MetadataBundle::cstr(data);
      let model_at = data.iter().position(|b| *b == 0).map_or(data.len(), |p| p + 1);
      md.model = MetadataBundle::cstr(&data[model_at..]);
    }
    0x1810 => {
      s.seek(12);
      let degrees = s.get_u32()? as i32;
      md.flip = Some(Orientation::from_degrees(degrees).flip_bits());
    }
    0x1835 => md.tiff_compress = Some(s.get_u32()?),
    0x1818 => {
      s.seek(4);
      md.shot.shutter = Some(2_f32.powf(-f32::from_bits(s.get_u32()?)));
      md.shot.aperture = Some(2_f32.powf(f32::from_bits(s.get_u32()?) / 2.0));
    }
    0x102a => {
      s.seek(4);
      md.shot.iso_speed = Some(2_f32.powf(s.get_u16()? as f32 / 32.0 - 4.0) * 50.0);
      s.seek(8);
      md.shot.aperture = Some(2_f32.powf(s.get_u16()? as i16 as f32 / 64.0));
      let shutter = 2_f32.powf(-(s.get_u16()? as i16 as f32) / 32.0);
      s.seek(14);
      *wbi = s.get_u16()? as i32;
      if *wbi > 17 {
        *wbi = 0;
      }
      md.shot.shutter = Some(if shutter > 1e6 {
        s.seek(48);
        s.get_u16()? as f32 / 10.0
      } else {
        shutter
      });
    }
    0x102c => {
      let mut mul = [0.0; 4];
      if s.get_u16()? > 512 {
        // Pro90, G1
        s.seek(120);
        for c in 0..4 {
          mul[c ^ 2] = s.get_u16()? as f32;
        }
      } else {
        s.seek(100);
        for c in 0..4 {
          mul[c ^ (c >> 1) ^ 1] = s.get_u16()? as f32;
        }
      }
      md.wb.set(mul);
    }
    0x0032 => color_info(s, rec, *wbi, md)?,
    0x10a9 => {
      if rec.len > 66 {
        if let Some(d) = usize::try_from(*wbi).ok().and_then(|i| b"0134567028".get(i)) {
          *wbi = (d - b'0') as i32;
        }
      }
      if *wbi >= 0 {
        s.seek(2 + *wbi as usize * 8);
        let mut mul = [0.0; 4];
        for c in 0..4 {
          mul[c ^ (c >> 1)] = s.get_u16()? as f32;
        }
        md.wb.set(mul);
      }
    }
    0x1030 if (0..32).contains(&*wbi) && (0x18040 >> *wbi) & 1 == 1 => {
      md.white_sample = white_sample(s)?;
    }
    0x1031 => {
      s.seek(2);
      md.raw_width = Some(s.get_u16()? as u32);
      md.raw_height = Some(s.get_u16()? as u32);
    }
    0x5029 => {
      let mut focal = (rec.len >> 16) as f32;
      if rec.len & 0xffff == 2 {
        focal /= 32.0;
      }
      md.shot.focal_len = Some(focal);
    }
    0x5817 => md.shot.shot_order = Some(rec.len),
    0x5834 => md.unique_id = rec.len,
    0x580e => md.timestamp = timestamp_from_unix(rec.len),
    0x180e => md.timestamp = timestamp_from_unix(s.get_u32()?),
    _ => {}
  }
  Ok(())
}

/// White balance table of the PowerShot models and the EOS D30
fn color_info(s: &mut ByteStream, rec: &CiffRecord, wbi: i32, md: &mut MetadataBundle) -> Result<()> {
  let mut mul = [0.0; 4];
  if rec.len == 768 {
    // EOS D30
    s.seek(72);
    for c in 0..4 {
      mul[c ^ (c >> 1)] = 1024.0 / s.get_u16()?.max(1) as f32;
    }
  } else if md.wb.get()[0] == 0.0 {
    let Some(wbi) = usize::try_from(wbi).ok().filter(|i| *i < 18) else {
      debug!("CIFF: no white balance index for color info");
      return Ok(());
    };
    let (idx, key) = if s.get_u16()? == WB_KEY[0] {
      // Pro1, G6, S60, S70
      let table = if md.model.contains("Pro1") { b"012346000000000000" } else { b"01345:000000006008" };
      ((table[wbi] - b'0') as usize + 2, WB_KEY)
    } else {
      // G3, G5, S45, S50
      ((b"023457000000006000"[wbi] - b'0') as usize, [0, 0])
    };
    s.seek(2 + 78 + idx * 8);
    for c in 0..4 {
      mul[c ^ (c >> 1) ^ 1] = (s.get_u16()? ^ key[c & 1]) as f32;
    }
  } else {
    return Ok(());
  }
  md.wb.set(mul);
  if wbi == 0 {
    md.wb.request_auto();
  }
  Ok(())
}

/// 8x8 white sample, obfuscated 10 or 12 bit values
fn white_sample(s: &mut ByteStream) -> Result<Option<[[u16; 8]; 8]>> {
  s.seek(2);
  if s.get_u32()? != 0x80008 || s.get_u32()? == 0 {
    return Ok(None);
  }
  let bpp = s.get_u16()? as u32;
  if bpp != 10 && bpp != 12 {
    return Ok(None);
  }
  let mut white = [[0_u16; 8]; 8];
  let mut bitbuf: u64 = 0;
  let mut vbits = 0;
  let mut i = 0;
  for v in white.iter_mut().flatten() {
    if vbits < bpp {
      bitbuf = bitbuf << 16 | (s.get_u16()? ^ WB_KEY[i & 1]) as u64;
      i += 1;
      vbits += 16;
    }
    *v = (bitbuf << (64 - vbits) >> (64 - bpp)) as u16;
    vbits -= bpp;
  }
  Ok(Some(white))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bits::Endian;

  struct HeapBuilder {
    data: Vec<u8>,
    records: Vec<(u16, u32, u32)>,
  }

  impl HeapBuilder {
    fn new() -> Self {
      Self {
        data: Vec::new(),
        records: Vec::new(),
      }
    }

    fn record(&mut self, typ: u16, value: &[u8]) {
      self.records.push((typ, value.len() as u32, self.data.len() as u32));
      self.data.extend_from_slice(value);
    }

    fn inline(&mut self, typ: u16, value: u32) {
      self.records.push((typ, value, 0));
    }

    fn finish(self) -> Vec<u8> {
      let mut buf = b"II\x1a\0\0\0HEAPCCDR".to_vec();
      buf.resize(26, 0);
      let table = self.data.len() as u32;
      buf.extend_from_slice(&self.data);
      buf.extend_from_slice(&(self.records.len() as u16).to_le_bytes());
      for (typ, len, off) in self.records {
        buf.extend_from_slice(&typ.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&off.to_le_bytes());
      }
      buf.extend_from_slice(&table.to_le_bytes());
      buf
    }
  }

  fn shorts(values: &[(usize, u16)], len: usize) -> Vec<u8> {
    let mut v = vec![0_u16; len];
    for (i, x) in values {
      v[*i] = *x;
    }
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
  }

  #[test]
  fn records_to_metadata() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut heap = HeapBuilder::new();
    heap.record(0x080a, b"Canon\0Canon EOS 10D\0");
    // ISO 100, wbi 1 at short 7
    heap.record(0x102a, &shorts(&[(2, 160), (4, 256), (5, 256), (7, 1)], 32));
    // 67 bytes: wbi 1 maps to table entry 1
    let mut wb = shorts(&[(1 + 4, 2000), (1 + 4 + 1, 1024), (1 + 4 + 2, 1024), (1 + 4 + 3, 1500)], 33);
    wb.push(0);
    heap.record(0x10a9, &wb);
    heap.record(0x1031, &shorts(&[(1, 3152), (2, 2068)], 8));
    heap.inline(0x5817, 1234);
    heap.inline(0x5029, 50 << 16);
    let buf = heap.finish();

    let mut md = MetadataBundle::new();
    parse_ciff(&buf, &mut md)?;
    assert_eq!(md.make, "Canon");
    assert_eq!(md.model, "Canon EOS 10D");
    assert_eq!(md.shot.iso_speed, Some(100.0));
    assert_eq!(md.wb.get(), [2000.0, 1024.0, 1500.0, 1024.0]);
    assert_eq!((md.raw_width, md.raw_height), (Some(3152), Some(2068)));
    assert_eq!(md.shot.shot_order, Some(1234));
    assert_eq!(md.shot.focal_len, Some(50.0));
    Ok(())
  }

  #[test]
  fn obfuscated_color_info() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut heap = HeapBuilder::new();
    heap.record(0x080a, b"Canon\0Canon PowerShot G6\0");
    heap.record(0x102a, &shorts(&[(7, 0)], 32));
    // Index 0 + 2 places the values at byte 2 + 78 + 16
    let mut info = shorts(&[(0, 0x410)], 60);
    let plain = [1500_u16, 1024, 1024, 2100];
    for (c, v) in plain.iter().enumerate() {
      let pos = 96 + c * 2;
      info[pos..pos + 2].copy_from_slice(&(v ^ WB_KEY[c & 1]).to_le_bytes());
    }
    heap.record(0x0032, &info);
    let buf = heap.finish();

    let mut md = MetadataBundle::new();
    parse_ciff(&buf, &mut md)?;
    // c ^ (c >> 1) ^ 1 reorders G R B G
    assert_eq!(md.wb.get(), [1024.0, 1500.0, 1024.0, 2100.0]);
    assert!(md.wb.wants_auto());
    Ok(())
  }

  #[test]
  fn white_sample_bits() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut data = vec![0_u8; 2];
    data.extend_from_slice(&0x80008_u32.to_le_bytes());
    data.extend_from_slice(&1_u32.to_le_bytes());
    data.extend_from_slice(&12_u16.to_le_bytes());
    // 64 values of 12 bit, all 0x800, packed MSB first into 16 bit words
    let words: Vec<u16> = (0..48).map(|i| [0x8008_u16, 0x0080, 0x0800][i % 3]).collect();
    for (i, w) in words.iter().enumerate() {
      data.extend_from_slice(&(w ^ WB_KEY[i & 1]).to_le_bytes());
    }
    let mut s = ByteStream::new(&data, Endian::Little);
    let white = white_sample(&mut s)?.ok_or("no sample")?;
    assert!(white.iter().flatten().all(|v| *v == 0x800));
    Ok(())
  }
}
