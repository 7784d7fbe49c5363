// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::io::Write;

use crate::Result;
use crate::image::DecodedImage;

/// Netpbm header: PGM or PPM for up to three colors, PAM otherwise
pub fn ppm_header(image: &DecodedImage) -> String {
  if image.colors > 3 {
    format!(
      "P7\nWIDTH {}\nHEIGHT {}\nDEPTH {}\nMAXVAL {}\nTUPLTYPE {}\nENDHDR\n",
      image.width,
      image.height,
      image.colors,
      image.maxval(),
      "RGBG"
    )
  } else {
    format!("P{}\n{} {}\n{}\n", image.colors / 2 + 5, image.width, image.height, image.maxval())
  }
}

/// Write as binary Netpbm. 16 bit samples are big endian.
pub fn write_ppm<W: Write + ?Sized>(writer: &mut W, image: &DecodedImage) -> Result<()> {
  writer.write_all(ppm_header(image).as_bytes())?;
  let stride = image.width * image.colors;
  let mut line = Vec::with_capacity(stride * 2);
  for row in 0..image.height {
    line.clear();
    let samples = image.row(row);
    if image.bps == 8 {
      line.extend(samples.iter().map(|v| *v as u8));
    } else {
      line.extend(samples.iter().flat_map(|v| v.to_be_bytes()));
    }
    writer.write_all(&line)?;
  }
  writer.flush()?;
  Ok(())
}
