// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Pixel payload decoders
//!
//! Every decoder writes into a [`RawFrame`] that already has the full
//! sensor dimensions. Decoders never read outside of the file buffer,
//! missing bytes are reported as [`RawError::UnexpectedEof`] and
//! samples outside of the valid range as
//! [`RawError::BitstreamCorruption`].

use crate::{RawError, Result};

pub mod crw;
pub mod hasselblad;
pub mod huffman;
pub mod kodak;
pub mod ljpeg;
pub mod nikon;
pub mod olympus;
pub mod packed;
pub mod panasonic;
pub mod phaseone;
pub mod pentax;
pub mod sony;

/// Payload starting at `offset` until end of file
pub fn payload(file: &[u8], offset: usize) -> Result<&[u8]> {
  file.get(offset..).ok_or_else(|| RawError::UnexpectedEof(format!("payload offset {} is behind EOF ({} bytes)", offset, file.len())))
}

/// Payload of exactly `len` bytes at `offset`
pub fn payload_exact(file: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
  offset
    .checked_add(len)
    .and_then(|end| file.get(offset..end))
    .ok_or_else(|| RawError::UnexpectedEof(format!("payload needs {} bytes at offset {}, file has {}", len, offset, file.len())))
}

/// Byte reader that yields zeros past the end of its buffer and
/// remembers how far it went beyond.
#[derive(Debug, Clone)]
pub(crate) struct PaddedReader<'a> {
  buf: &'a [u8],
  pos: usize,
}

/// Zero bytes tolerated past the end before the payload counts as truncated
const PAD_SLACK: usize = 16;

impl<'a> PaddedReader<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self { buf, pos: 0 }
  }

  #[inline(always)]
  pub fn byte(&mut self) -> u8 {
    let b = self.buf.get(self.pos).copied().unwrap_or(0);
    self.pos += 1;
    b
  }

  pub fn pos(&self) -> usize {
    self.pos
  }

  pub fn seek(&mut self, pos: usize) {
    self.pos = pos;
  }

  /// Fail if more than a small padding was read beyond the buffer
  pub fn check(&self) -> Result<()> {
    if self.pos > self.buf.len() + PAD_SLACK {
      Err(RawError::UnexpectedEof(format!(
        "payload ends after {} bytes, decoder needs at least {}",
        self.buf.len(),
        self.pos
      )))
    } else {
      Ok(())
    }
  }
}
