// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use rayon::prelude::*;

use crate::imgop::{Dim2, Rect};

/// Single channel pixel plane
#[derive(Debug, Clone, PartialEq)]
pub struct Pix2D<T> {
  pub width: usize,
  pub height: usize,
  pub data: Vec<T>,
}

pub type PixF32 = Pix2D<f32>;

impl<T> Pix2D<T>
where
  T: Copy + Default + Send + Sync,
{
  pub fn new_with(data: Vec<T>, width: usize, height: usize) -> Self {
    debug_assert_eq!(data.len(), height * width);
    Self { data, width, height }
  }

  pub fn new(width: usize, height: usize) -> Self {
    let data = vec![T::default(); width * height];
    Self { data, width, height }
  }

  pub fn dim(&self) -> Dim2 {
    Dim2::new(self.width, self.height)
  }

  pub fn pixels(&self) -> &[T] {
    &self.data
  }

  pub fn pixels_mut(&mut self) -> &mut [T] {
    &mut self.data
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> &T {
    &self.data[row * self.width + col]
  }

  #[inline(always)]
  pub fn at_mut(&mut self, row: usize, col: usize) -> &mut T {
    &mut self.data[row * self.width + col]
  }

  pub fn for_each<F>(&mut self, op: F)
  where
    F: Fn(T) -> T + Send + Sync,
  {
    self.data.par_iter_mut().for_each(|v| *v = op(*v));
  }
}

/// Multi channel image, channels interleaved per pixel.
///
/// The develop stages work on `Color2D<u16, 4>`: one slot per camera
/// color, a pixel of a mosaic image has only its CFA color slot filled.
#[derive(Debug, Clone, PartialEq)]
pub struct Color2D<T, const N: usize> {
  pub width: usize,
  pub height: usize,
  pub data: Vec<[T; N]>,
}

pub type Image4 = Color2D<u16, 4>;

impl<T, const N: usize> Color2D<T, N>
where
  T: Copy + Default + Send + Sync,
{
  pub fn new_with(data: Vec<[T; N]>, width: usize, height: usize) -> Self {
    debug_assert_eq!(data.len(), height * width);
    Self { data, width, height }
  }

  pub fn new(width: usize, height: usize) -> Self {
    let data = vec![[T::default(); N]; width * height];
    Self { data, width, height }
  }

  pub fn dim(&self) -> Dim2 {
    Dim2::new(self.width, self.height)
  }

  pub fn into_inner(self) -> Vec<[T; N]> {
    self.data
  }

  pub fn pixels(&self) -> &[[T; N]] {
    &self.data
  }

  pub fn pixels_mut(&mut self) -> &mut [[T; N]] {
    &mut self.data
  }

  pub fn pixel_rows(&self) -> std::slice::ChunksExact<'_, [T; N]> {
    self.data.chunks_exact(self.width)
  }

  pub fn pixel_rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, [T; N]> {
    self.data.chunks_exact_mut(self.width)
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> &[T; N] {
    &self.data[row * self.width + col]
  }

  #[inline(always)]
  pub fn at_mut(&mut self, row: usize, col: usize) -> &mut [T; N] {
    &mut self.data[row * self.width + col]
  }

  pub fn for_each<F>(&mut self, op: F)
  where
    F: Fn([T; N]) -> [T; N] + Send + Sync,
  {
    self.data.par_iter_mut().for_each(|v| *v = op(*v));
  }

  /// Run `op` for each row in parallel. The closure gets a read-only
  /// copy of the image as it was before this pass, so it may look at
  /// neighbor rows while the row itself is rewritten.
  pub fn par_rows_with_snapshot<F>(&mut self, op: F)
  where
    F: Fn(usize, &mut [[T; N]], &Self) + Send + Sync,
  {
    let snapshot = self.clone();
    let width = self.width;
    self.data.par_chunks_exact_mut(width).enumerate().for_each(|(row, buf)| op(row, buf, &snapshot));
  }

  pub fn crop(&self, area: Rect) -> Self {
    let mut output = Vec::with_capacity(area.d.h * area.d.w);
    output.extend(
      self
        .pixels()
        .chunks_exact(self.width)
        .skip(area.p.y)
        .take(area.d.h)
        .flat_map(|row| row[area.p.x..area.p.x + area.d.w].iter())
        .cloned(),
    );
    Self::new_with(output, area.d.w, area.d.h)
  }

  /// Single channel as plane
  pub fn channel(&self, c: usize) -> Pix2D<T> {
    Pix2D::new_with(self.data.par_iter().map(|p| p[c]).collect(), self.width, self.height)
  }
}

impl<T, const N: usize> Default for Color2D<T, N> {
  fn default() -> Self {
    Self {
      width: 0,
      height: 0,
      data: Default::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::imgop::Point;

  #[test]
  fn crop_keeps_row_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let data: Vec<[u16; 4]> = (0..16).map(|i| [i, 0, 0, 0]).collect();
    let img = Image4::new_with(data, 4, 4);
    let cropped = img.crop(Rect::new(Point::new(1, 2), Dim2::new(2, 2)));
    let values: Vec<u16> = cropped.pixels().iter().map(|p| p[0]).collect();
    assert_eq!(values, vec![9, 10, 13, 14]);
    Ok(())
  }

  #[test]
  fn snapshot_pass_reads_old_values() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut img = Image4::new_with(vec![[1, 0, 0, 0]; 9], 3, 3);
    img.par_rows_with_snapshot(|row, buf, old| {
      for (col, pix) in buf.iter_mut().enumerate() {
        let above = if row > 0 { old.at(row - 1, col)[0] } else { 0 };
        pix[0] += above;
      }
    });
    assert_eq!(img.at(0, 0)[0], 1);
    assert_eq!(img.at(2, 2)[0], 2);
    Ok(())
  }
}
