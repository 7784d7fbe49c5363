// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

pub const IDENTITY_MATRIX_3: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Linear sRGB (D65) to XYZ
pub const XYZ_RGB: [[f64; 3]; 3] = [[0.412453, 0.357580, 0.180423], [0.212671, 0.715160, 0.072169], [0.019334, 0.119193, 0.950227]];

/// D65 white point in XYZ
pub const D65_WHITE: [f64; 3] = [0.950456, 1.0, 1.088754];

/// sRGB primaries adapted to D50, used for ICC colorant tags
pub const XYZD50_SRGB: [[f64; 3]; 3] = [[0.436083, 0.385083, 0.143055], [0.222507, 0.716888, 0.060608], [0.013930, 0.097097, 0.714022]];

/// Linear sRGB to Adobe RGB (1998)
pub const ADOBE_RGB: [[f64; 3]; 3] = [[0.715146, 0.284856, 0.000000], [0.000000, 1.000000, 0.000000], [0.000000, 0.041166, 0.958839]];

/// Linear sRGB to Wide Gamut RGB (D65)
pub const WIDE_RGB: [[f64; 3]; 3] = [[0.593087, 0.404710, 0.002206], [0.095413, 0.843149, 0.061439], [0.011621, 0.069091, 0.919288]];

/// Linear sRGB to ProPhoto RGB (D65)
pub const PROPHOTO_RGB: [[f64; 3]; 3] = [[0.529317, 0.330092, 0.140588], [0.098368, 0.873465, 0.028169], [0.016879, 0.117663, 0.865457]];

/// Linear sRGB to ROMM (ProPhoto) primaries, inverted
pub const RGB_ROMM: [[f64; 3]; 3] = [[2.034193, -0.727420, -0.306766], [-0.228811, 1.231729, -0.002922], [-0.008565, -0.153273, 1.161839]];

/// Camera to sRGB matrix from a camera to ROMM matrix
pub fn cmatrix_from_romm(romm_cam: &[[f64; 3]; 3]) -> [[f32; 3]; 3] {
  multiply(&RGB_ROMM, romm_cam).map(|row| row.map(|v| v as f32))
}

/// Multiply two matrices a and b
pub fn multiply<const X: usize, const A: usize, const B: usize>(a: &[[f64; X]; A], b: &[[f64; B]; X]) -> [[f64; B]; A] {
  let mut r = [[0.0; B]; A];
  for i in 0..A {
    for j in 0..B {
      for x in 0..X {
        r[i][j] += a[i][x] * b[x][j];
      }
    }
  }
  r
}

/// Calculate pseudo-inverse of a given matrix, already transposed.
///
/// Zero rows of the input give zero columns in the result, so a three
/// color camera can use the four row form with an empty last row.
pub fn pseudo_inverse<const N: usize>(matrix: [[f64; 3]; N]) -> [[f64; N]; 3] {
  let mut result = [[0.0; N]; 3];
  let mut work = [[0.0; 6]; 3];
  for i in 0..3 {
    for j in 0..6 {
      work[i][j] = if j == i + 3 { 1.0 } else { 0.0 };
    }
    for j in 0..3 {
      for k in 0..N {
        work[i][j] += matrix[k][i] * matrix[k][j];
      }
    }
  }
  for i in 0..3 {
    let mut num = work[i][i];
    for j in 0..6 {
      work[i][j] /= num;
    }
    for k in 0..3 {
      if k == i {
        continue;
      }
      num = work[k][i];
      for j in 0..6 {
        work[k][j] -= work[i][j] * num;
      }
    }
  }
  for i in 0..N {
    for j in 0..3 {
      for k in 0..3 {
        result[j][i] += work[j][k + 3] * matrix[i][k];
      }
    }
  }
  result
}

/// Transpose a given input matrix
pub fn transpose<const N: usize, const M: usize>(matrix: &[[f64; M]; N]) -> [[f64; N]; M] {
  let mut transposed = [[0.0; N]; M];
  for n in 0..N {
    for m in 0..M {
      transposed[m][n] = matrix[n][m];
    }
  }
  transposed
}

/// Camera color space derived from an XYZ to camera matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraColor {
  /// Camera to linear sRGB
  pub rgb_cam: [[f64; 4]; 3],
  /// Multipliers that map a neutral surface to equal camera values
  pub pre_mul: [f64; 4],
}

impl CameraColor {
  /// Camera colors as sRGB channels, green doubled for a fourth color
  pub fn raw(colors: usize) -> Self {
    let mut rgb_cam = [[0.0; 4]; 3];
    for (i, row) in rgb_cam.iter_mut().enumerate() {
      row[i] = 1.0;
    }
    if colors > 3 {
      rgb_cam[1][3] = 1.0;
    }
    Self { rgb_cam, pre_mul: [1.0; 4] }
  }

  /// Multiply out the XYZ space, normalize rows so that a neutral sRGB
  /// value gives equal camera values and invert. Returns None for a
  /// degenerate matrix.
  pub fn from_cam_xyz(cam_xyz: &[[f64; 3]; 4], colors: usize) -> Option<Self> {
    let mut cam_rgb = [[0.0; 3]; 4];
    let mut pre_mul = [1.0; 4];
    for i in 0..colors.min(4) {
      for j in 0..3 {
        for k in 0..3 {
          cam_rgb[i][j] += cam_xyz[i][k] * XYZ_RGB[k][j];
        }
      }
      let num: f64 = cam_rgb[i].iter().sum();
      if num.abs() < 1e-9 || !num.is_finite() {
        return None;
      }
      for v in cam_rgb[i].iter_mut() {
        *v /= num;
      }
      pre_mul[i] = 1.0 / num;
    }
    let rgb_cam = pseudo_inverse(cam_rgb);
    if rgb_cam.iter().flatten().any(|v| !v.is_finite()) {
      return None;
    }
    Some(Self { rgb_cam, pre_mul })
  }

  /// Linear sRGB to XYZ normalized to D65 white, times camera to sRGB
  pub fn xyz_cam(&self) -> [[f64; 4]; 3] {
    let mut xyz_cam = [[0.0; 4]; 3];
    for i in 0..3 {
      for j in 0..4 {
        for k in 0..3 {
          xyz_cam[i][j] += XYZ_RGB[i][k] * self.rgb_cam[k][j] / D65_WHITE[i];
        }
      }
    }
    xyz_cam
  }
}

/// Camera to sRGB matrix given directly by the maker, each row is
/// normalized to sum up to one.
pub fn rgb_cam_from_cmatrix(cmatrix: &[[f32; 3]; 3]) -> [[f64; 4]; 3] {
  let mut rgb_cam = [[0.0; 4]; 3];
  for i in 0..3 {
    let num: f64 = cmatrix[i].iter().map(|v| *v as f64).sum();
    for j in 0..3 {
      rgb_cam[i][j] = if num != 0.0 { cmatrix[i][j] as f64 / num } else { 0.0 };
    }
  }
  rgb_cam
}
