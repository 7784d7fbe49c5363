// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Power function with linear toe segment, the BT.709 style curve.

use rayon::prelude::*;

/// Curve parameters: power, toe slope and the derived break points.
///
/// `g[2]` is the break point on the encoded side, `g[3]` on the linear
/// side, `g[4]` the offset of the power segment and `g[5]` the area
/// correction used for ICC descriptions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gamma {
  pub g: [f64; 6],
}

impl Default for Gamma {
  fn default() -> Self {
    Self::new(0.45, 4.5)
  }
}

impl Gamma {
  /// Solve the break points for power `pwr` and toe slope `ts`. A zero
  /// power gives a logarithmic curve.
  pub fn new(pwr: f64, ts: f64) -> Self {
    let mut g = [pwr, ts, 0.0, 0.0, 0.0, 0.0];
    let mut bnd = [0.0_f64, 0.0];
    bnd[(g[1] >= 1.0) as usize] = 1.0;
    if g[1] != 0.0 && (g[1] - 1.0) * (g[0] - 1.0) <= 0.0 {
      // Bisection for the point where both segments meet with equal slope
      for _ in 0..48 {
        g[2] = (bnd[0] + bnd[1]) / 2.0;
        let upper = if g[0] != 0.0 {
          ((g[2] / g[1]).powf(-g[0]) - 1.0) / g[0] - 1.0 / g[2] > -1.0
        } else {
          g[2] / (1.0 - 1.0 / g[2]).exp() < g[1]
        };
        bnd[upper as usize] = g[2];
      }
      g[3] = g[2] / g[1];
      if g[0] != 0.0 {
        g[4] = g[2] * (1.0 / g[0] - 1.0);
      }
    }
    g[5] = if g[0] != 0.0 {
      1.0 / (g[1] * g[3] * g[3] / 2.0 - g[4] * (1.0 - g[3]) + (1.0 - g[3].powf(1.0 + g[0])) * (1.0 + g[4]) / (1.0 + g[0])) - 1.0
    } else {
      1.0 / (g[1] * g[3] * g[3] / 2.0 + 1.0 - g[2] - g[3] - g[2] * g[3] * (g[3].ln() - 1.0)) - 1.0
    };
    Self { g }
  }

  /// Linear value in 0..1 to encoded value
  pub fn encode(&self, r: f64) -> f64 {
    let g = &self.g;
    if r >= 1.0 {
      1.0
    } else if r < g[3] {
      r * g[1]
    } else if g[0] != 0.0 {
      r.powf(g[0]) * (1.0 + g[4]) - g[4]
    } else {
      r.ln() * g[2] + 1.0
    }
  }

  /// Encoded value in 0..1 back to linear
  pub fn decode(&self, r: f64) -> f64 {
    let g = &self.g;
    if r >= 1.0 {
      1.0
    } else if r < g[2] {
      r / g[1]
    } else if g[0] != 0.0 {
      ((r + g[4]) / (1.0 + g[4])).powf(1.0 / g[0])
    } else {
      ((r - 1.0) / g[2]).exp()
    }
  }

  /// 16 bit lookup table, input values at or above `imax` map to white
  pub fn table(&self, forward: bool, imax: u32) -> Vec<u16> {
    let imax = imax.max(1) as f64;
    (0..0x10000_u32)
      .into_par_iter()
      .map(|i| {
        let r = i as f64 / imax;
        let v = if forward { self.encode(r) } else { self.decode(r) };
        (v * 65536.0).clamp(0.0, 65535.0) as u16
      })
      .collect()
  }
}

/// Build a 0x10000 entry curve. Mode 1 linearizes encoded samples,
/// mode 2 applies the curve for output.
pub fn gamma_curve(pwr: f64, ts: f64, mode: u32, imax: u32) -> Vec<u16> {
  Gamma::new(pwr, ts).table(mode >= 2, imax)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bt709_break_points() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let gamma = Gamma::default();
    // Toe meets the power segment near 0.018 linear, 0.081 encoded
    assert!((gamma.g[3] - 0.018).abs() < 0.001);
    assert!((gamma.g[2] - 0.081).abs() < 0.001);
    assert!((gamma.g[4] - 0.099).abs() < 0.001);
    Ok(())
  }

  #[test]
  fn decode_inverts_encode() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let gamma = Gamma::new(1.0 / 2.4, 12.92);
    for v in [0.0, 0.001, 0.01, 0.2, 0.5, 0.9] {
      assert!((gamma.decode(gamma.encode(v)) - v).abs() < 1e-6);
    }
    Ok(())
  }

  #[test]
  fn table_limits() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let curve = gamma_curve(0.45, 4.5, 2, 4096);
    assert_eq!(curve.len(), 0x10000);
    assert_eq!(curve[0], 0);
    assert_eq!(curve[4096], 0xffff);
    assert_eq!(curve[0xffff], 0xffff);
    assert!(curve.windows(2).all(|w| w[0] <= w[1]));
    let linear = gamma_curve(0.45, 4.5, 1, 255);
    assert!(linear[128] < curve[128 * 16]);
    Ok(())
  }
}
