// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use log::debug;

use crate::{pixarray::Image4, CFA};

/// Relative spread of the neighbors up to which a pixel is corrected
const THRESHOLD: f64 = 0.01;

/// Scale the second green of each 2x2 block so that it matches the
/// average of the surrounding first greens. Only flat areas below
/// saturation are touched. Needs the second green as color 3.
pub fn green_matching(img: &mut Image4, cfa: &CFA, maximum: u32) {
  const MARGIN: usize = 3;
  let (mut oj, mut oi) = (2, 2);
  if cfa.color_at(oj, oi) != 3 {
    oj += 1;
  }
  if cfa.color_at(oj, oi) != 3 {
    oi += 1;
  }
  if cfa.color_at(oj, oi) != 3 {
    oj -= 1;
  }
  if cfa.color_at(oj, oi) != 3 {
    debug!("No second green in pattern {}, skip green matching", cfa);
    return;
  }
  let (width, height) = (img.width, img.height);
  let maximum = maximum as f64;
  img.par_rows_with_snapshot(|row, buf, old| {
    if row < oj || row + MARGIN >= height || (row - oj) % 2 != 0 {
      return;
    }
    let mut col = oi;
    while col + MARGIN < width {
      let o1 = [old.at(row - 1, col - 1)[1], old.at(row - 1, col + 1)[1], old.at(row + 1, col - 1)[1], old.at(row + 1, col + 1)[1]].map(|v| v as i32);
      let o2 = [old.at(row - 2, col)[3], old.at(row + 2, col)[3], old.at(row, col - 2)[3], old.at(row, col + 2)[3]].map(|v| v as i32);
      let m1 = o1.iter().sum::<i32>() as f64 / 4.0;
      let m2 = o2.iter().sum::<i32>() as f64 / 4.0;
      let spread = |o: [i32; 4]| {
        ((o[0] - o[1]).abs() + (o[0] - o[2]).abs() + (o[0] - o[3]).abs() + (o[1] - o[2]).abs() + (o[2] - o[3]).abs() + (o[1] - o[3]).abs()) as f64 / 6.0
      };
      let (c1, c2) = (spread(o1), spread(o2));
      let center = old.at(row, col)[3] as f64;
      if center < maximum * 0.95 && c1 < maximum * THRESHOLD && c2 < maximum * THRESHOLD && m2 > 0.0 {
        let f = center * m1 / m2;
        buf[col][3] = f.min(65535.0) as u16;
      }
      col += 2;
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_green_is_pulled_to_first() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cfa = CFA::new("RGGB").split_greens();
    let mut img = Image4::new(12, 12);
    for row in 0..12 {
      for col in 0..12 {
        let c = cfa.color_at(row, col);
        img.at_mut(row, col)[c] = match c {
          1 => 1000,
          3 => 1010,
          _ => 500,
        };
      }
    }
    green_matching(&mut img, &cfa, 4095);
    assert_eq!(img.at(3, 2)[3], 1000);
    // Margin is left alone
    assert_eq!(img.at(11, 10)[3], 1010);
    Ok(())
  }
}
