// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Develop a decoded sensor frame into the output image.
//!
//! The order of the steps is fixed: levels, white balance, optional
//! denoise, scaling, interpolation, highlights, color conversion,
//! geometry and tone. Single steps can be disabled for diagnostics.

use std::time::Instant;

use log::{debug, warn};

use super::color::convert_to_rgb;
use super::defects::{fix_bad_pixels, load_bad_pixels, load_dark_frame, subtract_dark_frame};
use super::denoise::{median_filter, wavelet_denoise};
use super::gamma::Gamma;
use super::green::green_matching;
use super::highlights::{blend_highlights, recover_highlights};
use super::matrix::{CameraColor, rgb_cam_from_cmatrix};
use super::scale::{CameraBalance, Interpolation, Levels, frame_to_image, mix_green, pre_interpolate, remove_zeroes, scale_colors, select_multipliers, unshrink};
use super::sensor::bayer;
use super::transform::{ToneParams, flip_and_map, fuji_rotate, output_curve, stretch};
use crate::decoders::RawLayout;
use crate::develop::DevelopParams;
use crate::image::DecodedImage;
use crate::metadata::MetadataBundle;
use crate::output::icc;
use crate::rawimage::RawFrame;
use crate::{RawError, Result};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ProcessingStep {
  /// Replace zero photosites on sensors known to have dead pixels
  ZeroFix,
  GreenMatching,
  WhiteBalance,
  Denoise,
  Demosaic,
  Highlights,
  /// Turn SuperCCD canvases upright
  FujiRotate,
  /// Camera to output color space
  Calibrate,
  Stretch,
  Orient,
}

/// Color related facts about the camera, collected from the metadata
/// and the resolved layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorInfo {
  /// As shot multipliers, zero if unknown
  pub cam_mul: [f32; 4],
  pub wants_auto: bool,
  pub white_sample: Option<[[u16; 8]; 8]>,
  pub cam_xyz: Option<[[f64; 3]; 4]>,
  pub cmatrix: Option<[[f32; 3]; 3]>,
  /// Daylight multipliers if no matrix provides them
  pub pre_mul: [f32; 4],
  pub zero_is_bad: bool,
  /// Capture time as Unix seconds
  pub timestamp: Option<i64>,
}

impl ColorInfo {
  pub fn new(md: &MetadataBundle, layout: &RawLayout) -> Self {
    Self {
      cam_mul: md.wb.get(),
      wants_auto: md.wb.wants_auto(),
      white_sample: md.white_sample,
      cam_xyz: layout.cam_xyz,
      cmatrix: md.cmatrix,
      pre_mul: md.pre_mul,
      zero_is_bad: layout.zero_is_bad,
      timestamp: md.timestamp.map(|t| t.and_utc().timestamp()),
    }
  }

  /// Camera color space. Fails if the camera has no usable matrix.
  pub fn camera_color(&self, colors: usize) -> Result<CameraColor> {
    let daylight = self.pre_mul.map(|v| if v > 0.0 { v as f64 } else { 1.0 });
    if let Some(cam_xyz) = &self.cam_xyz {
      return CameraColor::from_cam_xyz(cam_xyz, colors).ok_or_else(|| RawError::ColorProfileMissing(format!("degenerate camera matrix {:?}", cam_xyz)));
    }
    if let Some(cmatrix) = &self.cmatrix {
      return Ok(CameraColor {
        rgb_cam: rgb_cam_from_cmatrix(cmatrix),
        pre_mul: daylight,
      });
    }
    Err(RawError::ColorProfileMissing("no color matrix known for this camera".into()))
  }
}

/// Output of [`RawDevelop::develop`]
#[derive(Debug)]
pub struct Developed {
  pub image: DecodedImage,
  /// Recoverable problems, the image is still usable
  pub warnings: Vec<RawError>,
}

#[derive(Clone, Debug)]
pub struct RawDevelop {
  pub steps: Vec<ProcessingStep>,
  pub params: DevelopParams,
}

impl Default for RawDevelop {
  fn default() -> Self {
    Self::new(DevelopParams::default())
  }
}

impl RawDevelop {
  pub fn new(params: DevelopParams) -> Self {
    Self {
      steps: vec![
        ProcessingStep::ZeroFix,
        ProcessingStep::GreenMatching,
        ProcessingStep::WhiteBalance,
        ProcessingStep::Denoise,
        ProcessingStep::Demosaic,
        ProcessingStep::Highlights,
        ProcessingStep::FujiRotate,
        ProcessingStep::Calibrate,
        ProcessingStep::Stretch,
        ProcessingStep::Orient,
      ],
      params,
    }
  }

  fn enabled(&self, step: ProcessingStep) -> bool {
    self.steps.contains(&step)
  }

  /// Black and saturation after user overrides. Without any black
  /// level from the metadata the masked border pixels are used.
  fn levels(&self, frame: &RawFrame) -> Levels {
    let mut levels = Levels::from_frame(frame);
    if let Some(black) = self.params.user_black {
      levels.black = black;
      levels.cblack = [0; 4];
    } else if levels.black == 0 && levels.cblack == [0; 4] {
      if let Some((per_color, all)) = frame.masked_black() {
        let per_color = per_color.map(|v| if v == 0 { all } else { v });
        let min = per_color.iter().copied().min().unwrap_or(0);
        levels.black = min;
        levels.cblack = per_color.map(|v| v - min);
        debug!("Black level from masked pixels: {} + {:?}", levels.black, levels.cblack);
      }
    }
    if let Some(sat) = self.params.user_sat {
      levels.maximum = sat;
    }
    levels
  }

  /// Develop a frame into an image ready for output
  pub fn develop(&self, mut frame: RawFrame, color: &ColorInfo) -> Result<Developed> {
    let params = &self.params;
    params.validate()?;
    let now = Instant::now();
    let mut warnings = Vec::new();

    let mut levels = self.levels(&frame);
    if color.zero_is_bad && self.enabled(ProcessingStep::ZeroFix) {
      remove_zeroes(&mut frame);
    }
    if let Some(path) = &params.bad_pixels {
      match load_bad_pixels(path) {
        Ok(list) => {
          let fixed = fix_bad_pixels(&mut frame, &list, color.timestamp.unwrap_or(0));
          debug!("Fixed {} of {} listed dead pixels", fixed, list.len());
        }
        Err(err) => {
          warn!("Skipping dead pixel list: {}", err);
          warnings.push(err);
        }
      }
    }
    if let Some(path) = &params.dark_frame {
      match load_dark_frame(path, frame.crop.d.w, frame.crop.d.h) {
        Ok(dark) => {
          subtract_dark_frame(&mut frame, &dark);
          levels.maximum = levels.maximum.saturating_sub(levels.black);
          levels.black = 0;
          levels.cblack = [0; 4];
        }
        Err(err) => {
          warn!("Skipping dark frame: {}", err);
          warnings.push(err);
        }
      }
    }

    let mosaic = frame.cfa.is_valid() && frame.colors > 1 && !frame.is_full_color();
    let colors = frame.colors;
    let full = frame.crop.d;
    let denoise = params.threshold > 0.0 && self.enabled(ProcessingStep::Denoise);
    let shrink = mosaic && params.half_size;
    // Both need each 2x2 block as one pixel
    let packed = shrink || (mosaic && denoise);
    let cfa = frame.cfa;
    let mut img = frame_to_image(&frame, packed);
    debug!("Working image {}x{}, {} colors, packed: {}", img.width, img.height, colors, packed);

    let (camera, raw_color) = if colors == 1 {
      (CameraColor::raw(colors), true)
    } else {
      match color.camera_color(colors) {
        Ok(camera) => (camera, false),
        Err(err) => {
          warn!("{}, keeping camera colors", err);
          warnings.push(err);
          let mut camera = CameraColor::raw(colors);
          camera.pre_mul = color.pre_mul.map(|v| if v > 0.0 { v as f64 } else { 1.0 });
          (camera, true)
        }
      }
    };
    let mut pre_mul = camera.pre_mul;
    if colors < 4 {
      pre_mul[3] = 0.0;
    }

    if mosaic && params.green_matching && !packed && self.enabled(ProcessingStep::GreenMatching) {
      green_matching(&mut img, &cfa, levels.maximum);
    }

    if self.enabled(ProcessingStep::WhiteBalance) {
      let balance = CameraBalance {
        cam_mul: color.cam_mul,
        wants_auto: color.wants_auto,
        white_sample: color.white_sample.as_ref(),
      };
      pre_mul = select_multipliers(&img, &cfa, packed, colors, &levels, &balance, params, pre_mul);
    } else {
      pre_mul = [1.0; 4];
    }
    debug!("Channel multipliers {:?}", pre_mul);

    if denoise {
      wavelet_denoise(&mut img, mosaic.then_some(&cfa), full, colors, &mut levels, &pre_mul, params.threshold);
    }
    let pre_mul = scale_colors(&mut img, &levels, pre_mul, params.highlight);

    if packed && !shrink {
      img = unshrink(&img, &cfa, full.w, full.h);
    }
    let interp = if mosaic {
      pre_interpolate(&mut img, &cfa, colors, shrink, params.four_color_rgb)
    } else {
      Interpolation { colors, cfa: None, mix_green: false }
    };
    let mut colors = interp.colors;

    if let Some(cfa) = &interp.cfa {
      if !params.document_mode && self.enabled(ProcessingStep::Demosaic) {
        let xyz_cam = camera.xyz_cam().map(|row| row.map(|v| v as f32));
        let method = bayer::select(params.quality, cfa, colors, xyz_cam);
        bayer::run(method.as_ref(), &mut img, cfa, colors);
      }
    }
    if interp.mix_green {
      mix_green(&mut img);
      colors = 3;
    }

    if !params.document_mode {
      if colors == 3 && params.med_passes > 0 {
        median_filter(&mut img, params.med_passes);
      }
      if self.enabled(ProcessingStep::Highlights) {
        match params.highlight {
          2 => blend_highlights(&mut img, colors, &pre_mul),
          level if level > 2 => recover_highlights(&mut img, colors, &pre_mul, level, shrink),
          _ => {}
        }
      }
    }
    if !params.no_stretch && self.enabled(ProcessingStep::FujiRotate) {
      img = fuji_rotate(img, colors, frame.fuji_width, shrink);
    }

    let raw_color = raw_color || !self.enabled(ProcessingStep::Calibrate);
    let converted = convert_to_rgb(&mut img, interp.cfa.as_ref(), colors, &camera.rgb_cam, raw_color, params.output_color, params.document_mode);

    if !params.no_stretch && self.enabled(ProcessingStep::Stretch) {
      img = stretch(img, converted.colors, frame.pixel_aspect);
    }

    let tone = ToneParams {
      gamma: params.gamma,
      bright: params.bright,
      fixed_white: (params.highlight & !2) != 0 || params.no_auto_bright,
    };
    let (curve, white) = output_curve(&converted.histogram, converted.colors, img.width * img.height, &tone);
    let flip = if self.enabled(ProcessingStep::Orient) {
      params.user_flip_bits().unwrap_or_else(|| frame.orientation.flip_bits())
    } else {
      0
    };
    let (width, height, pixels) = flip_and_map(&img, converted.colors, flip, &curve, params.output_bps);

    let gamma = Gamma::new(params.gamma[0], params.gamma[1]);
    let icc = if converted.raw_color { None } else { Some(icc::build_profile(params.output_color, &gamma)) };
    debug!("Developed {}x{} image in {:.5}s", width, height, now.elapsed().as_secs_f32());

    Ok(Developed {
      image: DecodedImage {
        width,
        height,
        colors: converted.colors,
        bps: params.output_bps,
        pixels,
        histogram: converted.histogram,
        gamma,
        white,
        output_color: params.output_color,
        raw_color: converted.raw_color,
        icc,
      },
      warnings,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CFA;
  use crate::develop::DemosaicQuality;
  use crate::imgop::{Dim2, Point, Rect};

  fn uniform_frame(value: u16, w: usize, h: usize) -> RawFrame {
    let mut frame = RawFrame::new(Dim2::new(w, h), 8, CFA::new("RGGB").split_greens());
    frame.data.fill(value);
    frame.maximum = 255;
    frame
  }

  fn neutral() -> ColorInfo {
    ColorInfo {
      cmatrix: Some([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
      pre_mul: [1.0; 4],
      ..Default::default()
    }
  }

  #[test]
  fn uniform_input_gives_gray() -> std::result::Result<(), Box<dyn std::error::Error>> {
    for quality in [DemosaicQuality::Bilinear, DemosaicQuality::Vng, DemosaicQuality::Ppg, DemosaicQuality::Ahd] {
      let dev = RawDevelop::new(DevelopParams {
        quality,
        ..Default::default()
      });
      let out = dev.develop(uniform_frame(128, 8, 8), &neutral())?;
      assert_eq!((out.image.width, out.image.height, out.image.colors), (8, 8, 3));
      assert!(out.warnings.is_empty());
      for pix in out.image.pixels.chunks_exact(3) {
        assert!(pix[0].abs_diff(pix[1]) <= 1 && pix[1].abs_diff(pix[2]) <= 1, "{} {:?}", quality, pix);
      }
    }
    Ok(())
  }

  #[test]
  fn black_input_stays_black() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = uniform_frame(0, 8, 8);
    frame.black = 64;
    let out = RawDevelop::default().develop(frame, &neutral())?;
    assert!(out.image.pixels.iter().all(|v| *v == 0));
    Ok(())
  }

  #[test]
  fn missing_matrix_is_a_warning() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let out = RawDevelop::default().develop(uniform_frame(100, 8, 8), &ColorInfo::default())?;
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(out.warnings[0].kind(), crate::ErrorKind::ColorProfileMissing);
    assert!(out.image.raw_color);
    assert!(out.image.icc.is_none());
    Ok(())
  }

  #[test]
  fn half_size_and_rotation() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dev = RawDevelop::new(DevelopParams {
      half_size: true,
      user_flip: Some(90),
      output_bps: 16,
      ..Default::default()
    });
    let out = dev.develop(uniform_frame(128, 8, 4), &neutral())?;
    assert_eq!((out.image.width, out.image.height), (2, 4));
    assert_eq!(out.image.bps, 16);
    Ok(())
  }

  #[test]
  fn masked_pixels_give_black() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = uniform_frame(80, 12, 8);
    frame.crop = Rect::new(Point::new(0, 0), Dim2::new(8, 8));
    for row in 0..8 {
      for col in 10..12 {
        frame.data[row * 12 + col] = 80;
      }
    }
    let dev = RawDevelop::default();
    let levels = dev.levels(&frame);
    assert_eq!(levels.black, 80);
    let out = dev.develop(frame, &neutral())?;
    assert!(out.image.pixels.iter().all(|v| *v == 0));
    Ok(())
  }

  #[test]
  fn full_color_frame_skips_demosaic() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = RawFrame::new_with_cpp(Dim2::new(6, 4), 8, CFA::default(), 3);
    frame.data.fill(128);
    frame.maximum = 255;
    let dev = RawDevelop::new(DevelopParams {
      half_size: true,
      ..Default::default()
    });
    let out = dev.develop(frame, &neutral())?;
    assert_eq!((out.image.width, out.image.height, out.image.colors), (6, 4, 3));
    assert!(out.image.pixels.chunks_exact(3).all(|pix| pix[0].abs_diff(pix[1]) <= 1 && pix[1].abs_diff(pix[2]) <= 1));
    Ok(())
  }

  #[test]
  fn super_ccd_canvas_is_rotated() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut frame = uniform_frame(128, 8, 7);
    frame.fuji_width = 4;
    let out = RawDevelop::default().develop(frame.clone(), &neutral())?;
    assert_eq!((out.image.width, out.image.height), (5, 4));
    let dev = RawDevelop::new(DevelopParams {
      no_stretch: true,
      ..Default::default()
    });
    let out = dev.develop(frame, &neutral())?;
    assert_eq!((out.image.width, out.image.height), (8, 7));
    Ok(())
  }

  #[test]
  fn missing_correction_files_are_warnings() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dev = RawDevelop::new(DevelopParams {
      bad_pixels: Some("/nonexistent/dead.txt".into()),
      dark_frame: Some("/nonexistent/dark.pgm".into()),
      ..Default::default()
    });
    let out = dev.develop(uniform_frame(128, 8, 8), &neutral())?;
    assert_eq!(out.warnings.len(), 2);
    assert!(out.warnings.iter().all(|w| w.kind() == crate::ErrorKind::Io));
    Ok(())
  }

  #[test]
  fn document_mode_keeps_mosaic() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dev = RawDevelop::new(DevelopParams {
      document_mode: true,
      ..Default::default()
    });
    let out = dev.develop(uniform_frame(128, 8, 8), &neutral())?;
    assert_eq!(out.image.colors, 1);
    assert!(out.image.raw_color);
    Ok(())
  }
}
