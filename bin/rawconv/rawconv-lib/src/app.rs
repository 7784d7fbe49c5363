// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command, arg, command, value_parser};
use rawcore::develop::OutputColor;
use rawcore::output::OutputFormat;

pub fn create_app() -> Command {
  command!()
    .about("rawconv - develop camera raw files into PPM or TIFF images")
    .author("Daniel V. <daniel@chaospixel.com>")
    .version(crate::version())
    .subcommand_required(true)
    .arg(arg!(verbose: -v --verbose "Print more messages").global(true))
    .arg(
      arg!(debug: -d ... "Sets the level of debugging information")
        .global(true)
        .action(ArgAction::Count),
    )
    .subcommand(
      Command::new("convert")
        .about("Develop raw image(s) into PPM or TIFF files")
        .arg(
          arg!(params: -p --params <FILE> "TOML file with develop parameters, switches override it")
            .required(false)
            .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(half_size: --"half-size" "Half-size image, 2x2 blocks become one pixel"))
        .arg(arg!(four_color: --"four-color" "Interpolate RGGB as four colors"))
        .arg(arg!(green_matching: --"green-matching" "Equalize the two green channels"))
        .arg(arg!(auto_wb: -a --"auto-wb" "Average the whole image for white balance"))
        .arg(arg!(no_camera_wb: --"no-camera-wb" "Ignore the white balance stored by the camera"))
        .arg(
          arg!(mul: -r --mul <MUL> "Custom white balance multipliers: R G B G")
            .required(false)
            .num_args(4)
            .value_parser(value_parser!(f32)),
        )
        .arg(
          arg!(greybox: -A --greybox <AREA> "Average a grey box for white balance: X Y W H")
            .required(false)
            .num_args(4)
            .value_parser(value_parser!(u32)),
        )
        .arg(
          arg!(black: -k --black <LEVEL> "Set the darkness level")
            .required(false)
            .value_parser(value_parser!(u32)),
        )
        .arg(
          arg!(saturation: -S --saturation <LEVEL> "Set the saturation level")
            .required(false)
            .value_parser(value_parser!(u32)),
        )
        .arg(
          arg!(highlight: -H --highlight <MODE> "Highlight mode: 0 clip, 1 unclip, 2 blend, 3 to 9 rebuild")
            .required(false)
            .value_parser(value_parser!(u32).range(0..=9)),
        )
        .arg(
          arg!(threshold: -n --threshold <NUM> "Wavelet denoising threshold")
            .required(false)
            .value_parser(value_parser!(f32)),
        )
        .arg(
          arg!(median: -m --median <NUM> "Median filter passes after interpolation")
            .required(false)
            .value_parser(value_parser!(u32)),
        )
        .arg(
          arg!(quality: -q --quality <NUM> "Interpolation: 0 bilinear, 1 VNG, 2 PPG, 3 AHD")
            .required(false)
            .value_parser(value_parser!(u32).range(0..=3)),
        )
        .arg(
          arg!(colorspace: -c --colorspace <SPACE> "Output color space")
            .required(false)
            .value_parser(value_parser!(OutputColor)),
        )
        .arg(arg!(sixteen_bit: -'6' --"16bit" "Write 16 bits per sample"))
        .arg(
          arg!(gamma: -g --gamma <CURVE> "Gamma curve: power and toe slope")
            .required(false)
            .num_args(2)
            .value_parser(value_parser!(f64)),
        )
        .arg(
          arg!(bright: -b --bright <NUM> "Brightness, default 1.0")
            .required(false)
            .value_parser(value_parser!(f32)),
        )
        .arg(arg!(no_auto_bright: -W --"no-auto-bright" "Don't automatically brighten the image"))
        .arg(
          arg!(flip: -t --flip <DEG> "Flip the image: 0 to 7, 90, 180 or 270")
            .required(false)
            .value_parser(value_parser!(i32)),
        )
        .arg(arg!(document: -D --document "Document mode, raw values without interpolation"))
        .arg(arg!(no_stretch: -j --"no-stretch" "Don't stretch or rotate raw pixels"))
        .arg(
          arg!(bad_pixels: -P --"bad-pixels" <FILE> "Fix the dead pixels listed in this file")
            .required(false)
            .value_parser(value_parser!(PathBuf)),
        )
        .arg(
          arg!(dark_frame: -K --"dark-frame" <FILE> "Subtract a dark frame, 16 bit PGM")
            .required(false)
            .value_parser(value_parser!(PathBuf)),
        )
        .arg(
          arg!(format: -T --format <FORMAT> "Output format, guessed from the output file name if not given")
            .required(false)
            .value_parser(value_parser!(OutputFormat)),
        )
        .arg(arg!(recursive: -R --recursive "Process input directories recursive"))
        .arg(arg!(replace: -f --"override" "Override existing files"))
        .arg(
          arg!(output: -o --output <OUTPUT> "Output file or existing directory")
            .required(true)
            .value_parser(value_parser!(PathBuf)),
        )
        .arg(
          Arg::new("INPUT")
            .help("Input files or directories")
            .required(true)
            .num_args(1..)
            .value_parser(value_parser!(PathBuf)),
        ),
    )
    .subcommand(
      Command::new("identify")
        .about("Print format and metadata without decoding pixels")
        .arg(arg!(json: --json "Format metadata as JSON"))
        .arg(arg!(yaml: --yaml "Format metadata as YAML").conflicts_with("json"))
        .arg(
          Arg::new("FILE")
            .help("Input files")
            .required(true)
            .num_args(1..)
            .value_parser(value_parser!(PathBuf)),
        ),
    )
    .subcommand(
      Command::new("cameras")
        .about("List built-in camera profiles")
        .arg(arg!(markdown: --md "Format table as Markdown")),
    )
}
