// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Anything that can be used to address a TIFF entry
pub trait TiffTag: Into<u16> + Copy {}

impl TiffTag for u16 {}
impl TiffTag for TiffCommonTag {}
impl TiffTag for ExifTag {}
impl TiffTag for GpsTag {}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum TiffCommonTag {
  PanaWidth = 0x02,
  PanaLength = 0x03,
  PanaSensorLeft = 0x05,
  PanaSensorBottom = 0x06,
  PanaSensorRight = 0x07,
  PanaCfaPattern = 0x09,
  PanaRedBalance = 0x11,
  PanaBlueBalance = 0x12,
  PanaBlackRed = 0x1c,
  PanaBlackGreen = 0x1d,
  PanaBlackBlue = 0x1e,
  PanaWbRed = 0x24,
  PanaWbGreen = 0x25,
  PanaWbBlue = 0x26,
  PanaWbInfo = 0x27,
  PanaIso = 0x17,
  PanaRawFormat = 0x2d,
  PanaJpgFromRaw = 0x2e,
  NewSubFileType = 254,
  ImageWidth = 256,
  ImageLength = 257,
  BitsPerSample = 258,
  Compression = 259,
  PhotometricInt = 262,
  ImageDescription = 270,
  Make = 271,
  Model = 272,
  StripOffsets = 273,
  Orientation = 274,
  SamplesPerPixel = 277,
  RowsPerStrip = 278,
  StripByteCounts = 279,
  PanaRawOffset = 280,
  XResolution = 282,
  YResolution = 283,
  PlanarConfig = 284,
  ResolutionUnit = 296,
  Linearization = 291,
  Software = 305,
  DateTime = 306,
  Artist = 315,
  Predictor = 317,
  TileWidth = 322,
  TileLength = 323,
  TileOffsets = 324,
  TileByteCounts = 325,
  SubIFDs = 330,
  JPEGInterchangeFormat = 513,
  JPEGInterchangeFormatLength = 514,
  KodakIfd = 33424,
  Copyright = 33432,
  ExposureTime = 33434,
  FNumber = 33437,
  CFARepeatPatternDim = 33421,
  CFAPattern = 33422,
  Model2 = 33405,
  FocalLength = 37386,
  ImageNumber = 37393,
  LeafMarker = 34303,
  LeafWb = 34306,
  LeafMetadata = 34310,
  IccProfile = 34675,
  ExifIFDPointer = 34665,
  GPSInfo = 34853,
  SonyCurve = 28688,
  SonyOffset = 29184,
  SonyLength = 29185,
  SonyKey = 29217,
  SonyWb = 29443,
  SonyWbAlt = 29459,
  DNGVersion = 50706,
  UniqueCameraModel = 50708,
  CFAPlaneColor = 50710,
  CFALayout = 50711,
  LinearizationTable = 50712,
  BlackLevelRepeatDim = 50713,
  BlackLevels = 50714,
  BlackLevelDeltaH = 50715,
  BlackLevelDeltaV = 50716,
  WhiteLevel = 50717,
  DefaultScale = 50718,
  ColorMatrix1 = 50721,
  ColorMatrix2 = 50722,
  CameraCalibration1 = 50723,
  CameraCalibration2 = 50724,
  AnalogBalance = 50727,
  AsShotNeutral = 50728,
  AsShotWhiteXY = 50729,
  HasselbladMarker = 50458,
  DNGPrivateData = 50740,
  Cr2Slice = 50752,
  OriginalRawFileData = 50781,
  ActiveArea = 50829,
  MaskedAreas = 50830,
  AsShotICCProfile = 50831,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ExifTag {
  ExposureTime = 33434,
  FNumber = 33437,
  ISOSpeedRatings = 34855,
  DateTimeOriginal = 36867,
  ExifVersion = 36864,
  CreateDate = 36868,
  ShutterSpeedValue = 37377,
  ApertureValue = 37378,
  FocalLength = 37386,
  MakerNotes = 37500,
  PixelXDimension = 40962,
  PixelYDimension = 40963,
  CFAPattern = 41730,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum GpsTag {
  GPSVersionID = 0,
  GPSLatitudeRef = 1,
  GPSLatitude = 2,
  GPSLongitudeRef = 3,
  GPSLongitude = 4,
  GPSAltitudeRef = 5,
  GPSAltitude = 6,
  GPSTimeStamp = 7,
  GPSMapDatum = 18,
  GPSDateStamp = 29,
}
