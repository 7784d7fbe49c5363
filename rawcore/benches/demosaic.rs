// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rawcore::CFA;
use rawcore::develop::DemosaicQuality;
use rawcore::imgop::sensor::bayer::{self, Demosaic};
use rawcore::pixarray::Image4;
use std::hint::black_box;

/// sRGB to XYZ, close enough to a real camera for the AHD color space
const XYZ_CAM: [[f32; 4]; 3] = [[0.4124, 0.3576, 0.1805, 0.0], [0.2126, 0.7152, 0.0722, 0.0], [0.0193, 0.1192, 0.9505, 0.0]];

fn generate_mosaic(cfa: &CFA, w: usize, h: usize) -> Image4 {
  let mut img = Image4::new(w, h);
  for row in 0..h {
    for col in 0..w {
      let c = cfa.color_at(row, col);
      img.at_mut(row, col)[c] = ((row * 31 + col * 17 + c * 1000) % 16384) as u16;
    }
  }
  img
}

fn criterion_benchmark(c: &mut Criterion) {
  let mut group = c.benchmark_group("demosaic");
  group.significance_level(0.1).sample_size(10);

  let cfa = CFA::new("RGGB");
  let mosaic = generate_mosaic(&cfa, 1024, 768);

  for quality in [DemosaicQuality::Bilinear, DemosaicQuality::Vng, DemosaicQuality::Ppg, DemosaicQuality::Ahd] {
    let method = bayer::select(quality, &cfa, 3, XYZ_CAM);
    group.bench_with_input(BenchmarkId::new(method.name(), "1024x768"), &mosaic, |b, data| {
      b.iter(|| {
        let mut img = data.clone();
        method.demosaic(black_box(&mut img), &cfa, 3);
        img
      })
    });
  }

  group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
