// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use strata_raster::{RampPayload, colorize, colorize_operation};

/// Deterministic grayscale tile with a transparent border.
fn tile(side: usize) -> Vec<[u8; 4]> {
    (0..side * side)
        .map(|i| {
            let (x, y) = (i % side, i / side);
            if x == 0 || y == 0 || x == side - 1 || y == side - 1 {
                [0, 0, 0, 0]
            } else {
                #[expect(clippy::cast_possible_truncation, reason = "value is masked to a byte")]
                let v = ((x * 7 + y * 13) & 0xFF) as u8;
                [v, v, v, 255]
            }
        })
        .collect()
}

fn bench_colorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("strata_raster");
    let pixels = tile(256);
    let payload = RampPayload::from_percentiles(10.0, 90.0, 0.8);
    let data = payload.to_operation_data();
    group.throughput(Throughput::Elements(pixels.len() as u64));

    group.bench_function("colorize(256x256)", |b| {
        b.iter(|| {
            let out: Vec<[u8; 4]> = pixels.iter().map(|&p| colorize(p, &payload)).collect();
            black_box(out);
        });
    });

    group.bench_function("colorize_operation(256x256)", |b| {
        b.iter(|| {
            let out: Vec<[u8; 4]> = pixels
                .iter()
                .map(|&p| colorize_operation(p, black_box(&data)))
                .collect();
            black_box(out);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_colorize);
criterion_main!(benches);
