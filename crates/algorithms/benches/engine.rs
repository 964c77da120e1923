//! Benchmarks for the pixel, window and alongside passes

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use imgcalc_algorithms::imagery::{BandMathParams, band_math};
use imgcalc_algorithms::segmentation::{ClumpParams, clump};
use imgcalc_algorithms::statistics::{WindowStatistic, WindowStatsParams, window_statistics};
use imgcalc_core::MemRaster;

fn create_stack(bands: usize, size: usize) -> MemRaster {
    let mut r = MemRaster::new(bands, size, size);
    for b in 0..bands {
        for row in 0..size {
            for col in 0..size {
                let v = ((row * 31 + col * 17 + b * 7) % 200) as f64 / 200.0;
                r.set(b, row, col, v).unwrap();
            }
        }
    }
    r
}

fn bench_band_math(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/band_math");
    let params = BandMathParams {
        expressions: vec!["(b4 - b3) / (b4 + b3)".into()],
        ..Default::default()
    };
    for size in [256, 512, 1024] {
        let raster = create_stack(4, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| band_math(&[black_box(&raster)], &params).unwrap())
        });
    }
    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/window_mean");
    let raster = create_stack(1, 512);
    for radius in [1, 2, 3] {
        let params = WindowStatsParams {
            radius,
            statistic: WindowStatistic::Mean,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(radius), &radius, |b, _| {
            b.iter(|| window_statistics(black_box(&raster), &params).unwrap())
        });
    }
    group.finish();
}

fn bench_clump(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/clump");
    group.sample_size(10);
    for size in [64, 128] {
        let mut raster = MemRaster::new(1, size, size);
        for row in 0..size {
            for col in 0..size {
                raster.set(0, row, col, ((row / 8 + col / 8) % 3) as f64).unwrap();
            }
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| clump(black_box(&raster), &ClumpParams::default()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_band_math, bench_window, bench_clump);
criterion_main!(benches);
