//! End-to-end pipelines over the engine, algorithms and file formats.

use imgcalc_algorithms::classification::{
    InitMethod, IsodataParams, KmeansParams, classify, isodata, kmeans, load_centres, save_centres,
};
use imgcalc_algorithms::imagery::{BandMathParams, band_math};
use imgcalc_algorithms::morphology::{StructuringElement, opening};
use imgcalc_algorithms::segmentation::{ClumpParams, clump};
use imgcalc_algorithms::statistics::{WindowStatistic, WindowStatsParams, correlation_matrix, window_statistics};
use imgcalc_algorithms::unmixing::{EndmemberMatrix, UnmixMethod, UnmixParams, unmix};
use imgcalc_core::io::{read_geotiff, write_matrix};
use imgcalc_core::{DataType, GeoTransform, MemRaster, OutputSpec};
use imgcalc_engine::{ImageCalc, ProcessingMode};
use ndarray::array;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

fn block_in_zeros() -> MemRaster {
    let mut r = MemRaster::new(1, 4, 4);
    for (row, col) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
        r.set(0, row, col, 1.0).unwrap();
    }
    r
}

fn distinct_labels(r: &MemRaster) -> Vec<f64> {
    let mut ids: Vec<f64> = r.data().iter().copied().filter(|v| *v > 0.0).collect();
    ids.sort_by(|a, b| a.total_cmp(b));
    ids.dedup();
    ids
}

// ---------------------------------------------------------------------------
// Clumping
// ---------------------------------------------------------------------------

#[test]
fn clump_block_with_zero_nodata() {
    let params = ClumpParams {
        nodata: Some(0.0),
        ..Default::default()
    };
    let result = clump(&block_in_zeros(), &params).unwrap();
    assert_eq!(distinct_labels(&result.labels).len(), 1);
    let zeros = result.labels.data().iter().filter(|v| **v == 0.0).count();
    assert_eq!(zeros, 12);
}

#[test]
fn clump_block_without_nodata() {
    let result = clump(&block_in_zeros(), &ClumpParams::default()).unwrap();
    assert_eq!(distinct_labels(&result.labels).len(), 2);
    assert!(result.labels.data().iter().all(|v| *v > 0.0));
    assert!(result.passes <= 4);
}

/// One-pixel-wide spiral of 1s with 0 walls, walked inwards from the corner
fn spiral(size: usize) -> MemRaster {
    let mut r = MemRaster::new(1, size, size);
    let inside = |row: isize, col: isize| row >= 0 && col >= 0 && row < size as isize && col < size as isize;
    let dirs = [(0isize, 1isize), (1, 0), (0, -1), (-1, 0)];
    let (mut row, mut col, mut d) = (0isize, 0isize, 0usize);
    r.set(0, 0, 0, 1.0).unwrap();
    let mut turns = 0;
    while turns < 2 {
        let (dr, dc) = dirs[d];
        let (r1, c1) = (row + dr, col + dc);
        let (r2, c2) = (row + 2 * dr, col + 2 * dc);
        let free = |rr: isize, cc: isize, r: &MemRaster| r.get(0, rr as usize, cc as usize).unwrap() == 0.0;
        let step = inside(r1, c1) && free(r1, c1, &r) && (!inside(r2, c2) || free(r2, c2, &r));
        if step {
            row = r1;
            col = c1;
            r.set(0, row as usize, col as usize, 1.0).unwrap();
            turns = 0;
        } else {
            d = (d + 1) % 4;
            turns += 1;
        }
    }
    r
}

#[test]
fn clump_spiral_within_pass_bound() {
    let raster = spiral(15);
    // the spiral winds at least three times round the centre
    let ones = raster.data().iter().filter(|v| **v == 1.0).count();
    assert!(ones > 100, "spiral has only {} pixels", ones);

    let params = ClumpParams {
        nodata: Some(0.0),
        ..Default::default()
    };
    let result = clump(&raster, &params).unwrap();
    assert_eq!(distinct_labels(&result.labels).len(), 1);
    assert!(result.passes <= 15, "{} passes for a 15x15 spiral", result.passes);

    // the walls form a second spiral when 0 is a value
    let result = clump(&raster, &ClumpParams::default()).unwrap();
    assert_eq!(distinct_labels(&result.labels).len(), 2);
    assert!(result.labels.data().iter().all(|v| *v > 0.0));
    assert!(result.passes <= 15, "{} passes for a 15x15 spiral", result.passes);
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Standard normal draw (Box-Muller)
fn normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn gaussian_clusters(means: &[[f64; 2]], per_cluster: usize) -> MemRaster {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let total = means.len() * per_cluster;
    let mut r = MemRaster::new(2, 1, total);
    for (i, mean) in means.iter().enumerate() {
        for j in 0..per_cluster {
            let col = i * per_cluster + j;
            r.set_pixel(0, col, &[mean[0] + normal(&mut rng), mean[1] + normal(&mut rng)]);
        }
    }
    r
}

#[test]
fn kmeans_plus_plus_recovers_gaussian_means() {
    let means = [[0.0, 0.0], [50.0, 50.0], [100.0, 0.0]];
    let raster = gaussian_clusters(&means, 200);
    let params = KmeansParams {
        num_clusters: 3,
        init: InitMethod::KMeansPlusPlus,
        seed: 7,
        ..Default::default()
    };
    let result = kmeans(&raster, &params).unwrap();
    assert_eq!(result.centres.len(), 3);
    for mean in &means {
        let closest = result
            .centres
            .iter()
            .map(|c| ((c.values[0] - mean[0]).powi(2) + (c.values[1] - mean[1]).powi(2)).sqrt())
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 0.5, "no centre near {:?} (closest {})", mean, closest);
    }
}

#[test]
fn kmeans_centres_classify_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("centres.mtxt");

    let mut raster = gaussian_clusters(&[[10.0, 10.0], [90.0, 90.0]], 50);
    raster.set_pixel(0, 0, &[-1.0, -1.0]);
    let params = KmeansParams {
        num_clusters: 2,
        nodata: Some(-1.0),
        ..Default::default()
    };
    let result = kmeans(&raster, &params).unwrap();
    save_centres(&path, &result.centres).unwrap();
    let centres = load_centres(&path).unwrap();

    let classes = classify(&raster, &centres, Some(-1.0)).unwrap();
    assert_eq!(classes.get(0, 0, 0).unwrap(), 0.0);
    let first = classes.get(0, 0, 1).unwrap();
    let last = classes.get(0, 0, 99).unwrap();
    assert!(first >= 1.0 && first <= 2.0);
    assert!(last >= 1.0 && last <= 2.0);
    assert_ne!(first, last);
}

#[test]
fn isodata_restructured_last_iteration_gives_class_means() {
    let mut raster = MemRaster::new(1, 10, 10);
    for col in 0..10 {
        for row in 8..10 {
            raster.set(0, row, col, 100.0).unwrap();
        }
    }
    let params = IsodataParams {
        num_clusters: 1,
        min_num_clusters: 1,
        max_iterations: 1,
        start_iteration: 0,
        end_iteration: 1,
        min_num_features: 5,
        init: InitMethod::DiagonalFull,
        ..Default::default()
    };
    let result = isodata(&raster, &params).unwrap();
    let centres = result.plain_centres();
    assert_eq!(centres.len(), 2);

    let classes = classify(&raster, &centres, None).unwrap();
    for (i, centre) in centres.iter().enumerate() {
        let class = (i + 1) as f64;
        let members: Vec<f64> = raster
            .data()
            .iter()
            .zip(classes.data().iter())
            .filter(|(_, c)| **c == class)
            .map(|(v, _)| *v)
            .collect();
        assert!(!members.is_empty());
        let mean = members.iter().sum::<f64>() / members.len() as f64;
        assert!((centre.values[0] - mean).abs() < 1e-10, "centre {} vs mean {}", centre.values[0], mean);
    }
}

// ---------------------------------------------------------------------------
// Unmixing
// ---------------------------------------------------------------------------

fn endmember_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("endmembers.mtxt");
    let table = array![
        [0.1, 0.2, 0.4, 0.6, 0.7],
        [0.5, 0.4, 0.3, 0.2, 0.1],
        [0.2, 0.6, 0.2, 0.5, 0.9],
    ];
    write_matrix(&path, &table).unwrap();
    path
}

fn mixed_raster(em: &EndmemberMatrix) -> (MemRaster, Vec<[f64; 3]>) {
    let mut r = MemRaster::new(em.num_bands(), 3, 3);
    let mut fractions = Vec::new();
    for row in 0..3 {
        for col in 0..3 {
            let f1 = 0.1 * (row + 1) as f64;
            let f2 = 0.05 * (col + 1) as f64;
            let f = [f1, f2, 1.0 - f1 - f2];
            let pixel: Vec<f64> = (0..em.num_bands())
                .map(|b| (0..3).map(|e| f[e] * em.matrix()[(b, e)]).sum())
                .collect();
            r.set_pixel(row, col, &pixel);
            fractions.push(f);
        }
    }
    (r, fractions)
}

#[test]
fn unconstrained_unmixing_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let em = Arc::new(EndmemberMatrix::load(endmember_file(dir.path())).unwrap());
    assert_eq!(em.num_bands(), 5);
    let (raster, fractions) = mixed_raster(&em);

    let out = unmix(&raster, em, &UnmixParams::default()).unwrap();
    assert_eq!(out.bands(), 3);
    for (i, f) in fractions.iter().enumerate() {
        let (row, col) = (i / 3, i % 3);
        for e in 0..3 {
            let got = out.get(e, row, col).unwrap();
            assert!((got - f[e]).abs() < 1e-9, "pixel {} endmember {}: {} vs {}", i, e, got, f[e]);
        }
    }
}

#[test]
fn exhaustive_unmixing_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let em = Arc::new(EndmemberMatrix::load(endmember_file(dir.path())).unwrap());
    let (raster, _) = mixed_raster(&em);
    let params = UnmixParams {
        method: UnmixMethod::Exhaustive { step: 0.05 },
        ..Default::default()
    };
    let a = unmix(&raster, em.clone(), &params).unwrap();
    let b = unmix(&raster, em, &params).unwrap();
    assert_eq!(a.bands(), 4);
    let bits_a: Vec<u64> = a.data().iter().map(|v| v.to_bits()).collect();
    let bits_b: Vec<u64> = b.data().iter().map(|v| v.to_bits()).collect();
    assert_eq!(bits_a, bits_b);
}

// ---------------------------------------------------------------------------
// Engine policies
// ---------------------------------------------------------------------------

#[test]
fn window_at_border_uses_clamped_coordinates() {
    let data: Vec<f64> = (0..25).map(|v| ((v * 37) % 11) as f64).collect();
    let r = MemRaster::from_vec(1, 5, 5, data).unwrap();
    let params = WindowStatsParams {
        statistic: WindowStatistic::Sum,
        ..Default::default()
    };
    let out = window_statistics(&r, &params).unwrap();
    for (row, col) in [(0, 0), (0, 4), (4, 2), (2, 0)] {
        let mut expected = 0.0;
        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                let rr = (row as isize + dr).clamp(0, 4) as usize;
                let cc = (col as isize + dc).clamp(0, 4) as usize;
                expected += r.get(0, rr, cc).unwrap();
            }
        }
        assert!((out.get(0, row, col).unwrap() - expected).abs() < 1e-10);
    }
}

#[test]
fn all_nodata_pixels_give_zero() {
    let mut a = MemRaster::filled(2, 3, 3, 4.0);
    a.set_pixel(1, 1, &[-9.0, -9.0]);
    a.set_pixel(0, 0, &[-9.0, 2.0]);
    let params = BandMathParams {
        expressions: vec!["b1 + b2 + 100".into()],
        nodata: Some(-9.0),
        ..Default::default()
    };
    let out = band_math(&[&a], &params).unwrap();
    assert_eq!(out.get(0, 1, 1).unwrap(), 0.0);
    // only some bands are no-data, so the pixel is computed
    assert!((out.get(0, 0, 0).unwrap() - 93.0).abs() < 1e-10);
}

#[test]
fn correlation_of_band_and_its_negation() {
    let mut r = MemRaster::new(3, 4, 4);
    for row in 0..4 {
        for col in 0..4 {
            let v = (row * 4 + col) as f64 * 0.5 + ((row + col) % 3) as f64;
            r.set_pixel(row, col, &[v, -v, v]);
        }
    }
    let m = correlation_matrix(&r, None, ProcessingMode::Parallel).unwrap();
    assert!((m[(0, 1)] + 1.0).abs() < 1e-10);
    assert!((m[(0, 2)] - 1.0).abs() < 1e-10);
    assert!((m[(1, 0)] + 1.0).abs() < 1e-10);
}

#[test]
fn opening_removes_isolated_speck() {
    let mut r = MemRaster::new(1, 9, 9);
    r.set(0, 4, 4, 50.0).unwrap();
    let out = opening(&r, &StructuringElement::Square(1)).unwrap();
    assert!(out.data().iter().all(|v| *v == 0.0));
}

// ---------------------------------------------------------------------------
// GeoTIFF
// ---------------------------------------------------------------------------

#[test]
fn band_math_to_geotiff_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ndvi.tif");

    let mut input = MemRaster::new(2, 4, 6);
    input.set_transform(GeoTransform::new(500_000.0, 4_200_000.0, 30.0, -30.0));
    for row in 0..4 {
        for col in 0..6 {
            input.set_pixel(row, col, &[0.1 + 0.01 * col as f64, 0.5 + 0.02 * row as f64]);
        }
    }

    let params = BandMathParams {
        expressions: vec!["(b2 - b1) / (b2 + b1)".into()],
        ..Default::default()
    };
    let mut calc = imgcalc_algorithms::imagery::BandMath::new(&params).unwrap();
    let spec = OutputSpec::geotiff(1, &path)
        .with_data_type(DataType::F64)
        .with_nodata(Some(-9999.0));
    let mut sink = spec.create_sink(&input).unwrap();
    ImageCalc::default().calc_image(&[&input], &mut calc, sink.as_mut()).unwrap();

    let back = read_geotiff(&path).unwrap();
    assert_eq!((back.bands(), back.rows(), back.cols()), (1, 4, 6));
    assert!(back.transform().same_grid(&input.transform(), 1e-9));
    assert_eq!(imgcalc_core::RasterSource::nodata(&back, 0), Some(-9999.0));
    for row in 0..4 {
        for col in 0..6 {
            let (red, nir) = (0.1 + 0.01 * col as f64, 0.5 + 0.02 * row as f64);
            let expected = (nir - red) / (nir + red);
            assert!((back.get(0, row, col).unwrap() - expected).abs() < 1e-12);
        }
    }
}
