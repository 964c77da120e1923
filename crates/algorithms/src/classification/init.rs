//! Training samples and centre initialisation.
//!
//! Samples are every `subsample`-th valid pixel of a raster. Initial
//! centres come from one of several seeding strategies; every random
//! choice is drawn from a seeded ChaCha RNG, so a fixed seed reproduces a
//! run exactly.

use super::centre::ClusterCentre;
use imgcalc_core::{Error, RasterSource, Result};
use imgcalc_engine::{Accumulator, ImageCalc, NoDataPolicy};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Centre seeding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMethod {
    /// Uniform random values within the per-dimension sample range
    Random,
    /// Evenly spaced along the diagonal from the per-dimension min to max
    DiagonalFull,
    /// Evenly spaced along the diagonal between mean - stddev and mean + stddev
    DiagonalStdDev,
    /// `DiagonalFull`, then each seed snaps to its nearest sample
    DiagonalFullAttach,
    /// `DiagonalStdDev`, then each seed snaps to its nearest sample
    DiagonalStdDevAttach,
    /// D² weighted seeding
    #[default]
    KMeansPlusPlus,
}

impl InitMethod {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "diagonal_full" => Ok(Self::DiagonalFull),
            "diagonal_stddev" => Ok(Self::DiagonalStdDev),
            "diagonal_full_attach" => Ok(Self::DiagonalFullAttach),
            "diagonal_stddev_attach" => Ok(Self::DiagonalStdDevAttach),
            "kmeans++" | "kmeanspp" => Ok(Self::KMeansPlusPlus),
            _ => Err(Error::invalid_param("init", name, "unknown initialisation method")),
        }
    }
}

/// Row-major sample table, one row per pixel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    dims: usize,
    data: Vec<f64>,
}

impl Samples {
    pub fn new(dims: usize) -> Self {
        Self { dims, data: Vec::new() }
    }

    /// Build from a flat row-major buffer
    pub fn from_vec(dims: usize, data: Vec<f64>) -> Result<Self> {
        if dims == 0 || data.len() % dims != 0 {
            return Err(Error::invalid_param(
                "samples",
                data.len(),
                format!("length must be a multiple of {} dimensions", dims),
            ));
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 { 0 } else { self.data.len() / self.dims }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> &[f64] {
        &self.data[i * self.dims..(i + 1) * self.dims]
    }

    pub fn push(&mut self, sample: &[f64]) {
        self.data.extend_from_slice(sample);
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.dims.max(1))
    }

    /// Per-dimension minimum and maximum
    pub fn min_max(&self) -> (Vec<f64>, Vec<f64>) {
        let mut min = vec![f64::INFINITY; self.dims];
        let mut max = vec![f64::NEG_INFINITY; self.dims];
        for s in self.iter() {
            for d in 0..self.dims {
                min[d] = min[d].min(s[d]);
                max[d] = max[d].max(s[d]);
            }
        }
        (min, max)
    }

    /// Per-dimension mean and population standard deviation
    pub fn mean_std_dev(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.len().max(1) as f64;
        let mut mean = vec![0.0; self.dims];
        for s in self.iter() {
            for (m, v) in mean.iter_mut().zip(s) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);
        let mut var = vec![0.0; self.dims];
        for s in self.iter() {
            for d in 0..self.dims {
                var[d] += (s[d] - mean[d]).powi(2);
            }
        }
        let std_dev = var.into_iter().map(|v| (v / n).sqrt()).collect();
        (mean, std_dev)
    }
}

/// Accumulator that keeps every `subsample`-th valid pixel
#[derive(Debug, Clone)]
pub struct SampleCollector {
    subsample: usize,
    nodata: NoDataPolicy,
    seen: usize,
    samples: Samples,
}

impl SampleCollector {
    /// `nodata` excludes pixels whose bands all equal it; `None` keeps every pixel
    pub fn new(dims: usize, subsample: usize, nodata: Option<f64>) -> Self {
        Self {
            subsample: subsample.max(1),
            nodata: NoDataPolicy::from_option(nodata),
            seen: 0,
            samples: Samples::new(dims),
        }
    }

    pub fn into_samples(self) -> Samples {
        self.samples
    }
}

impl Accumulator for SampleCollector {
    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != self.samples.dims() {
            return Err(Error::OutputBands {
                expected: self.samples.dims(),
                actual: num_bands,
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.samples = Samples::new(self.samples.dims());
    }

    fn accumulate(&mut self, sample: &[f64]) -> Result<()> {
        if self.seen % self.subsample == 0 {
            self.samples.push(sample);
        }
        self.seen += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<f64>> {
        Ok(vec![self.samples.len() as f64])
    }
}

/// Collect training samples from every band of a raster
pub fn collect_samples(raster: &dyn RasterSource, subsample: usize, nodata: Option<f64>) -> Result<Samples> {
    let mut collector = SampleCollector::new(raster.band_count(), subsample, nodata);
    ImageCalc::default().accumulate(&[raster], &mut collector)?;
    let samples = collector.into_samples();
    tracing::debug!(samples = samples.len(), subsample, "collected training samples");
    Ok(samples)
}

/// Squared Euclidean distance
#[inline]
pub(crate) fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the nearest centre and its squared distance; the first centre
/// at the minimum distance wins.
#[inline]
pub(crate) fn nearest<T: AsRef<[f64]>>(sample: &[f64], centres: &[T]) -> (usize, f64) {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centres.iter().enumerate() {
        let d = distance_sq(sample, c.as_ref());
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    (best, best_dist)
}

fn diagonal(lo: &[f64], hi: &[f64], k: usize) -> Vec<Vec<f64>> {
    (0..k)
        .map(|i| {
            let t = if k == 1 { 0.5 } else { i as f64 / (k - 1) as f64 };
            lo.iter().zip(hi).map(|(l, h)| l + t * (h - l)).collect()
        })
        .collect()
}

fn attach(seeds: Vec<Vec<f64>>, samples: &Samples) -> Vec<Vec<f64>> {
    seeds
        .into_iter()
        .map(|seed| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (i, s) in samples.iter().enumerate() {
                let d = distance_sq(&seed, s);
                if d < best_dist {
                    best_dist = d;
                    best = i;
                }
            }
            samples.get(best).to_vec()
        })
        .collect()
}

fn kmeans_plus_plus(samples: &Samples, k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let n = samples.len();
    let mut seeds: Vec<Vec<f64>> = Vec::with_capacity(k);
    seeds.push(samples.get(rng.random_range(0..n)).to_vec());
    let mut weights: Vec<f64> = samples.iter().map(|s| distance_sq(s, &seeds[0])).collect();

    while seeds.len() < k {
        let total: f64 = weights.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            for (i, w) in weights.iter().enumerate() {
                cumulative += w;
                if *w > 0.0 && cumulative > target {
                    pick = Some(i);
                    break;
                }
            }
            // rounding can leave the target just past the last positive weight
            pick.or_else(|| weights.iter().rposition(|w| *w > 0.0)).unwrap_or(0)
        } else {
            rng.random_range(0..n)
        };
        let seed = samples.get(chosen).to_vec();
        for (w, s) in weights.iter_mut().zip(samples.iter()) {
            *w = w.min(distance_sq(s, &seed));
        }
        seeds.push(seed);
    }
    seeds
}

/// Seed `k` centres from the samples
pub fn initialise(method: InitMethod, samples: &Samples, k: usize, rng: &mut ChaCha8Rng) -> Result<Vec<ClusterCentre>> {
    if k == 0 {
        return Err(Error::invalid_param("num_clusters", 0, "at least one cluster is required"));
    }
    if samples.is_empty() {
        return Err(Error::invalid_param("samples", 0, "no valid samples to initialise from"));
    }

    let seeds = match method {
        InitMethod::Random => {
            let (min, max) = samples.min_max();
            (0..k)
                .map(|_| {
                    min.iter()
                        .zip(&max)
                        .map(|(lo, hi)| lo + rng.random::<f64>() * (hi - lo))
                        .collect()
                })
                .collect()
        }
        InitMethod::DiagonalFull | InitMethod::DiagonalFullAttach => {
            let (min, max) = samples.min_max();
            diagonal(&min, &max, k)
        }
        InitMethod::DiagonalStdDev | InitMethod::DiagonalStdDevAttach => {
            let (mean, std_dev) = samples.mean_std_dev();
            let lo: Vec<f64> = mean.iter().zip(&std_dev).map(|(m, s)| m - s).collect();
            let hi: Vec<f64> = mean.iter().zip(&std_dev).map(|(m, s)| m + s).collect();
            diagonal(&lo, &hi, k)
        }
        InitMethod::KMeansPlusPlus => kmeans_plus_plus(samples, k, rng),
    };

    let seeds = match method {
        InitMethod::DiagonalFullAttach | InitMethod::DiagonalStdDevAttach => attach(seeds, samples),
        _ => seeds,
    };

    Ok(seeds
        .into_iter()
        .enumerate()
        .map(|(id, values)| ClusterCentre::new(id, values))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgcalc_core::MemRaster;
    use rand::SeedableRng;

    fn line_samples() -> Samples {
        Samples::from_vec(2, vec![0.0, 10.0, 1.0, 12.0, 4.0, 20.0, 10.0, 30.0]).unwrap()
    }

    #[test]
    fn test_diagonal_full_spans_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let c = initialise(InitMethod::DiagonalFull, &line_samples(), 3, &mut rng).unwrap();
        assert_eq!(c[0].values, vec![0.0, 10.0]);
        assert_eq!(c[1].values, vec![5.0, 20.0]);
        assert_eq!(c[2].values, vec![10.0, 30.0]);
    }

    #[test]
    fn test_attach_snaps_to_samples() {
        let samples = line_samples();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let c = initialise(InitMethod::DiagonalFullAttach, &samples, 3, &mut rng).unwrap();
        for centre in &c {
            assert!(samples.iter().any(|s| s == centre.values.as_slice()));
        }
        assert_eq!(c[1].values, vec![4.0, 20.0]);
    }

    #[test]
    fn test_random_within_range_and_seeded() {
        let samples = line_samples();
        let a = initialise(InitMethod::Random, &samples, 4, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        let b = initialise(InitMethod::Random, &samples, 4, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        for c in &a {
            assert!((0.0..=10.0).contains(&c.values[0]));
            assert!((10.0..=30.0).contains(&c.values[1]));
        }
    }

    #[test]
    fn test_kmeans_plus_plus_distinct_seeds() {
        let samples = Samples::from_vec(1, vec![0.0, 0.0, 0.0, 100.0, 100.0, 100.0]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let c = initialise(InitMethod::KMeansPlusPlus, &samples, 2, &mut rng).unwrap();
        // the second seed can only be drawn from the other group
        assert!((c[0].values[0] - c[1].values[0]).abs() == 100.0);
    }

    #[test]
    fn test_collect_subsample_and_nodata() {
        let mut r = MemRaster::new(1, 2, 5);
        for (i, v) in r.data_mut().iter_mut().enumerate() {
            *v = i as f64;
        }
        r.set(0, 0, 0, -9.0).unwrap();
        let all = collect_samples(&r, 1, None).unwrap();
        assert_eq!(all.len(), 10);
        let valid = collect_samples(&r, 1, Some(-9.0)).unwrap();
        assert_eq!(valid.len(), 9);
        let every_third = collect_samples(&r, 3, Some(-9.0)).unwrap();
        let values: Vec<f64> = every_third.iter().map(|s| s[0]).collect();
        assert_eq!(values, vec![1.0, 4.0, 7.0]);
    }

    #[test]
    fn test_init_errors() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(initialise(InitMethod::Random, &Samples::new(2), 2, &mut rng).is_err());
        assert!(initialise(InitMethod::Random, &line_samples(), 0, &mut rng).is_err());
        assert!(InitMethod::parse("bogus").is_err());
        assert_eq!(InitMethod::parse("kmeans++").unwrap(), InitMethod::KMeansPlusPlus);
    }
}
