//! K-means clustering for raster data
//!
//! Unsupervised classification by iteratively partitioning training
//! samples into k clusters by Euclidean distance over all bands.

use super::centre::ClusterCentre;
use super::init::{InitMethod, Samples, collect_samples, distance_sq, initialise, nearest};
use crate::maybe_rayon::*;
use imgcalc_core::{Algorithm, Error, MemRaster, Result};
use imgcalc_engine::CancelToken;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Parameters for K-means clustering
#[derive(Debug, Clone)]
pub struct KmeansParams {
    /// Number of clusters
    pub num_clusters: usize,
    /// Maximum iterations (default: 100)
    pub max_iterations: usize,
    /// Stop when no centre moves further than this (default: 0.001)
    pub degree_of_change: f64,
    pub init: InitMethod,
    /// Use every n-th valid pixel as a training sample
    pub subsample: usize,
    /// Pixels whose bands all equal this value are not sampled
    pub nodata: Option<f64>,
    /// Random seed for initialisation
    pub seed: u64,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            num_clusters: 5,
            max_iterations: 100,
            degree_of_change: 0.001,
            init: InitMethod::KMeansPlusPlus,
            subsample: 1,
            nodata: None,
            seed: 42,
        }
    }
}

/// Final centres of a clustering run
#[derive(Debug, Clone, PartialEq)]
pub struct KmeansResult {
    pub centres: Vec<ClusterCentre>,
    pub iterations: usize,
    pub converged: bool,
}

/// K-means algorithm
#[derive(Debug, Clone, Default)]
pub struct Kmeans;

impl Algorithm for Kmeans {
    type Input = MemRaster;
    type Output = KmeansResult;
    type Params = KmeansParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "KMeans"
    }

    fn description(&self) -> &'static str {
        "K-means clustering of multi-band pixels"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        kmeans(&input, &params)
    }
}

/// Label of the nearest centre for every sample
pub(crate) fn assign<T: AsRef<[f64]> + Sync>(samples: &Samples, centres: &[T]) -> Vec<usize> {
    (0..samples.len())
        .into_par_iter()
        .map(|i| nearest(samples.get(i), centres).0)
        .collect()
}

/// Member count and mean of each cluster
pub(crate) fn cluster_means(samples: &Samples, labels: &[usize], k: usize) -> (Vec<usize>, Vec<Vec<f64>>) {
    let dims = samples.dims();
    let mut counts = vec![0usize; k];
    let mut sums = vec![vec![0.0; dims]; k];
    for (sample, &label) in samples.iter().zip(labels) {
        counts[label] += 1;
        for (s, v) in sums[label].iter_mut().zip(sample) {
            *s += v;
        }
    }
    for (sum, &count) in sums.iter_mut().zip(&counts) {
        if count > 0 {
            sum.iter_mut().for_each(|s| *s /= count as f64);
        }
    }
    (counts, sums)
}

/// Run K-means on collected samples
pub fn kmeans_samples(samples: &Samples, params: &KmeansParams, cancel: &CancelToken) -> Result<KmeansResult> {
    if params.num_clusters == 0 {
        return Err(Error::invalid_param("num_clusters", 0, "at least one cluster is required"));
    }
    if samples.len() < params.num_clusters {
        return Err(Error::invalid_param(
            "num_clusters",
            params.num_clusters,
            format!("only {} valid samples", samples.len()),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut centres = initialise(params.init, samples, params.num_clusters, &mut rng)?;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iterations {
        cancel.check()?;
        let labels = assign(samples, &centres);
        let (counts, means) = cluster_means(samples, &labels, centres.len());

        let mut max_shift = 0.0_f64;
        for ((centre, mean), count) in centres.iter_mut().zip(means).zip(counts) {
            // empty clusters keep their previous centre
            if count == 0 {
                continue;
            }
            let shift = distance_sq(&centre.values, &mean).sqrt();
            max_shift = max_shift.max(shift);
            centre.values = mean;
        }
        iterations += 1;
        tracing::debug!(iteration = iterations, max_shift, "k-means iteration");

        if max_shift < params.degree_of_change {
            converged = true;
            break;
        }
    }

    tracing::info!(
        clusters = centres.len(),
        iterations,
        converged,
        samples = samples.len(),
        "k-means finished"
    );
    Ok(KmeansResult {
        centres,
        iterations,
        converged,
    })
}

/// Sample a raster and cluster every band
pub fn kmeans(raster: &MemRaster, params: &KmeansParams) -> Result<KmeansResult> {
    let samples = collect_samples(raster, params.subsample, params.nodata)?;
    kmeans_samples(&samples, params, &CancelToken::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Samples {
        let mut data = Vec::new();
        for i in 0..20 {
            data.extend_from_slice(&[10.0 + (i % 3) as f64, 5.0]);
            data.extend_from_slice(&[100.0 + (i % 3) as f64, 50.0]);
        }
        Samples::from_vec(2, data).unwrap()
    }

    #[test]
    fn test_two_groups_separate() {
        let params = KmeansParams {
            num_clusters: 2,
            ..Default::default()
        };
        let result = kmeans_samples(&two_groups(), &params, &CancelToken::new()).unwrap();
        assert!(result.converged);
        let mut firsts: Vec<f64> = result.centres.iter().map(|c| c.values[0]).collect();
        firsts.sort_by(|a, b| a.total_cmp(b));
        assert!((firsts[0] - 11.0).abs() < 1e-10);
        assert!((firsts[1] - 101.0).abs() < 1e-10);
    }

    #[test]
    fn test_empty_cluster_keeps_centre() {
        let samples = Samples::from_vec(1, vec![0.0, 0.0, 10.0, 10.0]).unwrap();
        // no sample is nearest to the middle seed at 5
        let params = KmeansParams {
            num_clusters: 3,
            init: InitMethod::DiagonalFull,
            ..Default::default()
        };
        let result = kmeans_samples(&samples, &params, &CancelToken::new()).unwrap();
        assert_eq!(result.centres.len(), 3);
        assert_eq!(result.centres[1].values, vec![5.0]);
    }

    #[test]
    fn test_ties_go_to_first_centre() {
        let samples = Samples::from_vec(1, vec![5.0]).unwrap();
        let centres = vec![ClusterCentre::new(0, vec![4.0]), ClusterCentre::new(1, vec![6.0])];
        assert_eq!(assign(&samples, &centres), vec![0]);
    }

    #[test]
    fn test_seed_reproducible() {
        let params = KmeansParams {
            num_clusters: 3,
            init: InitMethod::Random,
            seed: 11,
            ..Default::default()
        };
        let a = kmeans_samples(&two_groups(), &params, &CancelToken::new()).unwrap();
        let b = kmeans_samples(&two_groups(), &params, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_samples() {
        let samples = Samples::from_vec(1, vec![1.0]).unwrap();
        let params = KmeansParams {
            num_clusters: 2,
            ..Default::default()
        };
        assert!(kmeans_samples(&samples, &params, &CancelToken::new()).is_err());
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let params = KmeansParams {
            num_clusters: 2,
            ..Default::default()
        };
        assert!(matches!(kmeans_samples(&two_groups(), &params, &cancel), Err(Error::Cancelled)));
    }

    #[test]
    fn test_kmeans_on_raster() {
        let mut r = MemRaster::new(1, 10, 10);
        for row in 0..10 {
            for col in 0..10 {
                r.set(0, row, col, if row < 5 { 10.0 } else { 100.0 }).unwrap();
            }
        }
        let params = KmeansParams {
            num_clusters: 2,
            ..Default::default()
        };
        let result = Kmeans.execute(r, params).unwrap();
        assert_eq!(result.centres.len(), 2);
    }
}
