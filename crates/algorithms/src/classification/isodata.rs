//! ISODATA clustering algorithm
//!
//! Iterative Self-Organizing Data Analysis Technique. Extends K-means
//! with discarding, splitting and merging of clusters. Inside the
//! iteration window `[start_iteration, end_iteration]` each iteration
//! discards small clusters first, then splits wide ones, then merges
//! close pairs.

use super::centre::{ClusterCentre, ClusterCentreIso};
use super::init::{InitMethod, Samples, collect_samples, distance_sq, initialise};
use super::kmeans::{assign, cluster_means};
use imgcalc_core::{Algorithm, Error, MemRaster, Result};
use imgcalc_engine::CancelToken;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Parameters for ISODATA
#[derive(Debug, Clone)]
pub struct IsodataParams {
    /// Initial number of clusters
    pub num_clusters: usize,
    pub min_num_clusters: usize,
    pub max_num_clusters: usize,
    pub max_iterations: usize,
    /// Stop when no centre moves further than this and nothing was split,
    /// merged or discarded
    pub degree_of_change: f64,
    /// Clusters with fewer members are discarded; splitting needs twice this
    pub min_num_features: usize,
    /// Maximum per-dimension standard deviation before splitting a cluster
    pub max_std_dev: f64,
    /// Centres closer than this are merged
    pub min_dist_between_clusters: f64,
    /// First iteration (zero-based) that may discard, split or merge
    pub start_iteration: usize,
    /// Last iteration that may discard, split or merge
    pub end_iteration: usize,
    pub init: InitMethod,
    pub subsample: usize,
    pub nodata: Option<f64>,
    pub seed: u64,
}

impl Default for IsodataParams {
    fn default() -> Self {
        Self {
            num_clusters: 5,
            min_num_clusters: 2,
            max_num_clusters: 10,
            max_iterations: 50,
            degree_of_change: 0.001,
            min_num_features: 10,
            max_std_dev: 10.0,
            min_dist_between_clusters: 5.0,
            start_iteration: 0,
            end_iteration: 40,
            init: InitMethod::DiagonalStdDev,
            subsample: 1,
            nodata: None,
            seed: 42,
        }
    }
}

impl IsodataParams {
    fn validate(&self) -> Result<()> {
        if self.num_clusters == 0 {
            return Err(Error::invalid_param("num_clusters", 0, "at least one cluster is required"));
        }
        if self.min_num_clusters == 0 || self.min_num_clusters > self.max_num_clusters {
            return Err(Error::invalid_param(
                "min_num_clusters",
                self.min_num_clusters,
                format!("must be between 1 and max_num_clusters ({})", self.max_num_clusters),
            ));
        }
        if self.start_iteration > self.end_iteration {
            return Err(Error::invalid_param(
                "start_iteration",
                self.start_iteration,
                "must not be after end_iteration",
            ));
        }
        Ok(())
    }
}

/// Final centres of an ISODATA run
#[derive(Debug, Clone, PartialEq)]
pub struct IsodataResult {
    pub centres: Vec<ClusterCentreIso>,
    pub iterations: usize,
    pub converged: bool,
}

impl IsodataResult {
    /// Centres without their spread, ready for classification
    pub fn plain_centres(&self) -> Vec<ClusterCentre> {
        self.centres.iter().map(ClusterCentreIso::to_centre).collect()
    }
}

/// ISODATA algorithm
#[derive(Debug, Clone, Default)]
pub struct Isodata;

impl Algorithm for Isodata {
    type Input = MemRaster;
    type Output = IsodataResult;
    type Params = IsodataParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "ISODATA"
    }

    fn description(&self) -> &'static str {
        "ISODATA clustering with discard, split and merge of clusters"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        isodata(&input, &params)
    }
}

/// Recompute means and spreads from the current labels.
/// Returns the largest centre movement.
fn update_centres(samples: &Samples, labels: &[usize], centres: &mut [ClusterCentreIso]) -> f64 {
    let (counts, means) = cluster_means(samples, labels, centres.len());
    let dims = samples.dims();
    let mut sq = vec![vec![0.0; dims]; centres.len()];
    let mut dist = vec![0.0; centres.len()];
    for (sample, &label) in samples.iter().zip(labels) {
        let mean = &means[label];
        for d in 0..dims {
            sq[label][d] += (sample[d] - mean[d]).powi(2);
        }
        dist[label] += distance_sq(sample, mean).sqrt();
    }

    let mut max_shift = 0.0_f64;
    for (i, centre) in centres.iter_mut().enumerate() {
        centre.split = false;
        centre.num_members = counts[i];
        if counts[i] == 0 {
            centre.avg_distance = 0.0;
            continue;
        }
        let n = counts[i] as f64;
        max_shift = max_shift.max(distance_sq(&centre.values, &means[i]).sqrt());
        centre.values = means[i].clone();
        centre.std_dev = sq[i].iter().map(|s| (s / n).sqrt()).collect();
        centre.avg_distance = dist[i] / n;
    }
    max_shift
}

/// Drop clusters below `min_num_features` members while staying at or
/// above `min_num_clusters`. Returns the number discarded.
fn discard(centres: &mut Vec<ClusterCentreIso>, params: &IsodataParams) -> usize {
    let before = centres.len();
    let mut i = 0;
    while i < centres.len() {
        if centres[i].num_members < params.min_num_features && centres.len() > params.min_num_clusters {
            centres.remove(i);
        } else {
            i += 1;
        }
    }
    before - centres.len()
}

/// Split wide clusters into two along their dimension of largest spread.
/// Returns the number of splits.
fn split(centres: &mut Vec<ClusterCentreIso>, params: &IsodataParams) -> usize {
    let mut splits = 0;
    let original = centres.len();
    for i in 0..original {
        if centres.len() >= params.max_num_clusters {
            break;
        }
        let centre = &centres[i];
        let Some((dim, &sd)) = centre
            .std_dev
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            continue;
        };
        if sd <= params.max_std_dev || centre.num_members < 2 * params.min_num_features {
            continue;
        }

        let mut upper = centre.clone();
        upper.values[dim] += sd;
        upper.num_members = centre.num_members / 2;
        upper.split = true;
        let lower = &mut centres[i];
        lower.values[dim] -= sd;
        lower.num_members -= upper.num_members;
        lower.split = true;
        centres.push(upper);
        splits += 1;
    }
    splits
}

/// Merge centre pairs closer than `min_dist_between_clusters`, closest
/// first. A centre merges at most once. Returns the number of merges.
fn merge(centres: &mut Vec<ClusterCentreIso>, params: &IsodataParams) -> usize {
    let mut pairs = Vec::new();
    for i in 0..centres.len() {
        for j in (i + 1)..centres.len() {
            let d = distance_sq(&centres[i].values, &centres[j].values).sqrt();
            if d < params.min_dist_between_clusters {
                pairs.push((d, i, j));
            }
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut used = vec![false; centres.len()];
    let mut removed = vec![false; centres.len()];
    let mut remaining = centres.len();
    let mut merges = 0;
    for (_, i, j) in pairs {
        if used[i] || used[j] || remaining <= params.min_num_clusters {
            continue;
        }
        let (ni, nj) = (centres[i].num_members as f64, centres[j].num_members as f64);
        let (wi, wj) = if ni + nj > 0.0 { (ni / (ni + nj), nj / (ni + nj)) } else { (0.5, 0.5) };
        let merged: Vec<f64> = centres[i]
            .values
            .iter()
            .zip(&centres[j].values)
            .map(|(a, b)| a * wi + b * wj)
            .collect();
        centres[i].values = merged;
        centres[i].num_members += centres[j].num_members;
        used[i] = true;
        used[j] = true;
        removed[j] = true;
        remaining -= 1;
        merges += 1;
    }

    let mut idx = 0;
    centres.retain(|_| {
        let keep = !removed[idx];
        idx += 1;
        keep
    });
    merges
}

fn renumber(centres: &mut [ClusterCentreIso]) {
    for (id, centre) in centres.iter_mut().enumerate() {
        centre.id = id;
        centre.name = format!("class_{}", id + 1);
    }
}

/// Run ISODATA on collected samples
pub fn isodata_samples(samples: &Samples, params: &IsodataParams, cancel: &CancelToken) -> Result<IsodataResult> {
    params.validate()?;
    if samples.len() < params.num_clusters {
        return Err(Error::invalid_param(
            "num_clusters",
            params.num_clusters,
            format!("only {} valid samples", samples.len()),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut centres: Vec<ClusterCentreIso> = initialise(params.init, samples, params.num_clusters, &mut rng)?
        .into_iter()
        .map(ClusterCentreIso::from)
        .collect();
    let mut iterations = 0;
    let mut converged = false;
    let mut restructured = false;

    while iterations < params.max_iterations {
        cancel.check()?;
        let iteration = iterations;
        let labels = assign(samples, &centres);
        let max_shift = update_centres(samples, &labels, &mut centres);

        let mut changes = 0;
        if (params.start_iteration..=params.end_iteration).contains(&iteration) {
            let discarded = discard(&mut centres, params);
            let splits = split(&mut centres, params);
            let merges = merge(&mut centres, params);
            changes = discarded + splits + merges;
            if changes > 0 {
                tracing::debug!(iteration, discarded, splits, merges, clusters = centres.len(), "isodata restructure");
            }
            renumber(&mut centres);
        }
        restructured = changes > 0;
        iterations += 1;
        tracing::debug!(iteration, max_shift, "isodata iteration");

        if changes == 0 && max_shift < params.degree_of_change {
            converged = true;
            break;
        }
    }

    // split seeds and merged averages are not means yet
    if restructured {
        let labels = assign(samples, &centres);
        update_centres(samples, &labels, &mut centres);
    }

    tracing::info!(
        clusters = centres.len(),
        iterations,
        converged,
        samples = samples.len(),
        "isodata finished"
    );
    Ok(IsodataResult {
        centres,
        iterations,
        converged,
    })
}

/// Sample a raster and cluster every band with ISODATA
pub fn isodata(raster: &MemRaster, params: &IsodataParams) -> Result<IsodataResult> {
    let samples = collect_samples(raster, params.subsample, params.nodata)?;
    isodata_samples(&samples, params, &CancelToken::new())
}
