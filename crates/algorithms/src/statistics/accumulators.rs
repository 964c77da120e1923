//! Streaming whole-image reductions.
//!
//! Every accumulator is single-pass with memory independent of the raster
//! size, and resets for reuse. Band indices are fixed at construction.

use imgcalc_core::{Error, RasterSource, Result};
use imgcalc_engine::{Accumulator, ImageCalc, NoDataPolicy, PairedAccumulator, ProcessingMode, check_band};
use ndarray::Array2;

fn require_samples(count: u64, what: &str) -> Result<()> {
    if count == 0 {
        return Err(Error::Numeric(format!("{}: no valid pixels", what)));
    }
    Ok(())
}

/// Per-band mean of every valid pixel
#[derive(Debug, Clone, Default)]
pub struct MeanVector {
    sums: Vec<f64>,
    count: u64,
    nodata: NoDataPolicy,
}

impl MeanVector {
    pub fn new(nodata: Option<f64>) -> Self {
        Self {
            sums: Vec::new(),
            count: 0,
            nodata: NoDataPolicy::from_option(nodata),
        }
    }
}

impl Accumulator for MeanVector {
    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn reset(&mut self) {
        self.sums.clear();
        self.count = 0;
    }

    fn accumulate(&mut self, sample: &[f64]) -> Result<()> {
        if self.sums.len() != sample.len() {
            self.sums = vec![0.0; sample.len()];
        }
        for (s, v) in self.sums.iter_mut().zip(sample) {
            *s += v;
        }
        self.count += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<f64>> {
        require_samples(self.count, "mean vector")?;
        let n = self.count as f64;
        Ok(self.sums.iter().map(|s| s / n).collect())
    }
}

/// Full band covariance matrix, accumulated with Welford co-moments.
///
/// `finalize` returns `[means..., covariance row-major...]`; use
/// [`CovarianceMatrix::split`] to separate them.
#[derive(Debug, Clone, Default)]
pub struct CovarianceMatrix {
    mean: Vec<f64>,
    comoment: Vec<f64>,
    delta: Vec<f64>,
    count: u64,
    nodata: NoDataPolicy,
}

impl CovarianceMatrix {
    pub fn new(nodata: Option<f64>) -> Self {
        Self {
            nodata: NoDataPolicy::from_option(nodata),
            ..Default::default()
        }
    }

    /// Split a finalised vector into the mean vector and the n x n matrix
    pub fn split(values: &[f64]) -> Result<(Vec<f64>, Array2<f64>)> {
        // values.len() == n + n * n
        let n = ((((4 * values.len() + 1) as f64).sqrt() - 1.0) / 2.0).round() as usize;
        if n + n * n != values.len() {
            return Err(Error::invalid_param("values", values.len(), "not a mean vector plus a square matrix"));
        }
        let cov = Array2::from_shape_vec((n, n), values[n..].to_vec()).map_err(|e| Error::Other(e.to_string()))?;
        Ok((values[..n].to_vec(), cov))
    }
}

impl Accumulator for CovarianceMatrix {
    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn reset(&mut self) {
        self.mean.clear();
        self.comoment.clear();
        self.delta.clear();
        self.count = 0;
    }

    fn accumulate(&mut self, sample: &[f64]) -> Result<()> {
        let n = sample.len();
        if self.mean.len() != n {
            self.mean = vec![0.0; n];
            self.comoment = vec![0.0; n * n];
            self.delta = vec![0.0; n];
        }
        self.count += 1;
        let k = self.count as f64;
        for i in 0..n {
            self.delta[i] = sample[i] - self.mean[i];
            self.mean[i] += self.delta[i] / k;
        }
        for i in 0..n {
            for j in 0..n {
                // old delta of i times new delta of j
                self.comoment[i * n + j] += self.delta[i] * (sample[j] - self.mean[j]);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<f64>> {
        if self.count < 2 {
            return Err(Error::Numeric("covariance matrix: fewer than two valid pixels".into()));
        }
        let denom = (self.count - 1) as f64;
        let mut out = self.mean.clone();
        out.extend(self.comoment.iter().map(|c| c / denom));
        Ok(out)
    }
}

/// Covariance of `band_a` in image A and `band_b` in image B.
///
/// With known means the result is `sum((a - ma)(b - mb)) / n`; otherwise
/// the means are estimated on the fly and the sample covariance
/// (`n - 1` denominator) is returned.
#[derive(Debug, Clone)]
pub struct Covariance {
    band_a: usize,
    band_b: usize,
    means: Option<(f64, f64)>,
    mean_a: f64,
    mean_b: f64,
    comoment: f64,
    count: u64,
    nodata: NoDataPolicy,
}

impl Covariance {
    pub fn new(band_a: usize, band_b: usize) -> Self {
        Self {
            band_a,
            band_b,
            means: None,
            mean_a: 0.0,
            mean_b: 0.0,
            comoment: 0.0,
            count: 0,
            nodata: NoDataPolicy::disabled(),
        }
    }

    pub fn with_means(mut self, mean_a: f64, mean_b: f64) -> Self {
        self.means = Some((mean_a, mean_b));
        self
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = NoDataPolicy::from_option(nodata);
        self
    }
}

impl PairedAccumulator for Covariance {
    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, bands_a: usize, bands_b: usize) -> Result<()> {
        check_band(self.band_a, bands_a)?;
        check_band(self.band_b, bands_b)
    }

    fn reset(&mut self) {
        self.mean_a = 0.0;
        self.mean_b = 0.0;
        self.comoment = 0.0;
        self.count = 0;
    }

    fn accumulate_pair(&mut self, a: &[f64], b: &[f64]) -> Result<()> {
        let (x, y) = (a[self.band_a], b[self.band_b]);
        self.count += 1;
        match self.means {
            Some((ma, mb)) => self.comoment += (x - ma) * (y - mb),
            None => {
                let k = self.count as f64;
                let dx = x - self.mean_a;
                self.mean_a += dx / k;
                self.mean_b += (y - self.mean_b) / k;
                self.comoment += dx * (y - self.mean_b);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<f64>> {
        require_samples(self.count, "covariance")?;
        let denom = match self.means {
            Some(_) => self.count as f64,
            None if self.count > 1 => (self.count - 1) as f64,
            None => return Err(Error::Numeric("covariance: fewer than two valid pixels".into())),
        };
        Ok(vec![self.comoment / denom])
    }
}

/// Pearson correlation from running sums.
///
/// As a [`PairedAccumulator`] it correlates `band_a` of image A with
/// `band_b` of image B; as an [`Accumulator`] both bands come from the same
/// sample.
#[derive(Debug, Clone)]
pub struct Correlation {
    band_a: usize,
    band_b: usize,
    n: f64,
    sum_a: f64,
    sum_b: f64,
    sum_aa: f64,
    sum_bb: f64,
    sum_ab: f64,
    nodata: NoDataPolicy,
}

impl Correlation {
    pub fn new(band_a: usize, band_b: usize) -> Self {
        Self {
            band_a,
            band_b,
            n: 0.0,
            sum_a: 0.0,
            sum_b: 0.0,
            sum_aa: 0.0,
            sum_bb: 0.0,
            sum_ab: 0.0,
            nodata: NoDataPolicy::disabled(),
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = NoDataPolicy::from_option(nodata);
        self
    }

    fn clear(&mut self) {
        self.n = 0.0;
        self.sum_a = 0.0;
        self.sum_b = 0.0;
        self.sum_aa = 0.0;
        self.sum_bb = 0.0;
        self.sum_ab = 0.0;
    }

    /// Add one pair; skipped when either correlated value is no-data
    fn add(&mut self, a: f64, b: f64) {
        if self.nodata.is_nodata(a) || self.nodata.is_nodata(b) {
            return;
        }
        self.n += 1.0;
        self.sum_a += a;
        self.sum_b += b;
        self.sum_aa += a * a;
        self.sum_bb += b * b;
        self.sum_ab += a * b;
    }

    /// Correlation of the values added so far
    pub fn value(&self) -> Result<f64> {
        if self.n < 2.0 {
            return Err(Error::Numeric("correlation: fewer than two valid pixels".into()));
        }
        let n = self.n;
        let num = n * self.sum_ab - self.sum_a * self.sum_b;
        let var_a = n * self.sum_aa - self.sum_a * self.sum_a;
        let var_b = n * self.sum_bb - self.sum_b * self.sum_b;
        let denom = (var_a * var_b).sqrt();
        if denom <= 0.0 {
            tracing::warn!("correlation of a constant series is undefined");
            return Ok(f64::NAN);
        }
        Ok((num / denom).clamp(-1.0, 1.0))
    }
}

impl PairedAccumulator for Correlation {
    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, bands_a: usize, bands_b: usize) -> Result<()> {
        check_band(self.band_a, bands_a)?;
        check_band(self.band_b, bands_b)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn accumulate_pair(&mut self, a: &[f64], b: &[f64]) -> Result<()> {
        self.add(a[self.band_a], b[self.band_b]);
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<f64>> {
        Ok(vec![self.value()?])
    }
}

impl Accumulator for Correlation {
    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        check_band(self.band_a, num_bands)?;
        check_band(self.band_b, num_bands)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn accumulate(&mut self, sample: &[f64]) -> Result<()> {
        self.add(sample[self.band_a], sample[self.band_b]);
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<f64>> {
        Ok(vec![self.value()?])
    }
}

/// Root mean square difference between `band_a` of A and `band_b` of B
#[derive(Debug, Clone)]
pub struct Rmse {
    band_a: usize,
    band_b: usize,
    sum_sq: f64,
    count: u64,
    nodata: NoDataPolicy,
}

impl Rmse {
    pub fn new(band_a: usize, band_b: usize) -> Self {
        Self {
            band_a,
            band_b,
            sum_sq: 0.0,
            count: 0,
            nodata: NoDataPolicy::disabled(),
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = NoDataPolicy::from_option(nodata);
        self
    }
}

impl PairedAccumulator for Rmse {
    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, bands_a: usize, bands_b: usize) -> Result<()> {
        check_band(self.band_a, bands_a)?;
        check_band(self.band_b, bands_b)
    }

    fn reset(&mut self) {
        self.sum_sq = 0.0;
        self.count = 0;
    }

    fn accumulate_pair(&mut self, a: &[f64], b: &[f64]) -> Result<()> {
        let d = a[self.band_a] - b[self.band_b];
        self.sum_sq += d * d;
        self.count += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<f64>> {
        require_samples(self.count, "rmse")?;
        Ok(vec![(self.sum_sq / self.count as f64).sqrt()])
    }
}

/// Band-by-band correlation matrix of one raster.
///
/// Each band pair runs its own [`Correlation`] pass; pairs are independent
/// jobs scheduled by `mode`.
pub fn correlation_matrix<R>(raster: &R, nodata: Option<f64>, mode: ProcessingMode) -> Result<Array2<f64>>
where
    R: RasterSource + Sync,
{
    let n = raster.band_count();
    let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).collect();
    let jobs: Vec<_> = pairs
        .iter()
        .map(|&(i, j)| {
            move || -> Result<f64> {
                let mut acc = Correlation::new(i, j).with_nodata(nodata);
                let values = ImageCalc::default().accumulate(&[raster as &dyn RasterSource], &mut acc)?;
                Ok(values[0])
            }
        })
        .collect();
    let results = mode.run_jobs(jobs)?;

    let mut matrix = Array2::eye(n);
    for (&(i, j), r) in pairs.iter().zip(results) {
        let v = r?;
        matrix[(i, j)] = v;
        matrix[(j, i)] = v;
    }
    tracing::info!(bands = n, pairs = pairs.len(), "correlation matrix done");
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgcalc_core::MemRaster;

    fn ramp(bands: usize, scale: &[f64]) -> MemRaster {
        let mut r = MemRaster::new(bands, 4, 5);
        for b in 0..bands {
            for row in 0..4 {
                for col in 0..5 {
                    r.set(b, row, col, scale[b] * (row * 5 + col) as f64).unwrap();
                }
            }
        }
        r
    }

    #[test]
    fn test_correlation_identical_and_negated() {
        let a = ramp(1, &[1.0]);
        let neg = ramp(1, &[-2.0]);
        let engine = ImageCalc::default();
        let same = engine.accumulate_pair(&a, &a, &mut Correlation::new(0, 0)).unwrap();
        assert!((same[0] - 1.0).abs() < 1e-10);
        let opposite = engine.accumulate_pair(&a, &neg, &mut Correlation::new(0, 0)).unwrap();
        assert!((opposite[0] + 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_accumulator_reset_on_reuse() {
        let a = ramp(2, &[1.0, 3.0]);
        let engine = ImageCalc::default();
        let mut acc = Correlation::new(0, 1);
        let first = engine.accumulate(&[&a], &mut acc).unwrap();
        let second = engine.accumulate(&[&a], &mut acc).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_correlation_ignores_nodata_in_other_bands() {
        let mut a = ramp(3, &[1.0, 2.0, 5.0]);
        // band 2 is no-data everywhere except one pixel; band 0 is no-data once
        for row in 0..4 {
            for col in 0..5 {
                if (row, col) != (3, 4) {
                    a.set(2, row, col, -9.0).unwrap();
                }
            }
        }
        a.set(0, 2, 2, -9.0).unwrap();
        a.set(1, 2, 2, 1000.0).unwrap();
        let mut acc = Correlation::new(0, 1).with_nodata(Some(-9.0));
        let r = ImageCalc::default().accumulate(&[&a], &mut acc).unwrap();
        assert!((r[0] - 1.0).abs() < 1e-10);
        assert_eq!(acc.n, 19.0);
    }

    #[test]
    fn test_mean_vector() {
        let a = ramp(2, &[1.0, 2.0]);
        let means = ImageCalc::default()
            .accumulate(&[&a], &mut MeanVector::new(None))
            .unwrap();
        assert!((means[0] - 9.5).abs() < 1e-10);
        assert!((means[1] - 19.0).abs() < 1e-10);
    }

    #[test]
    fn test_rmse() {
        let a = MemRaster::filled(1, 3, 3, 2.0);
        let b = MemRaster::filled(1, 3, 3, 5.0);
        let rmse = ImageCalc::default()
            .accumulate_pair(&a, &b, &mut Rmse::new(0, 0))
            .unwrap();
        assert!((rmse[0] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_covariance_known_and_estimated_means() {
        let a = ramp(1, &[1.0]);
        let engine = ImageCalc::default();
        // variance of 0..20 (sample): 35
        let est = engine.accumulate_pair(&a, &a, &mut Covariance::new(0, 0)).unwrap();
        assert!((est[0] - 35.0).abs() < 1e-9);
        // population variance with the true mean: 33.25
        let known = engine
            .accumulate_pair(&a, &a, &mut Covariance::new(0, 0).with_means(9.5, 9.5))
            .unwrap();
        assert!((known[0] - 33.25).abs() < 1e-9);
    }

    #[test]
    fn test_covariance_matrix_matches_pairwise() {
        let a = ramp(2, &[1.0, -1.0]);
        let values = ImageCalc::default()
            .accumulate(&[&a], &mut CovarianceMatrix::new(None))
            .unwrap();
        let (mean, cov) = CovarianceMatrix::split(&values).unwrap();
        assert!((mean[0] - 9.5).abs() < 1e-10);
        assert!((cov[(0, 0)] - 35.0).abs() < 1e-9);
        assert!((cov[(0, 1)] + 35.0).abs() < 1e-9);
        assert!((cov[(1, 0)] - cov[(0, 1)]).abs() < 1e-12);
    }

    #[test]
    fn test_band_index_checked() {
        let a = ramp(1, &[1.0]);
        let err = ImageCalc::default()
            .accumulate_pair(&a, &a, &mut Rmse::new(0, 2))
            .unwrap_err();
        assert!(matches!(err, Error::BandIndex { index: 2, available: 1 }));
    }

    #[test]
    fn test_correlation_matrix() {
        let a = ramp(3, &[1.0, 2.0, -1.0]);
        for mode in [ProcessingMode::Sequential, ProcessingMode::Parallel] {
            let m = correlation_matrix(&a, None, mode).unwrap();
            assert!((m[(0, 1)] - 1.0).abs() < 1e-10);
            assert!((m[(0, 2)] + 1.0).abs() < 1e-10);
            assert!((m[(2, 1)] + 1.0).abs() < 1e-10);
            assert_eq!(m[(1, 1)], 1.0);
        }
    }
}
