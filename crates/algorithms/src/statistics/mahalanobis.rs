//! Mahalanobis distance filters.
//!
//! - Global: distance of every pixel from a fixed mean vector and
//!   covariance matrix. The covariance is inverted once; a singular matrix
//!   is a configuration error.
//! - Windowed: distance of the centre pixel from the distribution of the
//!   pixels in its window.

use crate::statistics::accumulators::CovarianceMatrix;
use imgcalc_core::io::read_matrix;
use imgcalc_core::{Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, PixelCalculator, Window, WindowCalculator};
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use std::path::Path;

fn to_dmatrix(m: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |r, c| m[(r, c)])
}

/// Distance from a fixed distribution
#[derive(Debug, Clone)]
pub struct MahalanobisGlobal {
    mean: DVector<f64>,
    inv_cov: DMatrix<f64>,
    diff: DVector<f64>,
    nodata: NoDataPolicy,
}

impl MahalanobisGlobal {
    pub fn new(mean: &[f64], covariance: &Array2<f64>, nodata: Option<f64>) -> Result<Self> {
        let n = mean.len();
        if n == 0 {
            return Err(Error::invalid_param("mean", 0, "mean vector is empty"));
        }
        if covariance.dim() != (n, n) {
            return Err(Error::invalid_param(
                "covariance",
                format!("{}x{}", covariance.nrows(), covariance.ncols()),
                format!("expected {}x{}", n, n),
            ));
        }
        let inv_cov = to_dmatrix(covariance)
            .try_inverse()
            .ok_or_else(|| Error::SingularMatrix("covariance matrix is not invertible".into()))?;
        Ok(Self {
            mean: DVector::from_column_slice(mean),
            inv_cov,
            diff: DVector::zeros(n),
            nodata: NoDataPolicy::from_option(nodata),
        })
    }

    /// Load the mean (1 x n or n x 1) and covariance (n x n) from matrix files
    pub fn from_files<P: AsRef<Path>>(mean_path: P, cov_path: P, nodata: Option<f64>) -> Result<Self> {
        let mean = read_matrix(mean_path)?;
        let cov = read_matrix(cov_path)?;
        let mean: Vec<f64> = mean.iter().copied().collect();
        Self::new(&mean, &cov, nodata)
    }

    /// Distance of one sample
    pub fn distance(&mut self, sample: &[f64]) -> f64 {
        for (d, (x, m)) in self.diff.iter_mut().zip(sample.iter().zip(self.mean.iter())) {
            *d = x - m;
        }
        let q = self.diff.dot(&(&self.inv_cov * &self.diff));
        q.max(0.0).sqrt()
    }
}

impl PixelCalculator for MahalanobisGlobal {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != self.mean.len() {
            return Err(Error::invalid_param(
                "mean",
                self.mean.len(),
                format!("expected one mean per band ({} bands)", num_bands),
            ));
        }
        Ok(())
    }

    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
        out[0] = self.distance(sample);
        Ok(())
    }
}

/// Distance of the centre pixel from its window's distribution.
///
/// Windows whose covariance is singular (for example flat areas) give 0.
#[derive(Debug, Clone)]
pub struct MahalanobisWindow {
    bands: usize,
    nodata: NoDataPolicy,
}

impl MahalanobisWindow {
    pub fn new(bands: usize, nodata: Option<f64>) -> Self {
        Self {
            bands,
            nodata: NoDataPolicy::from_option(nodata),
        }
    }
}

impl WindowCalculator for MahalanobisWindow {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != self.bands {
            return Err(Error::invalid_param("bands", num_bands, format!("expected {} bands", self.bands)));
        }
        Ok(())
    }

    fn calc_window(&mut self, window: &Window<'_>, out: &mut [f64]) -> Result<()> {
        let n = self.bands;
        let count = window.size() * window.size();
        let mut mean = DVector::<f64>::zeros(n);
        for b in 0..n {
            mean[b] = window.band(b).iter().sum::<f64>() / count as f64;
        }
        let mut cov = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            let bi = window.band(i);
            for j in i..n {
                let bj = window.band(j);
                let s: f64 = bi.iter().zip(bj).map(|(a, b)| (a - mean[i]) * (b - mean[j])).sum();
                let c = s / (count as f64 - 1.0).max(1.0);
                cov[(i, j)] = c;
                cov[(j, i)] = c;
            }
        }
        out[0] = match cov.try_inverse() {
            Some(inv) => {
                let diff = DVector::from_fn(n, |b, _| window.center(b) - mean[b]);
                diff.dot(&(inv * &diff)).max(0.0).sqrt()
            }
            None => 0.0,
        };
        Ok(())
    }
}

/// Distance of every pixel from the image's own mean and covariance
pub fn mahalanobis_global(raster: &dyn RasterSource, nodata: Option<f64>) -> Result<MemRaster> {
    let engine = ImageCalc::default();
    let stats = engine.accumulate(&[raster], &mut CovarianceMatrix::new(nodata))?;
    let (mean, cov) = CovarianceMatrix::split(&stats)?;
    let mut calc = MahalanobisGlobal::new(&mean, &cov, nodata)?;
    engine.calc_image_to_memory(&[raster], &mut calc)
}

/// Windowed Mahalanobis filter with an odd window size
pub fn mahalanobis_window(raster: &dyn RasterSource, win_size: usize, nodata: Option<f64>) -> Result<MemRaster> {
    let mut calc = MahalanobisWindow::new(raster.band_count(), nodata);
    ImageCalc::default().calc_window_to_memory(&[raster], win_size, &mut calc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity_covariance_is_euclidean() {
        let mut calc = MahalanobisGlobal::new(&[1.0, 1.0], &array![[1.0, 0.0], [0.0, 1.0]], None).unwrap();
        assert!((calc.distance(&[4.0, 5.0]) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_scaled_covariance() {
        let mut calc = MahalanobisGlobal::new(&[0.0], &array![[4.0]], None).unwrap();
        assert!((calc.distance(&[6.0]) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_singular_covariance_rejected() {
        let err = MahalanobisGlobal::new(&[0.0, 0.0], &array![[1.0, 2.0], [2.0, 4.0]], None).unwrap_err();
        assert!(matches!(err, Error::SingularMatrix(_)));
        assert_eq!(err.kind(), imgcalc_core::ErrorKind::Configuration);
    }

    #[test]
    fn test_global_outlier_is_farthest() {
        let mut r = MemRaster::new(2, 5, 5);
        for row in 0..5 {
            for col in 0..5 {
                r.set_pixel(row, col, &[(row + col) as f64, (row * col % 3) as f64]);
            }
        }
        r.set_pixel(2, 2, &[30.0, -20.0]);
        let d = mahalanobis_global(&r, None).unwrap();
        let max = d.data().iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(d.get(0, 2, 2).unwrap(), max);
    }

    #[test]
    fn test_window_flat_is_zero() {
        let r = MemRaster::filled(2, 4, 4, 3.0);
        let d = mahalanobis_window(&r, 3, None).unwrap();
        assert!(d.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_window_centre_spike() {
        let mut r = MemRaster::new(1, 5, 5);
        for row in 0..5 {
            for col in 0..5 {
                r.set(0, row, col, ((row * 7 + col * 3) % 5) as f64).unwrap();
            }
        }
        r.set(0, 2, 2, 50.0).unwrap();
        let d = mahalanobis_window(&r, 3, None).unwrap();
        assert!(d.get(0, 2, 2).unwrap() > d.get(0, 2, 4).unwrap());
    }
}
