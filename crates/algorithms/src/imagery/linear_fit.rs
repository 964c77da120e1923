//! Per-pixel linear regression of the band stack against x values.
//!
//! Outputs three bands: slope, intercept and R².

use imgcalc_core::io::read_value_list;
use imgcalc_core::{Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, PixelCalculator};
use std::path::Path;

/// Parameters for the per-pixel linear fit
#[derive(Debug, Clone, Default)]
pub struct LinearFitParams {
    /// One x value per input band
    pub x_values: Vec<f64>,
    pub nodata: Option<f64>,
}

impl LinearFitParams {
    /// Read x values from a text file. Malformed entries are skipped with a warning.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            x_values: read_value_list(path)?,
            nodata: None,
        })
    }
}

/// Least-squares fit of `y = slope * x + intercept` per pixel
#[derive(Debug, Clone)]
pub struct LinearFit {
    x: Vec<f64>,
    sum_x: f64,
    denom: f64,
    nodata: NoDataPolicy,
}

impl LinearFit {
    pub fn new(params: &LinearFitParams) -> Result<Self> {
        let x = params.x_values.clone();
        if x.len() < 2 {
            return Err(Error::invalid_param("x_values", x.len(), "at least two x values are required"));
        }
        let n = x.len() as f64;
        let sum_x: f64 = x.iter().sum();
        let sum_xx: f64 = x.iter().map(|v| v * v).sum();
        let denom = n * sum_xx - sum_x * sum_x;
        if denom.abs() < 1e-12 {
            return Err(Error::invalid_param("x_values", "constant", "x values must not all be equal"));
        }
        Ok(Self {
            x,
            sum_x,
            denom,
            nodata: NoDataPolicy::from_option(params.nodata),
        })
    }

    /// (slope, intercept, r²) for one series of y values
    pub fn fit(&self, y: &[f64]) -> (f64, f64, f64) {
        let n = self.x.len() as f64;
        let sum_y: f64 = y.iter().sum();
        let sum_xy: f64 = self.x.iter().zip(y).map(|(a, b)| a * b).sum();
        let slope = (n * sum_xy - self.sum_x * sum_y) / self.denom;
        let intercept = (sum_y - slope * self.sum_x) / n;

        let mean_y = sum_y / n;
        let mut ss_tot = 0.0;
        let mut ss_res = 0.0;
        for (&xi, &yi) in self.x.iter().zip(y) {
            let pred = slope * xi + intercept;
            ss_res += (yi - pred).powi(2);
            ss_tot += (yi - mean_y).powi(2);
        }
        // a flat series is fitted exactly by a flat line
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };
        (slope, intercept, r2)
    }
}

impl PixelCalculator for LinearFit {
    fn num_out_bands(&self) -> usize {
        3
    }

    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != self.x.len() {
            return Err(Error::invalid_param(
                "x_values",
                self.x.len(),
                format!("expected one x value per band ({} bands)", num_bands),
            ));
        }
        Ok(())
    }

    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
        let (slope, intercept, r2) = self.fit(sample);
        out[0] = slope;
        out[1] = intercept;
        out[2] = r2;
        Ok(())
    }
}

/// Fit every pixel of `input` against `params.x_values`
pub fn linear_fit(input: &dyn RasterSource, params: &LinearFitParams) -> Result<MemRaster> {
    let mut calc = LinearFit::new(params)?;
    let mut out = ImageCalc::default().calc_image_to_memory(&[input], &mut calc)?;
    out.set_band_names(vec!["slope".into(), "intercept".into(), "r2".into()]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let fit = LinearFit::new(&LinearFitParams {
            x_values: vec![1.0, 2.0, 3.0, 4.0],
            nodata: None,
        })
        .unwrap();
        let (slope, intercept, r2) = fit.fit(&[3.0, 5.0, 7.0, 9.0]);
        assert!((slope - 2.0).abs() < 1e-10);
        assert!((intercept - 1.0).abs() < 1e-10);
        assert!((r2 - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_noisy_r2_below_one() {
        let fit = LinearFit::new(&LinearFitParams {
            x_values: vec![0.0, 1.0, 2.0, 3.0],
            nodata: None,
        })
        .unwrap();
        let (_, _, r2) = fit.fit(&[0.0, 2.0, 1.0, 3.0]);
        assert!(r2 > 0.0 && r2 < 1.0);
    }

    #[test]
    fn test_constant_x_rejected() {
        assert!(
            LinearFit::new(&LinearFitParams {
                x_values: vec![2.0, 2.0, 2.0],
                nodata: None,
            })
            .is_err()
        );
    }

    #[test]
    fn test_raster_fit_and_x_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, "10\n20\nbad\n30\n").unwrap();
        let params = LinearFitParams::from_file(&path).unwrap();
        assert_eq!(params.x_values, vec![10.0, 20.0, 30.0]);

        let mut input = MemRaster::new(3, 2, 2);
        for (b, v) in [1.0, 2.0, 3.0].iter().enumerate() {
            input.band_mut(b).fill(*v);
        }
        let out = linear_fit(&input, &params).unwrap();
        assert_eq!(out.bands(), 3);
        assert!((out.get(0, 1, 1).unwrap() - 0.1).abs() < 1e-10);
        assert!(out.get(1, 0, 0).unwrap().abs() < 1e-10);
        assert_eq!(out.band_names()[0], "slope");
    }
}
