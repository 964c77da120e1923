//! Linear spectral unmixing
//!
//! Models each pixel spectrum `b` as a mix `A x` of the endmember spectra
//! (the columns of `A`) and estimates the fractions `x`:
//!
//! - **Unconstrained**: least squares through a precomputed SVD
//! - **Sum to one**: `A` gains a row of `weight`, `b` gains `weight`
//! - **Non-negative**: the same augmentation solved with NNLS
//! - **Exhaustive**: grid search over fractions for 2 or 3 endmembers,
//!   with the RMS reconstruction error as an extra band

use super::endmembers::EndmemberMatrix;
use super::linalg::{SvdSolver, nnls};
use imgcalc_core::{Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, PixelCalculator};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// Unmixing method
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum UnmixMethod {
    #[default]
    Unconstrained,
    /// Fractions pushed towards summing to one; larger weights push harder
    SumToOne { weight: f64 },
    /// Sum-to-one augmentation with non-negative fractions
    NonNegative { weight: f64 },
    /// Grid search with fractions in steps of `step`
    Exhaustive { step: f64 },
}

/// Parameters for unmixing
#[derive(Debug, Clone)]
pub struct UnmixParams {
    pub method: UnmixMethod,
    /// Outputs are `fraction * gain + offset`
    pub gain: f64,
    pub offset: f64,
    pub nodata: Option<f64>,
}

impl Default for UnmixParams {
    fn default() -> Self {
        Self {
            method: UnmixMethod::Unconstrained,
            gain: 1.0,
            offset: 0.0,
            nodata: None,
        }
    }
}

/// Exhaustive search state; spectra are normalised to unit length
#[derive(Debug, Clone)]
struct ExhaustiveSearch {
    endmembers: Vec<Vec<f64>>,
    step: f64,
    steps: usize,
    pixel: Vec<f64>,
    fractions: Vec<f64>,
    best: Vec<f64>,
}

fn normalise(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

impl ExhaustiveSearch {
    fn new(endmembers: &EndmemberMatrix, step: f64) -> Result<Self> {
        let n = endmembers.num_endmembers();
        if !(2..=3).contains(&n) {
            return Err(Error::invalid_param(
                "endmembers",
                n,
                "exhaustive unmixing needs 2 or 3 endmembers",
            ));
        }
        if !(step > 0.0 && step <= 1.0) {
            return Err(Error::invalid_param("step", step, "must be in (0, 1]"));
        }
        let spectra = (0..n)
            .map(|e| {
                let mut s = endmembers.spectrum(e);
                normalise(&mut s);
                s
            })
            .collect();
        Ok(Self {
            endmembers: spectra,
            step,
            steps: ((1.0 + 1e-9) / step).floor() as usize,
            pixel: vec![0.0; endmembers.num_bands()],
            fractions: vec![0.0; n],
            best: vec![0.0; n],
        })
    }

    fn rms_error(&self) -> f64 {
        let mut sum = 0.0;
        for (band, p) in self.pixel.iter().enumerate() {
            let model: f64 = self
                .fractions
                .iter()
                .zip(&self.endmembers)
                .map(|(f, e)| f * e[band])
                .sum();
            sum += (p - model).powi(2);
        }
        (sum / self.pixel.len() as f64).sqrt()
    }

    /// Try the current fractions; strict comparison keeps the first minimum
    fn consider(&mut self, best_error: &mut f64) {
        let total: f64 = self.fractions.iter().sum();
        if total >= 1.0 + self.step {
            return;
        }
        let err = self.rms_error();
        if err < *best_error {
            *best_error = err;
            self.best.copy_from_slice(&self.fractions);
        }
    }

    /// Returns the best fractions (in `self.best`) and their error
    fn search(&mut self, sample: &[f64]) -> f64 {
        self.pixel.copy_from_slice(sample);
        normalise(&mut self.pixel);
        let mut best_error = f64::INFINITY;
        self.best.iter_mut().for_each(|f| *f = 0.0);
        for i in 0..=self.steps {
            self.fractions[0] = i as f64 * self.step;
            for j in 0..=self.steps {
                self.fractions[1] = j as f64 * self.step;
                if self.fractions.len() == 3 {
                    for k in 0..=self.steps {
                        self.fractions[2] = k as f64 * self.step;
                        self.consider(&mut best_error);
                    }
                } else {
                    self.consider(&mut best_error);
                }
            }
        }
        best_error
    }
}

#[derive(Debug, Clone)]
enum Solver {
    Svd(SvdSolver),
    Nnls(DMatrix<f64>),
    Exhaustive(ExhaustiveSearch),
}

/// Per-pixel unmixing calculator
#[derive(Debug, Clone)]
pub struct LinearUnmixer {
    endmembers: Arc<EndmemberMatrix>,
    solver: Solver,
    /// Right-hand side, with the weight appended for constrained methods
    rhs: DVector<f64>,
    gain: f64,
    offset: f64,
    nodata: NoDataPolicy,
}

fn augment(a: &DMatrix<f64>, weight: f64) -> Result<DMatrix<f64>> {
    if !(weight > 0.0) {
        return Err(Error::invalid_param("weight", weight, "must be positive"));
    }
    let (m, n) = a.shape();
    Ok(DMatrix::from_fn(m + 1, n, |r, c| if r < m { a[(r, c)] } else { weight }))
}

impl LinearUnmixer {
    pub fn new(endmembers: Arc<EndmemberMatrix>, params: &UnmixParams) -> Result<Self> {
        let a = endmembers.matrix();
        let bands = endmembers.num_bands();
        let (solver, rhs) = match params.method {
            UnmixMethod::Unconstrained => (Solver::Svd(SvdSolver::new(a.clone())?), DVector::zeros(bands)),
            UnmixMethod::SumToOne { weight } => {
                let mut rhs = DVector::zeros(bands + 1);
                rhs[bands] = weight;
                (Solver::Svd(SvdSolver::new(augment(a, weight)?)?), rhs)
            }
            UnmixMethod::NonNegative { weight } => {
                let mut rhs = DVector::zeros(bands + 1);
                rhs[bands] = weight;
                (Solver::Nnls(augment(a, weight)?), rhs)
            }
            UnmixMethod::Exhaustive { step } => (
                Solver::Exhaustive(ExhaustiveSearch::new(&endmembers, step)?),
                DVector::zeros(bands),
            ),
        };
        Ok(Self {
            endmembers,
            solver,
            rhs,
            gain: params.gain,
            offset: params.offset,
            nodata: NoDataPolicy::from_option(params.nodata),
        })
    }

    /// Output band names: one per endmember, plus the error band for
    /// exhaustive search
    pub fn band_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (1..=self.endmembers.num_endmembers())
            .map(|i| format!("endmember_{}", i))
            .collect();
        if matches!(self.solver, Solver::Exhaustive(_)) {
            names.push("rms_error".to_string());
        }
        names
    }
}

impl PixelCalculator for LinearUnmixer {
    fn num_out_bands(&self) -> usize {
        match self.solver {
            Solver::Exhaustive(_) => self.endmembers.num_endmembers() + 1,
            _ => self.endmembers.num_endmembers(),
        }
    }

    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != self.endmembers.num_bands() {
            return Err(Error::invalid_param(
                "endmembers",
                self.endmembers.num_bands(),
                format!("endmembers have {} bands but the image has {}", self.endmembers.num_bands(), num_bands),
            ));
        }
        Ok(())
    }

    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
        let n = self.endmembers.num_endmembers();
        match &mut self.solver {
            Solver::Exhaustive(search) => {
                let err = search.search(sample);
                for (o, f) in out.iter_mut().zip(&search.best) {
                    *o = f * self.gain + self.offset;
                }
                out[n] = err;
                return Ok(());
            }
            Solver::Svd(solver) => {
                for (r, v) in self.rhs.iter_mut().zip(sample) {
                    *r = *v;
                }
                let x = solver.solve(&self.rhs);
                for (o, f) in out.iter_mut().zip(x.iter()) {
                    *o = f * self.gain + self.offset;
                }
            }
            Solver::Nnls(a) => {
                for (r, v) in self.rhs.iter_mut().zip(sample) {
                    *r = *v;
                }
                let x = nnls(a, &self.rhs)?;
                for (o, f) in out.iter_mut().zip(x.iter()) {
                    *o = f * self.gain + self.offset;
                }
            }
        }
        Ok(())
    }
}

/// Unmix every pixel of a raster
pub fn unmix(raster: &dyn RasterSource, endmembers: Arc<EndmemberMatrix>, params: &UnmixParams) -> Result<MemRaster> {
    let mut calc = LinearUnmixer::new(endmembers, params)?;
    let mut out = ImageCalc::default().calc_image_to_memory(&[raster], &mut calc)?;
    out.set_band_names(calc.band_names());
    tracing::info!(
        method = ?params.method,
        endmembers = calc.endmembers.num_endmembers(),
        "unmixing finished"
    );
    Ok(out)
}
