//! Calculator contracts.
//!
//! A calculator is the unit of work the engine drives across an image. Each
//! invocation shape is its own trait, so a calculator implements exactly
//! the shapes it supports and an unsupported shape cannot be requested.
//!
//! | shape                | trait                         | engine entry point                |
//! |----------------------|-------------------------------|-----------------------------------|
//! | one pixel            | [`PixelCalculator`]           | `ImageCalc::calc_image`           |
//! | window               | [`WindowCalculator`]          | `ImageCalc::calc_window`          |
//! | gated window write   | [`ConditionalWindowCalculator`] | `ImageCalc::calc_window_conditional` |
//! | whole-image reduction| [`Accumulator`]               | `ImageCalc::accumulate`           |
//! | paired reduction     | [`PairedAccumulator`]         | `ImageCalc::accumulate_pair`      |

use crate::window::Window;
use imgcalc_core::{Error, Result};

/// Optional no-data value a calculator honours.
///
/// When enabled and *every* band of a sample equals the value, the engine
/// writes zeros for that pixel (or skips it when accumulating) without
/// calling the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoDataPolicy {
    value: Option<f64>,
}

impl NoDataPolicy {
    pub fn disabled() -> Self {
        Self { value: None }
    }

    pub fn enabled(value: f64) -> Self {
        Self { value: Some(value) }
    }

    pub fn from_option(value: Option<f64>) -> Self {
        Self { value }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_enabled(&self) -> bool {
        self.value.is_some()
    }

    /// Whether a single value matches the no-data value.
    /// A NaN no-data value matches NaN samples.
    #[inline]
    pub fn is_nodata(&self, v: f64) -> bool {
        match self.value {
            Some(nd) if nd.is_nan() => v.is_nan(),
            Some(nd) => v == nd,
            None => false,
        }
    }

    /// Whether every band of `sample` is no-data
    #[inline]
    pub fn all_nodata(&self, sample: &[f64]) -> bool {
        self.is_enabled() && !sample.is_empty() && sample.iter().all(|&v| self.is_nodata(v))
    }
}

/// Fail with [`Error::BandIndex`] when `index` is not below `available`
#[inline]
pub fn check_band(index: usize, available: usize) -> Result<()> {
    if index >= available {
        return Err(Error::BandIndex { index, available });
    }
    Ok(())
}

/// Produces `num_out_bands` values from the band values of one pixel.
///
/// For multi-dataset runs `sample` holds the bands of every input, in
/// dataset-then-band order.
pub trait PixelCalculator {
    fn num_out_bands(&self) -> usize;

    fn nodata(&self) -> NoDataPolicy {
        NoDataPolicy::disabled()
    }

    /// Validate the input band count before the first pixel
    fn check_bands(&self, _num_bands: usize) -> Result<()> {
        Ok(())
    }

    /// `out` is zeroed and has `num_out_bands` elements
    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()>;
}

/// Produces `num_out_bands` values from a neighbourhood window.
pub trait WindowCalculator {
    fn num_out_bands(&self) -> usize;

    fn nodata(&self) -> NoDataPolicy {
        NoDataPolicy::disabled()
    }

    fn check_bands(&self, _num_bands: usize) -> Result<()> {
        Ok(())
    }

    fn calc_window(&mut self, window: &Window<'_>, out: &mut [f64]) -> Result<()>;
}

/// Window calculator whose result is only written when it returns `true`.
///
/// Pixels the calculator declines keep the input centre values, so the
/// output band count must equal the input band count.
pub trait ConditionalWindowCalculator {
    fn num_out_bands(&self) -> usize;

    fn nodata(&self) -> NoDataPolicy {
        NoDataPolicy::disabled()
    }

    fn check_bands(&self, _num_bands: usize) -> Result<()> {
        Ok(())
    }

    fn calc_window(&mut self, window: &Window<'_>, out: &mut [f64]) -> Result<bool>;
}

/// Streaming reduction over every pixel of an image.
pub trait Accumulator {
    fn nodata(&self) -> NoDataPolicy {
        NoDataPolicy::disabled()
    }

    fn check_bands(&self, _num_bands: usize) -> Result<()> {
        Ok(())
    }

    /// Clear internal state so the accumulator can be reused
    fn reset(&mut self);

    fn accumulate(&mut self, sample: &[f64]) -> Result<()>;

    fn finalize(&mut self) -> Result<Vec<f64>>;
}

/// Streaming reduction over co-located pixels of two images.
pub trait PairedAccumulator {
    fn nodata(&self) -> NoDataPolicy {
        NoDataPolicy::disabled()
    }

    fn check_bands(&self, _bands_a: usize, _bands_b: usize) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self);

    fn accumulate_pair(&mut self, a: &[f64], b: &[f64]) -> Result<()>;

    fn finalize(&mut self) -> Result<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodata_all_bands() {
        let policy = NoDataPolicy::enabled(0.0);
        assert!(policy.all_nodata(&[0.0, 0.0, 0.0]));
        assert!(!policy.all_nodata(&[0.0, 1.0, 0.0]));
        assert!(!NoDataPolicy::disabled().all_nodata(&[0.0, 0.0]));
    }

    #[test]
    fn test_nodata_nan() {
        let policy = NoDataPolicy::enabled(f64::NAN);
        assert!(policy.all_nodata(&[f64::NAN, f64::NAN]));
        assert!(!policy.is_nodata(0.0));
    }

    #[test]
    fn test_check_band() {
        assert!(check_band(2, 3).is_ok());
        assert!(matches!(
            check_band(3, 3),
            Err(Error::BandIndex { index: 3, available: 3 })
        ));
    }
}
