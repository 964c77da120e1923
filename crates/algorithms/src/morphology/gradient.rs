//! Morphological gradient (dilation minus erosion)
//!
//! Highlights edges and boundaries by computing the difference between
//! the dilation and erosion of the input. The result is always non-negative.

use imgcalc_core::{Algorithm, Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, PixelCalculator};

use super::dilate::dilate;
use super::element::StructuringElement;
use super::erode::erode;

/// Parameters for morphological gradient
#[derive(Debug, Clone, Default)]
pub struct GradientParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Morphological gradient algorithm
#[derive(Debug, Clone, Default)]
pub struct Gradient;

impl Algorithm for Gradient {
    type Input = MemRaster;
    type Output = MemRaster;
    type Params = GradientParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "MorphologicalGradient"
    }

    fn description(&self) -> &'static str {
        "Morphological gradient (dilation minus erosion) for edge detection"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        gradient(&input, &params.element)
    }
}

/// Band-wise `a - b` over a stack of two equal-band images.
///
/// A band that is no-data on either side stays no-data.
pub(crate) struct BandDifference {
    nodata: Vec<NoDataPolicy>,
}

impl BandDifference {
    pub(crate) fn new(nodata: Vec<Option<f64>>) -> Self {
        Self {
            nodata: nodata.into_iter().map(NoDataPolicy::from_option).collect(),
        }
    }
}

impl PixelCalculator for BandDifference {
    fn num_out_bands(&self) -> usize {
        self.nodata.len()
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != 2 * self.nodata.len() {
            return Err(Error::OutputBands {
                expected: 2 * self.nodata.len(),
                actual: num_bands,
            });
        }
        Ok(())
    }

    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
        let n = self.nodata.len();
        for (band, o) in out.iter_mut().enumerate() {
            let (a, b) = (sample[band], sample[n + band]);
            let policy = &self.nodata[band];
            *o = if policy.is_nodata(a) || policy.is_nodata(b) {
                policy.value().unwrap_or(f64::NAN)
            } else {
                a - b
            };
        }
        Ok(())
    }
}

/// `a - b` band by band, keeping the no-data of `a`
pub(crate) fn difference(a: &MemRaster, b: &MemRaster) -> Result<MemRaster> {
    let nodata: Vec<Option<f64>> = (0..a.bands()).map(|band| RasterSource::nodata(a, band)).collect();
    let mut calc = BandDifference::new(nodata.clone());
    let mut out = ImageCalc::default().calc_image_to_memory(&[a, b], &mut calc)?;
    for (band, nd) in nodata.into_iter().enumerate() {
        out.set_band_nodata(band, nd);
    }
    Ok(out)
}

/// Compute the morphological gradient of a raster
///
/// Gradient = dilate - erode. Values are always >= 0.
pub fn gradient(raster: &dyn RasterSource, element: &StructuringElement) -> Result<MemRaster> {
    let dilated = dilate(raster, element)?;
    let eroded = erode(raster, element)?;
    difference(&dilated, &eroded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_uniform_is_zero() {
        let raster = MemRaster::filled(1, 6, 6, 3.0);
        let result = gradient(&raster, &StructuringElement::Square(1)).unwrap();
        assert!(result.data().iter().all(|&v| v.abs() < 1e-10));
    }

    #[test]
    fn test_gradient_step_edge() {
        let mut raster = MemRaster::new(1, 6, 6);
        for r in 0..6 {
            for c in 3..6 {
                raster.set(0, r, c, 10.0).unwrap();
            }
        }
        let result = gradient(&raster, &StructuringElement::Square(1)).unwrap();
        assert!((result.get(0, 2, 2).unwrap() - 10.0).abs() < 1e-10);
        assert!((result.get(0, 2, 3).unwrap() - 10.0).abs() < 1e-10);
        assert!(result.get(0, 2, 0).unwrap().abs() < 1e-10);
        assert!(result.data().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_gradient_keeps_nodata() {
        let mut raster = MemRaster::filled(1, 5, 5, 2.0);
        raster.set_nodata(Some(-1.0));
        raster.set(0, 0, 0, -1.0).unwrap();
        let result = gradient(&raster, &StructuringElement::Square(1)).unwrap();
        assert_eq!(result.get(0, 0, 0).unwrap(), -1.0);
    }
}
