//! Morphological erosion (minimum filter)
//!
//! Replaces each pixel with the minimum value in its structuring element
//! neighbourhood. Shrinks bright regions and enlarges dark regions.

use imgcalc_core::{Algorithm, Error, MemRaster, RasterSource, Result};

use super::element::StructuringElement;
use super::filter::{MorphOp, apply};

/// Parameters for morphological erosion
#[derive(Debug, Clone, Default)]
pub struct ErodeParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Erosion algorithm
#[derive(Debug, Clone, Default)]
pub struct Erode;

impl Algorithm for Erode {
    type Input = MemRaster;
    type Output = MemRaster;
    type Params = ErodeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Erode"
    }

    fn description(&self) -> &'static str {
        "Morphological erosion (minimum filter over structuring element)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        erode(&input, &params.element)
    }
}

/// Perform morphological erosion on every band of a raster
///
/// Windows clamp to the raster edge. No-data neighbours are ignored and
/// no-data pixels stay unchanged.
pub fn erode(raster: &dyn RasterSource, element: &StructuringElement) -> Result<MemRaster> {
    apply(raster, element, MorphOp::Erode)
}
