//! Top-hat and black-hat morphological transforms
//!
//! - **Top-hat** (white top-hat): input - opening. Extracts small bright
//!   features on a dark background.
//! - **Black-hat**: closing - input. Extracts small dark features on a
//!   bright background.

use imgcalc_core::{Algorithm, Error, MemRaster, RasterSource, Result};

use super::closing::closing;
use super::element::StructuringElement;
use super::gradient::difference;
use super::opening::opening;

/// Parameters for top-hat transform
#[derive(Debug, Clone, Default)]
pub struct TopHatParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Top-hat (white top-hat) algorithm
#[derive(Debug, Clone, Default)]
pub struct TopHat;

impl Algorithm for TopHat {
    type Input = MemRaster;
    type Output = MemRaster;
    type Params = TopHatParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "TopHat"
    }

    fn description(&self) -> &'static str {
        "Top-hat transform (input minus opening) to extract bright features"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        top_hat(&input, &params.element)
    }
}

/// Parameters for black-hat transform
#[derive(Debug, Clone, Default)]
pub struct BlackHatParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Black-hat algorithm
#[derive(Debug, Clone, Default)]
pub struct BlackHat;

impl Algorithm for BlackHat {
    type Input = MemRaster;
    type Output = MemRaster;
    type Params = BlackHatParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "BlackHat"
    }

    fn description(&self) -> &'static str {
        "Black-hat transform (closing minus input) to extract dark features"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        black_hat(&input, &params.element)
    }
}

/// Compute the top-hat transform: input - opening
pub fn top_hat(raster: &MemRaster, element: &StructuringElement) -> Result<MemRaster> {
    let opened = opening(raster, element)?;
    difference(raster, &opened)
}

/// Compute the black-hat transform: closing - input
pub fn black_hat(raster: &MemRaster, element: &StructuringElement) -> Result<MemRaster> {
    let closed = closing(raster as &dyn RasterSource, element)?;
    difference(&closed, raster)
}
