//! Morphological dilation (maximum filter)
//!
//! Replaces each pixel with the maximum value in its structuring element
//! neighbourhood. Enlarges bright regions and shrinks dark regions.

use imgcalc_core::{Algorithm, Error, MemRaster, RasterSource, Result};

use super::element::StructuringElement;
use super::filter::{MorphOp, apply};

/// Parameters for morphological dilation
#[derive(Debug, Clone, Default)]
pub struct DilateParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Dilation algorithm
#[derive(Debug, Clone, Default)]
pub struct Dilate;

impl Algorithm for Dilate {
    type Input = MemRaster;
    type Output = MemRaster;
    type Params = DilateParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Dilate"
    }

    fn description(&self) -> &'static str {
        "Morphological dilation (maximum filter over structuring element)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        dilate(&input, &params.element)
    }
}

/// Perform morphological dilation on every band of a raster
pub fn dilate(raster: &dyn RasterSource, element: &StructuringElement) -> Result<MemRaster> {
    apply(raster, element, MorphOp::Dilate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dilate_picks_maximum() {
        let mut raster = MemRaster::filled(1, 7, 7, 1.0);
        raster.set(0, 3, 3, 9.0).unwrap();
        let result = dilate(&raster, &StructuringElement::Square(1)).unwrap();
        for r in 2..=4 {
            for c in 2..=4 {
                assert!((result.get(0, r, c).unwrap() - 9.0).abs() < 1e-10);
            }
        }
        assert!((result.get(0, 1, 1).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_dilate_disk_radius_two() {
        let mut raster = MemRaster::new(1, 9, 9);
        raster.set(0, 4, 4, 1.0).unwrap();
        let result = dilate(&raster, &StructuringElement::Disk(2)).unwrap();
        let count = result.data().iter().filter(|&&v| v == 1.0).count();
        assert_eq!(count, 13);
    }

    #[test]
    fn test_dilate_per_band() {
        let mut raster = MemRaster::new(2, 3, 3);
        raster.set(1, 0, 0, 4.0).unwrap();
        let result = dilate(&raster, &StructuringElement::Square(1)).unwrap();
        assert_eq!(result.get(0, 1, 1).unwrap(), 0.0);
        assert_eq!(result.get(1, 1, 1).unwrap(), 4.0);
        assert_eq!(result.get(1, 2, 2).unwrap(), 0.0);
    }
}
