//! Masking with a companion mask raster.
//!
//! The mask is the last band of the concatenated sample. Pixels whose mask
//! value is listed get `out_value` on every band; others pass through.

use imgcalc_core::{Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, PixelCalculator};

/// Parameters for masking
#[derive(Debug, Clone)]
pub struct MaskParams {
    /// Mask values that trigger replacement
    pub mask_values: Vec<f64>,
    /// Value written to every band of a masked pixel
    pub out_value: f64,
    pub nodata: Option<f64>,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            mask_values: vec![0.0],
            out_value: 0.0,
            nodata: None,
        }
    }
}

/// Mask calculator over `image_bands` image bands plus one mask band
#[derive(Debug, Clone)]
pub struct MaskCalculator {
    image_bands: usize,
    params: MaskParams,
}

impl MaskCalculator {
    pub fn new(image_bands: usize, params: MaskParams) -> Result<Self> {
        if image_bands == 0 {
            return Err(Error::invalid_param("image_bands", 0, "image needs at least one band"));
        }
        Ok(Self { image_bands, params })
    }

    fn is_masked(&self, value: f64) -> bool {
        self.params.mask_values.iter().any(|&m| m == value)
    }
}

impl PixelCalculator for MaskCalculator {
    fn num_out_bands(&self) -> usize {
        self.image_bands
    }

    fn nodata(&self) -> NoDataPolicy {
        NoDataPolicy::from_option(self.params.nodata)
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != self.image_bands + 1 {
            return Err(Error::invalid_param(
                "bands",
                num_bands,
                format!("expected {} image bands plus one mask band", self.image_bands),
            ));
        }
        Ok(())
    }

    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
        let mask = sample[self.image_bands];
        if self.is_masked(mask) {
            out.fill(self.params.out_value);
        } else {
            out.copy_from_slice(&sample[..self.image_bands]);
        }
        Ok(())
    }
}

/// Apply the first band of `mask` to every band of `image`
pub fn mask(image: &dyn RasterSource, mask: &dyn RasterSource, params: MaskParams) -> Result<MemRaster> {
    if mask.band_count() != 1 {
        return Err(Error::invalid_param(
            "mask",
            mask.band_count(),
            "mask raster must have exactly one band",
        ));
    }
    let mut calc = MaskCalculator::new(image.band_count(), params)?;
    ImageCalc::default().calc_image_to_memory(&[image, mask], &mut calc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_pixels_replaced() {
        let image = MemRaster::filled(2, 2, 2, 7.0);
        let mut m = MemRaster::filled(1, 2, 2, 1.0);
        m.set(0, 0, 1, 0.0).unwrap();
        let params = MaskParams {
            out_value: -9.0,
            ..Default::default()
        };
        let out = mask(&image, &m, params).unwrap();
        assert_eq!(out.pixel(0, 1), vec![-9.0, -9.0]);
        assert_eq!(out.pixel(1, 1), vec![7.0, 7.0]);
    }

    #[test]
    fn test_band_layout_checked() {
        let calc = MaskCalculator::new(3, MaskParams::default()).unwrap();
        assert!(calc.check_bands(4).is_ok());
        assert!(calc.check_bands(3).is_err());
    }

    #[test]
    fn test_multi_band_mask_rejected() {
        let image = MemRaster::new(1, 2, 2);
        let m = MemRaster::new(2, 2, 2);
        assert!(mask(&image, &m, MaskParams::default()).is_err());
    }
}
