//! Nearest-centre classification of every pixel.

use super::centre::ClusterCentre;
use super::init::nearest;
use imgcalc_core::{Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, PixelCalculator};

/// Writes the 1-based id of the nearest centre; no-data pixels get 0
#[derive(Debug, Clone)]
pub struct NearestCentreClassifier {
    centres: Vec<ClusterCentre>,
    nodata: NoDataPolicy,
}

impl NearestCentreClassifier {
    pub fn new(centres: Vec<ClusterCentre>, nodata: Option<f64>) -> Result<Self> {
        let Some(first) = centres.first() else {
            return Err(Error::invalid_param("centres", 0, "no centres to classify with"));
        };
        let dims = first.num_vals();
        if centres.iter().any(|c| c.num_vals() != dims) {
            return Err(Error::invalid_param("centres", dims, "centres differ in dimensionality"));
        }
        Ok(Self {
            centres,
            nodata: NoDataPolicy::from_option(nodata),
        })
    }
}

impl PixelCalculator for NearestCentreClassifier {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        let dims = self.centres[0].num_vals();
        if num_bands != dims {
            return Err(Error::invalid_param(
                "centres",
                dims,
                format!("centres have {} values but the image has {} bands", dims, num_bands),
            ));
        }
        Ok(())
    }

    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
        out[0] = (nearest(sample, &self.centres).0 + 1) as f64;
        Ok(())
    }
}

/// Classify a raster against cluster centres
pub fn classify(raster: &dyn RasterSource, centres: &[ClusterCentre], nodata: Option<f64>) -> Result<MemRaster> {
    let mut calc = NearestCentreClassifier::new(centres.to_vec(), nodata)?;
    let mut out = ImageCalc::default().calc_image_to_memory(&[raster], &mut calc)?;
    out.set_nodata(Some(0.0));
    out.set_band_names(vec!["class".to_string()]);
    Ok(out)
}
