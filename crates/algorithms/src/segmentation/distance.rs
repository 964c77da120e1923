//! Distance transform by iterative growth
//!
//! Feature pixels (non-zero, not no-data) start at distance 0. Each pass
//! sets every unreached pixel that touches a reached one (8-neighbourhood,
//! previous pass) to the pass number; the counts are then scaled by the
//! pixel size.

use imgcalc_core::{Error, MemRaster, PixelRect, RasterBlock, RasterSource, Result};
use imgcalc_engine::{AlongsideCalculator, AlongsideEngine, AlongsidePixel, NoDataPolicy};

const UNSET: f64 = -1.0;

/// Parameters for the distance transform
#[derive(Debug, Clone)]
pub struct DistanceParams {
    pub band: usize,
    /// No-data pixels are never features
    pub nodata: Option<f64>,
    /// Stop growing beyond this distance (in georeferenced units)
    pub max_distance: Option<f64>,
    /// Value of pixels the growth never reached
    pub fill_value: f64,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            band: 0,
            nodata: None,
            max_distance: None,
            fill_value: -1.0,
        }
    }
}

/// Grows reached pixels by one ring per pass
#[derive(Debug, Clone)]
pub struct DistanceGrowth {
    pixel_size: f64,
    max_distance: Option<f64>,
}

impl DistanceGrowth {
    pub fn new(pixel_size: f64, max_distance: Option<f64>) -> Self {
        Self {
            pixel_size,
            max_distance,
        }
    }

    fn within_limit(&self, steps: usize) -> bool {
        self.max_distance
            .is_none_or(|max| steps as f64 * self.pixel_size <= max)
    }
}

impl AlongsideCalculator for DistanceGrowth {
    fn calc_value(&mut self, _first_iteration: bool, px: &AlongsidePixel<'_>, out: &mut [f64]) -> Result<bool> {
        if px.value(0) != UNSET {
            return Ok(false);
        }
        let step = px.pass() + 1;
        if !self.within_limit(step) {
            return Ok(false);
        }
        for dr in -1..=1 {
            for dc in -1..=1 {
                if (dr, dc) == (0, 0) {
                    continue;
                }
                if let Some(v) = px.prev(dr, dc, 0)
                    && v != UNSET
                {
                    out[0] = step as f64;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn continue_passes(&mut self, pass: usize, changed: usize) -> bool {
        changed > 0 && self.within_limit(pass + 2)
    }
}

/// Distance from every pixel to the nearest feature pixel
pub fn distance(raster: &dyn RasterSource, params: &DistanceParams) -> Result<MemRaster> {
    if params.band >= raster.band_count() {
        return Err(Error::BandIndex {
            index: params.band,
            available: raster.band_count(),
        });
    }
    let (rows, cols) = raster.size();
    let mut block = RasterBlock::empty();
    raster.read_block(params.band..params.band + 1, PixelRect::full(rows, cols), &mut block)?;

    let nodata = NoDataPolicy::from_option(params.nodata);
    let mut state = MemRaster::like(raster, 1);
    let mut features = 0usize;
    for (s, v) in state.band_mut(0).iter_mut().zip(block.band(0).iter()) {
        if *v != 0.0 && !v.is_nan() && !nodata.is_nodata(*v) {
            *s = 0.0;
            features += 1;
        } else {
            *s = UNSET;
        }
    }

    let pixel_size = raster.transform().pixel_size();
    if features > 0 {
        let mut calc = DistanceGrowth::new(pixel_size, params.max_distance);
        let summary = AlongsideEngine::new().run(&mut state, &mut calc)?;
        tracing::debug!(passes = summary.passes, features, "distance growth finished");
    } else {
        tracing::warn!("no feature pixels, every pixel gets the fill value");
    }

    state.band_mut(0).mapv_inplace(|v| if v == UNSET { params.fill_value } else { v * pixel_size });
    state.set_nodata(Some(params.fill_value));
    state.set_band_names(vec!["distance".to_string()]);
    Ok(state)
}
