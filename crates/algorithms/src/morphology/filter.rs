//! Shared min/max filter behind erosion and dilation.
//!
//! The filter is a conditional window calculator: it declines to write
//! when no band changes, and never rewrites no-data centres, so those
//! pixels keep their input values.

use super::element::StructuringElement;
use imgcalc_core::{MemRaster, RasterSource, Result};
use imgcalc_engine::{ConditionalWindowCalculator, ImageCalc, NoDataPolicy, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOp {
    /// Minimum over the element
    Erode,
    /// Maximum over the element
    Dilate,
}

/// Min/max filter over a structuring element
#[derive(Debug, Clone)]
pub struct MorphologyFilter {
    op: MorphOp,
    /// Window-local (row, col) of the active cells
    footprint: Vec<(usize, usize)>,
    /// Per-band no-data
    nodata: Vec<NoDataPolicy>,
}

impl MorphologyFilter {
    pub fn new(op: MorphOp, element: &StructuringElement, nodata: Vec<Option<f64>>) -> Result<Self> {
        element.validate()?;
        let r = element.radius() as isize;
        let footprint = element
            .offsets()
            .into_iter()
            .map(|(dr, dc)| ((dr + r) as usize, (dc + r) as usize))
            .collect();
        Ok(Self {
            op,
            footprint,
            nodata: nodata.into_iter().map(NoDataPolicy::from_option).collect(),
        })
    }

    fn is_invalid(&self, band: usize, v: f64) -> bool {
        v.is_nan() || self.nodata[band].is_nodata(v)
    }
}

impl ConditionalWindowCalculator for MorphologyFilter {
    fn num_out_bands(&self) -> usize {
        self.nodata.len()
    }

    fn calc_window(&mut self, window: &Window<'_>, out: &mut [f64]) -> Result<bool> {
        let mut changed = false;
        for (band, o) in out.iter_mut().enumerate() {
            let centre = window.center(band);
            if self.is_invalid(band, centre) {
                *o = centre;
                continue;
            }
            let mut best = centre;
            for &(wr, wc) in &self.footprint {
                let v = window.get(band, wr, wc);
                if self.is_invalid(band, v) {
                    continue;
                }
                best = match self.op {
                    MorphOp::Erode => best.min(v),
                    MorphOp::Dilate => best.max(v),
                };
            }
            changed |= best != centre;
            *o = best;
        }
        Ok(changed)
    }
}

/// Run one min/max pass; the output keeps the input's no-data values
pub(crate) fn apply(raster: &dyn RasterSource, element: &StructuringElement, op: MorphOp) -> Result<MemRaster> {
    let nodata: Vec<Option<f64>> = (0..raster.band_count()).map(|b| raster.nodata(b)).collect();
    let mut filter = MorphologyFilter::new(op, element, nodata.clone())?;
    let mut out =
        ImageCalc::default().calc_window_conditional_to_memory(&[raster], element.window_size(), &mut filter)?;
    for (band, nd) in nodata.into_iter().enumerate() {
        out.set_band_nodata(band, nd);
    }
    Ok(out)
}
