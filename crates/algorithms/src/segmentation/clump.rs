//! Connected-component clumping
//!
//! Labels maximal 4-connected regions of equal value. The first pass
//! hands out increasing ids in raster order, inheriting from the left or
//! upper neighbour where the value matches (left first). When both match
//! with different ids the two are recorded as equivalent, keeping the
//! smaller id as the representative. The second pass replaces every id
//! by its representative, so any shape finishes in at most two passes.
//!
//! NaN pixels compare equal to each other and clump together unless NaN
//! is the no-data value.

use imgcalc_core::{Error, MemRaster, PixelRect, RasterBlock, RasterSource, Result};
use imgcalc_engine::{AlongsideCalculator, AlongsideEngine, AlongsidePixel, NoDataPolicy};
use std::collections::HashMap;

const VALUE: usize = 0;
const LABEL: usize = 1;

/// Parameters for clumping
#[derive(Debug, Clone, Default)]
pub struct ClumpParams {
    /// Band of the input to clump
    pub band: usize,
    /// Pixels with this value get label 0 and never join a clump
    pub nodata: Option<f64>,
    /// Renumber clumps to 1..=n in order of first appearance
    pub relabel: bool,
    /// Upper bound on propagation passes
    pub max_passes: Option<usize>,
}

/// Result of a clumping run
#[derive(Debug, Clone)]
pub struct ClumpResult {
    /// Single-band label raster
    pub labels: MemRaster,
    pub num_clumps: usize,
    pub passes: usize,
}

/// Alongside calculator over a two-band state (value, label)
#[derive(Debug, Clone)]
pub struct Clumper {
    nodata: NoDataPolicy,
    /// Equivalence forest over ids; index 0 is unused
    parent: Vec<usize>,
    merged: bool,
}

impl Clumper {
    pub fn new(nodata: Option<f64>) -> Self {
        Self {
            nodata: NoDataPolicy::from_option(nodata),
            parent: vec![0],
            merged: false,
        }
    }

    fn same_value(a: f64, b: f64) -> bool {
        a == b || (a.is_nan() && b.is_nan())
    }

    /// Label of a neighbour if it belongs with `value`
    fn matching(value: f64, neighbour_value: Option<f64>, neighbour_label: Option<f64>) -> Option<usize> {
        match (neighbour_value, neighbour_label) {
            (Some(v), Some(l)) if Self::same_value(v, value) && l > 0.0 => Some(l as usize),
            _ => None,
        }
    }

    fn new_id(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        id
    }

    fn find(&mut self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = id;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Join two ids under the smaller representative
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
            self.merged = true;
        }
    }
}

impl AlongsideCalculator for Clumper {
    fn calc_value(&mut self, first_iteration: bool, px: &AlongsidePixel<'_>, out: &mut [f64]) -> Result<bool> {
        if first_iteration && px.row() == 0 && px.col() == 0 {
            self.parent.truncate(1);
            self.merged = false;
        }
        let value = px.value(VALUE);
        if self.nodata.is_nodata(value) {
            return Ok(false);
        }

        if first_iteration {
            let left = Self::matching(value, px.prev(0, -1, VALUE), px.left(LABEL));
            let above = Self::matching(value, px.prev(-1, 0, VALUE), px.above(LABEL));
            let id = match (left, above) {
                (Some(l), Some(a)) => {
                    self.union(l, a);
                    l
                }
                (Some(l), None) => l,
                (None, Some(a)) => a,
                (None, None) => self.new_id(),
            };
            out[LABEL] = id as f64;
            return Ok(true);
        }

        let current = px.value(LABEL);
        if current <= 0.0 {
            return Ok(false);
        }
        let root = self.find(current as usize) as f64;
        if root != current {
            out[LABEL] = root;
            return Ok(true);
        }
        Ok(false)
    }

    /// Resolution is complete after the second pass; a first pass without
    /// equivalences is already final.
    fn continue_passes(&mut self, pass: usize, _changed: usize) -> bool {
        pass == 0 && self.merged
    }
}

/// Renumber non-zero labels to 1..=n by first appearance; returns n
fn relabel(labels: &mut MemRaster) -> usize {
    let mut ids: HashMap<u64, f64> = HashMap::new();
    for v in labels.data_mut().iter_mut() {
        if *v > 0.0 {
            let next = ids.len() as f64 + 1.0;
            *v = *ids.entry(v.to_bits()).or_insert(next);
        }
    }
    ids.len()
}

fn count_labels(labels: &MemRaster) -> usize {
    let mut seen: Vec<u64> = labels
        .data()
        .iter()
        .filter(|v| **v > 0.0)
        .map(|v| v.to_bits())
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Clump one band of a raster into 4-connected regions of equal value
pub fn clump(raster: &dyn RasterSource, params: &ClumpParams) -> Result<ClumpResult> {
    if params.band >= raster.band_count() {
        return Err(Error::BandIndex {
            index: params.band,
            available: raster.band_count(),
        });
    }
    let (rows, cols) = raster.size();
    let mut block = RasterBlock::empty();
    raster.read_block(params.band..params.band + 1, PixelRect::full(rows, cols), &mut block)?;

    let mut state = MemRaster::like(raster, 2);
    state.band_mut(VALUE).assign(&block.band(0));

    let mut engine = AlongsideEngine::new();
    if let Some(max) = params.max_passes {
        engine = engine.with_max_passes(max);
    }
    let mut calc = Clumper::new(params.nodata);
    let summary = engine.run(&mut state, &mut calc)?;

    let mut labels = MemRaster::like(raster, 1);
    labels.band_mut(0).assign(&state.band(LABEL));
    let num_clumps = if params.relabel {
        relabel(&mut labels)
    } else {
        count_labels(&labels)
    };
    if params.nodata.is_some() {
        labels.set_nodata(Some(0.0));
    }
    labels.set_band_names(vec!["clump".to_string()]);
    tracing::info!(clumps = num_clumps, passes = summary.passes, "clumping finished");

    Ok(ClumpResult {
        labels,
        num_clumps,
        passes: summary.passes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_in_zeros() -> MemRaster {
        let mut r = MemRaster::new(1, 4, 4);
        for (row, col) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            r.set(0, row, col, 1.0).unwrap();
        }
        r
    }

    #[test]
    fn test_block_with_nodata_background() {
        let params = ClumpParams {
            nodata: Some(0.0),
            ..Default::default()
        };
        let result = clump(&block_in_zeros(), &params).unwrap();
        assert_eq!(result.num_clumps, 1);
        let labels = &result.labels;
        assert_eq!(labels.get(0, 0, 0).unwrap(), 0.0);
        assert!(labels.get(0, 1, 1).unwrap() > 0.0);
        assert_eq!(labels.get(0, 2, 2).unwrap(), labels.get(0, 1, 1).unwrap());
    }

    #[test]
    fn test_block_without_nodata() {
        let result = clump(&block_in_zeros(), &ClumpParams::default()).unwrap();
        assert_eq!(result.num_clumps, 2);
        assert!(result.labels.data().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_u_shape_needs_propagation() {
        // the two arms of the U get different ids on the first pass
        let data = vec![
            1.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, //
            1.0, 1.0, 1.0,
        ];
        let r = MemRaster::from_vec(1, 3, 3, data).unwrap();
        let result = clump(&r, &ClumpParams::default()).unwrap();
        assert_eq!(result.num_clumps, 2);
        let l = &result.labels;
        assert_eq!(l.get(0, 0, 0).unwrap(), l.get(0, 0, 2).unwrap());
        // labelling pass plus one resolution pass
        assert_eq!(result.passes, 2);
    }

    #[test]
    fn test_staircase_merges_resolve_in_two_passes() {
        // every row joins a new arm to the one above through a chain of ids
        let data = vec![
            1.0, 0.0, 1.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, 0.0, 1.0, //
            1.0, 1.0, 1.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 1.0, 1.0,
        ];
        let r = MemRaster::from_vec(1, 4, 5, data).unwrap();
        let params = ClumpParams {
            nodata: Some(0.0),
            ..Default::default()
        };
        let result = clump(&r, &params).unwrap();
        assert_eq!(result.num_clumps, 1);
        assert_eq!(result.passes, 2);
        assert_eq!(result.labels.get(0, 0, 4).unwrap(), 1.0);
    }

    #[test]
    fn test_single_pass_without_equivalences() {
        let result = clump(&block_in_zeros(), &ClumpParams::default()).unwrap();
        assert_eq!(result.passes, 1);
    }

    #[test]
    fn test_nan_pixels_clump_together() {
        let data = vec![
            f64::NAN, f64::NAN, 1.0, //
            1.0, f64::NAN, 1.0, //
            1.0, 1.0, 1.0,
        ];
        let r = MemRaster::from_vec(1, 3, 3, data).unwrap();
        let result = clump(&r, &ClumpParams::default()).unwrap();
        assert_eq!(result.num_clumps, 2);
        let l = &result.labels;
        assert_eq!(l.get(0, 0, 0).unwrap(), l.get(0, 1, 1).unwrap());
    }

    #[test]
    fn test_diagonal_is_not_connected() {
        let r = MemRaster::from_vec(1, 2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let params = ClumpParams {
            nodata: Some(0.0),
            ..Default::default()
        };
        assert_eq!(clump(&r, &params).unwrap().num_clumps, 2);
    }

    #[test]
    fn test_relabel_is_dense() {
        let data = vec![
            1.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, //
            1.0, 1.0, 1.0,
        ];
        let r = MemRaster::from_vec(1, 3, 3, data).unwrap();
        let params = ClumpParams {
            relabel: true,
            ..Default::default()
        };
        let result = clump(&r, &params).unwrap();
        let mut ids: Vec<f64> = result.labels.data().iter().copied().collect();
        ids.sort_by(|a, b| a.total_cmp(b));
        ids.dedup();
        assert_eq!(ids, vec![1.0, 2.0]);
        assert_eq!(result.labels.get(0, 0, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_band_out_of_range() {
        let params = ClumpParams {
            band: 3,
            ..Default::default()
        };
        assert!(clump(&block_in_zeros(), &params).is_err());
    }
}
