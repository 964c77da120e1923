//! Sample raster values under point features into attribute fields.

use geo_types::Geometry;
use imgcalc_core::vector::{AttributeValue, VectorLayer};
use imgcalc_core::{Error, PixelRect, RasterBlock, RasterSource, Result};

/// Parameters for point sampling
#[derive(Debug, Clone)]
pub struct SamplePointsParams {
    /// Field name prefix; fields are `<prefix><band>` with 1-based bands
    pub prefix: String,
    /// Zero-based bands to sample; all bands when `None`
    pub bands: Option<Vec<usize>>,
}

impl Default for SamplePointsParams {
    fn default() -> Self {
        Self {
            prefix: "b".to_string(),
            bands: None,
        }
    }
}

/// Write pixel values under each point of `layer`.
///
/// Points outside the raster get `Null` fields. Features without point
/// geometry are skipped. Returns the number of features sampled.
pub fn sample_points(
    raster: &dyn RasterSource,
    layer: &mut dyn VectorLayer,
    params: &SamplePointsParams,
) -> Result<usize> {
    let bands: Vec<usize> = match &params.bands {
        Some(b) => b.clone(),
        None => (0..raster.band_count()).collect(),
    };
    for &b in &bands {
        if b >= raster.band_count() {
            return Err(Error::BandIndex {
                index: b,
                available: raster.band_count(),
            });
        }
    }
    let (rows, cols) = raster.size();
    let transform = raster.transform();
    let mut block = RasterBlock::empty();
    let mut sampled = 0;

    for fid in 0..layer.feature_count() {
        let (x, y) = match layer.geometry(fid)? {
            Some(Geometry::Point(p)) => (p.x(), p.y()),
            _ => {
                tracing::debug!(fid, "skipping feature without point geometry");
                continue;
            }
        };
        let (row, col) = transform.geo_to_pixel(x, y);
        let inside = row >= 0.0 && col >= 0.0 && (row as usize) < rows && (col as usize) < cols;
        if !inside {
            tracing::debug!(fid, x, y, "point outside raster");
            for &b in &bands {
                layer.set_field(fid, &field_name(&params.prefix, b), AttributeValue::Null)?;
            }
            continue;
        }
        let rect = PixelRect::new(row as usize, col as usize, 1, 1);
        raster.read_block(0..raster.band_count(), rect, &mut block)?;
        for &b in &bands {
            let value = block.get(b, 0, 0);
            let attr = if raster.nodata(b).is_some_and(|nd| nd == value) {
                AttributeValue::Null
            } else {
                AttributeValue::Float(value)
            };
            layer.set_field(fid, &field_name(&params.prefix, b), attr)?;
        }
        sampled += 1;
    }
    tracing::info!(sampled, features = layer.feature_count(), "point sampling done");
    Ok(sampled)
}

fn field_name(prefix: &str, band: usize) -> String {
    format!("{}{}", prefix, band + 1)
}
