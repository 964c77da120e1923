//! In-memory multi-band raster

use crate::error::{Error, Result};
use crate::io::{RasterSink, RasterSource};
use crate::raster::{GeoTransform, PixelRect, RasterBlock};
use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut2, Axis, s};

/// A georeferenced multi-band raster held in memory.
///
/// Data is stored band-major as `(band, row, col)`. `MemRaster` is both a
/// [`RasterSource`] and a [`RasterSink`], which makes it the default
/// container for intermediate results and for tests.
///
/// # Example
///
/// ```ignore
/// use imgcalc_core::MemRaster;
///
/// let mut img = MemRaster::new(3, 100, 200);
/// img.set(0, 10, 20, 42.0)?;
/// assert_eq!(img.get(0, 10, 20)?, 42.0);
/// ```
#[derive(Debug, Clone)]
pub struct MemRaster {
    data: Array3<f64>,
    transform: GeoTransform,
    nodata: Vec<Option<f64>>,
    band_names: Vec<String>,
}

impl MemRaster {
    /// Zero-filled raster
    pub fn new(bands: usize, rows: usize, cols: usize) -> Self {
        Self::from_array(Array3::zeros((bands, rows, cols)))
    }

    /// Raster with every sample set to `value`
    pub fn filled(bands: usize, rows: usize, cols: usize, value: f64) -> Self {
        Self::from_array(Array3::from_elem((bands, rows, cols), value))
    }

    /// Build from a band-major array
    pub fn from_array(data: Array3<f64>) -> Self {
        let bands = data.len_of(Axis(0));
        Self {
            data,
            transform: GeoTransform::default(),
            nodata: vec![None; bands],
            band_names: (1..=bands).map(|b| format!("Band {}", b)).collect(),
        }
    }

    /// Build from band-major data
    pub fn from_vec(bands: usize, rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        let array = Array3::from_shape_vec((bands, rows, cols), data)
            .map_err(|_| Error::InvalidDimensions { rows, cols })?;
        Ok(Self::from_array(array))
    }

    /// Stack single-band arrays into one raster
    pub fn from_bands(bands: &[Array2<f64>]) -> Result<Self> {
        let first = bands
            .first()
            .ok_or_else(|| Error::invalid_param("bands", "[]", "at least one band required"))?;
        let (rows, cols) = first.dim();
        let mut data = Array3::zeros((bands.len(), rows, cols));
        for (i, band) in bands.iter().enumerate() {
            if band.dim() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: band.nrows(),
                    ac: band.ncols(),
                });
            }
            data.index_axis_mut(Axis(0), i).assign(band);
        }
        Ok(Self::from_array(data))
    }

    /// Zero-filled raster with the same grid as `source`
    pub fn like(source: &dyn RasterSource, bands: usize) -> Self {
        let (rows, cols) = source.size();
        let mut out = Self::new(bands, rows, cols);
        out.transform = source.transform();
        out
    }

    pub fn bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn rows(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn cols(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn get(&self, band: usize, row: usize, col: usize) -> Result<f64> {
        self.data
            .get((band, row, col))
            .copied()
            .ok_or_else(|| self.out_of_bounds(band))
    }

    pub fn set(&mut self, band: usize, row: usize, col: usize, value: f64) -> Result<()> {
        let err = self.out_of_bounds(band);
        let cell = self.data.get_mut((band, row, col)).ok_or(err)?;
        *cell = value;
        Ok(())
    }

    fn out_of_bounds(&self, band: usize) -> Error {
        if band >= self.bands() {
            Error::BandIndex {
                index: band,
                available: self.bands(),
            }
        } else {
            Error::InvalidDimensions {
                rows: self.rows(),
                cols: self.cols(),
            }
        }
    }

    /// Band values of pixel (row, col)
    pub fn pixel(&self, row: usize, col: usize) -> Vec<f64> {
        self.data.slice(s![.., row, col]).to_vec()
    }

    pub fn set_pixel(&mut self, row: usize, col: usize, values: &[f64]) {
        for (band, &v) in values.iter().enumerate().take(self.bands()) {
            self.data[(band, row, col)] = v;
        }
    }

    pub fn band(&self, band: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), band)
    }

    pub fn band_mut(&mut self, band: usize) -> ArrayViewMut2<'_, f64> {
        self.data.index_axis_mut(Axis(0), band)
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    pub fn into_array(self) -> Array3<f64> {
        self.data
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Set the same no-data value on every band
    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = vec![nodata; self.bands()];
    }

    pub fn set_band_nodata(&mut self, band: usize, nodata: Option<f64>) {
        if let Some(slot) = self.nodata.get_mut(band) {
            *slot = nodata;
        }
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn set_band_names(&mut self, names: Vec<String>) {
        if names.len() == self.bands() {
            self.band_names = names;
        }
    }
}

impl RasterSource for MemRaster {
    fn band_count(&self) -> usize {
        self.bands()
    }

    fn size(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    fn read_block(&self, bands: std::ops::Range<usize>, rect: PixelRect, block: &mut RasterBlock) -> Result<()> {
        if bands.end > self.bands() {
            return Err(Error::BandIndex {
                index: bands.end - 1,
                available: self.bands(),
            });
        }
        rect.check_within(self.rows(), self.cols())?;
        block.reshape(bands.len(), rect);
        for (dst, band) in bands.enumerate() {
            block.band_mut(dst).assign(&self.data.slice(s![
                band,
                rect.row..rect.row + rect.rows,
                rect.col..rect.col + rect.cols
            ]));
        }
        Ok(())
    }

    fn nodata(&self, band: usize) -> Option<f64> {
        self.nodata.get(band).copied().flatten()
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }
}

impl RasterSink for MemRaster {
    fn band_count(&self) -> usize {
        self.bands()
    }

    fn size(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    fn write_block(&mut self, block: &RasterBlock) -> Result<()> {
        let rect = block.rect();
        rect.check_within(self.rows(), self.cols())?;
        if block.bands() != self.bands() {
            return Err(Error::OutputBands {
                expected: block.bands(),
                actual: self.bands(),
            });
        }
        for band in 0..block.bands() {
            self.data
                .slice_mut(s![
                    band,
                    rect.row..rect.row + rect.rows,
                    rect.col..rect.col + rect.cols
                ])
                .assign(&block.band(band));
        }
        Ok(())
    }
}
