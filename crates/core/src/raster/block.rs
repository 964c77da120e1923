//! Rectangular multi-band tiles moved between drivers and the engine

use crate::error::{Error, Result};
use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis};

/// A pixel-space rectangle (row/col offset plus size)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl PixelRect {
    pub fn new(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self { row, col, rows, cols }
    }

    /// Rectangle covering a full `rows x cols` raster
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, rows, cols)
    }

    /// Number of pixels covered
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Check the rectangle lies inside a raster of the given size
    pub fn check_within(&self, rows: usize, cols: usize) -> Result<()> {
        if self.row + self.rows > rows || self.col + self.cols > cols {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: self.row + self.rows,
                ac: self.col + self.cols,
            });
        }
        Ok(())
    }
}

/// A tile of one or more bands, stored band-major as `(band, row, col)`.
///
/// Blocks are reused as arena buffers: [`RasterBlock::reshape`] keeps the
/// allocation when the new shape fits in the existing capacity.
#[derive(Debug, Clone)]
pub struct RasterBlock {
    data: Array3<f64>,
    rect: PixelRect,
}

impl RasterBlock {
    /// Zero-filled block covering `rect`
    pub fn new(bands: usize, rect: PixelRect) -> Self {
        Self {
            data: Array3::zeros((bands, rect.rows, rect.cols)),
            rect,
        }
    }

    /// Empty block, to be shaped by the first read
    pub fn empty() -> Self {
        Self::new(0, PixelRect::new(0, 0, 0, 0))
    }

    /// Build a block from band-major data
    pub fn from_vec(bands: usize, rect: PixelRect, data: Vec<f64>) -> Result<Self> {
        let array = Array3::from_shape_vec((bands, rect.rows, rect.cols), data).map_err(|_| {
            Error::InvalidDimensions {
                rows: rect.rows,
                cols: rect.cols,
            }
        })?;
        Ok(Self { data: array, rect })
    }

    /// Change shape and origin. Contents are unspecified afterwards.
    pub fn reshape(&mut self, bands: usize, rect: PixelRect) {
        let shape = (bands, rect.rows, rect.cols);
        if self.data.dim() != shape {
            let mut buf = std::mem::take(&mut self.data).into_raw_vec_and_offset().0;
            buf.resize(bands * rect.rows * rect.cols, 0.0);
            // length matches the requested shape, so this cannot fail
            self.data = Array3::from_shape_vec(shape, buf)
                .unwrap_or_else(|_| Array3::zeros(shape));
        }
        self.rect = rect;
    }

    pub fn bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn rows(&self) -> usize {
        self.rect.rows
    }

    pub fn cols(&self) -> usize {
        self.rect.cols
    }

    /// Location of the block in its raster
    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    /// Value at block-local (band, row, col)
    #[inline]
    pub fn get(&self, band: usize, row: usize, col: usize) -> f64 {
        self.data[(band, row, col)]
    }

    #[inline]
    pub fn set(&mut self, band: usize, row: usize, col: usize, value: f64) {
        self.data[(band, row, col)] = value;
    }

    /// Copy the band values of block-local pixel (row, col) into `out`
    #[inline]
    pub fn pixel_into(&self, row: usize, col: usize, out: &mut [f64]) {
        for (band, v) in out.iter_mut().enumerate().take(self.bands()) {
            *v = self.data[(band, row, col)];
        }
    }

    /// Write `values` as the bands of block-local pixel (row, col)
    #[inline]
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

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }
}
