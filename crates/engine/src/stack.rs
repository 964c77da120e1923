//! Ordered set of input datasets read as one concatenated band stack.

use imgcalc_core::{Error, PixelRect, RasterBlock, RasterSource, Result};

/// Inputs of one engine pass.
///
/// All datasets must share the same pixel dimensions. Pixel samples are the
/// concatenation of every dataset's bands, in dataset order.
pub struct InputStack<'a> {
    sources: &'a [&'a dyn RasterSource],
    blocks: Vec<RasterBlock>,
    rows: usize,
    cols: usize,
    total_bands: usize,
}

impl<'a> InputStack<'a> {
    pub fn new(sources: &'a [&'a dyn RasterSource]) -> Result<Self> {
        let first = sources
            .first()
            .ok_or_else(|| Error::invalid_param("inputs", 0, "at least one input dataset is required"))?;
        let (rows, cols) = first.size();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        let reference = first.transform();
        for (idx, source) in sources.iter().enumerate().skip(1) {
            let (r, c) = source.size();
            if (r, c) != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: r,
                    ac: c,
                });
            }
            if !reference.same_grid(&source.transform(), 1e-9) {
                tracing::warn!(input = idx, "input georeferencing differs from the first input");
            }
        }
        let total_bands = sources.iter().map(|s| s.band_count()).sum();
        Ok(Self {
            sources,
            blocks: sources.iter().map(|_| RasterBlock::empty()).collect(),
            rows,
            cols,
            total_bands,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn total_bands(&self) -> usize {
        self.total_bands
    }

    pub fn first(&self) -> &'a dyn RasterSource {
        self.sources[0]
    }

    /// Read `rect` from every dataset
    pub fn read(&mut self, rect: PixelRect) -> Result<()> {
        for (source, block) in self.sources.iter().zip(self.blocks.iter_mut()) {
            source.read_block(0..source.band_count(), rect, block)?;
        }
        Ok(())
    }

    /// Concatenated sample of block-local pixel (row, col)
    #[inline]
    pub fn sample_into(&self, row: usize, col: usize, out: &mut [f64]) {
        let mut offset = 0;
        for block in &self.blocks {
            let n = block.bands();
            block.pixel_into(row, col, &mut out[offset..offset + n]);
            offset += n;
        }
    }

    /// Value of concatenated `band` at block-local (row, col)
    #[inline]
    pub fn value(&self, band: usize, row: usize, col: usize) -> f64 {
        let mut band = band;
        for block in &self.blocks {
            if band < block.bands() {
                return block.get(band, row, col);
            }
            band -= block.bands();
        }
        f64::NAN
    }

    /// Per-band no-data values of the concatenated stack
    pub fn nodata_values(&self) -> Vec<Option<f64>> {
        self.sources
            .iter()
            .flat_map(|s| (0..s.band_count()).map(move |b| s.nodata(b)))
            .collect()
    }
}
