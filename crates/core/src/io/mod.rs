//! Block I/O traits and file drivers
//!
//! The engine only talks to [`RasterSource`] and [`RasterSink`]. Concrete
//! drivers (in-memory, GeoTIFF) live behind them, so datasets larger than
//! memory can be served by any driver that reads rectangles on demand.

mod matrix;
mod geotiff;

pub use self::matrix::{read_matrix, read_value_list, write_matrix};
pub use self::geotiff::{TiffSink, read_geotiff, read_geotiff_from_buffer, write_geotiff};

use crate::error::{Error, Result};
use crate::raster::{DataType, GeoTransform, MemRaster, PixelRect, RasterBlock};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Read side of a multi-band raster dataset
pub trait RasterSource {
    /// Number of bands
    fn band_count(&self) -> usize;

    /// Dimensions as (rows, cols)
    fn size(&self) -> (usize, usize);

    /// Read `bands` over `rect` into `block`, reshaping it as needed
    fn read_block(&self, bands: Range<usize>, rect: PixelRect, block: &mut RasterBlock) -> Result<()>;

    /// No-data value of a band, if any
    fn nodata(&self, band: usize) -> Option<f64>;

    /// Georeferencing of the pixel grid
    fn transform(&self) -> GeoTransform;
}

/// Write side of a multi-band raster dataset
pub trait RasterSink {
    fn band_count(&self) -> usize;

    fn size(&self) -> (usize, usize);

    /// Write a block at the location recorded in the block itself
    fn write_block(&mut self, block: &RasterBlock) -> Result<()>;

    /// Flush buffered data. Called once after the last block.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Container an [`OutputSpec`] creates
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Keep results in a [`MemRaster`]
    #[default]
    Memory,
    /// Write a multi-page GeoTIFF, one page per band
    GeoTiff(PathBuf),
}

/// Description of an output raster, fixed before any pixel is processed
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub bands: usize,
    pub band_names: Option<Vec<String>>,
    pub data_type: DataType,
    pub format: OutputFormat,
    pub nodata: Option<f64>,
}

impl OutputSpec {
    /// In-memory float output with `bands` bands
    pub fn new(bands: usize) -> Self {
        Self {
            bands,
            band_names: None,
            data_type: DataType::F64,
            format: OutputFormat::Memory,
            nodata: None,
        }
    }

    /// GeoTIFF output at `path`
    pub fn geotiff(bands: usize, path: impl AsRef<Path>) -> Self {
        Self {
            format: OutputFormat::GeoTiff(path.as_ref().to_path_buf()),
            ..Self::new(bands)
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_band_names(mut self, names: Vec<String>) -> Self {
        self.band_names = Some(names);
        self
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Validate the spec itself
    pub fn validate(&self) -> Result<()> {
        if self.bands == 0 {
            return Err(Error::invalid_param("bands", 0, "output needs at least one band"));
        }
        if let Some(names) = &self.band_names
            && names.len() != self.bands
        {
            return Err(Error::invalid_param(
                "band_names",
                names.len(),
                format!("expected {} names", self.bands),
            ));
        }
        Ok(())
    }

    /// In-memory raster on the grid of `like`
    pub fn create_memory(&self, like: &dyn RasterSource) -> Result<MemRaster> {
        self.validate()?;
        let mut raster = MemRaster::like(like, self.bands);
        raster.set_nodata(self.nodata);
        if let Some(names) = &self.band_names {
            raster.set_band_names(names.clone());
        }
        Ok(raster)
    }

    /// Create the sink this spec describes, on the grid of `like`
    pub fn create_sink(&self, like: &dyn RasterSource) -> Result<Box<dyn RasterSink>> {
        match &self.format {
            OutputFormat::Memory => Ok(Box::new(self.create_memory(like)?)),
            OutputFormat::GeoTiff(path) => Ok(Box::new(TiffSink::create(path, self, like)?)),
        }
    }
}
