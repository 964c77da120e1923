//! # imgcalc core
//!
//! Data types and I/O shared by the imgcalc engine and algorithms:
//! - `MemRaster`: in-memory multi-band raster
//! - `RasterBlock` / `PixelRect`: tiles moved between drivers and the engine
//! - `RasterSource` / `RasterSink`: block I/O traits, plus a native GeoTIFF driver
//! - `OutputSpec`: description of an output raster
//! - Matrix text files and the `VectorLayer` abstraction

pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use error::{Error, ErrorKind, Result};
pub use io::{OutputFormat, OutputSpec, RasterSink, RasterSource};
pub use raster::{DataType, GeoTransform, MemRaster, PixelRect, RasterBlock};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::io::{OutputSpec, RasterSink, RasterSource};
    pub use crate::raster::{GeoTransform, MemRaster, PixelRect, RasterBlock};
    pub use crate::Algorithm;
}

/// Whole-image operation with typed parameters.
///
/// Per-pixel work is expressed as calculators driven by the engine; an
/// `Algorithm` wraps one complete run (reading inputs, driving one or more
/// passes, producing the output).
pub trait Algorithm {
    type Input;
    type Output;
    type Params: Default;
    type Error: std::error::Error;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
