//! Raster data structures

mod block;
mod element;
mod geotransform;
mod image;

pub use block::{PixelRect, RasterBlock};
pub use element::{DataType, RasterElement, convert_samples};
pub use geotransform::GeoTransform;
pub use image::MemRaster;
