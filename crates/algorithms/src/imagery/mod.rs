//! Per-pixel imagery calculators
//!
//! - Band math: arithmetic expressions over `b1..bN` or named bands
//! - Mask: replace pixels selected by a mask raster
//! - Linear fit: per-pixel regression of the band stack against x values
//! - Point sampling: copy pixel values into vector attributes

mod band_math;
mod linear_fit;
mod mask;
mod sampling;

pub use band_math::{BandMath, BandMathParams, band_math};
pub use linear_fit::{LinearFit, LinearFitParams, linear_fit};
pub use mask::{MaskCalculator, MaskParams, mask};
pub use sampling::{SamplePointsParams, sample_points};
