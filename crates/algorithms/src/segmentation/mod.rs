//! Region growing on the alongside engine
//!
//! - **Clump**: 4-connected regions of equal value
//! - **Distance**: growth-based distance to the nearest feature pixel

mod clump;
mod distance;

pub use clump::{ClumpParams, ClumpResult, Clumper, clump};
pub use distance::{DistanceGrowth, DistanceParams, distance};
