//! # imgcalc algorithms
//!
//! Pixel calculators and whole-image algorithms built on the imgcalc engine.
//!
//! ## Algorithm Categories
//!
//! - **imagery**: band math, masking, per-pixel linear fit, point sampling
//! - **statistics**: streaming accumulators, window statistics, Mahalanobis filters
//! - **morphology**: erosion, dilation and the transforms composed from them
//! - **classification**: K-means, ISODATA and nearest-centre classification
//! - **unmixing**: linear spectral unmixing
//! - **segmentation**: clumping and growth distance transform

pub(crate) mod maybe_rayon;

pub mod classification;
pub mod imagery;
pub mod morphology;
pub mod segmentation;
pub mod statistics;
pub mod unmixing;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        ClusterCentre, InitMethod, IsodataParams, KmeansParams, classify, isodata, kmeans, load_centres,
        save_centres,
    };
    pub use crate::imagery::{BandMathParams, LinearFitParams, MaskParams, SamplePointsParams, band_math, linear_fit, mask, sample_points};
    pub use crate::morphology::{StructuringElement, black_hat, closing, dilate, erode, gradient, opening, top_hat};
    pub use crate::segmentation::{ClumpParams, DistanceParams, clump, distance};
    pub use crate::statistics::{WindowStatistic, WindowStatsParams, mahalanobis_global, mahalanobis_window, window_statistics};
    pub use crate::unmixing::{EndmemberMatrix, UnmixMethod, UnmixParams, unmix};
    pub use imgcalc_core::prelude::*;
}
