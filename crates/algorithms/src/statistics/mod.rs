//! Statistical reductions and filters
//!
//! - **accumulators**: mean vector, covariance, correlation, RMSE
//! - **window_stats**: moving window statistics
//! - **mahalanobis**: global and windowed Mahalanobis distance

pub mod accumulators;
pub mod mahalanobis;
pub mod window_stats;

pub use accumulators::{Correlation, Covariance, CovarianceMatrix, MeanVector, Rmse, correlation_matrix};
pub use mahalanobis::{MahalanobisGlobal, MahalanobisWindow, mahalanobis_global, mahalanobis_window};
pub use window_stats::{WindowStatistic, WindowStats, WindowStatsParams, window_statistics};
