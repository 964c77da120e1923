//! Unsupervised classification of multi-band rasters
//!
//! - **K-means**: iterative partitioning around cluster means
//! - **ISODATA**: K-means with discard, split and merge of clusters
//! - **Classification**: nearest-centre labelling with saved centres

mod centre;
mod classify;
mod init;
mod isodata;
mod kmeans;

pub use centre::{ClusterCentre, ClusterCentreIso, centres_from_matrix, centres_to_matrix, load_centres, save_centres};
pub use classify::{NearestCentreClassifier, classify};
pub use init::{InitMethod, SampleCollector, Samples, collect_samples, initialise};
pub use isodata::{Isodata, IsodataParams, IsodataResult, isodata, isodata_samples};
pub use kmeans::{Kmeans, KmeansParams, KmeansResult, kmeans, kmeans_samples};
