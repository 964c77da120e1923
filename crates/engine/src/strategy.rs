//! Execution mode for batches of independent jobs.
//!
//! A single engine pass is sequential. Parallelism comes from running
//! independent jobs (one calculator per job) side by side.

use imgcalc_core::{Error, Result};
use rayon::prelude::*;

/// Processing mode for batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// One job after another on the calling thread
    Sequential,
    /// All jobs on the global rayon pool
    #[default]
    Parallel,
    /// Jobs on a dedicated pool with the given number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Run every job and collect the results in job order
    pub fn run_jobs<T, F>(&self, jobs: Vec<F>) -> Result<Vec<Result<T>>>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        tracing::debug!(jobs = jobs.len(), mode = ?self, "running batch");
        match self {
            ProcessingMode::Sequential => Ok(jobs.into_iter().map(|job| job()).collect()),
            ProcessingMode::Parallel => Ok(jobs.into_par_iter().map(|job| job()).collect()),
            ProcessingMode::ParallelWith(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()
                    .map_err(|e| Error::Other(format!("failed to build thread pool: {}", e)))?;
                Ok(pool.install(|| jobs.into_par_iter().map(|job| job()).collect()))
            }
        }
    }
}

/// Number of threads in the global pool
pub fn num_threads() -> usize {
    rayon::current_num_threads()
}

/// Configure the global thread pool; ignored once it is initialised
pub fn set_num_threads(threads: usize) {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
