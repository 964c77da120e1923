//! # imgcalc engine
//!
//! Drives calculators over rasters:
//!
//! - [`ImageCalc`]: strip-by-strip pixel, window and accumulation passes
//! - [`AlongsideEngine`]: multi-pass neighbour propagation on an in-memory state
//! - [`ProcessingMode`]: sequential or rayon execution of independent jobs

pub mod alongside;
pub mod calc;
pub mod calculator;
pub mod progress;
pub mod stack;
pub mod strategy;
pub mod strips;
pub mod window;

pub use alongside::{AlongsideCalculator, AlongsideEngine, AlongsidePixel, AlongsideSummary};
pub use calc::{CalcConfig, ImageCalc};
pub use calculator::{
    Accumulator, ConditionalWindowCalculator, NoDataPolicy, PairedAccumulator, PixelCalculator,
    WindowCalculator, check_band,
};
pub use progress::{CancelToken, NoProgress, Progress};
pub use strategy::{ProcessingMode, num_threads, set_num_threads};
pub use strips::{Strip, StripIterator};
pub use window::{Window, check_window_size};
