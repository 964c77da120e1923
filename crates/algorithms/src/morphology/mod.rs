//! Mathematical morphology
//!
//! Erosion and dilation are conditional window calculators over a
//! structuring element; the other transforms are composed from them:
//! - **Erosion**: minimum filter (shrinks bright regions)
//! - **Dilation**: maximum filter (expands bright regions)
//! - **Opening**: erosion then dilation (removes small bright features)
//! - **Closing**: dilation then erosion (fills small dark gaps)
//! - **Gradient**: dilation minus erosion (edge detection)
//! - **Top-hat**: input minus opening (bright feature extraction)
//! - **Black-hat**: closing minus input (dark feature extraction)

mod closing;
mod dilate;
mod element;
mod erode;
mod filter;
mod gradient;
mod opening;
mod tophat;

pub use closing::{Closing, ClosingParams, closing};
pub use dilate::{Dilate, DilateParams, dilate};
pub use element::StructuringElement;
pub use erode::{Erode, ErodeParams, erode};
pub use filter::{MorphOp, MorphologyFilter};
pub use gradient::{Gradient, GradientParams, gradient};
pub use opening::{Opening, OpeningParams, opening};
pub use tophat::{BlackHat, BlackHatParams, TopHat, TopHatParams, black_hat, top_hat};
