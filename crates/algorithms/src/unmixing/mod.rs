//! Linear spectral unmixing
//!
//! Estimates per-pixel endmember fractions with unconstrained, sum-to-one,
//! non-negative or exhaustive solvers.

mod endmembers;
mod linalg;
mod lsu;

pub use endmembers::EndmemberMatrix;
pub use linalg::{SINGULAR_TOLERANCE, SvdSolver, nnls};
pub use lsu::{LinearUnmixer, UnmixMethod, UnmixParams, unmix};
