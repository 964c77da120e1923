//! Endmember spectra.

use imgcalc_core::io::read_matrix;
use imgcalc_core::{Error, Result};
use nalgebra::DMatrix;
use ndarray::Array2;
use std::path::Path;

/// Bands x endmembers matrix, one column per endmember.
///
/// Loaded once and shared read-only (behind an `Arc`) by every pixel of a
/// run. Files store one endmember per row and are transposed on load.
#[derive(Debug, Clone, PartialEq)]
pub struct EndmemberMatrix {
    matrix: DMatrix<f64>,
}

impl EndmemberMatrix {
    /// Build from an endmembers x bands table
    pub fn from_rows(table: &Array2<f64>) -> Result<Self> {
        let (n, m) = table.dim();
        if n == 0 {
            return Err(Error::invalid_param("endmembers", 0, "no endmembers given"));
        }
        if n >= m {
            return Err(Error::invalid_param(
                "endmembers",
                n,
                format!("need fewer endmembers than bands ({})", m),
            ));
        }
        Ok(Self {
            matrix: DMatrix::from_fn(m, n, |band, e| table[(e, band)]),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table = read_matrix(path.as_ref())?;
        let em = Self::from_rows(&table)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            endmembers = em.num_endmembers(),
            bands = em.num_bands(),
            "loaded endmembers"
        );
        Ok(em)
    }

    pub fn num_bands(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_endmembers(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Spectrum of one endmember
    pub fn spectrum(&self, endmember: usize) -> Vec<f64> {
        self.matrix.column(endmember).iter().copied().collect()
    }
}
