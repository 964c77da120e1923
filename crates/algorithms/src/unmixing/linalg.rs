//! Least-squares solvers shared by the unmixing calculators.

use imgcalc_core::{Error, Result};
use nalgebra::{DMatrix, DVector, SVD};

/// Relative singular value below which a system counts as singular
pub const SINGULAR_TOLERANCE: f64 = 1e-10;

const SVD_EPS: f64 = 1e-14;
const SVD_MAX_ITER: usize = 1000;

fn decompose(a: DMatrix<f64>) -> Result<SVD<f64, nalgebra::Dyn, nalgebra::Dyn>> {
    SVD::try_new(a, true, true, SVD_EPS, SVD_MAX_ITER)
        .ok_or_else(|| Error::Numeric("SVD did not converge".into()))
}

/// Least-squares solver for a fixed design matrix.
///
/// The SVD is computed once and kept as a pseudo-inverse, so each solve
/// is one matrix-vector product.
#[derive(Debug, Clone)]
pub struct SvdSolver {
    pinv: DMatrix<f64>,
    x: DVector<f64>,
}

impl SvdSolver {
    pub fn new(a: DMatrix<f64>) -> Result<Self> {
        let (rows, cols) = a.shape();
        if rows < cols {
            return Err(Error::invalid_param(
                "endmembers",
                cols,
                format!("system has {} equations for {} unknowns", rows, cols),
            ));
        }
        let svd = decompose(a)?;
        let max = svd.singular_values.max();
        let min = svd.singular_values.min();
        if max <= 0.0 || min / max < SINGULAR_TOLERANCE {
            return Err(Error::SingularMatrix(format!(
                "singular values range from {:e} to {:e}",
                min, max
            )));
        }
        let pinv = svd
            .pseudo_inverse(max * SINGULAR_TOLERANCE)
            .map_err(|e| Error::Numeric(e.to_string()))?;
        Ok(Self {
            pinv,
            x: DVector::zeros(cols),
        })
    }

    /// Solve `A x = b` in the least-squares sense
    pub fn solve(&mut self, b: &DVector<f64>) -> &DVector<f64> {
        self.x.gemv(1.0, &self.pinv, b, 0.0);
        &self.x
    }
}

/// Non-negative least squares (Lawson-Hanson active set).
///
/// Minimises `|A x - b|` subject to `x >= 0`.
pub fn nnls(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    let n = a.ncols();
    let tol = 1e-12 * a.norm().max(1.0);
    let max_outer = 3 * n.max(1) + 10;

    let mut x = DVector::<f64>::zeros(n);
    let mut passive = vec![false; n];
    let mut w = a.tr_mul(&(b - a * &x));

    for _ in 0..max_outer {
        let candidate = (0..n)
            .filter(|&j| !passive[j] && w[j] > tol)
            .max_by(|&i, &j| w[i].total_cmp(&w[j]));
        let Some(j) = candidate else {
            return Ok(x);
        };
        passive[j] = true;

        for _ in 0..=n {
            let s = solve_passive(a, b, &passive)?;
            let feasible = (0..n).filter(|&i| passive[i]).all(|i| s[i] > tol);
            if feasible {
                x = s;
                break;
            }
            let mut alpha = f64::INFINITY;
            for i in (0..n).filter(|&i| passive[i] && s[i] <= tol) {
                let denom = x[i] - s[i];
                if denom > 0.0 {
                    alpha = alpha.min(x[i] / denom);
                }
            }
            if !alpha.is_finite() {
                alpha = 0.0;
            }
            for i in 0..n {
                x[i] += alpha * (s[i] - x[i]);
                if passive[i] && x[i] <= tol {
                    passive[i] = false;
                    x[i] = 0.0;
                }
            }
            if !passive.iter().any(|&p| p) {
                break;
            }
        }
        w = a.tr_mul(&(b - a * &x));
    }
    tracing::warn!(unknowns = n, "NNLS reached its iteration limit");
    Ok(x)
}

/// Unconstrained least squares over the passive columns; other entries are 0
fn solve_passive(a: &DMatrix<f64>, b: &DVector<f64>, passive: &[bool]) -> Result<DVector<f64>> {
    let cols: Vec<usize> = (0..a.ncols()).filter(|&i| passive[i]).collect();
    let sub = a.select_columns(cols.iter());
    let svd = decompose(sub)?;
    let z = svd
        .solve(b, SINGULAR_TOLERANCE)
        .map_err(|e| Error::Numeric(e.to_string()))?;
    let mut s = DVector::zeros(a.ncols());
    for (k, &i) in cols.iter().enumerate() {
        s[i] = z[k];
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svd_exact_solution() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![2.0, 3.0, 5.0]);
        let mut solver = SvdSolver::new(a).unwrap();
        let x = solver.solve(&b);
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_svd_singular() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        assert!(matches!(SvdSolver::new(a), Err(Error::SingularMatrix(_))));
    }

    #[test]
    fn test_nnls_matches_unconstrained_when_positive() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![2.0, 3.0, 5.0]);
        let x = nnls(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_nnls_clamps_negative() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let b = DVector::from_vec(vec![2.0, -3.0, 0.0]);
        let x = nnls(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert_eq!(x[1], 0.0);
    }
}
