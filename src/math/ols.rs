//! Least squares solver used for formula calibration.
//!
//! Calibration solves a tiny regression of the form:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! with two or three columns and at most a few hundred rows. We solve it with
//! SVD because the design matrix is tall; nalgebra's `QR::solve` is intended
//! for square systems.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Benchmark·fx and fx columns are strongly correlated on short windows,
    // so progressively looser tolerances are tried before giving up.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Least squares fit of `y` on the given feature rows (no implicit intercept).
///
/// Every row of `rows` must have the same length. Returns the coefficients in
/// column order, or `None` when the system is underdetermined or singular.
pub fn fit_linear(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let n = rows.len();
    let k = rows.first()?.len();
    if k == 0 || n < k || y.len() != n || rows.iter().any(|r| r.len() != k) {
        return None;
    }

    let x = DMatrix::from_fn(n, k, |i, j| rows[i][j]);
    let y = DVector::from_column_slice(y);
    solve_least_squares(&x, &y).map(|beta| beta.iter().copied().collect())
}
