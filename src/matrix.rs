use ndarray::{Array1, Array2, ArrayView2};
use ndarray_linalg::{Cholesky, Eigh, UPLO};

use crate::error::{Result, SimError};
use crate::types::Matrix;

/// Absolute tolerance for symmetry, unit-diagonal and eigenvalue checks.
pub const TOL: f64 = 1e-8;

pub fn to_array2(matrix: &Matrix, name: &str) -> Result<Array2<f64>> {
    let n = matrix.len();
    let m = matrix.first().map(|row| row.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(n * m);
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != m {
            return Err(SimError::dimension(format!("{name} row {i}"), m, row.len()));
        }
        data.extend_from_slice(row);
    }
    Array2::from_shape_vec((n, m), data)
        .map_err(|e| SimError::InvalidArgument(format!("{name}: {e}")))
}

pub fn ensure_square(matrix: &ArrayView2<'_, f64>, name: &str) -> Result<usize> {
    let (rows, cols) = matrix.dim();
    if rows == 0 {
        return Err(SimError::InvalidArgument(format!("{name} must not be empty")));
    }
    if rows != cols {
        return Err(SimError::dimension(
            name,
            format!("{rows}x{rows}"),
            format!("{rows}x{cols}"),
        ));
    }
    Ok(rows)
}

pub fn ensure_shape(matrix: &ArrayView2<'_, f64>, rows: usize, cols: usize, name: &str) -> Result<()> {
    if matrix.dim() != (rows, cols) {
        let (r, c) = matrix.dim();
        return Err(SimError::dimension(
            name,
            format!("{rows}x{cols}"),
            format!("{r}x{c}"),
        ));
    }
    Ok(())
}

pub fn max_asymmetry(matrix: &ArrayView2<'_, f64>) -> f64 {
    let n = matrix.nrows();
    let mut worst = 0.0_f64;
    for i in 0..n {
        for j in (i + 1)..n {
            worst = worst.max((matrix[(i, j)] - matrix[(j, i)]).abs());
        }
    }
    worst
}

pub fn max_unit_diagonal_deviation(matrix: &ArrayView2<'_, f64>) -> f64 {
    matrix
        .diag()
        .iter()
        .fold(0.0_f64, |acc, d| acc.max((d - 1.0).abs()))
}

pub fn min_eigenvalue(matrix: &ArrayView2<'_, f64>) -> Result<f64> {
    let (eigvals, _) = matrix.to_owned().eigh(UPLO::Lower)?;
    Ok(eigvals.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn scalar_correlation(value: f64, k: usize) -> Array2<f64> {
    let mut out = Array2::from_elem((k, k), value);
    out.diag_mut().fill(1.0);
    out
}

/// Returns `F` with `F Fᵗ = matrix`, taken from the eigen decomposition with
/// eigenvalues in `[-TOL, 0)` clamped to zero.
pub fn psd_sqrt_factor(matrix: &ArrayView2<'_, f64>, name: &str) -> Result<Array2<f64>> {
    let (eigvals, eigvecs) = matrix.to_owned().eigh(UPLO::Lower)?;
    let min = eigvals.iter().copied().fold(f64::INFINITY, f64::min);
    if !min.is_finite() || min < -TOL {
        return Err(SimError::NonPositiveDefinite {
            name: name.to_string(),
            min_eigenvalue: min,
        });
    }
    Ok(scale_columns_by_sqrt(&eigvecs, &eigvals))
}

/// Lower Cholesky factor, falling back to the eigen square root for
/// singular but positive semi-definite input.
pub fn cholesky_or_eigen(matrix: &ArrayView2<'_, f64>, name: &str) -> Result<Array2<f64>> {
    match matrix.to_owned().cholesky(UPLO::Lower) {
        Ok(chol) => Ok(chol),
        Err(_) => psd_sqrt_factor(matrix, name),
    }
}

pub fn scale_columns_by_sqrt(vectors: &Array2<f64>, values: &Array1<f64>) -> Array2<f64> {
    let sqrt_vals = values.mapv(|v| if v.is_finite() && v > 0.0 { v.sqrt() } else { 0.0 });
    vectors * &sqrt_vals
}
