//! Correlation-matrix validation, nearest-correlation repair, and Cholesky
//! factorization for multi-asset path generation.
//!
//! References:
//! - Higham (2002) for nearest-correlation repair.
//! - Glasserman (2004) for correlated-path simulation.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Eigenvalues below this are clipped during nearest-correlation repair.
const EIGENVALUE_CLIP: f64 = 1.0e-12;

/// PSD acceptance tolerance on the minimum eigenvalue.
pub const PSD_TOLERANCE: f64 = 1.0e-10;

/// Outcome of validating (and possibly repairing) a correlation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationFactor {
    /// Lower-triangular `L` with `L L^T ~= C`.
    pub cholesky: Vec<Vec<f64>>,
    /// `true` when the input needed a nearest-correlation projection.
    pub repaired: bool,
    /// Minimum eigenvalue of the input matrix.
    pub min_eigenvalue: f64,
}

/// Validates that `corr` is a finite, symmetric `n x n` correlation matrix
/// with unit diagonal and entries in `[-1, 1]`.
pub fn validate_correlation_matrix(corr: &[Vec<f64>], n_assets: usize) -> Result<(), String> {
    if corr.len() != n_assets || corr.iter().any(|row| row.len() != n_assets) {
        return Err("correlation matrix dimensions must match asset count".to_string());
    }

    for (i, row_i) in corr.iter().enumerate() {
        let di = row_i[i];
        if !di.is_finite() || (di - 1.0).abs() > 1.0e-10 {
            return Err("correlation matrix diagonal must be 1".to_string());
        }
        for (j, rho) in row_i.iter().copied().enumerate() {
            if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
                return Err("correlation entries must be finite and in [-1, 1]".to_string());
            }
            if (rho - corr[j][i]).abs() > 1.0e-10 {
                return Err("correlation matrix must be symmetric".to_string());
            }
        }
    }

    Ok(())
}

/// Returns the minimum eigenvalue of a symmetric matrix.
pub fn min_eigenvalue_symmetric(matrix: &[Vec<f64>]) -> Option<f64> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return None;
    }

    let eig = SymmetricEigen::new(to_dmatrix(matrix));
    eig.eigenvalues.iter().copied().reduce(f64::min)
}

/// Projects to the nearest correlation matrix by eigenvalue clipping:
/// negative eigenvalues are raised to [`EIGENVALUE_CLIP`], the matrix is
/// reconstructed, and the result is rescaled to unit diagonal.
pub fn nearest_correlation_clip(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, String> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return Err("matrix must be square and non-empty".to_string());
    }

    let eig = SymmetricEigen::new(to_dmatrix(matrix));
    let clipped = eig
        .eigenvalues
        .iter()
        .map(|v| v.max(EIGENVALUE_CLIP))
        .collect::<Vec<_>>();
    let d = DMatrix::from_diagonal(&DVector::from_vec(clipped));
    let rebuilt = &eig.eigenvectors * d * eig.eigenvectors.transpose();

    // Rescale to unit diagonal: C_ij / sqrt(C_ii * C_jj).
    let scale = (0..n)
        .map(|i| rebuilt[(i, i)].max(EIGENVALUE_CLIP).sqrt())
        .collect::<Vec<_>>();

    let mut out = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        out[i][i] = 1.0;
        for j in (i + 1)..n {
            let rho = (rebuilt[(i, j)] / (scale[i] * scale[j])).clamp(-1.0, 1.0);
            out[i][j] = rho;
            out[j][i] = rho;
        }
    }

    Ok(out)
}

/// Validates a correlation matrix, repairs it if it is not PSD within
/// tolerance, and returns its cached Cholesky factor.
pub fn factor_correlation_matrix(
    corr: &[Vec<f64>],
    n_assets: usize,
) -> Result<CorrelationFactor, String> {
    validate_correlation_matrix(corr, n_assets)?;

    let min_eigenvalue = min_eigenvalue_symmetric(corr)
        .ok_or_else(|| "correlation matrix eigenvalues unavailable".to_string())?;

    let (working, repaired) = if min_eigenvalue >= -PSD_TOLERANCE {
        (corr.to_vec(), false)
    } else {
        let projected = nearest_correlation_clip(corr)?;
        validate_correlation_matrix(&projected, n_assets)?;
        let projected_min = min_eigenvalue_symmetric(&projected)
            .ok_or_else(|| "projected matrix eigenvalues unavailable".to_string())?;
        if projected_min < -PSD_TOLERANCE {
            return Err(
                "correlation matrix is not PSD beyond repair tolerance".to_string()
            );
        }
        (projected, true)
    };

    let cholesky = cholesky_lower_psd(&working, EIGENVALUE_CLIP)
        .ok_or_else(|| "correlation matrix could not be factorized".to_string())?;

    Ok(CorrelationFactor {
        cholesky,
        repaired,
        min_eigenvalue,
    })
}

/// Cholesky decomposition tolerant of semidefinite input.
///
/// Returns lower-triangular `L` such that `L L^T ~= matrix`.
pub fn cholesky_lower_psd(matrix: &[Vec<f64>], tol: f64) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return None;
    }

    let mut l = vec![vec![0.0_f64; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum < -tol {
                    return None;
                }
                l[i][j] = sum.max(tol).sqrt();
            } else if l[j][j] > tol {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    Some(l)
}

/// Applies a Cholesky factor to independent normals.
#[inline]
pub fn correlate_normals(chol: &[Vec<f64>], indep: &[f64], out: &mut [f64]) {
    for i in 0..chol.len() {
        let mut sum = 0.0;
        for (j, lij) in chol[i].iter().enumerate().take(i + 1) {
            sum += *lij * indep[j];
        }
        out[i] = sum;
    }
}

fn to_dmatrix(matrix: &[Vec<f64>]) -> DMatrix<f64> {
    let n = matrix.len();
    let data = matrix
        .iter()
        .flat_map(|row| row.iter().copied())
        .collect::<Vec<_>>();
    DMatrix::from_row_slice(n, n, &data)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn valid_psd_matrix_is_not_repaired() {
        let corr = vec![vec![1.0, 0.4], vec![0.4, 1.0]];
        let factor = factor_correlation_matrix(&corr, 2).expect("valid matrix");
        assert!(!factor.repaired);
        assert_relative_eq!(factor.cholesky[0][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(factor.cholesky[1][0], 0.4, epsilon = 1e-12);
        assert_relative_eq!(
            factor.cholesky[1][1],
            (1.0_f64 - 0.16).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn non_psd_matrix_is_repaired_with_flag() {
        let bad = vec![
            vec![1.0, 0.95, 0.95],
            vec![0.95, 1.0, -0.95],
            vec![0.95, -0.95, 1.0],
        ];
        assert!(validate_correlation_matrix(&bad, 3).is_ok());

        let factor = factor_correlation_matrix(&bad, 3).expect("repair should succeed");
        assert!(factor.repaired);
        assert!(factor.min_eigenvalue < 0.0);
        assert_eq!(factor.cholesky.len(), 3);
    }

    #[test]
    fn repaired_matrix_keeps_unit_diagonal_and_psd() {
        let bad = vec![
            vec![1.0, 0.9, -0.9],
            vec![0.9, 1.0, 0.9],
            vec![-0.9, 0.9, 1.0],
        ];
        let projected = nearest_correlation_clip(&bad).expect("projection");
        validate_correlation_matrix(&projected, 3).expect("projected matrix is valid");
        let min_ev = min_eigenvalue_symmetric(&projected).expect("eigenvalues");
        assert!(min_ev >= -PSD_TOLERANCE, "min eigenvalue {min_ev}");
    }

    #[test]
    fn asymmetric_matrix_is_rejected() {
        let corr = vec![vec![1.0, 0.3], vec![0.2, 1.0]];
        assert!(validate_correlation_matrix(&corr, 2).is_err());
    }

    #[test]
    fn correlate_normals_applies_lower_triangle() {
        let chol = vec![vec![1.0, 0.0], vec![0.5, 0.8]];
        let indep = [1.0, 2.0];
        let mut out = [0.0; 2];
        correlate_normals(&chol, &indep, &mut out);
        assert_relative_eq!(out[0], 1.0, epsilon = 1e-15);
        assert_relative_eq!(out[1], 0.5 + 1.6, epsilon = 1e-15);
    }
}
