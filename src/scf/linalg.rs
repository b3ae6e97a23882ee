use crate::defaults::DIIS_EIGENVALUE_THRESHOLD;
use log::warn;
use ndarray::prelude::*;
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Eigh, SVD, UPLO};

/// Solution of the DIIS equations.
#[derive(Debug, Clone)]
pub struct DiisCoefficients {
    /// Expansion coefficients of the new matrix in terms of the stored ones, they sum up to one.
    pub coeffs: Array1<f64>,
    /// Index and value of every eigenvalue that was discarded.
    pub discarded: Vec<(usize, f64)>,
}

/// Solves the bordered DIIS system
///
///  | B   -1 | | c |   |  0 |
///  | -1   0 | | l | = | -1 |
///
/// through the eigendecomposition of the bordered matrix. Eigenvectors with an
/// eigenvalue smaller than [DIIS_EIGENVALUE_THRESHOLD] in absolute value do not
/// enter the pseudo-inverse.
pub fn diis_coefficients(b: ArrayView2<f64>) -> Result<DiisCoefficients, LinalgError> {
    let nb: usize = b.nrows();
    let mut bordered: Array2<f64> = Array2::from_elem([nb + 1, nb + 1], -1.0);
    bordered.slice_mut(s![0..nb, 0..nb]).assign(&b);
    bordered[[nb, nb]] = 0.0;

    let (eigenvalues, eigenvectors): (Array1<f64>, Array2<f64>) = bordered.eigh(UPLO::Upper)?;

    let mut scaled: Array2<f64> = eigenvectors.clone();
    let mut discarded: Vec<(usize, f64)> = Vec::new();
    for (j, ev) in eigenvalues.iter().enumerate() {
        if ev.abs() < DIIS_EIGENVALUE_THRESHOLD {
            warn!(
                "DIIS: eigenvalue {} of the DIIS matrix is {:.6e} and below the threshold {:.1e}, the eigenvector is discarded",
                j + 1,
                ev,
                DIIS_EIGENVALUE_THRESHOLD
            );
            scaled.column_mut(j).fill(0.0);
            discarded.push((j, *ev));
        } else {
            scaled.column_mut(j).mapv_inplace(|x| x / ev);
        }
    }
    // pseudo-inverse U diag(1/ev) U^T, only its last column is needed
    let last_column: Array1<f64> = scaled.dot(&eigenvectors.row(nb));
    let coeffs: Array1<f64> = -&last_column.slice(s![0..nb]);

    Ok(DiisCoefficients { coeffs, discarded })
}

/// Moore-Penrose pseudo-inverse from a truncated singular value decomposition.
/// Singular values below `rskip` times the largest one are treated as zero.
pub fn pseudo_inverse_svd(a: ArrayView2<f64>, rskip: f64) -> Result<Array2<f64>, LinalgError> {
    let (u, sigma, vt) = a.svd(true, true)?;
    let u: Array2<f64> = u.ok_or(LinalgError::MemoryNotCont)?;
    let vt: Array2<f64> = vt.ok_or(LinalgError::MemoryNotCont)?;

    let sigma_max: f64 = sigma.iter().cloned().fold(0.0, f64::max);
    let mut inverse: Array2<f64> = Array2::zeros([a.ncols(), a.nrows()]);
    for (k, s) in sigma.iter().enumerate() {
        if *s > rskip * sigma_max {
            let v_k: ArrayView1<f64> = vt.row(k);
            let u_k: ArrayView1<f64> = u.column(k);
            for i in 0..a.ncols() {
                for j in 0..a.nrows() {
                    inverse[[i, j]] += v_k[i] * u_k[j] / s;
                }
            }
        }
    }
    Ok(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::{random_matrix, random_symmetric};
    use approx::assert_abs_diff_eq;
    use ndarray_linalg::Inverse;

    #[test]
    fn coefficients_sum_to_one_and_solve_the_system() {
        let e: Array2<f64> = random_matrix([3, 5], 5);
        let b: Array2<f64> = e.dot(&e.t());
        let result = diis_coefficients(b.view()).unwrap();

        assert!(result.discarded.is_empty());
        assert_abs_diff_eq!(result.coeffs.sum(), 1.0, epsilon = 1e-10);
        // B c = -lambda (1, 1, 1)
        let bc: Array1<f64> = b.dot(&result.coeffs);
        assert_abs_diff_eq!(bc[0], bc[1], epsilon = 1e-10);
        assert_abs_diff_eq!(bc[0], bc[2], epsilon = 1e-10);
    }

    #[test]
    fn duplicated_error_vector_discards_one_eigenvector() {
        // errors e1 = e2 = (1, 0) and e3 = (0, 1)
        let b: Array2<f64> = array![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let result = diis_coefficients(b.view()).unwrap();

        assert_eq!(result.discarded.len(), 1);
        assert!(result.coeffs.iter().all(|c| c.is_finite()));
        assert_abs_diff_eq!(result.coeffs, array![0.25, 0.25, 0.5], epsilon = 1e-10);
    }

    #[test]
    fn single_vector_gives_unit_coefficient() {
        let result = diis_coefficients(array![[0.3]].view()).unwrap();
        assert_abs_diff_eq!(result.coeffs, array![1.0], epsilon = 1e-12);
    }

    #[test]
    fn empty_history_gives_no_coefficients() {
        let b: Array2<f64> = Array2::zeros([0, 0]);
        let result = diis_coefficients(b.view()).unwrap();
        assert_eq!(result.coeffs.len(), 0);
        assert_eq!(result.discarded.len(), 1);
    }

    #[test]
    fn tiny_error_norm_is_not_discarded() {
        // the bordered matrix [[1e-14, -1], [-1, 0]] has eigenvalues close to +-1
        let result = diis_coefficients(array![[1.0e-14]].view()).unwrap();
        assert!(result.discarded.is_empty());
        assert_abs_diff_eq!(result.coeffs, array![1.0], epsilon = 1e-12);
    }

    #[test]
    fn pseudo_inverse_of_regular_matrix_is_the_inverse() {
        let a: Array2<f64> = random_symmetric(4, 9) + 4.0 * Array2::<f64>::eye(4);
        let pinv: Array2<f64> = pseudo_inverse_svd(a.view(), 1e-12).unwrap();
        assert_abs_diff_eq!(pinv, a.inv().unwrap(), epsilon = 1e-10);
    }

    #[test]
    fn pseudo_inverse_skips_small_singular_values() {
        let a: Array2<f64> = array![[2.0, 0.0], [0.0, 1.0e-14]];
        let pinv: Array2<f64> = pseudo_inverse_svd(a.view(), 1e-12).unwrap();
        assert_abs_diff_eq!(pinv, array![[0.5, 0.0], [0.0, 0.0]], epsilon = 1e-14);
    }
}
