mod block_sparse;

pub use block_sparse::BlockSparseMatrix;

use crate::scf::history::Overwrite;
use ndarray::prelude::*;

/// Matrix operations that are needed by the DIIS extrapolation.
pub trait MatrixAlgebra: Overwrite {
    /// Matrix of the same shape (and block structure) with all elements zero.
    fn zeros_like(&self) -> Self;

    /// self += alpha * other
    fn axpy(&mut self, alpha: f64, other: &Self);

    /// Frobenius inner product, trace(A^T B).
    fn frobenius_dot(&self, other: &Self) -> f64;

    /// Largest absolute value of all elements.
    fn max_abs(&self) -> f64;
}

impl MatrixAlgebra for Array2<f64> {
    fn zeros_like(&self) -> Self {
        Array2::zeros(self.raw_dim())
    }

    fn axpy(&mut self, alpha: f64, other: &Self) {
        self.scaled_add(alpha, other);
    }

    fn frobenius_dot(&self, other: &Self) -> f64 {
        self.iter().zip(other.iter()).map(|(a, b)| a * b).sum()
    }

    fn max_abs(&self) -> f64 {
        self.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dense_frobenius_dot_is_trace_of_product() {
        let a: Array2<f64> = array![[1.0, 2.0], [3.0, 4.0]];
        let b: Array2<f64> = array![[0.5, -1.0], [2.0, 0.0]];
        let trace: f64 = a.t().dot(&b).diag().sum();
        assert_abs_diff_eq!(a.frobenius_dot(&b), trace, epsilon = 1e-14);
    }

    #[test]
    fn dense_axpy_and_max_abs() {
        let mut a: Array2<f64> = -Array2::<f64>::eye(2);
        a.axpy(-2.0, &array![[0.0, 1.0], [1.0, 0.0]]);
        assert_eq!(a, array![[-1.0, -2.0], [-2.0, -1.0]]);
        assert_eq!(a.max_abs(), 2.0);
        assert_eq!(a.zeros_like(), Array2::<f64>::zeros([2, 2]));
    }
}
