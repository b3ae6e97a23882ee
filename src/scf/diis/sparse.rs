use crate::matrix::{BlockSparseMatrix, MatrixAlgebra};
use crate::scf::diis::{DiisBuffer, DiisOutcome, DiisStep};

/// Settings of one DIIS call of the linear scaling SCF.
#[derive(Debug, Clone, Copy)]
pub struct LsDiisStep {
    pub step: DiisStep,
    /// The extrapolated matrices are only used from this SCF iteration on.
    pub iter_ini_diis: usize,
    /// Threshold for the blocks of the matrix products.
    pub filter_eps: f64,
}

impl DiisBuffer<BlockSparseMatrix> {
    /// Block-sparse variant of [step](DiisBuffer::step). The history and the B matrix
    /// are updated in every call, the extrapolation is only applied once
    /// `iter_count >= iter_ini_diis`.
    pub fn step_ls(
        &mut self,
        ks: &mut [BlockSparseMatrix],
        density: &[BlockSparseMatrix],
        overlap: Option<&BlockSparseMatrix>,
        iter_count: usize,
        settings: &LsDiisStep,
    ) -> DiisOutcome {
        let errors: Vec<BlockSparseMatrix> = ks
            .iter()
            .zip(density.iter())
            .map(|(k, p)| sparse_commutator_error(k, p, overlap, settings.filter_eps))
            .collect();
        let apply: bool = iter_count >= settings.iter_ini_diis;
        self.update(ks, errors, &settings.step, apply)
    }
}

fn sparse_commutator_error(
    k: &BlockSparseMatrix,
    p: &BlockSparseMatrix,
    s: Option<&BlockSparseMatrix>,
    filter_eps: f64,
) -> BlockSparseMatrix {
    let (mut error, spk): (BlockSparseMatrix, BlockSparseMatrix) = match s {
        Some(s) => {
            let kp: BlockSparseMatrix = BlockSparseMatrix::multiply(k, p, filter_eps);
            let sp: BlockSparseMatrix = BlockSparseMatrix::multiply(s, p, filter_eps);
            (
                BlockSparseMatrix::multiply(&kp, s, filter_eps),
                BlockSparseMatrix::multiply(&sp, k, filter_eps),
            )
        }
        None => (
            BlockSparseMatrix::multiply(k, p, filter_eps),
            BlockSparseMatrix::multiply(p, k, filter_eps),
        ),
    };
    error.axpy(-1.0, &spk);
    error.filter(filter_eps);
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::random_symmetric;
    use approx::assert_abs_diff_eq;
    use ndarray::prelude::*;

    fn settings(iter_ini_diis: usize) -> LsDiisStep {
        LsDiisStep {
            step: DiisStep {
                delta: 0.0,
                eps_diis: 0.1,
                nmixing: 2,
            },
            iter_ini_diis,
            filter_eps: 0.0,
        }
    }

    fn inputs(call: u64) -> (Array2<f64>, Array2<f64>) {
        let ks: Array2<f64> = random_symmetric(6, call);
        let density: Array2<f64> = 0.002 * random_symmetric(6, 100 + call);
        (ks, density)
    }

    #[test]
    fn sparse_and_dense_diis_agree() {
        let blk_sizes: [usize; 3] = [2, 2, 2];
        let overlap: Array2<f64> = Array2::eye(6) + 0.02 * random_symmetric(6, 7);
        let sparse_overlap = BlockSparseMatrix::from_dense(overlap.view(), &blk_sizes, 0.0);
        let mut dense_diis: DiisBuffer<Array2<f64>> = DiisBuffer::new(3);
        let mut sparse_diis: DiisBuffer<BlockSparseMatrix> = DiisBuffer::new(3);

        for call in 0..5 {
            let (ks, density) = inputs(call);
            let mut dense_ks: Vec<Array2<f64>> = vec![ks.clone()];
            let mut sparse_ks: Vec<BlockSparseMatrix> =
                vec![BlockSparseMatrix::from_dense(ks.view(), &blk_sizes, 0.0)];
            let sparse_density: Vec<BlockSparseMatrix> =
                vec![BlockSparseMatrix::from_dense(density.view(), &blk_sizes, 0.0)];

            let dense = dense_diis.step(&mut dense_ks, &[density], Some(&overlap), &settings(0).step);
            let sparse = sparse_diis.step_ls(
                &mut sparse_ks,
                &sparse_density,
                Some(&sparse_overlap),
                call as usize + 1,
                &settings(0),
            );

            assert_eq!(dense.diis_step, sparse.diis_step);
            assert_abs_diff_eq!(dense.error_max, sparse.error_max, epsilon = 1e-12);
            assert_abs_diff_eq!(sparse_ks[0].to_dense(), dense_ks[0], epsilon = 1e-10);
        }
    }

    #[test]
    fn extrapolation_waits_for_iter_ini_diis() {
        let blk_sizes: [usize; 2] = [3, 3];
        let mut diis: DiisBuffer<BlockSparseMatrix> = DiisBuffer::new(4);
        for iter_count in 1..=4 {
            let (ks, density) = inputs(iter_count as u64);
            let original = BlockSparseMatrix::from_dense(ks.view(), &blk_sizes, 0.0);
            let mut sparse_ks: Vec<BlockSparseMatrix> = vec![original.clone()];
            let sparse_density: Vec<BlockSparseMatrix> =
                vec![BlockSparseMatrix::from_dense(density.view(), &blk_sizes, 0.0)];
            let outcome = diis.step_ls(&mut sparse_ks, &sparse_density, None, iter_count, &settings(4));

            assert_eq!(outcome.diis_step, iter_count >= 4);
            if iter_count < 4 {
                assert_eq!(sparse_ks[0], original);
            }
            assert_eq!(diis.b_matrix().nrows(), iter_count);
        }
    }
}
