use crate::matrix::MatrixAlgebra;
use crate::scf::history::Overwrite;
use hashbrown::HashMap;
use ndarray::prelude::*;

/// Square matrix that is stored as a set of dense blocks. Blocks that are
/// not present are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSparseMatrix {
    blk_sizes: Vec<usize>,
    blk_offsets: Vec<usize>,
    blocks: HashMap<(usize, usize), Array2<f64>>,
}

impl BlockSparseMatrix {
    /// Empty (zero) matrix with the given block sizes for rows and columns.
    pub fn new(blk_sizes: &[usize]) -> Self {
        let mut blk_offsets: Vec<usize> = Vec::with_capacity(blk_sizes.len() + 1);
        blk_offsets.push(0);
        for size in blk_sizes.iter() {
            blk_offsets.push(blk_offsets[blk_offsets.len() - 1] + size);
        }
        Self {
            blk_sizes: blk_sizes.to_vec(),
            blk_offsets,
            blocks: HashMap::new(),
        }
    }

    /// Splits a dense matrix into blocks. Blocks with a Frobenius norm below `eps` are not stored.
    pub fn from_dense(dense: ArrayView2<f64>, blk_sizes: &[usize], eps: f64) -> Self {
        let mut matrix: Self = Self::new(blk_sizes);
        for row in 0..blk_sizes.len() {
            for col in 0..blk_sizes.len() {
                let block: Array2<f64> = dense
                    .slice(s![matrix.block_range(row), matrix.block_range(col)])
                    .to_owned();
                if frobenius_norm(&block) >= eps && block.iter().any(|x| *x != 0.0) {
                    matrix.blocks.insert((row, col), block);
                }
            }
        }
        matrix
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let dim: usize = self.dim();
        let mut dense: Array2<f64> = Array2::zeros([dim, dim]);
        for ((row, col), block) in self.blocks.iter() {
            dense
                .slice_mut(s![self.block_range(*row), self.block_range(*col)])
                .assign(block);
        }
        dense
    }

    pub fn dim(&self) -> usize {
        self.blk_offsets[self.blk_offsets.len() - 1]
    }

    pub fn blk_sizes(&self) -> &[usize] {
        &self.blk_sizes
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, row: usize, col: usize) -> Option<&Array2<f64>> {
        self.blocks.get(&(row, col))
    }

    /// Removes all blocks with a Frobenius norm below `eps`.
    pub fn filter(&mut self, eps: f64) {
        self.blocks.retain(|_, block| frobenius_norm(block) >= eps);
    }

    /// Block-wise product `a b`. Blocks of the result with a norm below `filter_eps` are dropped.
    pub fn multiply(a: &Self, b: &Self, filter_eps: f64) -> Self {
        debug_assert_eq!(a.blk_sizes, b.blk_sizes);
        // blocks of b grouped by their block row
        let mut b_rows: HashMap<usize, Vec<(usize, &Array2<f64>)>> = HashMap::new();
        for ((k, j), block) in b.blocks.iter() {
            b_rows.entry(*k).or_insert_with(Vec::new).push((*j, block));
        }

        let mut product: Self = Self::new(&a.blk_sizes);
        for ((i, k), a_block) in a.blocks.iter() {
            if let Some(row) = b_rows.get(k) {
                for (j, b_block) in row.iter() {
                    let contribution: Array2<f64> = a_block.dot(*b_block);
                    match product.blocks.get_mut(&(*i, *j)) {
                        Some(block) => *block += &contribution,
                        None => {
                            product.blocks.insert((*i, *j), contribution);
                        }
                    }
                }
            }
        }
        product.filter(filter_eps);
        product
    }

    fn block_range(&self, blk: usize) -> std::ops::Range<usize> {
        self.blk_offsets[blk]..self.blk_offsets[blk + 1]
    }
}

fn frobenius_norm(block: &Array2<f64>) -> f64 {
    block.iter().map(|x| x * x).sum::<f64>().sqrt()
}

impl Overwrite for BlockSparseMatrix {
    fn overwrite(&mut self, other: &Self) {
        if self.blk_sizes != other.blk_sizes {
            *self = other.clone();
            return;
        }
        self.blocks.retain(|key, _| other.blocks.contains_key(key));
        for (key, block) in other.blocks.iter() {
            match self.blocks.get_mut(key) {
                Some(old) => old.assign(block),
                None => {
                    self.blocks.insert(*key, block.clone());
                }
            }
        }
    }
}

impl MatrixAlgebra for BlockSparseMatrix {
    fn zeros_like(&self) -> Self {
        Self::new(&self.blk_sizes)
    }

    fn axpy(&mut self, alpha: f64, other: &Self) {
        for (key, block) in other.blocks.iter() {
            match self.blocks.get_mut(key) {
                Some(old) => old.scaled_add(alpha, block),
                None => {
                    self.blocks.insert(*key, alpha * block);
                }
            }
        }
    }

    fn frobenius_dot(&self, other: &Self) -> f64 {
        self.blocks
            .iter()
            .filter_map(|(key, block)| {
                other
                    .blocks
                    .get(key)
                    .map(|other_block| (block * other_block).sum())
            })
            .sum()
    }

    fn max_abs(&self) -> f64 {
        self.blocks
            .values()
            .flat_map(|block| block.iter())
            .fold(0.0, |acc: f64, x| acc.max(x.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::random_symmetric;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dense_round_trip_drops_zero_blocks() {
        let mut dense: Array2<f64> = Array2::zeros([5, 5]);
        dense.slice_mut(s![0..2, 0..2]).assign(&array![[1.0, 0.5], [0.5, 2.0]]);
        dense[[4, 4]] = 3.0;
        let matrix = BlockSparseMatrix::from_dense(dense.view(), &[2, 2, 1], 0.0);
        assert_eq!(matrix.n_blocks(), 2);
        assert!(matrix.block(0, 1).is_none());
        assert_eq!(matrix.to_dense(), dense);
    }

    #[test]
    fn product_agrees_with_dense_product() {
        let a: Array2<f64> = random_symmetric(7, 11);
        let b: Array2<f64> = random_symmetric(7, 12);
        let blk_sizes: [usize; 3] = [3, 2, 2];
        let product = BlockSparseMatrix::multiply(
            &BlockSparseMatrix::from_dense(a.view(), &blk_sizes, 0.0),
            &BlockSparseMatrix::from_dense(b.view(), &blk_sizes, 0.0),
            0.0,
        );
        assert_abs_diff_eq!(product.to_dense(), a.dot(&b), epsilon = 1e-12);
    }

    #[test]
    fn algebra_matches_dense_algebra() {
        let a: Array2<f64> = random_symmetric(6, 3);
        let b: Array2<f64> = random_symmetric(6, 4);
        let blk_sizes: [usize; 3] = [2, 2, 2];
        let mut sparse_a = BlockSparseMatrix::from_dense(a.view(), &blk_sizes, 0.0);
        let sparse_b = BlockSparseMatrix::from_dense(b.view(), &blk_sizes, 0.0);

        assert_abs_diff_eq!(
            sparse_a.frobenius_dot(&sparse_b),
            a.frobenius_dot(&b),
            epsilon = 1e-12
        );
        sparse_a.axpy(-0.5, &sparse_b);
        let expected: Array2<f64> = &a - &(0.5 * &b);
        assert_abs_diff_eq!(sparse_a.to_dense(), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(sparse_a.max_abs(), expected.max_abs(), epsilon = 1e-12);
    }

    #[test]
    fn overwrite_removes_missing_blocks() {
        let mut a = BlockSparseMatrix::from_dense(Array2::eye(4).view(), &[2, 2], 0.0);
        let mut upper: Array2<f64> = Array2::zeros([4, 4]);
        upper.slice_mut(s![0..2, 2..4]).fill(1.0);
        let b = BlockSparseMatrix::from_dense(upper.view(), &[2, 2], 0.0);
        a.overwrite(&b);
        assert_eq!(a, b);
        assert_eq!(a.n_blocks(), 1);
    }
}
