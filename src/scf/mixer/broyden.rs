use crate::defaults;
use crate::scf::linalg::pseudo_inverse_svd;
use anyhow::Result;
use log::debug;
use ndarray::prelude::*;
use qsmix_parallel::ProcessGroup;

/// Modified Broyden mixing of the charges of the local atoms.
///
/// The algorithm is based on D. D. Johnson, Phys. Rev. B 38, 12807 (1988).
/// All inner products are summed over the process group, so every rank only
/// stores the components of its own atoms.
#[derive(Debug, Clone)]
pub struct BroydenStore {
    capacity: usize,
    // number of stored directions
    n_stored: usize,
    omega0: f64,
    // minimal weight allowed
    min_weight: f64,
    // maximal weight allowed
    max_weight: f64,
    // numerator of the weight
    weight_factor: f64,
    // relative threshold of the singular values of beta
    rskip: f64,
    weights: Array1<f64>,
    // storage for A matrix
    a_mat: Array2<f64>,
    // normalized differences of the charge differences, one per row
    df: Array2<f64>,
    // update directions, one per row
    uu: Array2<f64>,
}

impl BroydenStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            n_stored: 0,
            omega0: defaults::BROYDEN_OMEGA0,
            min_weight: defaults::BROYDEN_MIN_WEIGHT,
            max_weight: defaults::BROYDEN_MAX_WEIGHT,
            weight_factor: defaults::BROYDEN_WEIGHT_FACTOR,
            rskip: defaults::BROYDEN_RSKIP,
            weights: Array1::zeros([capacity]),
            a_mat: Array2::zeros([capacity, capacity]),
            df: Array2::zeros([capacity, 0]),
            uu: Array2::zeros([capacity, 0]),
        }
    }

    pub fn n_stored(&self) -> usize {
        self.n_stored
    }

    pub fn clear(&mut self) {
        self.n_stored = 0;
    }

    /// Computes the new input charges from the input charges `q` and the charge
    /// differences `dq` (output - input) of the current and the previous iteration.
    pub fn update<G: ProcessGroup + ?Sized>(
        &mut self,
        q: ArrayView1<f64>,
        dq: ArrayView1<f64>,
        q_old: ArrayView1<f64>,
        dq_old: ArrayView1<f64>,
        alpha: f64,
        group: &G,
    ) -> Result<Array1<f64>> {
        let dim: usize = q.len();
        if self.df.ncols() != dim {
            self.df = Array2::zeros([self.capacity, dim]);
            self.uu = Array2::zeros([self.capacity, dim]);
            self.n_stored = 0;
        }
        // the oldest direction is dropped if the store is full
        if self.n_stored == self.capacity {
            self.shift();
        }
        let idx: usize = self.n_stored;

        // Create the weight factor of the current iteration.
        let mut weight: f64 = group.sum_scalar(dq.dot(&dq)).sqrt();
        if weight > self.weight_factor / self.max_weight {
            weight = self.weight_factor / weight;
        } else {
            weight = self.max_weight;
        }
        if weight < self.min_weight {
            weight = self.min_weight;
        }

        // Build |DF(idx)> and normalize it.
        let mut df_idx: Array1<f64> = &dq - &dq_old;
        let norm: f64 = group.sum_scalar(df_idx.dot(&df_idx)).sqrt();
        if norm == 0.0 {
            debug!("Broyden: charge differences did not change, linear mixing is used");
            return Ok(&q + &(alpha * &dq));
        }
        let inv_norm: f64 = 1.0 / norm;
        df_idx *= inv_norm;

        // <df_i|df_idx>, <df_i|dq> and <df_idx|dq> in one reduction
        let mut dots: Vec<f64> = Vec::with_capacity(2 * idx + 1);
        for i in 0..idx {
            dots.push(self.df.row(i).dot(&df_idx));
        }
        for i in 0..idx {
            dots.push(self.df.row(i).dot(&dq));
        }
        dots.push(df_idx.dot(&dq));
        group.sum(&mut dots);

        let n: usize = idx + 1;
        let mut c: Array1<f64> = Array1::zeros([n]);
        for i in 0..idx {
            self.a_mat[[i, idx]] = dots[i];
            self.a_mat[[idx, i]] = dots[i];
            c[i] = self.weights[i] * dots[idx + i];
        }
        self.a_mat[[idx, idx]] = 1.0;
        self.weights[idx] = weight;
        c[idx] = weight * dots[2 * idx];

        let mut beta: Array2<f64> = Array2::zeros([n, n]);
        for i in 0..n {
            for j in 0..n {
                beta[[i, j]] = self.weights[i] * self.weights[j] * self.a_mat[[i, j]];
            }
            beta[[i, i]] += self.omega0.powi(2);
        }
        let beta_inv: Array2<f64> = pseudo_inverse_svd(beta.view(), self.rskip)?;
        let gamma: Array1<f64> = c.dot(&beta_inv);

        // Store |dF(idx)> and create |u(idx)>
        self.df.row_mut(idx).assign(&df_idx);
        let u_idx: Array1<f64> = alpha * &df_idx + &((&q - &q_old) * inv_norm);
        self.uu.row_mut(idx).assign(&u_idx);
        self.n_stored += 1;

        // Build new vector
        let mut q_new: Array1<f64> = &q + &(alpha * &dq);
        for i in 0..n {
            q_new.scaled_add(-self.weights[i] * gamma[i], &self.uu.row(i));
        }
        Ok(q_new)
    }

    /// Removes the oldest direction.
    fn shift(&mut self) {
        for i in 1..self.capacity {
            let df_i: Array1<f64> = self.df.row(i).to_owned();
            self.df.row_mut(i - 1).assign(&df_i);
            let uu_i: Array1<f64> = self.uu.row(i).to_owned();
            self.uu.row_mut(i - 1).assign(&uu_i);
            self.weights[i - 1] = self.weights[i];
            for j in 1..self.capacity {
                self.a_mat[[i - 1, j - 1]] = self.a_mat[[i, j]];
            }
        }
        self.n_stored -= 1;
    }
}
