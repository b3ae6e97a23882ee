mod dense;
mod sparse;

pub use sparse::LsDiisStep;

use crate::matrix::MatrixAlgebra;
use crate::scf::history::{HistoryBuffer, Overwrite};
use crate::scf::linalg::{diis_coefficients, DiisCoefficients};
use log::{debug, warn};
use ndarray::prelude::*;

/// Settings of one DIIS call.
#[derive(Debug, Clone, Copy)]
pub struct DiisStep {
    /// Convergence measure of the outer SCF loop, the absolute change of the
    /// total energy in the previous iteration.
    pub delta: f64,
    /// DIIS is only used if `delta` and the largest commutator element are below this value.
    pub eps_diis: f64,
    /// Number of calls before the first extrapolation.
    pub nmixing: usize,
}

/// Result of one DIIS call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiisOutcome {
    /// The Kohn-Sham matrices were replaced by the extrapolated ones.
    pub diis_step: bool,
    /// Largest absolute element of the commutator error over all spins.
    pub error_max: f64,
}

/// DIIS extrapolation of the Kohn-Sham matrices (one per spin) with a history of
/// `nbuffer` matrices and their commutator errors. Only the row and column of the
/// newest entry of the B matrix are computed in each call.
#[derive(Debug, Clone)]
pub struct DiisBuffer<M: MatrixAlgebra> {
    history: HistoryBuffer<Vec<M>>,
    /// B[i][j] = sum over spins of <e_i, e_j>, indexed by history slot
    b_matrix: Array2<f64>,
}

impl<M: MatrixAlgebra> DiisBuffer<M> {
    pub fn new(nbuffer: usize) -> Self {
        Self {
            history: HistoryBuffer::new(nbuffer),
            b_matrix: Array2::zeros([nbuffer, nbuffer]),
        }
    }

    pub fn call_count(&self) -> usize {
        self.history.call_count()
    }

    /// B matrix of the valid history entries.
    pub fn b_matrix(&self) -> ArrayView2<f64> {
        let nb: usize = self.history.active_count();
        self.b_matrix.slice(s![0..nb, 0..nb])
    }

    /// Resets the history, e.g. after the geometry changed. The storage is kept.
    pub fn clear(&mut self) {
        self.history.clear();
        self.b_matrix.fill(0.0);
    }

    /// Control flow that is shared by the dense and the block-sparse DIIS. `apply`
    /// decides if a possible extrapolation replaces the Kohn-Sham matrices.
    fn update(
        &mut self,
        ks: &mut [M],
        errors: Vec<M>,
        settings: &DiisStep,
        apply: bool,
    ) -> DiisOutcome {
        let error_max: f64 = errors
            .iter()
            .map(|error| error.max_abs())
            .fold(0.0, f64::max);

        if self.history.capacity() == 0 {
            return DiisOutcome {
                diis_step: false,
                error_max,
            };
        }

        let ib: usize = self.history.advance();
        self.history.store(ib, &ks.to_vec());
        self.history.store_error(ib, &errors);
        let nb: usize = self.history.active_count();

        let mut diis_step: bool =
            self.history.call_count() >= settings.nmixing && settings.delta < settings.eps_diis;

        if error_max < settings.eps_diis {
            for jb in 0..nb {
                let value: f64 = self
                    .history
                    .error(jb)
                    .iter()
                    .zip(self.history.error(ib).iter())
                    .map(|(e_j, e_i)| e_j.frobenius_dot(e_i))
                    .sum();
                self.b_matrix[[jb, ib]] = value;
                self.b_matrix[[ib, jb]] = value;
            }
        } else {
            diis_step = false;
        }
        debug!(
            "DIIS: call {} max. error {:.6e} step: {}",
            self.history.call_count(),
            error_max,
            diis_step
        );

        if diis_step && apply {
            match diis_coefficients(self.b_matrix.slice(s![0..nb, 0..nb])) {
                Ok(solution) => self.extrapolate(ks, &solution, nb),
                Err(err) => {
                    warn!("DIIS: solution of the DIIS equations failed: {}", err);
                    diis_step = false;
                }
            }
        }

        DiisOutcome {
            diis_step: diis_step && apply,
            error_max,
        }
    }

    /// K_new = sum_j c_j K_j over all valid history slots.
    fn extrapolate(&self, ks: &mut [M], solution: &DiisCoefficients, nb: usize) {
        debug!("DIIS coefficients: {}", solution.coeffs);
        for (spin, k) in ks.iter_mut().enumerate() {
            let mut new_k: M = k.zeros_like();
            for jb in 0..nb {
                new_k.axpy(solution.coeffs[jb], &self.history.slot(jb)[spin]);
            }
            k.overwrite(&new_k);
        }
    }
}
