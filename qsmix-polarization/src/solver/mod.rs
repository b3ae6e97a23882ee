mod conjugate_gradient;
mod self_consistent;

use crate::initialization::{InducedMultipoleState, PolarizationAlgorithm, PolarizationConfig};
use crate::interface::FieldEvaluator;
use crate::output::{print_dipoles, print_pol_end, print_pol_init};
use ndarray::prelude::*;
use qsmix_parallel::{atom_partition, ProcessGroup};
use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PolarizationError {
    /// The conjugate gradient solver only treats induced dipoles.
    QuadrupolesNotSupported,
    /// The explicitly recomputed residual of the conjugate gradient solver is
    /// larger than the convergence threshold.
    InconsistentResidual { rmsd: f64, eps_pol: f64 },
    /// The field evaluator was built for a different number of atoms than the
    /// induced multipoles.
    SizeMismatch { state: usize, evaluator: usize },
}

impl fmt::Display for PolarizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolarizationError::QuadrupolesNotSupported => write!(
                f,
                "Induced quadrupoles are not available with the conjugate gradient \
                 polarization solver, use the sc algorithm"
            ),
            PolarizationError::InconsistentResidual { rmsd, eps_pol } => write!(
                f,
                "Error in the conjugate gradient polarization solver: the explicit \
                 residual {:.6e} exceeds the threshold {:.6e}",
                rmsd, eps_pol
            ),
            PolarizationError::SizeMismatch { state, evaluator } => write!(
                f,
                "The induced multipoles of {} atoms do not match the field evaluator of {} atoms",
                state, evaluator
            ),
        }
    }
}

impl error::Error for PolarizationError {}

/// Outcome of one polarization solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarizationResult {
    pub converged: bool,
    pub rmsd: f64,
    pub iterations: usize,
    /// Energy needed to create the induced multipoles.
    pub e_induction: f64,
    /// Electrostatic energy of the final evaluation with the converged multipoles.
    pub energy: f64,
}

/// Solver for the induced dipoles and quadrupoles that are consistent with
/// the field they generate.
#[derive(Debug, Clone)]
pub struct PolarizationSolver {
    pub algorithm: PolarizationAlgorithm,
    pub max_ipol_iter: usize,
    pub eps_pol: f64,
    /// Recompute the residual explicitly in every conjugate gradient step and
    /// fail if the final explicit residual is not converged.
    pub debug: bool,
}

impl From<&PolarizationConfig> for PolarizationSolver {
    fn from(config: &PolarizationConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            max_ipol_iter: config.max_ipol_iter,
            eps_pol: config.eps_pol,
            debug: config.debug,
        }
    }
}

impl PolarizationSolver {
    pub fn new(algorithm: PolarizationAlgorithm, max_ipol_iter: usize, eps_pol: f64) -> Self {
        Self {
            algorithm,
            max_ipol_iter,
            eps_pol,
            debug: false,
        }
    }

    /// Converges the induced multipoles in `state`, starting from the multipoles
    /// that are stored there. The state and the fields are replicated on all ranks
    /// of `group`, the sums over the atoms are split between the ranks.
    pub fn solve<E: FieldEvaluator, G: ProcessGroup + ?Sized>(
        &self,
        state: &mut InducedMultipoleState,
        evaluator: &mut E,
        group: &G,
    ) -> Result<PolarizationResult, PolarizationError> {
        if evaluator.n_atoms() != state.n_atoms() {
            return Err(PolarizationError::SizeMismatch {
                state: state.n_atoms(),
                evaluator: evaluator.n_atoms(),
            });
        }
        let name: &str = match self.algorithm {
            PolarizationAlgorithm::SelfConsistent => "self-consistent",
            PolarizationAlgorithm::ConjugateGradient => "conjugate gradient",
        };
        if self.algorithm == PolarizationAlgorithm::ConjugateGradient && state.has_quadrupoles() {
            return Err(PolarizationError::QuadrupolesNotSupported);
        }
        let local_atoms: Vec<usize> = atom_partition(state.n_atoms(), group);
        let n_dof: usize = group.sum_scalar(state.n_active_dof(&local_atoms) as f64) as usize;
        let print: bool = group.rank() == 0;
        if print {
            print_pol_init(name, self.max_ipol_iter, self.eps_pol, n_dof);
        }

        let (converged, iterations, rmsd) = match self.algorithm {
            PolarizationAlgorithm::SelfConsistent => {
                self.solve_sc(state, evaluator, &local_atoms, n_dof, group)
            }
            PolarizationAlgorithm::ConjugateGradient => {
                self.solve_cg(state, evaluator, &local_atoms, n_dof, group)?
            }
        };
        // The final evaluation uses the last (possibly unconverged) multipoles.
        let evaluation = evaluator.evaluate(state.dipoles.view(), state.quadrupoles.view());
        let e_induction: f64 = group.sum_scalar(state.induction_energy(&local_atoms));
        if print {
            print_pol_end(converged, iterations, rmsd, self.eps_pol);
            print_dipoles(state.dipoles.view());
        }

        Ok(PolarizationResult {
            converged,
            rmsd,
            iterations,
            e_induction,
            energy: evaluation.energy,
        })
    }
}

/// rms deviation of the residuals of all induced degrees of freedom.
pub(crate) fn rms_deviation(sum_of_squares: f64, n_dof: usize) -> f64 {
    if n_dof == 0 {
        0.0
    } else {
        (sum_of_squares / n_dof as f64).sqrt()
    }
}

/// Sum of the row-wise products of `a` and `b` over all atoms. Every rank adds
/// the rows of its own atoms.
pub(crate) fn group_dot<G: ProcessGroup + ?Sized>(
    a: &Array2<f64>,
    b: &Array2<f64>,
    local_atoms: &[usize],
    group: &G,
) -> f64 {
    let local: f64 = local_atoms
        .iter()
        .map(|atom| a.row(*atom).dot(&b.row(*atom)))
        .sum();
    group.sum_scalar(local)
}

/// Dipole and quadrupole components of one atom.
const MULTIPOLE_COMPONENTS: usize = 12;

/// Gathers the multipoles that were updated by the owning ranks, so that every
/// rank holds the multipoles of all atoms.
pub(crate) fn replicate_multipoles<G: ProcessGroup + ?Sized>(
    state: &mut InducedMultipoleState,
    local_atoms: &[usize],
    group: &G,
) {
    if group.size() == 1 {
        return;
    }
    let mut buffer: Vec<f64> = vec![0.0; MULTIPOLE_COMPONENTS * state.n_atoms()];
    for atom in local_atoms.iter() {
        let chunk: &mut [f64] =
            &mut buffer[MULTIPOLE_COMPONENTS * atom..MULTIPOLE_COMPONENTS * (atom + 1)];
        let values = state
            .dipoles
            .row(*atom)
            .into_iter()
            .chain(state.quadrupoles.slice(s![*atom, .., ..]).into_iter());
        for (target, value) in chunk.iter_mut().zip(values) {
            *target = *value;
        }
    }
    group.sum(&mut buffer);
    for (atom, chunk) in buffer.chunks(MULTIPOLE_COMPONENTS).enumerate() {
        let targets = state
            .dipoles
            .row_mut(atom)
            .into_iter()
            .chain(state.quadrupoles.slice_mut(s![atom, .., ..]).into_iter());
        for (target, value) in targets.zip(chunk.iter()) {
            *target = *value;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_fields {
    use crate::interface::{FieldEvaluation, FieldEvaluator};
    use ndarray::prelude::*;

    /// Field that is linear in the induced dipoles, E = E_ext + T mu.
    pub(crate) struct LinearField {
        pub external: Array2<f64>,
        pub external_gradient: Array3<f64>,
        pub coupling: Array2<f64>,
        pub calls: usize,
    }

    impl LinearField {
        pub(crate) fn new(external: Array2<f64>, coupling: Array2<f64>) -> Self {
            let n_atoms: usize = external.nrows();
            Self {
                external,
                external_gradient: Array3::zeros([n_atoms, 3, 3]),
                coupling,
                calls: 0,
            }
        }

        /// Two atoms on the z axis at a distance `r` coupled by the dipole tensor.
        pub(crate) fn dimer(external: Array2<f64>, r: f64) -> Self {
            let mut coupling: Array2<f64> = Array2::zeros([6, 6]);
            let t: Array2<f64> = Array2::from_diag(&array![-1.0, -1.0, 2.0]) / r.powi(3);
            coupling.slice_mut(s![0..3, 3..6]).assign(&t);
            coupling.slice_mut(s![3..6, 0..3]).assign(&t);
            Self::new(external, coupling)
        }
    }

    impl FieldEvaluator for LinearField {
        fn n_atoms(&self) -> usize {
            self.external.nrows()
        }

        fn evaluate(
            &mut self,
            dipoles: ArrayView2<f64>,
            _quadrupoles: ArrayView3<f64>,
        ) -> FieldEvaluation {
            self.calls += 1;
            let n_atoms: usize = self.external.nrows();
            let flat: Array1<f64> = dipoles.iter().cloned().collect();
            let induced: Array2<f64> = self
                .coupling
                .dot(&flat)
                .into_shape([n_atoms, 3])
                .unwrap();
            let efield1: Array2<f64> = &self.external + &induced;
            let energy: f64 = -0.5 * (&dipoles * &(&efield1 + &self.external)).sum();
            FieldEvaluation {
                energy,
                efield1,
                efield2: self.external_gradient.clone(),
            }
        }
    }
}
