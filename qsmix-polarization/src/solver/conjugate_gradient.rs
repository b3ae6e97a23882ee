use crate::initialization::InducedMultipoleState;
use crate::interface::FieldEvaluator;
use crate::output::print_pol_iteration;
use crate::solver::{group_dot, rms_deviation, PolarizationError, PolarizationSolver};
use log::{debug, log_enabled, Level};
use ndarray::prelude::*;
use qsmix_parallel::ProcessGroup;

impl PolarizationSolver {
    /// Solves the linear system `mu / apol - T mu = E_ext` for the induced
    /// dipoles with conjugate gradients. Only atoms with a dipole polarizability
    /// take part, all other residual components stay zero. The vectors are
    /// replicated, only the inner products are split between the ranks.
    pub(crate) fn solve_cg<E: FieldEvaluator, G: ProcessGroup + ?Sized>(
        &self,
        state: &mut InducedMultipoleState,
        evaluator: &mut E,
        local_atoms: &[usize],
        n_dof: usize,
        group: &G,
    ) -> Result<(bool, usize, f64), PolarizationError> {
        let n_atoms: usize = state.n_atoms();
        let inv_apol: Array1<f64> = inverse_polarizabilities(state);
        let zero_quadrupoles: Array3<f64> = Array3::zeros([n_atoms, 3, 3]);

        // field of the permanent charges alone
        let external: Array2<f64> = evaluator
            .evaluate(Array2::zeros([n_atoms, 3]).view(), zero_quadrupoles.view())
            .efield1;

        let mut residual: Array2<f64> =
            explicit_residual(state.dipoles.view(), &inv_apol, evaluator, &zero_quadrupoles);
        let mut direction: Array2<f64> = residual.clone();
        let mut rr: f64 = group_dot(&residual, &residual, local_atoms, group);
        let mut rmsd: f64 = rms_deviation(rr, n_dof);

        if rmsd <= self.eps_pol {
            return Ok((true, 0, rmsd));
        }

        let mut converged: bool = false;
        let mut iterations: usize = 0;
        for iter in 1..=self.max_ipol_iter {
            iterations = iter;

            // A c = c / apol - (E(c) - E_ext)
            let induced: Array2<f64> = evaluator
                .evaluate(direction.view(), zero_quadrupoles.view())
                .efield1
                - &external;
            let mut a_direction: Array2<f64> = Array2::zeros([n_atoms, 3]);
            for atom in 0..n_atoms {
                if inv_apol[atom] != 0.0 {
                    let row: Array1<f64> =
                        &direction.row(atom) * inv_apol[atom] - &induced.row(atom);
                    a_direction.row_mut(atom).assign(&row);
                }
            }

            let alpha: f64 = rr / group_dot(&direction, &a_direction, local_atoms, group);
            state.dipoles.scaled_add(alpha, &direction);
            residual.scaled_add(-alpha, &a_direction);

            let rr_new: f64 = group_dot(&residual, &residual, local_atoms, group);
            rmsd = rms_deviation(rr_new, n_dof);

            if self.debug {
                let explicit: Array2<f64> = explicit_residual(
                    state.dipoles.view(),
                    &inv_apol,
                    evaluator,
                    &zero_quadrupoles,
                );
                let deviation: f64 = (&explicit - &residual)
                    .iter()
                    .fold(0.0, |acc: f64, x| acc.max(x.abs()));
                debug!(
                    "cg iteration {: >4}: max. deviation of the recursive residual {:.6e}",
                    iter, deviation
                );
            }
            if log_enabled!(Level::Info) {
                let e_induction: f64 = group.sum_scalar(state.induction_energy(local_atoms));
                if group.rank() == 0 {
                    print_pol_iteration(iter, rmsd, e_induction, None);
                }
            }
            if rmsd <= self.eps_pol {
                converged = true;
                break;
            }

            let beta: f64 = rr_new / rr;
            rr = rr_new;
            direction = &residual + &(beta * &direction);
        }

        if self.debug {
            let explicit: Array2<f64> =
                explicit_residual(state.dipoles.view(), &inv_apol, evaluator, &zero_quadrupoles);
            let explicit_rmsd: f64 =
                rms_deviation(group_dot(&explicit, &explicit, local_atoms, group), n_dof);
            debug!("explicit rmsd of the final dipoles {:.6e}", explicit_rmsd);
            if explicit_rmsd > self.eps_pol {
                return Err(PolarizationError::InconsistentResidual {
                    rmsd: explicit_rmsd,
                    eps_pol: self.eps_pol,
                });
            }
        }
        Ok((converged, iterations, rmsd))
    }
}

/// 1 / apol for every atom, 0 for atoms without dipole polarizability.
fn inverse_polarizabilities(state: &InducedMultipoleState) -> Array1<f64> {
    (0..state.n_atoms())
        .map(|atom| {
            let apol: f64 = state.apol(atom);
            if apol != 0.0 {
                1.0 / apol
            } else {
                0.0
            }
        })
        .collect()
}

/// r = E(mu) - mu / apol on all polarizable atoms.
fn explicit_residual<E: FieldEvaluator>(
    dipoles: ArrayView2<f64>,
    inv_apol: &Array1<f64>,
    evaluator: &mut E,
    zero_quadrupoles: &Array3<f64>,
) -> Array2<f64> {
    let field: Array2<f64> = evaluator
        .evaluate(dipoles, zero_quadrupoles.view())
        .efield1;
    let mut residual: Array2<f64> = Array2::zeros(dipoles.raw_dim());
    for (atom, inv) in inv_apol.iter().enumerate() {
        if *inv != 0.0 {
            let row: Array1<f64> = &field.row(atom) - &(&dipoles.row(atom) * *inv);
            residual.row_mut(atom).assign(&row);
        }
    }
    residual
}

#[cfg(test)]
mod tests {
    use crate::initialization::{InducedMultipoleState, PolarizableKind, PolarizationAlgorithm};
    use crate::solver::test_fields::LinearField;
    use crate::solver::{PolarizationError, PolarizationSolver};
    use approx::assert_abs_diff_eq;
    use ndarray::prelude::*;
    use qsmix_parallel::SerialGroup;

    fn state(apol: &[f64]) -> InducedMultipoleState {
        let kinds: Vec<PolarizableKind> = apol
            .iter()
            .enumerate()
            .map(|(idx, a)| PolarizableKind {
                name: format!("K{}", idx),
                apol: *a,
                cpol: 0.0,
            })
            .collect();
        InducedMultipoleState::new(kinds, (0..apol.len()).collect())
    }

    fn debug_solver(max_ipol_iter: usize) -> PolarizationSolver {
        let mut solver =
            PolarizationSolver::new(PolarizationAlgorithm::ConjugateGradient, max_ipol_iter, 1e-10);
        solver.debug = true;
        solver
    }

    #[test]
    fn single_atom_converges_in_one_step() {
        let mut state = state(&[2.0, 0.0]);
        let mut field = LinearField::new(
            array![[0.0, 0.5, 0.0], [3.0, 3.0, 3.0]],
            Array2::zeros([6, 6]),
        );
        let result = debug_solver(10).solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(result.converged);
        assert_eq!(result.iterations, 1);
        assert_abs_diff_eq!(state.dipoles, array![[0.0, 1.0, 0.0], [0.0, 0.0, 0.0]], epsilon = 1e-14);
    }

    #[test]
    fn converged_start_needs_no_iteration() {
        let mut state = state(&[1.0]);
        state.dipoles.row_mut(0).assign(&array![0.0, 0.0, 1.0]);
        let mut field = LinearField::new(array![[0.0, 0.0, 1.0]], Array2::zeros([3, 3]));
        let result = debug_solver(10).solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.rmsd, 0.0);
    }

    #[test]
    fn coupled_dimer_with_debug_checks() {
        let mut state = state(&[1.0, 1.0]);
        let mut field = LinearField::dimer(array![[0.0, 0.0, 0.2], [0.1, 0.0, 0.2]], 2.0);
        let result = debug_solver(50).solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(result.converged);
        // the two coupled 3x3 blocks have at most 6 distinct eigenvalues
        assert!(result.iterations <= 6);
        let factor: f64 = 1.0 / (1.0 - 2.0 / 8.0);
        assert_abs_diff_eq!(state.dipoles[[0, 2]], factor * 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(state.dipoles[[1, 2]], factor * 0.2, epsilon = 1e-9);
    }

    #[test]
    fn unconverged_debug_run_fails() {
        let mut state = state(&[1.0, 1.0]);
        let mut field = LinearField::dimer(array![[0.0, 0.0, 0.2], [0.1, 0.0, 0.2]], 2.0);
        let result = debug_solver(1).solve(&mut state, &mut field, &SerialGroup);

        match result {
            Err(PolarizationError::InconsistentResidual { rmsd, eps_pol }) => {
                assert!(rmsd > eps_pol);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
