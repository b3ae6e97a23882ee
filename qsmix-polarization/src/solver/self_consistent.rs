use crate::initialization::InducedMultipoleState;
use crate::interface::{FieldEvaluation, FieldEvaluator};
use crate::output::print_pol_iteration;
use crate::solver::{replicate_multipoles, rms_deviation, PolarizationSolver};
use log::{log_enabled, trace, Level};
use qsmix_parallel::ProcessGroup;

impl PolarizationSolver {
    /// Fixed point iteration mu = apol * E(mu), Q = cpol * grad E(mu).
    /// Returns the convergence flag, the number of iterations and the last rmsd.
    pub(crate) fn solve_sc<E: FieldEvaluator, G: ProcessGroup + ?Sized>(
        &self,
        state: &mut InducedMultipoleState,
        evaluator: &mut E,
        local_atoms: &[usize],
        n_dof: usize,
        group: &G,
    ) -> (bool, usize, f64) {
        let mut rmsd: f64 = 0.0;
        let mut iterations: usize = 0;

        for iter in 1..=self.max_ipol_iter {
            iterations = iter;
            let evaluation: FieldEvaluation =
                evaluator.evaluate(state.dipoles.view(), state.quadrupoles.view());

            let sum_of_squares: f64 = group.sum_scalar(substitute(state, &evaluation, local_atoms));
            replicate_multipoles(state, local_atoms, group);
            rmsd = rms_deviation(sum_of_squares, n_dof);

            if log_enabled!(Level::Info) {
                let e_induction: f64 = group.sum_scalar(state.induction_energy(local_atoms));
                if group.rank() == 0 {
                    print_pol_iteration(iter, rmsd, e_induction, Some(evaluation.energy));
                }
            }
            if rmsd <= self.eps_pol {
                return (true, iterations, rmsd);
            }
        }
        (false, iterations, rmsd)
    }
}

/// Replaces the induced multipoles of the atoms `atoms` by the polarizability
/// times the field and returns the sum of the squared deviations between the
/// old multipoles (divided by the polarizability) and the field.
fn substitute(
    state: &mut InducedMultipoleState,
    evaluation: &FieldEvaluation,
    atoms: &[usize],
) -> f64 {
    let mut sum_of_squares: f64 = 0.0;
    for atom in atoms.iter().copied() {
        if !state.is_polarizable(atom) {
            continue;
        }
        let apol: f64 = state.apol(atom);
        if apol != 0.0 {
            for a in 0..3 {
                let field: f64 = evaluation.efield1[[atom, a]];
                let residual: f64 = state.dipoles[[atom, a]] / apol - field;
                sum_of_squares += residual * residual;
                state.dipoles[[atom, a]] = apol * field;
            }
        }
        let cpol: f64 = state.cpol(atom);
        if cpol != 0.0 {
            for a in 0..3 {
                for b in 0..3 {
                    let gradient: f64 = evaluation.efield2[[atom, a, b]];
                    let residual: f64 = state.quadrupoles[[atom, a, b]] / cpol - gradient;
                    sum_of_squares += residual * residual;
                    state.quadrupoles[[atom, a, b]] = cpol * gradient;
                }
            }
        }
        trace!(
            "atom {: >4} induced dipole {:?}",
            atom + 1,
            state.dipoles.row(atom).to_vec()
        );
    }
    sum_of_squares
}

#[cfg(test)]
mod tests {
    use crate::initialization::{InducedMultipoleState, PolarizableKind, PolarizationAlgorithm};
    use crate::solver::test_fields::LinearField;
    use crate::solver::PolarizationSolver;
    use approx::assert_abs_diff_eq;
    use ndarray::prelude::*;
    use qsmix_parallel::SerialGroup;

    fn kinds() -> Vec<PolarizableKind> {
        vec![
            PolarizableKind {
                name: String::from("A"),
                apol: 1.0,
                cpol: 0.0,
            },
            PolarizableKind {
                name: String::from("B"),
                apol: 0.0,
                cpol: 0.0,
            },
        ]
    }

    fn solver() -> PolarizationSolver {
        PolarizationSolver::new(PolarizationAlgorithm::SelfConsistent, 20, 1.0e-12)
    }

    #[test]
    fn uncoupled_dipole_is_found_by_one_substitution() {
        let mut state = InducedMultipoleState::new(kinds(), vec![0, 1]);
        let mut field = LinearField::new(array![[0.0, 0.0, 1.0], [0.0, 0.0, 0.0]], Array2::zeros([6, 6]));
        let result = solver().solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(result.converged);
        assert_eq!(state.dipoles.row(0), array![0.0, 0.0, 1.0]);
        assert_eq!(result.rmsd, 0.0);
        // the first substitution reaches the fixed point, the second one certifies it
        assert_eq!(result.iterations, 2);
        assert_abs_diff_eq!(result.e_induction, 0.5, epsilon = 1e-14);
    }

    #[test]
    fn exact_fixed_point_converges_in_first_iteration() {
        let mut state = InducedMultipoleState::new(kinds(), vec![0, 1]);
        state.dipoles.row_mut(0).assign(&array![0.0, 0.0, 1.0]);
        let mut field = LinearField::new(array![[0.0, 0.0, 1.0], [0.0, 0.0, 0.0]], Array2::zeros([6, 6]));
        let result = solver().solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(result.converged);
        assert_eq!(result.iterations, 1);
        assert_abs_diff_eq!(result.rmsd, 0.0, epsilon = 1e-15);
        // one evaluation in the iteration and the final one
        assert_eq!(field.calls, 2);
    }

    #[test]
    fn unpolarizable_atoms_do_not_enter_the_rmsd() {
        let mut state = InducedMultipoleState::new(kinds(), vec![0, 1]);
        state.dipoles.row_mut(0).assign(&array![0.0, 0.0, 1.0]);
        // a huge field at the unpolarizable atom must not spoil the convergence
        let mut field = LinearField::new(
            array![[0.0, 0.0, 1.0], [1.0e6, -1.0e6, 3.0e5]],
            Array2::zeros([6, 6]),
        );
        let result = solver().solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(result.converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(state.dipoles.row(1), array![0.0, 0.0, 0.0]);
    }

    #[test]
    fn quadrupoles_follow_the_field_gradient() {
        let kinds = vec![PolarizableKind {
            name: String::from("Q"),
            apol: 0.0,
            cpol: 2.0,
        }];
        let mut state = InducedMultipoleState::new(kinds, vec![0]);
        let mut field = LinearField::new(array![[0.0, 0.0, 0.0]], Array2::zeros([3, 3]));
        field.external_gradient[[0, 0, 0]] = -0.5;
        field.external_gradient[[0, 2, 2]] = 0.5;
        let result = solver().solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(result.converged);
        assert_abs_diff_eq!(state.quadrupoles[[0, 0, 0]], -1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(state.quadrupoles[[0, 2, 2]], 1.0, epsilon = 1e-14);
        // 2 / cpol / 6
        assert_abs_diff_eq!(result.e_induction, 2.0 / 12.0, epsilon = 1e-14);
    }

    #[test]
    fn not_converged_after_max_iterations() {
        let kinds = vec![PolarizableKind {
            name: String::from("A"),
            apol: 1.0,
            cpol: 0.0,
        }];
        let mut state = InducedMultipoleState::new(kinds, vec![0, 0]);
        let mut field = LinearField::dimer(array![[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]], 1.5);
        let solver = PolarizationSolver::new(PolarizationAlgorithm::SelfConsistent, 3, 1.0e-12);
        let result = solver.solve(&mut state, &mut field, &SerialGroup).unwrap();

        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
        assert!(result.rmsd > 1.0e-12);
    }
}
