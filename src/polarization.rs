use crate::io::Geometry;
use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::info;
use ndarray::prelude::*;
use ndarray_npy::write_npy;
use qsmix_parallel::{run_spmd, ProcessGroup};
use qsmix_polarization::defaults::DIPOLES_FILE_NAME;
use qsmix_polarization::{
    build_evaluator, InducedMultipoleState, KindConfig, MultipoleField, PolarizableKind,
    PolarizationConfig, PolarizationResult, PolarizationSolver,
};

/// Converges the induced multipoles of the atoms in `geometry` on `n_ranks`
/// ranks that share the atoms. The charges and polarizabilities are taken
/// from the kind with the same element name.
pub fn run_polarization(
    geometry: &Geometry,
    config: &PolarizationConfig,
    n_ranks: usize,
) -> Result<(PolarizationResult, InducedMultipoleState)> {
    let n_atoms: usize = geometry.elements.len();
    let mut kinds: Vec<PolarizableKind> = Vec::new();
    let mut kind_index: HashMap<String, usize> = HashMap::new();
    let mut kind_of_atom: Vec<usize> = Vec::with_capacity(n_atoms);
    let mut charges: Array1<f64> = Array1::zeros([n_atoms]);

    for (atom, element) in geometry.elements.iter().enumerate() {
        let kind: &KindConfig = config
            .kind(element)
            .with_context(|| format!("No polarization parameters for the element {}", element))?;
        charges[atom] = kind.charge;
        let index: usize = *kind_index
            .entry(kind.element.to_lowercase())
            .or_insert_with(|| {
                kinds.push(PolarizableKind::from(kind));
                kinds.len() - 1
            });
        kind_of_atom.push(index);
    }
    let initial_state: InducedMultipoleState = InducedMultipoleState::new(kinds, kind_of_atom);

    let results: Vec<Result<(PolarizationResult, InducedMultipoleState)>> =
        run_spmd(n_ranks, |group| {
            solve_on_rank(geometry, config, &charges, initial_state.clone(), group)
        });
    // the converged multipoles are replicated on all ranks
    let (result, state) = results
        .into_iter()
        .next()
        .context("The process group of the polarization solver is empty")??;

    info!("{: <25} {:18.14} Hartree", "induction energy:", result.e_induction);
    info!("{: <25} {:18.14} Hartree", "electrostatic energy:", result.energy);

    if config.save_dipoles {
        write_npy(DIPOLES_FILE_NAME, &state.dipoles)
            .with_context(|| format!("Unable to write the induced dipoles to {}", DIPOLES_FILE_NAME))?;
        info!("induced dipoles written to {}", DIPOLES_FILE_NAME);
    }
    Ok((result, state))
}

fn solve_on_rank<G: ProcessGroup + ?Sized>(
    geometry: &Geometry,
    config: &PolarizationConfig,
    charges: &Array1<f64>,
    mut state: InducedMultipoleState,
    group: &G,
) -> Result<(PolarizationResult, InducedMultipoleState)> {
    let mut evaluator: MultipoleField = build_evaluator(
        &config.electrostatics,
        geometry.positions.clone(),
        charges.clone(),
        geometry.cell,
    )?;
    let solver: PolarizationSolver = PolarizationSolver::from(config);
    let result: PolarizationResult = solver.solve(&mut state, &mut evaluator, group)?;
    Ok((result, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use qsmix_polarization::{ElectrostaticsType, PolarizationAlgorithm};

    fn config(algorithm: &str) -> PolarizationConfig {
        let input: String = format!(
            r#"
            algorithm = "{}"
            eps_pol = 1.0e-10

            [[kinds]]
            element = "Na"
            charge = 1.0

            [[kinds]]
            element = "Ar"
            apol = 11.0
            "#,
            algorithm
        );
        toml::from_str(&input).unwrap()
    }

    fn geometry() -> Geometry {
        Geometry {
            elements: vec!["Na".into(), "Ar".into(), "Ar".into()],
            atomic_numbers: vec![11, 18, 18],
            positions: array![[0.0, 0.0, 0.0], [0.0, 0.0, 6.0], [0.0, 6.0, 0.0]],
            cell: None,
        }
    }

    #[test]
    fn both_algorithms_induce_the_same_dipoles() {
        let (sc, sc_state) = run_polarization(&geometry(), &config("sc"), 1).unwrap();
        let (cg, cg_state) = run_polarization(&geometry(), &config("cg"), 2).unwrap();
        assert!(sc.converged);
        assert!(cg.converged);
        assert_abs_diff_eq!(sc_state.dipoles, cg_state.dipoles, epsilon = 1e-8);
        assert_abs_diff_eq!(sc.e_induction, cg.e_induction, epsilon = 1e-8);
        // the ion carries no induced dipole
        assert_eq!(sc_state.dipoles.row(0).sum(), 0.0);
        // the argon atoms are polarized away from the cation
        assert!(sc_state.dipoles[[1, 2]] > 0.0);
        assert!(sc_state.dipoles[[2, 1]] > 0.0);
        assert_eq!(sc_state.kinds.len(), 2);
    }

    #[test]
    fn unknown_elements_are_a_configuration_error() {
        let mut geometry: Geometry = geometry();
        geometry.elements[2] = "Kr".into();
        let error = run_polarization(&geometry, &config("sc"), 1).unwrap_err();
        assert!(error.to_string().contains("Kr"));
    }

    #[test]
    fn mesh_ewald_is_rejected() {
        let mut config: PolarizationConfig = config("sc");
        config.electrostatics.ewald_type = ElectrostaticsType::Spme;
        config.electrostatics.box_lengths = Some([20.0, 20.0, 20.0]);
        assert_eq!(config.algorithm, PolarizationAlgorithm::SelfConsistent);
        let error = run_polarization(&geometry(), &config, 2).unwrap_err();
        assert!(error.to_string().contains("not implemented for induced multipoles"));
    }
}
