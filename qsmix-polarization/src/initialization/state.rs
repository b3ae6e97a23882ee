use crate::initialization::KindConfig;
use ndarray::prelude::*;

/// Polarizabilities of an atomic kind. A kind with `apol == 0` and `cpol == 0`
/// carries no induced multipoles.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarizableKind {
    pub name: String,
    /// Dipole polarizability.
    pub apol: f64,
    /// Quadrupole polarizability.
    pub cpol: f64,
}

impl From<&KindConfig> for PolarizableKind {
    fn from(kind: &KindConfig) -> Self {
        Self {
            name: kind.element.clone(),
            apol: kind.apol,
            cpol: kind.cpol,
        }
    }
}

/// Induced dipoles and quadrupoles of all atoms. The multipoles are kept
/// between two calls of the solver, so that every solve starts from the
/// previous solution.
#[derive(Debug, Clone)]
pub struct InducedMultipoleState {
    pub kinds: Vec<PolarizableKind>,
    pub kind_of_atom: Vec<usize>,
    /// Induced dipoles, shape `[n_atoms, 3]`.
    pub dipoles: Array2<f64>,
    /// Induced quadrupoles, shape `[n_atoms, 3, 3]`.
    pub quadrupoles: Array3<f64>,
}

impl InducedMultipoleState {
    pub fn new(kinds: Vec<PolarizableKind>, kind_of_atom: Vec<usize>) -> Self {
        let n_atoms: usize = kind_of_atom.len();
        Self {
            kinds,
            kind_of_atom,
            dipoles: Array2::zeros([n_atoms, 3]),
            quadrupoles: Array3::zeros([n_atoms, 3, 3]),
        }
    }

    pub fn n_atoms(&self) -> usize {
        self.kind_of_atom.len()
    }

    pub fn apol(&self, atom: usize) -> f64 {
        self.kinds[self.kind_of_atom[atom]].apol
    }

    pub fn cpol(&self, atom: usize) -> f64 {
        self.kinds[self.kind_of_atom[atom]].cpol
    }

    pub fn is_polarizable(&self, atom: usize) -> bool {
        self.apol(atom) != 0.0 || self.cpol(atom) != 0.0
    }

    pub fn has_quadrupoles(&self) -> bool {
        self.kind_of_atom
            .iter()
            .any(|kind| self.kinds[*kind].cpol != 0.0)
    }

    /// Number of induced degrees of freedom of the atoms `atoms`: 3 for every
    /// dipole-polarizable and 9 for every quadrupole-polarizable atom.
    pub fn n_active_dof(&self, atoms: &[usize]) -> usize {
        atoms
            .iter()
            .map(|&atom| {
                let mut n: usize = 0;
                if self.apol(atom) != 0.0 {
                    n += 3;
                }
                if self.cpol(atom) != 0.0 {
                    n += 9;
                }
                n
            })
            .sum()
    }

    /// Energy that is needed to induce the current multipoles of the atoms `atoms`,
    /// `sum mu.mu / apol / 2 + sum Q:Q / cpol / 6`.
    pub fn induction_energy(&self, atoms: &[usize]) -> f64 {
        let mut e_induction: f64 = 0.0;
        for &atom in atoms.iter() {
            let apol: f64 = self.apol(atom);
            if apol != 0.0 {
                let dipole = self.dipoles.row(atom);
                e_induction += dipole.dot(&dipole) / apol * 0.5;
            }
            let cpol: f64 = self.cpol(atom);
            if cpol != 0.0 {
                let quadrupole = self.quadrupoles.slice(s![atom, .., ..]);
                e_induction += (&quadrupole * &quadrupole).sum() / cpol / 6.0;
            }
        }
        e_induction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn kinds() -> Vec<PolarizableKind> {
        vec![
            PolarizableKind {
                name: String::from("O"),
                apol: 2.0,
                cpol: 0.0,
            },
            PolarizableKind {
                name: String::from("H"),
                apol: 0.0,
                cpol: 0.0,
            },
            PolarizableKind {
                name: String::from("Cl"),
                apol: 1.0,
                cpol: 3.0,
            },
        ]
    }

    #[test]
    fn active_dof_skips_unpolarizable_atoms() {
        let state = InducedMultipoleState::new(kinds(), vec![0, 1, 1, 2]);
        assert_eq!(state.n_active_dof(&[0, 1, 2, 3]), 3 + 3 + 9);
        assert_eq!(state.n_active_dof(&[1, 3]), 9 + 3);
        assert!(!state.is_polarizable(1));
        assert!(state.has_quadrupoles());
    }

    #[test]
    fn induction_energy_of_dipoles_and_quadrupoles() {
        let mut state = InducedMultipoleState::new(kinds(), vec![0, 2]);
        state.dipoles.row_mut(0).assign(&array![0.0, 0.0, 2.0]);
        state.quadrupoles[[1, 0, 0]] = 3.0;
        // 4 / 2 / 2 + 9 / 3 / 6
        assert_abs_diff_eq!(state.induction_energy(&[0, 1]), 1.5, epsilon = 1e-14);
        assert_abs_diff_eq!(state.induction_energy(&[1]), 0.5, epsilon = 1e-14);
    }
}
