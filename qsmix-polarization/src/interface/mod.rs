pub use ndarray::prelude::*;

/// Fields that are returned by an electrostatic evaluator for a given set of
/// induced multipoles.
#[derive(Debug, Clone)]
pub struct FieldEvaluation {
    /// Electrostatic energy of the permanent and induced multipoles.
    pub energy: f64,
    /// Electric field at every atom, shape `[n_atoms, 3]`.
    pub efield1: Array2<f64>,
    /// Electric field gradient at every atom, shape `[n_atoms, 3, 3]`.
    pub efield2: Array3<f64>,
}

impl FieldEvaluation {
    pub fn zeros(n_atoms: usize) -> Self {
        Self {
            energy: 0.0,
            efield1: Array2::zeros([n_atoms, 3]),
            efield2: Array3::zeros([n_atoms, 3, 3]),
        }
    }
}

/// Trait that provides an interface for the electrostatics engine.
/// The polarization solvers only own the iteration, every field evaluation
/// is delegated to an implementor of this trait. The evaluation has to be
/// linear in the induced multipoles (apart from the constant permanent part).
pub trait FieldEvaluator {
    fn n_atoms(&self) -> usize;

    fn evaluate(&mut self, dipoles: ArrayView2<f64>, quadrupoles: ArrayView3<f64>)
        -> FieldEvaluation;
}
