use crate::scf::diis::{DiisBuffer, DiisOutcome, DiisStep};
use ndarray::prelude::*;

impl DiisBuffer<Array2<f64>> {
    /// Stores the Kohn-Sham matrices `ks` of all spins together with their
    /// commutator errors and replaces them by the DIIS extrapolation if the
    /// convergence criteria allow it.
    pub fn step(
        &mut self,
        ks: &mut [Array2<f64>],
        density: &[Array2<f64>],
        overlap: Option<&Array2<f64>>,
        settings: &DiisStep,
    ) -> DiisOutcome {
        let errors: Vec<Array2<f64>> = ks
            .iter()
            .zip(density.iter())
            .map(|(k, p)| commutator_error(k.view(), p.view(), overlap.map(|s| s.view())))
            .collect();
        self.update(ks, errors, settings, true)
    }
}

/// e = K P S - S P K, or K P - P K for an orthogonal basis.
pub(crate) fn commutator_error(
    k: ArrayView2<f64>,
    p: ArrayView2<f64>,
    s: Option<ArrayView2<f64>>,
) -> Array2<f64> {
    match s {
        Some(s) => {
            let kps: Array2<f64> = k.dot(&p).dot(&s);
            let spk: Array2<f64> = s.dot(&p).dot(&k);
            kps - spk
        }
        None => k.dot(&p) - p.dot(&k),
    }
}
