use log::{debug, info, warn};
use ndarray::ArrayView2;

pub(crate) fn print_pol_init(algorithm: &str, max_iter: usize, eps_pol: f64, n_dof: usize) {
    info!("{:^80}", "");
    info!("{: ^80}", "Polarization SCF");
    info!("{:-^80}", "");
    info!("{: <25} {}", "algorithm:", algorithm);
    info!("{: <25} {}", "max. iterations:", max_iter);
    info!("{: <25} {:e}", "convergence threshold:", eps_pol);
    info!("{: <25} {}", "induced dof:", n_dof);
    info!("{:-^62} ", "");
    info!(
        "{: <5} {: >18} {: >18} {: >18}",
        "Iter.", "RMSD", "E induction", "E electrostatic"
    );
    info!("{:-^62} ", "");
}

/// The conjugate gradient solver does not evaluate the field of the current
/// multipoles and passes no electrostatic energy.
pub(crate) fn print_pol_iteration(iter: usize, rmsd: f64, e_induction: f64, energy: Option<f64>) {
    match energy {
        Some(energy) => info!(
            "{: >5} {:>18.10e} {:>18.10e} {:>18.10e}",
            iter, rmsd, e_induction, energy
        ),
        None => info!(
            "{: >5} {:>18.10e} {:>18.10e} {: >18}",
            iter, rmsd, e_induction, "-"
        ),
    }
}

pub(crate) fn print_pol_end(converged: bool, iter: usize, rmsd: f64, eps_pol: f64) {
    info!("{:-^62} ", "");
    if converged {
        info!("{: ^62}", format!("Polarization converged in {} iterations", iter));
    } else {
        warn!(
            "Polarization SCF did not converge in {} iterations: RMSD {:.6e} > {:.6e}",
            iter, rmsd, eps_pol
        );
    }
}

pub(crate) fn print_dipoles(dipoles: ArrayView2<f64>) {
    debug!("");
    debug!("{: <35} ", "induced dipoles");
    debug!("{:-^62}", "");
    for (idx, dipole) in dipoles.outer_iter().enumerate() {
        debug!(
            "Atom {: >4} {:>18.12} {:>18.12} {:>18.12}",
            idx + 1,
            dipole[0],
            dipole[1],
            dipole[2]
        );
    }
    debug!("{:-^62}", "");
}
