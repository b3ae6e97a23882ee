use crate::utils::Timer;
use log::{debug, info};
use ndarray::{ArrayView1, ArrayView2};

pub fn print_scf_init(title: &str, max_iter: usize, n_orbs: usize, n_electrons: usize) {
    info!("{:^80}", "");
    info!("{: ^80}", title);
    info!("{:-^80}", "");
    info!("{: <25} {}", "max. iterations:", max_iter);
    info!("{: <25} {}", "number of orbitals:", n_orbs);
    info!("{: <25} {}", "number of electrons:", n_electrons);
    info!("{:^80}", "");
    info!(
        "{: <45} ",
        "SCF Iterations: all quantities are in atomic units"
    );
    info!("{:-^71} ", "");
    info!(
        "{: <5} {: >18} {: >18} {: >18} {: >8}",
        "Iter.", "SCF Energy", "Energy diff.", "Change", "Step"
    );
    info!("{:-^71} ", "");
}

pub fn print_charges(q: ArrayView2<f64>) {
    debug!("");
    debug!("{: <35} ", "site populations per spin");
    debug!("{:-^35}", "");
    for (idx, q_i) in q.outer_iter().enumerate() {
        let values: Vec<String> = q_i.iter().map(|value| format!("{:>18.14}", value)).collect();
        debug!("Site {: >4} n: {}", idx + 1, values.join(" "));
    }
    debug!("{:-^55}", "");
}

pub fn print_energies_at_iteration(
    iter: usize,
    scf_energy: f64,
    energy_old: f64,
    change: f64,
    step: &str,
) {
    if iter == 1 {
        info!(
            "{: >5} {:>18.10e} {:>18.13} {:>18.10e} {: >8}",
            iter, scf_energy, 0.0, change, step
        );
    } else {
        info!(
            "{: >5} {:>18.10e} {:>18.10e} {:>18.10e} {: >8}",
            iter,
            scf_energy,
            energy_old - scf_energy,
            change,
            step
        );
    }
}

pub fn print_scf_end(timer: Timer, converged: bool, scf_energy: f64) {
    info!("{:-^71} ", "");
    if converged {
        info!("{: ^71}", "SCF converged");
    } else {
        info!("{: ^71}", "SCF not converged");
    }
    info!("{:^80} ", "");
    info!("Total energy: {:18.14} Hartree", scf_energy);
    info!("{:-<80} ", "");
    info!("{}", timer);
}

pub fn print_orbital_information(orbe: ArrayView1<f64>, f: &[f64]) {
    info!("{:^80} ", "");
    info!(
        "{:^8} {:^6} {:>18.14} | {:^8} {:^6} {:>18.14}",
        "Orb.", "Occ.", "Energy/Hartree", "Orb.", "Occ.", "Energy/Hartree"
    );
    info!("{:-^71} ", "");
    let n_orbs: usize = orbe.len();
    for i in (0..n_orbs).step_by(2) {
        if i + 1 < n_orbs {
            info!(
                "MO:{:>5} {:>6.2} {:>18.14} | MO:{:>5} {:>6.2} {:>18.14}",
                i + 1,
                f[i],
                orbe[i],
                i + 2,
                f[i + 1],
                orbe[i + 1]
            );
        } else {
            info!("MO:{:>5} {:>6.2} {:>18.14} |", i + 1, f[i], orbe[i]);
        }
    }
    info!("{:-^71} ", "");
}
