use crate::io::Configuration;
use crate::matrix::BlockSparseMatrix;
use crate::scf::diis::{DiisBuffer, DiisOutcome};
use crate::scf::logging::*;
use crate::scf::model::HubbardChain;
use crate::utils::Timer;
use anyhow::{Context, Result};
use log::{debug, log_enabled, Level};
use ndarray::prelude::*;
use ndarray_stats::DeviationExt;
use qsmix_parallel::{atom_partition, run_spmd, ProcessGroup};
use std::fmt;

#[derive(Debug, Clone)]
pub struct ScfError {
    pub message: String,
    iteration: usize,
}

impl ScfError {
    pub fn new(iter: usize, energy_diff: f64, charge_diff: f64) -> Self {
        let message: String = format! {"SCF-Routine failed in Iteration: {}. The charge \
         difference at the last iteration was {} and the energy \
         difference was {}",
        iter,
        charge_diff,
        energy_diff};
        Self {
            message,
            iteration: iter,
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

impl fmt::Display for ScfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write! {f, "{}", self.message.as_str()}
    }
}

impl std::error::Error for ScfError {}

/// SCF drivers that converge the mean-field model with the different
/// convergence accelerators. All of them return the total energy or an
/// [ScfError] wrapped in the returned error if `scf_max_cycles` is exceeded.
pub trait SelfConsistentField {
    /// Kohn-Sham matrix DIIS with dense matrices.
    fn run_scf(&self, config: &Configuration) -> Result<f64>;
    /// Kohn-Sham matrix DIIS with block-sparse matrices.
    fn run_ls_scf(&self, config: &Configuration) -> Result<f64>;
    /// Self-consistent populations with the charge mixer, run on
    /// `number_of_ranks` ranks that share the sites.
    fn run_charge_scf(&self, config: &Configuration) -> Result<f64>;
}

impl SelfConsistentField for HubbardChain {
    fn run_scf(&self, config: &Configuration) -> Result<f64> {
        let overlap: Option<&Array2<f64>> = if self.is_orthogonal() {
            None
        } else {
            Some(self.overlap())
        };
        let mut diis: DiisBuffer<Array2<f64>> = DiisBuffer::new(config.diis.nbuffer);

        self.density_scf(config, "SCF-Routine", |fock, density, _iter, delta| {
            diis.step(fock, density, overlap, &config.diis.step(delta))
        })
    }

    fn run_ls_scf(&self, config: &Configuration) -> Result<f64> {
        let blk_sizes: &[usize] = self.blk_sizes();
        let filter_eps: f64 = config.diis.filter_eps;
        let to_sparse =
            |m: &Array2<f64>| BlockSparseMatrix::from_dense(m.view(), blk_sizes, filter_eps);
        let overlap: Option<BlockSparseMatrix> = if self.is_orthogonal() {
            None
        } else {
            Some(to_sparse(self.overlap()))
        };
        let mut diis: DiisBuffer<BlockSparseMatrix> = DiisBuffer::new(config.diis.nbuffer);

        self.density_scf(config, "Linear Scaling SCF-Routine", |fock, density, iter, delta| {
            let mut ks: Vec<BlockSparseMatrix> = fock.iter().map(to_sparse).collect();
            let p: Vec<BlockSparseMatrix> = density.iter().map(to_sparse).collect();
            let outcome: DiisOutcome = diis.step_ls(
                &mut ks,
                &p,
                overlap.as_ref(),
                iter,
                &config.diis.ls_step(delta),
            );
            debug!(
                "blocks of the Kohn-Sham matrix: {}",
                ks.iter().map(|k| k.n_blocks()).sum::<usize>()
            );
            for (f, k) in fock.iter_mut().zip(ks.iter()) {
                *f = k.to_dense();
            }
            outcome
        })
    }

    fn run_charge_scf(&self, config: &Configuration) -> Result<f64> {
        let n_ranks: usize = config.parallelization.number_of_ranks;
        let results: Vec<Result<f64>> =
            run_spmd(n_ranks, |group| self.charge_scf_on_rank(config, group));
        // all ranks converge the same replicated populations
        results
            .into_iter()
            .next()
            .context("The process group of the charge SCF is empty")?
    }
}

impl HubbardChain {
    /// SCF loop over density matrices. `extrapolate` receives the Fock matrices,
    /// the density matrices they were built from, the iteration and the change
    /// of the energy in the last iteration.
    fn density_scf<F>(&self, config: &Configuration, title: &str, mut extrapolate: F) -> Result<f64>
    where
        F: FnMut(&mut [Array2<f64>], &[Array2<f64>], usize, f64) -> DiisOutcome,
    {
        let timer: Timer = Timer::start();

        // SCF settings from the user input
        let max_iter: usize = config.scf.scf_max_cycles;
        let scf_charge_conv: f64 = config.scf.scf_charge_conv;
        let scf_energy_conv: f64 = config.scf.scf_energy_conv;
        let f: Vec<Vec<f64>> = self.occupations();

        if log_enabled!(Level::Info) {
            print_scf_init(title, max_iter, self.n_sites(), self.n_electrons());
        }

        // start from the density of the neutral chain
        let (mut p, mut orbe): (Vec<Array2<f64>>, Vec<Array1<f64>>) =
            self.density(&self.fock(self.initial_populations().view()))?;

        // variables that are updated during the iterations
        let mut last_energy: f64 = 0.0;
        let mut scf_energy: f64 = 0.0;
        let mut energy_change: f64 = f64::INFINITY;
        let mut converged: bool = false;
        let mut failure: ScfError = ScfError::new(0, f64::INFINITY, f64::INFINITY);

        for iter in 1..=max_iter {
            let populations: Array2<f64> = self.populations(&p);
            let mut fock: Vec<Array2<f64>> = self.fock(populations.view());
            let outcome: DiisOutcome = extrapolate(&mut fock, &p, iter, energy_change);

            let (p_new, orbe_new) = self.density(&fock)?;
            let populations_new: Array2<f64> = self.populations(&p_new);
            scf_energy = self.energy(&p_new, populations_new.view());

            let mut p_diff_max: f64 = 0.0;
            for (p_spin, p_new_spin) in p.iter().zip(p_new.iter()) {
                p_diff_max = p_diff_max.max(p_new_spin.root_mean_sq_err(p_spin)?);
            }
            energy_change = if iter == 1 {
                f64::INFINITY
            } else {
                (last_energy - scf_energy).abs()
            };
            let step: &str = if outcome.diis_step { "DIIS" } else { "-" };
            if log_enabled!(Level::Info) {
                print_energies_at_iteration(iter, scf_energy, last_energy, p_diff_max, step);
            }
            debug!("max. commutator error: {:.6e}", outcome.error_max);

            converged = p_diff_max < scf_charge_conv && energy_change < scf_energy_conv;
            last_energy = scf_energy;
            p = p_new;
            orbe = orbe_new;
            if converged {
                break;
            }
            failure = ScfError::new(iter, energy_change, p_diff_max);
        }

        if log_enabled!(Level::Info) {
            print_scf_end(timer, converged, scf_energy);
        }
        if log_enabled!(Level::Debug) {
            print_charges(self.populations(&p).view());
            for (orbe_spin, f_spin) in orbe.iter().zip(f.iter()) {
                print_orbital_information(orbe_spin.view(), f_spin);
            }
        }
        if converged {
            Ok(scf_energy)
        } else {
            Err(failure.into())
        }
    }

    /// Charge SCF of one rank. The populations are replicated on all ranks, the
    /// mixer of every rank only updates the sites that it owns.
    fn charge_scf_on_rank<G: ProcessGroup + ?Sized>(
        &self,
        config: &Configuration,
        group: &G,
    ) -> Result<f64> {
        let timer: Timer = Timer::start();
        let max_iter: usize = config.scf.scf_max_cycles;
        let scf_charge_conv: f64 = config.scf.scf_charge_conv;
        let scf_energy_conv: f64 = config.scf.scf_energy_conv;
        let print: bool = group.rank() == 0 && log_enabled!(Level::Info);

        let local_atoms: Vec<usize> = atom_partition(self.n_sites(), group);
        debug!("rank {} owns the sites {:?}", group.rank(), local_atoms);
        let mut mixer = config.mixing.build_mixer(local_atoms)?;

        if print {
            print_scf_init(
                "Charge SCF-Routine",
                max_iter,
                self.n_sites(),
                self.n_electrons(),
            );
        }

        let mut q_in: Array2<f64> = self.initial_populations();
        let mut last_energy: f64 = 0.0;
        let mut scf_energy: f64 = 0.0;
        let mut converged: bool = false;
        let mut failure: ScfError = ScfError::new(0, f64::INFINITY, f64::INFINITY);

        for iter in 1..=max_iter {
            let fock: Vec<Array2<f64>> = self.fock(q_in.view());
            let (p, _) = self.density(&fock)?;
            let mut q_out: Array2<f64> = self.populations(&p);
            scf_energy = self.energy(&p, q_out.view());

            let dq_diff_max: f64 = q_out.root_mean_sq_err(&q_in)?;
            let energy_change: f64 = if iter == 1 {
                f64::INFINITY
            } else {
                (last_energy - scf_energy).abs()
            };
            converged = dq_diff_max < scf_charge_conv && energy_change < scf_energy_conv;

            let step: String = if converged {
                String::from("-")
            } else {
                mixer.mix(&mut q_out, iter, group)?.to_string()
            };
            if print {
                print_energies_at_iteration(iter, scf_energy, last_energy, dq_diff_max, &step);
            }

            last_energy = scf_energy;
            if converged {
                break;
            }
            q_in = q_out;
            failure = ScfError::new(iter, energy_change, dq_diff_max);
        }

        if print {
            print_scf_end(timer, converged, scf_energy);
        }
        if group.rank() == 0 && log_enabled!(Level::Debug) {
            print_charges(q_in.view());
        }
        if converged {
            Ok(scf_energy)
        } else {
            Err(failure.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::get_config;
    use approx::assert_abs_diff_eq;

    #[test]
    fn all_drivers_find_the_same_ground_state() {
        let config: Configuration = get_config();
        let model = HubbardChain::new(&config.model).unwrap();
        let dense: f64 = model.run_scf(&config).unwrap();
        let sparse: f64 = model.run_ls_scf(&config).unwrap();
        let charges: f64 = model.run_charge_scf(&config).unwrap();
        assert_abs_diff_eq!(dense, sparse, epsilon = 1e-7);
        assert_abs_diff_eq!(dense, charges, epsilon = 1e-7);
    }

    #[test]
    fn charge_scf_does_not_depend_on_the_number_of_ranks() {
        let mut config: Configuration = get_config();
        let model = HubbardChain::new(&config.model).unwrap();
        let serial: f64 = model.run_charge_scf(&config).unwrap();
        for n_ranks in [2, 3] {
            config.parallelization.number_of_ranks = n_ranks;
            let distributed: f64 = model.run_charge_scf(&config).unwrap();
            assert_abs_diff_eq!(serial, distributed, epsilon = 1e-7);
        }
    }

    #[test]
    fn open_shell_chain_in_an_orthogonal_basis() {
        let mut config: Configuration = get_config();
        config.model.n_spin = 2;
        config.model.n_electrons = 7;
        config.model.overlap = 0.0;
        let model = HubbardChain::new(&config.model).unwrap();
        assert!(model.is_orthogonal());
        let dense: f64 = model.run_scf(&config).unwrap();
        let sparse: f64 = model.run_ls_scf(&config).unwrap();
        assert_abs_diff_eq!(dense, sparse, epsilon = 1e-7);
    }

    #[test]
    fn exceeding_the_iteration_limit_is_an_scf_error() {
        let mut config: Configuration = get_config();
        config.scf.scf_max_cycles = 2;
        let model = HubbardChain::new(&config.model).unwrap();
        for result in [model.run_scf(&config), model.run_charge_scf(&config)] {
            let error = result.unwrap_err();
            let scf_error: &ScfError = error.downcast_ref::<ScfError>().unwrap();
            assert_eq!(scf_error.iteration(), 2);
            assert!(scf_error.to_string().contains("Iteration: 2"));
        }
    }

    #[test]
    fn unavailable_mixing_method_stops_the_charge_scf() {
        let mut config: Configuration = get_config();
        config.mixing.method = crate::scf::mixer::MixingMethod::Kerker;
        let model = HubbardChain::new(&config.model).unwrap();
        let error = model.run_charge_scf(&config).unwrap_err();
        assert!(error.downcast_ref::<ScfError>().is_none());
        assert!(error.to_string().contains("Kerker"));
    }
}
