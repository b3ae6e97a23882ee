use crate::io::settings::ModelConfig;
use anyhow::{bail, Context, Result};
use ndarray::prelude::*;
use ndarray_linalg::*;

/// Open tight-binding chain with one orbital per site and a mean-field Hubbard
/// repulsion on every site. The site populations are Mulliken populations, so
/// the model has the same structure as a self-consistent charge Hamiltonian in a
/// non-orthogonal basis.
#[derive(Debug, Clone)]
pub struct HubbardChain {
    n_sites: usize,
    n_spin: usize,
    n_electrons: usize,
    hubbard_u: f64,
    h0: Array2<f64>,
    s: Array2<f64>,
    /// Loewdin orthogonalizer X = S^(-1/2)
    x: Array2<f64>,
    blk_sizes: Vec<usize>,
}

impl HubbardChain {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let n: usize = config.n_sites;
        if n == 0 {
            bail!("The chain needs at least one site");
        }
        if config.n_spin != 1 && config.n_spin != 2 {
            bail!("n_spin has to be 1 or 2, but is {}", config.n_spin);
        }
        if config.n_electrons > 2 * n {
            bail!(
                "{} electrons do not fit into {} sites",
                config.n_electrons,
                n
            );
        }
        if config.n_spin == 1 && config.n_electrons % 2 != 0 {
            bail!("An odd number of electrons requires n_spin = 2");
        }
        if config.overlap.abs() >= 0.5 {
            bail!(
                "The nearest neighbour overlap {} gives an overlap matrix that is not positive definite",
                config.overlap
            );
        }
        if config.block_size == 0 {
            bail!("The block size has to be at least 1");
        }

        let mut h0: Array2<f64> = Array2::zeros([n, n]);
        let mut s: Array2<f64> = Array2::eye(n);
        for i in 0..n {
            let sign: f64 = if i % 2 == 0 { 1.0 } else { -1.0 };
            h0[[i, i]] = 0.5 * sign * config.site_energy_alternation;
            if i + 1 < n {
                h0[[i, i + 1]] = config.hopping;
                h0[[i + 1, i]] = config.hopping;
                s[[i, i + 1]] = config.overlap;
                s[[i + 1, i]] = config.overlap;
            }
        }
        // convert generalized eigenvalue problem H.C = S.C.e into eigenvalue problem H'.C' = C'.e
        // by Loewdin orthogonalization, H' = X^T.H.X, where X = S^(-1/2)
        let x: Array2<f64> = s
            .ssqrt(UPLO::Upper)
            .context("square root of the overlap matrix failed")?
            .inv()
            .context("inversion of S^(1/2) failed")?;

        let blk_sizes: Vec<usize> = (0..n)
            .step_by(config.block_size)
            .map(|start| config.block_size.min(n - start))
            .collect();

        Ok(Self {
            n_sites: n,
            n_spin: config.n_spin,
            n_electrons: config.n_electrons,
            hubbard_u: config.hubbard_u,
            h0,
            s,
            x,
            blk_sizes,
        })
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn n_electrons(&self) -> usize {
        self.n_electrons
    }

    pub fn overlap(&self) -> &Array2<f64> {
        &self.s
    }

    pub fn is_orthogonal(&self) -> bool {
        self.s == Array2::<f64>::eye(self.n_sites)
    }

    pub fn blk_sizes(&self) -> &[usize] {
        &self.blk_sizes
    }

    /// Occupation numbers of the orbitals of every spin channel (aufbau principle).
    pub fn occupations(&self) -> Vec<Vec<f64>> {
        let mut f: Vec<Vec<f64>> = Vec::with_capacity(self.n_spin);
        if self.n_spin == 1 {
            let n_occ: usize = self.n_electrons / 2;
            f.push((0..self.n_sites).map(|i| if i < n_occ { 2.0 } else { 0.0 }).collect());
        } else {
            let n_alpha: usize = (self.n_electrons + 1) / 2;
            let n_beta: usize = self.n_electrons / 2;
            for n_occ in [n_alpha, n_beta] {
                f.push((0..self.n_sites).map(|i| if i < n_occ { 1.0 } else { 0.0 }).collect());
            }
        }
        f
    }

    /// Populations of the neutral chain, every site carries the same number of electrons.
    pub fn initial_populations(&self) -> Array2<f64> {
        let f: Vec<Vec<f64>> = self.occupations();
        let mut populations: Array2<f64> = Array2::zeros([self.n_sites, self.n_spin]);
        for (spin, f_spin) in f.iter().enumerate() {
            let n: f64 = f_spin.iter().sum();
            populations
                .column_mut(spin)
                .fill(n / self.n_sites as f64);
        }
        populations
    }

    /// Mean-field potential of every site and spin. In the restricted case the
    /// site carries half of the population in each spin channel.
    fn potential(&self, populations: ArrayView2<f64>) -> Array2<f64> {
        if self.n_spin == 1 {
            populations.mapv(|n| 0.5 * self.hubbard_u * n)
        } else {
            let mut v: Array2<f64> = Array2::zeros(populations.raw_dim());
            v.column_mut(0)
                .assign(&(self.hubbard_u * &populations.column(1)));
            v.column_mut(1)
                .assign(&(self.hubbard_u * &populations.column(0)));
            v
        }
    }

    /// Fock matrix of every spin channel,
    /// F_mu,nu = H0_mu,nu + 1/2 S_mu,nu (V_mu + V_nu).
    pub fn fock(&self, populations: ArrayView2<f64>) -> Vec<Array2<f64>> {
        let v: Array2<f64> = self.potential(populations);
        (0..self.n_spin)
            .map(|spin| {
                let v_spin: ArrayView1<f64> = v.column(spin);
                let mut f: Array2<f64> = self.h0.clone();
                for ((mu, nu), f_mn) in f.indexed_iter_mut() {
                    *f_mn += 0.5 * self.s[[mu, nu]] * (v_spin[mu] + v_spin[nu]);
                }
                f
            })
            .collect()
    }

    /// Diagonalizes the Fock matrices and builds the density matrices from the
    /// occupied orbitals. Returns the density matrices and the orbital energies.
    pub fn density(&self, fock: &[Array2<f64>]) -> Result<(Vec<Array2<f64>>, Vec<Array1<f64>>)> {
        let f: Vec<Vec<f64>> = self.occupations();
        let mut densities: Vec<Array2<f64>> = Vec::with_capacity(self.n_spin);
        let mut orbes: Vec<Array1<f64>> = Vec::with_capacity(self.n_spin);
        for (fock_spin, f_spin) in fock.iter().zip(f.iter()) {
            // H' = X^t.H.X
            let h: Array2<f64> = self.x.t().dot(fock_spin).dot(&self.x);
            let (orbe, orbs_orth): (Array1<f64>, Array2<f64>) = h
                .eigh(UPLO::Upper)
                .context("diagonalization of the Fock matrix failed")?;
            // C = X.C'
            let orbs: Array2<f64> = self.x.dot(&orbs_orth);
            densities.push(density_matrix(orbs.view(), f_spin));
            orbes.push(orbe);
        }
        Ok((densities, orbes))
    }

    /// Mulliken populations of the sites, n_i = (P S)_ii.
    pub fn populations(&self, density: &[Array2<f64>]) -> Array2<f64> {
        let mut populations: Array2<f64> = Array2::zeros([self.n_sites, self.n_spin]);
        for (spin, p) in density.iter().enumerate() {
            populations.column_mut(spin).assign(&p.dot(&self.s).diag());
        }
        populations
    }

    /// E = sum_sigma tr(P_sigma H0) + U sum_i n_i,up n_i,down
    pub fn energy(&self, density: &[Array2<f64>], populations: ArrayView2<f64>) -> f64 {
        let band: f64 = density.iter().map(|p| (p * &self.h0).sum()).sum();
        let interaction: f64 = if self.n_spin == 1 {
            populations.iter().map(|n| 0.25 * n * n).sum::<f64>()
        } else {
            populations
                .outer_iter()
                .map(|n| n[0] * n[1])
                .sum::<f64>()
        };
        band + self.hubbard_u * interaction
    }
}

/// P = sum_i f_i C_i C_i^T over the occupied orbitals.
fn density_matrix(orbs: ArrayView2<f64>, f: &[f64]) -> Array2<f64> {
    let n: usize = orbs.nrows();
    let mut p: Array2<f64> = Array2::zeros([n, n]);
    for (i, f_i) in f.iter().enumerate().filter(|(_, f_i)| **f_i > 0.0) {
        let c_i: ArrayView2<f64> = orbs.slice(s![.., i..i + 1]);
        p.scaled_add(*f_i, &c_i.dot(&c_i.t()));
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn config() -> ModelConfig {
        toml::from_str("").unwrap()
    }

    #[test]
    fn invalid_models_are_rejected() {
        let mut odd = config();
        odd.n_electrons = 7;
        assert!(HubbardChain::new(&odd).is_err());
        odd.n_spin = 2;
        assert!(HubbardChain::new(&odd).is_ok());

        let mut crowded = config();
        crowded.n_electrons = 2 * crowded.n_sites + 2;
        assert!(HubbardChain::new(&crowded).is_err());

        let mut singular = config();
        singular.overlap = 0.5;
        assert!(HubbardChain::new(&singular).is_err());
    }

    #[test]
    fn density_has_the_right_number_of_electrons() {
        for n_spin in [1, 2] {
            let mut model_config = config();
            model_config.n_spin = n_spin;
            let model = HubbardChain::new(&model_config).unwrap();
            let fock = model.fock(model.initial_populations().view());
            let (density, _) = model.density(&fock).unwrap();
            let populations: Array2<f64> = model.populations(&density);
            assert_abs_diff_eq!(
                populations.sum(),
                model_config.n_electrons as f64,
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn blocks_cover_the_chain() {
        let mut model_config = config();
        model_config.n_sites = 7;
        model_config.n_electrons = 6;
        model_config.block_size = 3;
        let model = HubbardChain::new(&model_config).unwrap();
        assert_eq!(model.blk_sizes(), &[3, 3, 1]);
    }

    #[test]
    fn restricted_and_unrestricted_energies_agree() {
        let restricted = HubbardChain::new(&config()).unwrap();
        let mut model_config = config();
        model_config.n_spin = 2;
        let unrestricted = HubbardChain::new(&model_config).unwrap();

        let p_total: Array2<f64> = Array2::eye(8) * 0.5 + 0.1 * Array2::<f64>::ones([8, 8]);
        let p_spin: Array2<f64> = 0.5 * &p_total;
        let n_restricted: Array2<f64> = restricted.populations(&[p_total.clone()]);
        let n_unrestricted: Array2<f64> = unrestricted.populations(&[p_spin.clone(), p_spin.clone()]);
        assert_abs_diff_eq!(
            restricted.energy(&[p_total], n_restricted.view()),
            unrestricted.energy(&[p_spin.clone(), p_spin], n_unrestricted.view()),
            epsilon = 1e-12
        );

        // the Fock matrices of a closed shell agree as well
        let f_restricted = restricted.fock(n_restricted.view());
        let f_unrestricted = unrestricted.fock(n_unrestricted.view());
        assert_abs_diff_eq!(f_restricted[0], f_unrestricted[0], epsilon = 1e-12);
        assert_abs_diff_eq!(f_restricted[0], f_unrestricted[1], epsilon = 1e-12);
    }
}
