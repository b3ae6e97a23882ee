use crate::defaults::SQRT_PI;
use crate::electrostatics::tensors::{multipole_contribution, radial_functions, KernelDerivatives};
use crate::interface::{FieldEvaluation, FieldEvaluator};
use itertools::iproduct;
use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Periodic boundary conditions of the classic Ewald summation.
#[derive(Debug, Clone)]
pub struct EwaldParameters {
    pub alpha: f64,
    pub gmax: usize,
    pub rcut: f64,
    pub box_lengths: [f64; 3],
}

/// Electrostatic field of permanent point charges and induced point dipoles and
/// quadrupoles. Without `ewald` the interactions are summed directly with open
/// boundaries, otherwise the classic Ewald summation in an orthorhombic box is used.
#[derive(Debug, Clone)]
pub struct MultipoleField {
    positions: Array2<f64>,
    charges: Array1<f64>,
    ewald: Option<EwaldParameters>,
    k_vectors: Vec<([f64; 3], f64)>,
}

impl MultipoleField {
    pub fn direct(positions: Array2<f64>, charges: Array1<f64>) -> Self {
        Self {
            positions,
            charges,
            ewald: None,
            k_vectors: Vec::new(),
        }
    }

    pub fn ewald(positions: Array2<f64>, charges: Array1<f64>, parameters: EwaldParameters) -> Self {
        let k_vectors = reciprocal_vectors(&parameters);
        debug!(
            "Ewald summation with {} reciprocal lattice vectors",
            k_vectors.len()
        );
        Self {
            positions,
            charges,
            ewald: Some(parameters),
            k_vectors,
        }
    }

    fn separation(&self, i: usize, j: usize) -> [f64; 3] {
        let mut r: [f64; 3] = [0.0; 3];
        for a in 0..3 {
            r[a] = self.positions[[i, a]] - self.positions[[j, a]];
            if let Some(ewald) = &self.ewald {
                let length: f64 = ewald.box_lengths[a];
                r[a] -= length * (r[a] / length).round();
            }
        }
        r
    }

    /// Potential, field and field gradient at every atom from the real space
    /// (or direct) sum.
    fn real_space(
        &self,
        dipoles: ArrayView2<f64>,
        quadrupoles: ArrayView3<f64>,
        with_quadrupole: bool,
    ) -> Vec<(f64, [f64; 3], [[f64; 3]; 3])> {
        let n_atoms: usize = self.charges.len();
        let alpha: Option<f64> = self.ewald.as_ref().map(|ewald| ewald.alpha);
        let rcut: f64 = self
            .ewald
            .as_ref()
            .map(|ewald| ewald.rcut)
            .unwrap_or(f64::INFINITY);

        (0..n_atoms)
            .into_par_iter()
            .map(|i| {
                let mut phi: f64 = 0.0;
                let mut field: [f64; 3] = [0.0; 3];
                let mut gradient: [[f64; 3]; 3] = [[0.0; 3]; 3];
                for j in 0..n_atoms {
                    if i == j {
                        continue;
                    }
                    let r: [f64; 3] = self.separation(i, j);
                    let distance: f64 = (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt();
                    if distance > rcut {
                        continue;
                    }
                    let kernel = KernelDerivatives::new(&r, &radial_functions(distance, alpha));
                    let mu: [f64; 3] = [dipoles[[j, 0]], dipoles[[j, 1]], dipoles[[j, 2]]];
                    let theta: [[f64; 3]; 3] = matrix_of(quadrupoles.slice(s![j, .., ..]));
                    let (p, e, g) =
                        multipole_contribution(&kernel, self.charges[j], &mu, &theta, with_quadrupole);
                    phi += p;
                    for a in 0..3 {
                        field[a] += e[a];
                        for c in 0..3 {
                            gradient[a][c] += g[a][c];
                        }
                    }
                }
                (phi, field, gradient)
            })
            .collect()
    }

    /// Adds the reciprocal space sum and removes the self interaction that it contains.
    fn reciprocal_space(
        &self,
        ewald: &EwaldParameters,
        dipoles: ArrayView2<f64>,
        quadrupoles: ArrayView3<f64>,
        potential: &mut Array1<f64>,
        efield1: &mut Array2<f64>,
        efield2: &mut Array3<f64>,
    ) {
        let n_atoms: usize = self.charges.len();
        let volume: f64 = ewald.box_lengths.iter().product();
        let prefactor: f64 = 4.0 * PI / volume;

        for (k, damping) in self.k_vectors.iter() {
            let phases: Vec<(f64, f64)> = (0..n_atoms)
                .map(|j| {
                    let kr: f64 = (0..3).map(|a| k[a] * self.positions[[j, a]]).sum();
                    (kr.cos(), kr.sin())
                })
                .collect();

            // Structure factor of the multipoles S(k) = sum_j z_j exp(-i k.r_j)
            // with z_j = q_j - k.theta_j.k / 3 - i k.mu_j
            let mut s_re: f64 = 0.0;
            let mut s_im: f64 = 0.0;
            for j in 0..n_atoms {
                let mut a: f64 = self.charges[j];
                for c in 0..3 {
                    for e in 0..3 {
                        a -= k[c] * quadrupoles[[j, c, e]] * k[e] / 3.0;
                    }
                }
                let b: f64 = (0..3).map(|c| k[c] * dipoles[[j, c]]).sum();
                let (cos_j, sin_j) = phases[j];
                s_re += a * cos_j - b * sin_j;
                s_im -= a * sin_j + b * cos_j;
            }

            for i in 0..n_atoms {
                let (cos_i, sin_i) = phases[i];
                let re: f64 = prefactor * damping * (s_re * cos_i - s_im * sin_i);
                let im: f64 = prefactor * damping * (s_re * sin_i + s_im * cos_i);
                potential[i] += re;
                for c in 0..3 {
                    efield1[[i, c]] += k[c] * im;
                    for e in 0..3 {
                        efield2[[i, c, e]] += k[c] * k[e] * re;
                    }
                }
            }
        }

        // Self interaction of the Gaussian screening charges, from the Taylor
        // expansion erf(alpha r)/r = c0 + c2 r^2 + c4 r^4 + ...
        let alpha: f64 = ewald.alpha;
        let c0: f64 = 2.0 * alpha / SQRT_PI;
        let c2: f64 = -2.0 * alpha.powi(3) / (3.0 * SQRT_PI);
        let c4: f64 = alpha.powi(5) / (5.0 * SQRT_PI);
        for i in 0..n_atoms {
            let theta = quadrupoles.slice(s![i, .., ..]);
            let trace: f64 = theta[[0, 0]] + theta[[1, 1]] + theta[[2, 2]];
            potential[i] -= c0 * self.charges[i] + 2.0 * c2 * trace / 3.0;
            for c in 0..3 {
                efield1[[i, c]] -= 2.0 * c2 * dipoles[[i, c]];
                efield2[[i, c, c]] += 2.0 * c2 * self.charges[i];
                for e in 0..3 {
                    let mut self_term: f64 = theta[[c, e]] + theta[[e, c]];
                    if c == e {
                        self_term += trace;
                    }
                    efield2[[i, c, e]] += 8.0 * c4 / 3.0 * self_term;
                }
            }
        }
    }
}

impl FieldEvaluator for MultipoleField {
    fn n_atoms(&self) -> usize {
        self.charges.len()
    }

    fn evaluate(
        &mut self,
        dipoles: ArrayView2<f64>,
        quadrupoles: ArrayView3<f64>,
    ) -> FieldEvaluation {
        let n_atoms: usize = self.charges.len();
        let with_quadrupole: bool = quadrupoles.iter().any(|x| *x != 0.0);

        let mut potential: Array1<f64> = Array1::zeros([n_atoms]);
        let mut result: FieldEvaluation = FieldEvaluation::zeros(n_atoms);

        for (i, (phi, field, gradient)) in self
            .real_space(dipoles, quadrupoles, with_quadrupole)
            .into_iter()
            .enumerate()
        {
            potential[i] = phi;
            for a in 0..3 {
                result.efield1[[i, a]] = field[a];
                for c in 0..3 {
                    result.efield2[[i, a, c]] = gradient[a][c];
                }
            }
        }

        if let Some(ewald) = self.ewald.clone() {
            self.reciprocal_space(
                &ewald,
                dipoles,
                quadrupoles,
                &mut potential,
                &mut result.efield1,
                &mut result.efield2,
            );
        }

        // E = 1/2 sum_i (q_i phi_i - mu_i.E_i - theta_i:grad E_i / 3)
        let mut energy: f64 = 0.0;
        for i in 0..n_atoms {
            energy += self.charges[i] * potential[i];
            energy -= dipoles.row(i).dot(&result.efield1.row(i));
            energy -= (&quadrupoles.slice(s![i, .., ..]) * &result.efield2.slice(s![i, .., ..]))
                .sum()
                / 3.0;
        }
        energy *= 0.5;

        // neutralizing background of a charged cell
        if let Some(ewald) = &self.ewald {
            let total_charge: f64 = self.charges.sum();
            let volume: f64 = ewald.box_lengths.iter().product();
            energy -= PI * total_charge * total_charge / (2.0 * volume * ewald.alpha.powi(2));
        }
        result.energy = energy;
        result
    }
}

fn matrix_of(theta: ArrayView2<f64>) -> [[f64; 3]; 3] {
    let mut matrix: [[f64; 3]; 3] = [[0.0; 3]; 3];
    for a in 0..3 {
        for c in 0..3 {
            matrix[a][c] = theta[[a, c]];
        }
    }
    matrix
}

/// All k-vectors 2 pi n / L with 0 < |n_i| <= gmax together with the
/// damping factor exp(-k^2 / 4 alpha^2) / k^2.
fn reciprocal_vectors(parameters: &EwaldParameters) -> Vec<([f64; 3], f64)> {
    let gmax: i64 = parameters.gmax as i64;
    let alpha_sq: f64 = parameters.alpha * parameters.alpha;
    iproduct!(-gmax..=gmax, -gmax..=gmax, -gmax..=gmax)
        .filter(|(nx, ny, nz)| !(*nx == 0 && *ny == 0 && *nz == 0))
        .map(|(nx, ny, nz)| {
            let k: [f64; 3] = [
                2.0 * PI * nx as f64 / parameters.box_lengths[0],
                2.0 * PI * ny as f64 / parameters.box_lengths[1],
                2.0 * PI * nz as f64 / parameters.box_lengths[2],
            ];
            let k_sq: f64 = k.iter().map(|x| x * x).sum();
            (k, (-k_sq / (4.0 * alpha_sq)).exp() / k_sq)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cscl_cell(alpha: f64) -> MultipoleField {
        let length: f64 = 4.0;
        let positions: Array2<f64> = array![[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]];
        let charges: Array1<f64> = array![1.0, -1.0];
        MultipoleField::ewald(
            positions,
            charges,
            EwaldParameters {
                alpha,
                gmax: 10,
                rcut: 1.99 * length,
                box_lengths: [length; 3],
            },
        )
    }

    #[test]
    fn madelung_energy_of_cesium_chloride() {
        let mut field = cscl_cell(1.5);
        let evaluation = field.evaluate(Array2::zeros([2, 3]).view(), Array3::zeros([2, 3, 3]).view());
        // nearest neighbour distance sqrt(3) * L / 2, Madelung constant 1.762675
        let r0: f64 = 3.0_f64.sqrt() * 2.0;
        assert_abs_diff_eq!(evaluation.energy, -1.762675 / r0, epsilon = 1e-5);
        // the field vanishes at every ion by symmetry
        for value in evaluation.efield1.iter() {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn ewald_field_does_not_depend_on_splitting() {
        let mut dipoles: Array2<f64> = Array2::zeros([2, 3]);
        dipoles[[0, 2]] = 0.3;
        dipoles[[1, 0]] = -0.2;
        let quadrupoles: Array3<f64> = Array3::zeros([2, 3, 3]);
        let first = cscl_cell(1.2).evaluate(dipoles.view(), quadrupoles.view());
        let second = cscl_cell(1.5).evaluate(dipoles.view(), quadrupoles.view());
        assert_abs_diff_eq!(first.energy, second.energy, epsilon = 1e-6);
        for (a, b) in first.efield1.iter().zip(second.efield1.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn direct_field_of_two_charges() {
        let positions: Array2<f64> = array![[0.0, 0.0, 0.0], [0.0, 0.0, 2.0]];
        let mut field = MultipoleField::direct(positions, array![1.0, 0.0]);
        let evaluation = field.evaluate(Array2::zeros([2, 3]).view(), Array3::zeros([2, 3, 3]).view());
        assert_abs_diff_eq!(evaluation.efield1[[1, 2]], 0.25, epsilon = 1e-14);
        assert_abs_diff_eq!(evaluation.efield1[[0, 2]], 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(evaluation.energy, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn direct_energy_of_charge_and_dipole() {
        let positions: Array2<f64> = array![[0.0, 0.0, 0.0], [0.0, 0.0, 2.0]];
        let mut field = MultipoleField::direct(positions, array![1.0, 0.0]);
        let mut dipoles: Array2<f64> = Array2::zeros([2, 3]);
        dipoles[[1, 2]] = 1.0;
        let evaluation = field.evaluate(dipoles.view(), Array3::zeros([2, 3, 3]).view());
        // -mu.E = -1 * 1/4
        assert_abs_diff_eq!(evaluation.energy, -0.25, epsilon = 1e-14);
    }
}
