//! Cartesian derivatives of the (screened) Coulomb kernel.
//!
//! For a radial kernel f(r) the derivatives with respect to the components of
//! R are written with the radial functions B_n, which obey
//! B_n = ((2n - 1) B_(n-1) + (2 alpha^2)^n exp(-alpha^2 r^2) / (alpha sqrt(pi))) / r^2
//! for the erfc screened kernel and B_n = (2n - 1) B_(n-1) / r^2 for 1/r.
use crate::defaults::SQRT_PI;
use libm::erfc;

/// Radial functions B_0 ... B_4 of the kernel at distance `r`. `alpha = None`
/// gives the bare Coulomb kernel.
pub(crate) fn radial_functions(r: f64, alpha: Option<f64>) -> [f64; 5] {
    let r2: f64 = r * r;
    let mut b: [f64; 5] = [0.0; 5];
    match alpha {
        None => {
            b[0] = 1.0 / r;
            for n in 1..5 {
                b[n] = (2 * n - 1) as f64 * b[n - 1] / r2;
            }
        }
        Some(alpha) => {
            let expo: f64 = (-alpha * alpha * r2).exp() / (alpha * SQRT_PI);
            let two_alpha_sq: f64 = 2.0 * alpha * alpha;
            let mut prefactor: f64 = 1.0;
            b[0] = erfc(alpha * r) / r;
            for n in 1..5 {
                prefactor *= two_alpha_sq;
                b[n] = ((2 * n - 1) as f64 * b[n - 1] + prefactor * expo) / r2;
            }
        }
    }
    b
}

#[inline]
fn delta(a: usize, b: usize) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

/// Derivatives of the kernel up to fourth order for the separation vector `r`.
pub(crate) struct KernelDerivatives {
    pub f: f64,
    pub d1: [f64; 3],
    pub d2: [[f64; 3]; 3],
    pub d3: [[[f64; 3]; 3]; 3],
    pub d4: [[[[f64; 3]; 3]; 3]; 3],
}

impl KernelDerivatives {
    pub(crate) fn new(r: &[f64; 3], b: &[f64; 5]) -> Self {
        let mut d1: [f64; 3] = [0.0; 3];
        let mut d2: [[f64; 3]; 3] = [[0.0; 3]; 3];
        let mut d3: [[[f64; 3]; 3]; 3] = [[[0.0; 3]; 3]; 3];
        let mut d4: [[[[f64; 3]; 3]; 3]; 3] = [[[[0.0; 3]; 3]; 3]; 3];
        for a in 0..3 {
            d1[a] = -r[a] * b[1];
            for c in 0..3 {
                d2[a][c] = r[a] * r[c] * b[2] - delta(a, c) * b[1];
                for e in 0..3 {
                    d3[a][c][e] = -r[a] * r[c] * r[e] * b[3]
                        + (r[a] * delta(c, e) + r[c] * delta(a, e) + r[e] * delta(a, c)) * b[2];
                    for g in 0..3 {
                        d4[a][c][e][g] = r[a] * r[c] * r[e] * r[g] * b[4]
                            - (r[a] * r[c] * delta(e, g)
                                + r[a] * r[e] * delta(c, g)
                                + r[a] * r[g] * delta(c, e)
                                + r[c] * r[e] * delta(a, g)
                                + r[c] * r[g] * delta(a, e)
                                + r[e] * r[g] * delta(a, c))
                                * b[3]
                            + (delta(a, c) * delta(e, g)
                                + delta(a, e) * delta(c, g)
                                + delta(a, g) * delta(c, e))
                                * b[2];
                    }
                }
            }
        }
        Self {
            f: b[0],
            d1,
            d2,
            d3,
            d4,
        }
    }
}

/// Potential, field and field gradient at a point that are generated by a
/// point multipole (charge `q`, dipole `mu`, traceless convention quadrupole
/// `theta`) at separation `R` (field point minus source).
/// phi = q f - mu.d1 + theta:d2 / 3
pub(crate) fn multipole_contribution(
    kernel: &KernelDerivatives,
    q: f64,
    mu: &[f64; 3],
    theta: &[[f64; 3]; 3],
    with_quadrupole: bool,
) -> (f64, [f64; 3], [[f64; 3]; 3]) {
    let mut phi: f64 = q * kernel.f;
    let mut field: [f64; 3] = [0.0; 3];
    let mut gradient: [[f64; 3]; 3] = [[0.0; 3]; 3];
    for a in 0..3 {
        phi -= mu[a] * kernel.d1[a];
        field[a] -= q * kernel.d1[a];
        for c in 0..3 {
            field[c] += mu[a] * kernel.d2[a][c];
            gradient[a][c] -= q * kernel.d2[a][c];
            for e in 0..3 {
                gradient[c][e] += mu[a] * kernel.d3[a][c][e];
            }
        }
    }
    if with_quadrupole {
        for a in 0..3 {
            for c in 0..3 {
                let t: f64 = theta[a][c] / 3.0;
                if t == 0.0 {
                    continue;
                }
                phi += t * kernel.d2[a][c];
                for e in 0..3 {
                    field[e] -= t * kernel.d3[a][c][e];
                    for g in 0..3 {
                        gradient[e][g] -= t * kernel.d4[a][c][e][g];
                    }
                }
            }
        }
    }
    (phi, field, gradient)
}
