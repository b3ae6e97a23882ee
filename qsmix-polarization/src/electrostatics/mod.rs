pub use multipole::{EwaldParameters, MultipoleField};

mod multipole;
mod tensors;

use crate::initialization::ElectrostaticsConfig;
use anyhow::{bail, Result};
use log::{info, warn};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Treatment of the long range electrostatics.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElectrostaticsType {
    /// Direct summation with open boundary conditions.
    None,
    /// Classic Ewald summation.
    Ewald,
    /// Particle mesh Ewald.
    Pme,
    /// Smooth particle mesh Ewald.
    Spme,
}

impl fmt::Display for ElectrostaticsType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name: &str = match self {
            ElectrostaticsType::None => "NONE",
            ElectrostaticsType::Ewald => "EWALD",
            ElectrostaticsType::Pme => "PME",
            ElectrostaticsType::Spme => "SPME",
        };
        write!(f, "{}", name)
    }
}

/// Creates the field evaluator for the polarization solver. Only the direct
/// summation and the classic Ewald summation can handle induced multipoles.
/// `cell` is used if the configuration does not specify the box lengths.
pub fn build_evaluator(
    config: &ElectrostaticsConfig,
    positions: Array2<f64>,
    charges: Array1<f64>,
    cell: Option<[f64; 3]>,
) -> Result<MultipoleField> {
    match config.ewald_type {
        ElectrostaticsType::None => {
            info!("{: <25} {}", "electrostatics:", "direct summation");
            Ok(MultipoleField::direct(positions, charges))
        }
        ElectrostaticsType::Ewald => {
            let box_lengths: [f64; 3] = match config.box_lengths.or(cell) {
                Some(lengths) => lengths,
                None => bail!("The Ewald summation requires the box lengths of the periodic cell"),
            };
            let half_box: f64 = box_lengths.iter().cloned().fold(f64::INFINITY, f64::min) / 2.0;
            if config.rcut > half_box {
                warn!(
                    "The real space cutoff {:.4} is larger than half the box length {:.4}",
                    config.rcut, half_box
                );
            }
            info!("{: <25} {}", "electrostatics:", "classic Ewald summation");
            info!("{: <25} {:.6}", "Ewald alpha:", config.alpha);
            info!("{: <25} {}", "Ewald gmax:", config.gmax);
            Ok(MultipoleField::ewald(
                positions,
                charges,
                EwaldParameters {
                    alpha: config.alpha,
                    gmax: config.gmax,
                    rcut: config.rcut,
                    box_lengths,
                },
            ))
        }
        ElectrostaticsType::Pme | ElectrostaticsType::Spme => bail!(
            "Ewald type {} is not implemented for induced multipoles, use EWALD or NONE",
            config.ewald_type
        ),
    }
}
