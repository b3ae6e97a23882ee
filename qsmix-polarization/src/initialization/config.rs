use crate::defaults::*;
use crate::electrostatics::ElectrostaticsType;
use serde::{Deserialize, Serialize};

fn default_algorithm() -> PolarizationAlgorithm {
    PolarizationAlgorithm::SelfConsistent
}
fn default_max_ipol_iter() -> usize {
    MAX_IPOL_ITER
}
fn default_eps_pol() -> f64 {
    EPS_POL
}
fn default_debug() -> bool {
    POL_SCF_DEBUG
}
fn default_save_dipoles() -> bool {
    SAVE_DIPOLES
}
fn default_ewald_type() -> ElectrostaticsType {
    ElectrostaticsType::None
}
fn default_ewald_alpha() -> f64 {
    EWALD_ALPHA
}
fn default_ewald_gmax() -> usize {
    EWALD_GMAX
}
fn default_ewald_rcut() -> f64 {
    EWALD_RCUT
}
fn default_kinds() -> Vec<KindConfig> {
    Vec::new()
}
fn default_electrostatics_config() -> ElectrostaticsConfig {
    let config: ElectrostaticsConfig = toml::from_str("").unwrap();
    config
}

/// Algorithm that is used to converge the induced multipoles.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolarizationAlgorithm {
    /// Direct fixed point substitution of the induced multipoles.
    #[serde(rename = "sc")]
    SelfConsistent,
    /// Conjugate gradient solution of the induced dipole equations.
    #[serde(rename = "cg")]
    ConjugateGradient,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PolarizationConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: PolarizationAlgorithm,
    #[serde(default = "default_max_ipol_iter")]
    pub max_ipol_iter: usize,
    #[serde(default = "default_eps_pol")]
    pub eps_pol: f64,
    #[serde(default = "default_debug")]
    pub debug: bool,
    #[serde(default = "default_save_dipoles")]
    pub save_dipoles: bool,
    #[serde(default = "default_electrostatics_config")]
    pub electrostatics: ElectrostaticsConfig,
    #[serde(default = "default_kinds")]
    pub kinds: Vec<KindConfig>,
}

impl Default for PolarizationConfig {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

impl PolarizationConfig {
    /// Returns the parameters of the kind with the given element symbol.
    pub fn kind(&self, element: &str) -> Option<&KindConfig> {
        self.kinds
            .iter()
            .find(|kind| kind.element.eq_ignore_ascii_case(element))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ElectrostaticsConfig {
    #[serde(default = "default_ewald_type")]
    pub ewald_type: ElectrostaticsType,
    #[serde(default = "default_ewald_alpha")]
    pub alpha: f64,
    #[serde(default = "default_ewald_gmax")]
    pub gmax: usize,
    #[serde(default = "default_ewald_rcut")]
    pub rcut: f64,
    /// Orthorhombic box lengths in bohr. If absent, the cell of the geometry file is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_lengths: Option<[f64; 3]>,
}

/// Force field parameters of one atomic kind.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KindConfig {
    pub element: String,
    #[serde(default)]
    pub charge: f64,
    #[serde(default)]
    pub apol: f64,
    #[serde(default)]
    pub cpol: f64,
}
