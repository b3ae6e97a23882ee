use crate::defaults::*;
use crate::scf::mixer::{ChargeMixer, ChargeMixerBuilder, MixingMethod};
use crate::scf::diis::{DiisStep, LsDiisStep};
use anyhow::{Context, Result};
use qsmix_polarization::PolarizationConfig;
use serde::{Deserialize, Serialize};

fn default_jobtype() -> String {
    String::from(JOBTYPE)
}
fn default_verbose() -> i8 {
    0
}
fn default_n_sites() -> usize {
    N_SITES
}
fn default_hopping() -> f64 {
    HOPPING
}
fn default_hubbard_u() -> f64 {
    HUBBARD_U
}
fn default_site_energy_alternation() -> f64 {
    SITE_ENERGY_ALTERNATION
}
fn default_overlap() -> f64 {
    NN_OVERLAP
}
fn default_n_electrons() -> usize {
    N_ELECTRONS
}
fn default_n_spin() -> usize {
    N_SPIN
}
fn default_block_size() -> usize {
    BLOCK_SIZE
}
fn default_scf_max_cycles() -> usize {
    MAX_ITER
}
fn default_scf_charge_conv() -> f64 {
    SCF_CHARGE_CONV
}
fn default_scf_energy_conv() -> f64 {
    SCF_ENERGY_CONV
}
fn default_diis_nbuffer() -> usize {
    DIIS_NBUFFER
}
fn default_eps_diis() -> f64 {
    EPS_DIIS
}
fn default_diis_nmixing() -> usize {
    DIIS_NMIXING
}
fn default_iter_ini_diis() -> usize {
    ITER_INI_DIIS
}
fn default_filter_eps() -> f64 {
    FILTER_EPS
}
fn default_mixing_method() -> MixingMethod {
    MIXING_METHOD
}
fn default_mixing_alpha() -> f64 {
    MIXING_ALPHA
}
fn default_nskip_mixing() -> usize {
    NSKIP_MIXING
}
fn default_n_simple_mix() -> usize {
    N_SIMPLE_MIX
}
fn default_mixing_nbuffer() -> usize {
    MIXING_NBUFFER
}
fn default_number_of_cores() -> usize {
    NUMBER_OF_CORES
}
fn default_number_of_ranks() -> usize {
    NUMBER_OF_RANKS
}
fn default_model_config() -> ModelConfig {
    let model_config: ModelConfig = toml::from_str("").unwrap();
    return model_config;
}
fn default_scf_config() -> ScfConfig {
    let scf_config: ScfConfig = toml::from_str("").unwrap();
    return scf_config;
}
fn default_diis_config() -> DiisConfig {
    let diis_config: DiisConfig = toml::from_str("").unwrap();
    return diis_config;
}
fn default_mixing_config() -> MixingConfig {
    let mixing_config: MixingConfig = toml::from_str("").unwrap();
    return mixing_config;
}
fn default_parallelization_config() -> ParallelizationConfig {
    let parallelization_config: ParallelizationConfig = toml::from_str("").unwrap();
    return parallelization_config;
}
fn default_polarization_config() -> PolarizationConfig {
    PolarizationConfig::default()
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Configuration {
    #[serde(default = "default_jobtype")]
    pub jobtype: String,
    #[serde(default = "default_verbose")]
    pub verbose: i8,
    #[serde(default = "default_model_config")]
    pub model: ModelConfig,
    #[serde(default = "default_scf_config")]
    pub scf: ScfConfig,
    #[serde(default = "default_diis_config")]
    pub diis: DiisConfig,
    #[serde(default = "default_mixing_config")]
    pub mixing: MixingConfig,
    #[serde(default = "default_parallelization_config")]
    pub parallelization: ParallelizationConfig,
    #[serde(default = "default_polarization_config")]
    pub polarization: PolarizationConfig,
}

/// Tight-binding chain with a mean-field Hubbard term that is converged by the SCF jobs.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct ModelConfig {
    #[serde(default = "default_n_sites")]
    pub n_sites: usize,
    #[serde(default = "default_hopping")]
    pub hopping: f64,
    #[serde(default = "default_hubbard_u")]
    pub hubbard_u: f64,
    #[serde(default = "default_site_energy_alternation")]
    pub site_energy_alternation: f64,
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    #[serde(default = "default_n_electrons")]
    pub n_electrons: usize,
    #[serde(default = "default_n_spin")]
    pub n_spin: usize,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct ScfConfig {
    #[serde(default = "default_scf_max_cycles")]
    pub scf_max_cycles: usize,
    #[serde(default = "default_scf_charge_conv")]
    pub scf_charge_conv: f64,
    #[serde(default = "default_scf_energy_conv")]
    pub scf_energy_conv: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct DiisConfig {
    #[serde(default = "default_diis_nbuffer")]
    pub nbuffer: usize,
    #[serde(default = "default_eps_diis")]
    pub eps_diis: f64,
    #[serde(default = "default_diis_nmixing")]
    pub nmixing: usize,
    #[serde(default = "default_iter_ini_diis")]
    pub iter_ini_diis: usize,
    #[serde(default = "default_filter_eps")]
    pub filter_eps: f64,
}

impl DiisConfig {
    /// Settings of a DIIS call with the current convergence measure `delta`.
    pub fn step(&self, delta: f64) -> DiisStep {
        DiisStep {
            delta,
            eps_diis: self.eps_diis,
            nmixing: self.nmixing,
        }
    }

    pub fn ls_step(&self, delta: f64) -> LsDiisStep {
        LsDiisStep {
            step: self.step(delta),
            iter_ini_diis: self.iter_ini_diis,
            filter_eps: self.filter_eps,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct MixingConfig {
    #[serde(default = "default_mixing_method")]
    pub method: MixingMethod,
    #[serde(default = "default_mixing_alpha")]
    pub alpha: f64,
    #[serde(default = "default_nskip_mixing")]
    pub nskip_mixing: usize,
    #[serde(default = "default_n_simple_mix")]
    pub n_simple_mix: usize,
    #[serde(default = "default_mixing_nbuffer")]
    pub nbuffer: usize,
}

impl MixingConfig {
    /// Initialize the charge mixer of one rank that owns the atoms `local_atoms`.
    pub fn build_mixer(&self, local_atoms: Vec<usize>) -> Result<ChargeMixer> {
        ChargeMixerBuilder::default()
            .method(self.method)
            .local_atoms(local_atoms)
            .alpha(self.alpha)
            .nskip_mixing(self.nskip_mixing)
            .n_simple_mix(self.n_simple_mix)
            .nbuffer(self.nbuffer)
            .build()
            .context("Could not initialize the charge mixer")
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct ParallelizationConfig {
    #[serde(default = "default_number_of_cores")]
    pub number_of_cores: usize,
    /// Ranks of the process group of the charge SCF.
    #[serde(default = "default_number_of_ranks")]
    pub number_of_ranks: usize,
}
