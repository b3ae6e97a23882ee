use crate::scf::mixer::MixingMethod;

// JOB SPECIFICATION
pub const JOBTYPE: &str = "scf";
// config file
pub const CONFIG_FILE_NAME: &str = "qsmix.toml";

// MODEL
// sites of the open tight-binding chain, one orbital per site
pub const N_SITES: usize = 8;
// nearest neighbour hopping in Hartree
pub const HOPPING: f64 = -0.5;
// on-site repulsion of the mean-field Hubbard term in Hartree
pub const HUBBARD_U: f64 = 0.4;
// on-site energies alternate between +/- half of this value
pub const SITE_ENERGY_ALTERNATION: f64 = 0.3;
// nearest neighbour overlap, zero gives an orthogonal basis
pub const NN_OVERLAP: f64 = 0.1;
pub const N_ELECTRONS: usize = 8;
pub const N_SPIN: usize = 1;
// block size of the block-sparse matrices
pub const BLOCK_SIZE: usize = 2;

// SCF ITERATION
// stop SCF calculation after maxiter iterations
pub const MAX_ITER: usize = 100;
// convergence threshold for the change of the density matrix/charges
pub const SCF_CHARGE_CONV: f64 = 1.0e-7;
pub const SCF_ENERGY_CONV: f64 = 1.0e-9;

// DIIS
// number of stored Kohn-Sham matrices
pub const DIIS_NBUFFER: usize = 4;
// DIIS is only used if the error and the SCF change are below this value
pub const EPS_DIIS: f64 = 0.1;
// number of calls before the first extrapolation
pub const DIIS_NMIXING: usize = 2;
// first SCF iteration of the linear scaling SCF that uses the extrapolated matrix
pub const ITER_INI_DIIS: usize = 2;
// blocks with a smaller Frobenius norm are dropped from block-sparse products
pub const FILTER_EPS: f64 = 1.0e-12;
// eigenvalues of the DIIS system below this absolute value are discarded
pub const DIIS_EIGENVALUE_THRESHOLD: f64 = 1.0e-12;

// CHARGE MIXING
pub const MIXING_METHOD: MixingMethod = MixingMethod::Broyden;
pub const MIXING_ALPHA: f64 = 0.4;
// iterations without any mixing
pub const NSKIP_MIXING: usize = 0;
// iterations of simple mixing before the configured method is used
pub const N_SIMPLE_MIX: usize = 0;
// length of the charge history
pub const MIXING_NBUFFER: usize = 8;

// Broyden
pub const BROYDEN_OMEGA0: f64 = 0.01;
pub const BROYDEN_MIN_WEIGHT: f64 = 1.0;
pub const BROYDEN_MAX_WEIGHT: f64 = 1.0e5;
pub const BROYDEN_WEIGHT_FACTOR: f64 = 0.01;
// singular values below rskip times the largest one are dropped
pub const BROYDEN_RSKIP: f64 = 1.0e-12;

// PARALLELIZATION
pub const NUMBER_OF_CORES: usize = 1;
pub const NUMBER_OF_RANKS: usize = 1;
