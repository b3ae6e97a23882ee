// maximal number of iterations of the induced multipole solver
pub const MAX_IPOL_ITER: usize = 100;
// convergence threshold for the rms deviation of the induced multipoles
pub const EPS_POL: f64 = 1.0e-8;
// recompute the conjugate gradient residual explicitly and check it at the end
pub const POL_SCF_DEBUG: bool = false;
// write the induced dipoles to a npy file
pub const SAVE_DIPOLES: bool = false;
pub const DIPOLES_FILE_NAME: &str = "induced_dipoles.npy";

// Electrostatics
// Ewald splitting parameter in 1/bohr
pub const EWALD_ALPHA: f64 = 0.35;
// largest reciprocal lattice index in each direction
pub const EWALD_GMAX: usize = 6;
// real space cutoff in bohr
pub const EWALD_RCUT: f64 = 15.0;

// The Ewald splitting constants below are used for the self interaction terms.
pub const SQRT_PI: f64 = 1.772_453_850_905_516;
