// conversion factor from bohr to angstrom
pub const BOHR_TO_ANGS: f64 = 0.529177210903;
