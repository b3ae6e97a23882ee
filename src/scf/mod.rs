pub mod diis;
pub mod history;
pub mod linalg;
pub mod logging;
pub mod mixer;
pub mod model;
pub(crate) mod scf_routine;

pub use model::HubbardChain;
pub use scf_routine::{ScfError, SelfConsistentField};
