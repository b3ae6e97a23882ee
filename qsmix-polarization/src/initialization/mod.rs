pub use config::*;
pub use state::*;

pub mod config;
pub mod state;
