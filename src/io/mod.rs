mod coordinates;
mod imprint;
mod input;
pub(crate) mod settings;

pub use coordinates::*;
pub use imprint::{write_footer, write_header};
pub use input::*;
pub use settings::Configuration;
