pub mod defaults;
pub mod electrostatics;
pub mod initialization;
pub mod interface;
mod output;
pub mod solver;

pub use electrostatics::{build_evaluator, ElectrostaticsType, MultipoleField};
pub use initialization::{
    ElectrostaticsConfig, InducedMultipoleState, KindConfig, PolarizableKind,
    PolarizationAlgorithm, PolarizationConfig,
};
pub use interface::{FieldEvaluation, FieldEvaluator};
pub use solver::{PolarizationError, PolarizationResult, PolarizationSolver};
