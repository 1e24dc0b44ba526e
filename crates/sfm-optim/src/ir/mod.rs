//! Backend-independent intermediate representation of refinement problems.

mod types;

pub use types::{
    Bound, FactorKind, FixedMask, ManifoldKind, ParamBlock, ParamId, ParamSlot, ProblemIR,
    ResidualBlock, RobustLoss,
};
