//! Differentiable bundle-adjustment residuals and refinement problems.
//!
//! The crate is organized in layers:
//! - [`factors`]: the four residuals (reprojection, fixed-pose reprojection,
//!   rig reprojection and two-view Sampson error), generic over the scalar
//!   type and the camera model,
//! - [`jacobian`]: forward-mode Jacobians of any factor through dual numbers,
//! - [`ir`]: a backend-independent description of parameter blocks and
//!   residual blocks with strict validation,
//! - [`backend`]: compilation of the IR into a `tiny-solver` problem,
//! - [`problems`]: bundle adjustment, rig bundle adjustment and relative pose
//!   refinement built on the layers above.
//!
//! Residual evaluation never fails: degenerate geometry (zero depth, a
//! vanishing epipolar denominator) yields non-finite values that the solver
//! and robust losses have to deal with.

pub mod backend;
pub mod factors;
pub mod ir;
pub mod jacobian;
pub mod params;
pub mod problems;

pub use backend::{BackendSolveOptions, BackendSolution, LinearSolverKind};
pub use factors::{
    CostFunction, FactorError, FixedPoseReprojectionFactor, RelativePoseFactor,
    ReprojectionFactor, RigReprojectionFactor,
};
pub use ir::RobustLoss;
