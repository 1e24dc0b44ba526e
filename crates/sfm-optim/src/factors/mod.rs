//! Residual factor implementations with automatic differentiation support.
//!
//! Factors (also called cost functions or residual blocks) compute the
//! difference between an observed measurement and the prediction made from
//! the current parameter values. Every factor is generic over
//! [`nalgebra::RealField`] so the same formula is evaluated with `f64` for
//! plain residuals and with dual numbers when the solver asks for Jacobians.
//!
//! # Design Pattern
//!
//! A factor is a small immutable struct holding its constants (the observation,
//! and for [`FixedPoseReprojectionFactor`] the pose). It exposes a typed
//! `residual` method and implements [`CostFunction`], which declares the
//! parameter block sizes and evaluates from a list of block slices:
//!
//! ```rust,ignore
//! impl CostFunction for MyFactor {
//!     const NUM_RESIDUALS: usize = 2;
//!
//!     fn parameter_block_sizes(&self) -> Vec<usize> {
//!         vec![4, 3]
//!     }
//!
//!     fn evaluate<T: RealField>(&self, params: &[&[T]]) -> DVector<T> {
//!         let r = self.residual(params[0], params[1]);
//!         DVector::from_column_slice(r.as_slice())
//!     }
//! }
//! ```
//!
//! ## Key Guidelines
//!
//! - Use `.clone()` on `T: RealField` values (dual numbers are not `Copy`)
//! - Convert constants with [`nalgebra::convert`]
//! - Never branch on values: degenerate inputs propagate NaN/Inf to the solver
//! - Parameter block sizes are checked at registration, not during evaluation
//!
//! # Available Factors
//!
//! - [`ReprojectionFactor`] - pose, point and intrinsics all variable
//! - [`FixedPoseReprojectionFactor`] - pose captured as a constant
//! - [`RigReprojectionFactor`] - rig pose composed with a camera-in-rig pose
//! - [`RelativePoseFactor`] - squared Sampson error of a two-view correspondence

mod relative_pose;
mod reprojection;
mod rig;

pub use relative_pose::RelativePoseFactor;
pub use reprojection::{FixedPoseReprojectionFactor, ReprojectionFactor};
pub use rig::RigReprojectionFactor;

use nalgebra::{DVector, RealField};
use thiserror::Error;
use tiny_solver::factors::Factor;

/// Parameter block mismatch detected when registering a factor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactorError {
    #[error("expected {expected} parameter blocks, got {got}")]
    BlockCount { expected: usize, got: usize },
    #[error("parameter block {block} expects {expected} values, got {got}")]
    BlockSize {
        block: usize,
        expected: usize,
        got: usize,
    },
}

/// A residual generic over the scalar type.
///
/// `evaluate` always succeeds and returns exactly `NUM_RESIDUALS` values;
/// degenerate geometry yields non-finite entries instead of an error.
pub trait CostFunction: Send + Sync {
    /// Length of the residual vector.
    const NUM_RESIDUALS: usize;

    /// Sizes of the parameter blocks, in evaluation order.
    fn parameter_block_sizes(&self) -> Vec<usize>;

    /// Evaluate the residual. `params` must match [`Self::parameter_block_sizes`].
    fn evaluate<T: RealField>(&self, params: &[&[T]]) -> DVector<T>;
}

/// Check that `sizes` matches the factor's declared parameter blocks.
pub fn check_parameter_blocks<F: CostFunction>(
    factor: &F,
    sizes: &[usize],
) -> Result<(), FactorError> {
    let expected = factor.parameter_block_sizes();
    if expected.len() != sizes.len() {
        return Err(FactorError::BlockCount {
            expected: expected.len(),
            got: sizes.len(),
        });
    }
    for (block, (&want, &got)) in expected.iter().zip(sizes).enumerate() {
        if want != got {
            return Err(FactorError::BlockSize {
                block,
                expected: want,
                got,
            });
        }
    }
    Ok(())
}

/// Callback receiving a concrete factor type.
///
/// Used to turn a runtime factor description into a monomorphized factor.
pub trait FactorVisitor {
    type Output;

    fn visit<F: CostFunction + Clone + 'static>(self, factor: F) -> Self::Output;
}

/// Adapter exposing a [`CostFunction`] as a tiny-solver factor.
#[derive(Debug, Clone)]
pub struct SolverFactor<F>(pub F);

impl<F: CostFunction, T: RealField> Factor<T> for SolverFactor<F> {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let blocks: Vec<&[T]> = params.iter().map(|p| p.as_slice()).collect();
        self.0.evaluate(&blocks)
    }
}

/// Assert that stepping any single parameter by `+h` or `-h` away from
/// `blocks` increases the residual norm.
#[cfg(test)]
pub(crate) fn assert_strict_local_minimum<F: CostFunction>(
    factor: &F,
    blocks: &[Vec<f64>],
    h: f64,
) {
    let norm_at = |blocks: &[Vec<f64>]| {
        let views: Vec<&[f64]> = blocks.iter().map(|b| b.as_slice()).collect();
        factor.evaluate::<f64>(&views).norm()
    };
    let base = norm_at(blocks);
    assert!(base < 1e-9, "not a zero-residual configuration: {base}");
    for (block, values) in blocks.iter().enumerate() {
        for idx in 0..values.len() {
            for step in [h, -h] {
                let mut stepped = blocks.to_vec();
                stepped[block][idx] += step;
                let norm = norm_at(&stepped);
                assert!(
                    norm > base,
                    "block {block}[{idx}] step {step:+e}: {norm:e} <= {base:e}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfm_core::{Pinhole, Vec2};

    #[test]
    fn block_checks_report_count_and_size() {
        let factor = ReprojectionFactor::<Pinhole>::new(Vec2::new(1.0, 2.0));
        assert_eq!(factor.parameter_block_sizes(), vec![4, 3, 3, 4]);
        assert!(check_parameter_blocks(&factor, &[4, 3, 3, 4]).is_ok());
        assert_eq!(
            check_parameter_blocks(&factor, &[4, 3, 3]),
            Err(FactorError::BlockCount {
                expected: 4,
                got: 3
            })
        );
        assert_eq!(
            check_parameter_blocks(&factor, &[4, 3, 3, 5]),
            Err(FactorError::BlockSize {
                block: 3,
                expected: 4,
                got: 5
            })
        );
    }

    #[test]
    fn solver_adapter_forwards_blocks() {
        let factor = RelativePoseFactor::new(Vec2::new(0.1, 0.0), Vec2::new(0.1, 0.0));
        let adapter = SolverFactor(factor.clone());
        let q = DVector::from_row_slice(&[0.0, 0.0, 0.0, 1.0]);
        let t = DVector::from_row_slice(&[0.0, 1.0, 0.0]);
        let r = adapter.residual_func(&[q.clone(), t.clone()]);
        let direct = factor.evaluate::<f64>(&[q.as_slice(), t.as_slice()]);
        assert_eq!(r, direct);
        assert_eq!(r.len(), RelativePoseFactor::NUM_RESIDUALS);
    }
}
