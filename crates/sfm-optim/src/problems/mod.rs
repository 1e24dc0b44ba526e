//! Refinement problems built on the IR and the solver backends.
//!
//! Each problem follows the same shape: a validated dataset, serializable
//! options, a `build_*_ir` function producing the IR plus initial values, and
//! an `optimize_*`/`refine_*` entry point that solves and unpacks the result.

pub mod bundle_adjustment;
pub mod relative_pose;
pub mod rig_bundle_adjustment;

use anyhow::Result;
use nalgebra::DVector;
use std::collections::HashMap;

use crate::backend::{evaluate_residuals, BackendSolution};
use crate::ir::{FixedMask, ProblemIR};
use sfm_core::CameraModelKind;

/// Fixed mask for an intrinsics block given which parameter groups are refined.
pub(crate) fn intrinsics_mask(
    model: CameraModelKind,
    refine_focal_length: bool,
    refine_principal_point: bool,
    refine_extra_params: bool,
) -> FixedMask {
    let mut fixed = Vec::new();
    if !refine_focal_length {
        fixed.extend_from_slice(model.focal_length_idxs());
    }
    if !refine_principal_point {
        fixed.extend_from_slice(model.principal_point_idxs());
    }
    if !refine_extra_params {
        fixed.extend_from_slice(model.extra_params_idxs());
    }
    FixedMask::fix_indices(&fixed)
}

/// Count how many times each point is observed.
pub(crate) fn track_lengths<'a>(
    num_points: usize,
    point_indices: impl Iterator<Item = &'a usize>,
) -> Vec<usize> {
    let mut counts = vec![0; num_points];
    for &idx in point_indices {
        if let Some(c) = counts.get_mut(idx) {
            *c += 1;
        }
    }
    counts
}

/// Solved value of a block, if the block took part in the problem.
pub(crate) fn solved<'a>(solution: &'a BackendSolution, key: &str) -> Option<&'a DVector<f64>> {
    solution.params.get(key)
}

/// Mean Euclidean norm of the residual blocks at `params`.
pub(crate) fn mean_residual_norm(
    ir: &ProblemIR,
    params: &HashMap<String, DVector<f64>>,
) -> Result<f64> {
    let residuals = evaluate_residuals(ir, params)?;
    if residuals.is_empty() {
        return Ok(0.0);
    }
    Ok(residuals.iter().map(|r| r.norm()).sum::<f64>() / residuals.len() as f64)
}
