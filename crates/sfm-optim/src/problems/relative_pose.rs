//! Two-view relative pose refinement.
//!
//! Refines the rotation and translation direction between two calibrated
//! views by minimizing the Sampson error of normalized correspondences. The
//! translation lives on the unit sphere since two views only observe its
//! direction.

use crate::backend::{solve_with_backend, BackendKind, BackendSolveOptions};
use crate::ir::{FactorKind, FixedMask, ManifoldKind, ProblemIR, ResidualBlock, RobustLoss};
use crate::params::{rotation_from_block, rotation_to_block, vec3_from_block, vec3_to_block};
use anyhow::{anyhow, ensure, Result};
use log::info;
use nalgebra::{DVector, UnitQuaternion};
use serde::{Deserialize, Serialize};
use sfm_core::{Vec2, Vec3, QUAT_DIM, VEC3_DIM};
use std::collections::HashMap;

/// Fewest correspondences accepted; five constrain the five pose degrees of freedom.
pub const MIN_CORRESPONDENCES: usize = 5;

const ROTATION_KEY: &str = "rotation";
const TRANSLATION_KEY: &str = "translation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativePoseOptions {
    pub robust_loss: RobustLoss,
}

impl Default for RelativePoseOptions {
    fn default() -> Self {
        Self {
            robust_loss: RobustLoss::Cauchy { scale: 1.0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelativePoseResult {
    /// Rotation taking camera-1 coordinates to camera 2.
    pub rotation: UnitQuaternion<f64>,
    /// Unit translation direction.
    pub translation: Vec3,
    pub initial_cost: f64,
    pub final_cost: f64,
}

/// Build IR for relative pose refinement.
///
/// `points1[i]` and `points2[i]` are normalized coordinates of the same point
/// in the two views. The initial translation is normalized.
pub fn build_relative_pose_ir(
    points1: &[Vec2],
    points2: &[Vec2],
    rotation: &UnitQuaternion<f64>,
    translation: &Vec3,
    opts: &RelativePoseOptions,
) -> Result<(ProblemIR, HashMap<String, DVector<f64>>)> {
    ensure!(
        points1.len() == points2.len(),
        "correspondence count mismatch: {} vs {}",
        points1.len(),
        points2.len()
    );
    ensure!(
        points1.len() >= MIN_CORRESPONDENCES,
        "need at least {} correspondences, got {}",
        MIN_CORRESPONDENCES,
        points1.len()
    );
    let direction = translation
        .try_normalize(f64::EPSILON)
        .ok_or_else(|| anyhow!("initial translation must be non-zero"))?;

    let mut ir = ProblemIR::new();
    let q_id = ir.add_param_block(
        ROTATION_KEY,
        QUAT_DIM,
        ManifoldKind::SO3,
        FixedMask::all_free(),
        None,
    );
    let t_id = ir.add_param_block(
        TRANSLATION_KEY,
        VEC3_DIM,
        ManifoldKind::S2,
        FixedMask::all_free(),
        None,
    );

    for (x1, x2) in points1.iter().zip(points2) {
        ir.add_residual_block(ResidualBlock::new(
            FactorKind::RelativePose {
                x1: [x1.x, x1.y],
                x2: [x2.x, x2.y],
            },
            vec![q_id, t_id],
            opts.robust_loss,
        ));
    }

    let initial_map = HashMap::from([
        (ROTATION_KEY.to_string(), rotation_to_block(rotation)),
        (TRANSLATION_KEY.to_string(), vec3_to_block(&direction)),
    ]);

    ir.validate()?;
    Ok((ir, initial_map))
}

/// Refine a relative pose with the tiny-solver backend.
pub fn refine_relative_pose(
    points1: &[Vec2],
    points2: &[Vec2],
    rotation: &UnitQuaternion<f64>,
    translation: &Vec3,
    opts: &RelativePoseOptions,
    backend_opts: &BackendSolveOptions,
) -> Result<RelativePoseResult> {
    let (ir, initial_map) = build_relative_pose_ir(points1, points2, rotation, translation, opts)?;
    info!("relative pose refinement: {} correspondences", points1.len());
    let solution = solve_with_backend(BackendKind::TinySolver, &ir, &initial_map, backend_opts)?;

    let block = |key: &str| {
        solution
            .params
            .get(key)
            .ok_or_else(|| anyhow!("solution is missing {}", key))
    };
    let rotation = rotation_from_block(block(ROTATION_KEY)?)?;
    let translation = vec3_from_block(block(TRANSLATION_KEY)?)?
        .try_normalize(f64::EPSILON)
        .ok_or_else(|| anyhow!("refined translation collapsed to zero"))?;

    Ok(RelativePoseResult {
        rotation,
        translation,
        initial_cost: solution.initial_cost,
        final_cost: solution.final_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correspondences(n: usize) -> (Vec<Vec2>, Vec<Vec2>) {
        let x1 = (0..n).map(|i| Vec2::new(0.01 * i as f64, -0.02)).collect();
        let x2 = (0..n).map(|i| Vec2::new(0.01 * i as f64 + 0.1, -0.02)).collect();
        (x1, x2)
    }

    #[test]
    fn too_few_or_mismatched_correspondences_fail() {
        let (x1, x2) = correspondences(4);
        let q = UnitQuaternion::identity();
        let t = Vec3::x();
        let opts = RelativePoseOptions::default();
        assert!(build_relative_pose_ir(&x1, &x2, &q, &t, &opts).is_err());

        let (x1, mut x2) = correspondences(6);
        x2.pop();
        assert!(build_relative_pose_ir(&x1, &x2, &q, &t, &opts).is_err());
    }

    #[test]
    fn zero_translation_is_rejected() {
        let (x1, x2) = correspondences(6);
        let err = build_relative_pose_ir(
            &x1,
            &x2,
            &UnitQuaternion::identity(),
            &Vec3::zeros(),
            &RelativePoseOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-zero"), "{err}");
    }

    #[test]
    fn translation_is_normalized_onto_s2() {
        let (x1, x2) = correspondences(6);
        let (ir, init) = build_relative_pose_ir(
            &x1,
            &x2,
            &UnitQuaternion::identity(),
            &Vec3::new(0.0, 3.0, 4.0),
            &RelativePoseOptions::default(),
        )
        .unwrap();
        assert_eq!(ir.residuals.len(), 6);
        let t = &init[TRANSLATION_KEY];
        assert!((t.norm() - 1.0).abs() < 1e-15);
        assert_eq!(ir.params[1].manifold, ManifoldKind::S2);
        assert_eq!(ir.residuals[0].loss, RobustLoss::Cauchy { scale: 1.0 });
    }
}
