//! High-level entry crate for the `sfm-rs` bundle-adjustment toolbox.
//!
//! This crate re-exports the residuals, camera models and refinement
//! problems of the workspace behind a single dependency:
//! - Bundle adjustment over per-image poses, points and intrinsics
//! - Rig bundle adjustment with shared camera-from-rig poses
//! - Two-view relative pose refinement on the Sampson error
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! # let dataset = unimplemented!();
//! use sfm::prelude::*;
//! use sfm::bundle_adjustment::{optimize_bundle_adjustment, BundleAdjustmentOptions};
//!
//! let opts = BundleAdjustmentOptions {
//!     constant_poses: vec![0, 1],
//!     ..Default::default()
//! };
//! let result = optimize_bundle_adjustment(&dataset, &opts, &BackendSolveOptions::default())?;
//! println!("cost {:.3e} -> {:.3e}", result.initial_cost, result.final_cost);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! ## Refinement Problems
//!
//! - [`bundle_adjustment`] - Poses, points and intrinsics from pixel observations
//! - [`rig_bundle_adjustment`] - Multi-camera rigs observed over several snapshots
//! - [`relative_pose`] - Rotation and translation direction between two views
//!
//! ## Foundation Crates (Advanced Users)
//!
//! - [`core`] - Math types, rotations, camera models
//! - [`optim`] - Residual factors, IR, Jacobians and the solver backend
//! - [`factors`] - The four residuals, generic over scalar and camera model
//! - [`synthetic`] - Deterministic synthetic scenes for testing
//!
//! # Residuals
//!
//! | Residual | Parameter blocks | Output |
//! |----------|------------------|--------|
//! | [`ReprojectionFactor`] | rotation, translation, point, camera | 2 |
//! | [`FixedPoseReprojectionFactor`] | point, camera | 2 |
//! | [`RigReprojectionFactor`] | rig rotation, rig translation, relative rotation, relative translation, point, camera | 2 |
//! | [`RelativePoseFactor`] | rotation, translation | 1 |

/// Bundle adjustment over images with independent poses.
pub mod bundle_adjustment {
    pub use sfm_optim::problems::bundle_adjustment::{
        BundleAdjustmentDataset, BundleAdjustmentOptions, BundleAdjustmentResult,
        ImageObservations, build_bundle_adjustment_ir, optimize_bundle_adjustment,
    };
}

/// Bundle adjustment of camera rigs.
///
/// Each snapshot carries one rig-from-world pose; every camera of the rig is
/// placed by its camera-from-rig pose. The first camera of a rig is the
/// reference and its relative pose never moves.
pub mod rig_bundle_adjustment {
    pub use sfm_optim::problems::rig_bundle_adjustment::{
        Rig, RigBundleAdjustmentDataset, RigBundleAdjustmentOptions, RigBundleAdjustmentResult,
        RigCamera, RigSnapshot, SnapshotImage, build_rig_bundle_adjustment_ir,
        optimize_rig_bundle_adjustment,
    };
}

/// Two-view relative pose refinement.
pub mod relative_pose {
    pub use sfm_optim::problems::relative_pose::{
        MIN_CORRESPONDENCES, RelativePoseOptions, RelativePoseResult, build_relative_pose_ir,
        refine_relative_pose,
    };
}

/// Core math types, rotations and camera models.
pub mod core {
    pub use sfm_core::*;
}

/// Optimization layer: factors, IR, backend and Jacobians.
pub mod optim {
    pub use sfm_optim::*;
}

/// Residual factors and the cost-function trait.
pub mod factors {
    pub use sfm_optim::factors::*;
    pub use sfm_optim::jacobian::{FactorEvaluation, evaluate_with_jacobians};
}

/// Deterministic synthetic scenes.
pub mod synthetic {
    pub use sfm_core::synthetic::*;
}

pub use sfm_core::{
    CameraModel, CameraModelKind, CameraParams, Iso3, OpenCv, Pinhole, Pt3, Radial, SimplePinhole,
    SimpleRadial, Vec2, Vec3,
};
pub use sfm_optim::{
    BackendSolveOptions, CostFunction, FixedPoseReprojectionFactor, RelativePoseFactor,
    ReprojectionFactor, RigReprojectionFactor, RobustLoss,
};

/// Common imports for refinement workflows.
pub mod prelude {
    // Core types
    pub use crate::{
        CameraModel, CameraModelKind, CameraParams, Iso3, OpenCv, Pinhole, Pt3, Radial,
        SimplePinhole, SimpleRadial, Vec2, Vec3,
    };

    // Residuals
    pub use crate::{
        CostFunction, FixedPoseReprojectionFactor, RelativePoseFactor, ReprojectionFactor,
        RigReprojectionFactor,
    };

    // Common options
    pub use crate::{BackendSolveOptions, RobustLoss};
}
