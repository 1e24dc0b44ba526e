//! Deterministic synthetic scene generation.
//!
//! Small building blocks for constructing refinement problems with known
//! ground truth in tests and examples:
//! - 3D point clouds inside an axis-aligned box,
//! - camera poses on an arc facing the scene,
//! - forward projection through any [`crate::CameraModel`],
//! - normalized two-view correspondences for a known relative pose,
//! - deterministic pixel noise.
//!
//! # Example
//!
//! ```
//! use sfm_core::{synthetic::scene, Pinhole, Vec3};
//!
//! let points = scene::points_in_box(50, Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0), 3);
//! let poses = scene::poses_on_arc(4, 6.0, 0.6, &Vec3::zeros());
//! let params = [800.0, 800.0, 320.0, 240.0];
//! let obs = scene::project_points::<Pinhole>(&params, &poses[0], &points);
//! assert_eq!(obs.len(), points.len());
//! ```

pub mod noise;
pub mod scene;
