//! Core math and camera primitives for `sfm-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - quaternion and pose primitives written generically over
//!   [`nalgebra::RealField`] so they run on both `f64` and dual numbers,
//! - the [`CameraModel`] projection capability and a set of concrete models,
//! - deterministic synthetic scenes used by tests across the workspace.
//!
//! Camera pipeline:
//! `pixel = C::world_to_image(params, x / z, y / z)`
//! where `(x, y, z)` is a point expressed in the camera frame.

/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera models and their serializable parameters.
pub mod models;
/// Quaternion, rotation and pose-composition primitives.
pub mod rotation;
/// Deterministic synthetic scene generation.
pub mod synthetic;

pub use math::*;
pub use models::*;
pub use rotation::*;
