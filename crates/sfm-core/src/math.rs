//! Scalar and geometry type aliases.

use nalgebra::{convert, Isometry3, Point3, RealField, Vector2, Vector3};

/// Scalar type used for constants and f64 evaluation.
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// World-to-camera rigid transform.
pub type Iso3 = Isometry3<Real>;

/// Lift a constant image point `(x, y)` to `(x, y, 1)` in scalar type `T`.
pub fn to_homogeneous<T: RealField>(p: &Vec2) -> Vector3<T> {
    Vector3::new(convert::<Real, T>(p.x), convert::<Real, T>(p.y), T::one())
}
