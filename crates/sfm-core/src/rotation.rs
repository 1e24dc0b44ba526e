//! Quaternion and rigid-pose primitives.
//!
//! Every function that touches optimized parameters is generic over
//! [`RealField`] and uses only arithmetic that is valid for dual numbers.
//! Quaternions are stored in parameter blocks as `[qx, qy, qz, qw]`.
//!
//! None of the generic helpers renormalize: unit norm is a property the
//! solver-side manifold maintains.

use crate::{Iso3, Real};
use nalgebra::{Matrix3, Quaternion, RealField, Translation3, UnitQuaternion, Vector3};

/// Length of a quaternion parameter block.
pub const QUAT_DIM: usize = 4;
/// Length of a translation or point parameter block.
pub const VEC3_DIM: usize = 3;

/// Read a quaternion stored as `[qx, qy, qz, qw]`.
#[inline]
pub fn quat_from_slice<T: RealField>(q: &[T]) -> Quaternion<T> {
    debug_assert_eq!(q.len(), QUAT_DIM, "quaternion must have 4 params");
    Quaternion::new(q[3].clone(), q[0].clone(), q[1].clone(), q[2].clone())
}

/// Read a 3-vector from a parameter slice.
#[inline]
pub fn vec3_from_slice<T: RealField>(v: &[T]) -> Vector3<T> {
    debug_assert_eq!(v.len(), VEC3_DIM, "vector must have 3 params");
    Vector3::new(v[0].clone(), v[1].clone(), v[2].clone())
}

/// Store a quaternion as `[qx, qy, qz, qw]`.
pub fn quat_to_array(q: &Quaternion<Real>) -> [Real; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Rotate `p` by `q`, assuming `q` has unit norm.
#[inline]
pub fn unit_quaternion_rotate_point<T: RealField>(q: &Quaternion<T>, p: &Vector3<T>) -> Vector3<T> {
    UnitQuaternion::new_unchecked(q.clone()).transform_vector(p)
}

/// Hamilton product `a ⊗ b`: rotating by the result applies `b` first, then `a`.
#[inline]
pub fn quaternion_product<T: RealField>(a: &Quaternion<T>, b: &Quaternion<T>) -> Quaternion<T> {
    a.clone() * b.clone()
}

/// Rotation matrix of a (not necessarily unit) quaternion.
///
/// The scaled rotation is divided by the squared norm, so any non-zero
/// multiple of a unit quaternion yields the same matrix.
pub fn quaternion_to_rotation<T: RealField>(q: &Quaternion<T>) -> Matrix3<T> {
    let (a, b, c, d) = (q.w.clone(), q.i.clone(), q.j.clone(), q.k.clone());

    let aa = a.clone() * a.clone();
    let ab = a.clone() * b.clone();
    let ac = a.clone() * c.clone();
    let ad = a * d.clone();
    let bb = b.clone() * b.clone();
    let bc = b.clone() * c.clone();
    let bd = b * d.clone();
    let cc = c.clone() * c.clone();
    let cd = c * d.clone();
    let dd = d.clone() * d;

    let two = T::one() + T::one();
    let scale = T::one() / (aa.clone() + bb.clone() + cc.clone() + dd.clone());

    let r = Matrix3::new(
        aa.clone() + bb.clone() - cc.clone() - dd.clone(),
        two.clone() * (bc.clone() - ad.clone()),
        two.clone() * (ac.clone() + bd.clone()),
        two.clone() * (ad + bc),
        aa.clone() - bb.clone() + cc.clone() - dd.clone(),
        two.clone() * (cd.clone() - ab.clone()),
        two.clone() * (bd - ac),
        two * (ab + cd),
        aa - bb - cc + dd,
    );
    r * scale
}

/// Skew-symmetric matrix `[v]×` such that `[v]× w = v × w`.
pub fn skew<T: RealField>(v: &Vector3<T>) -> Matrix3<T> {
    Matrix3::new(
        T::zero(),
        -v.z.clone(),
        v.y.clone(),
        v.z.clone(),
        T::zero(),
        -v.x.clone(),
        -v.y.clone(),
        v.x.clone(),
        T::zero(),
    )
}

/// Rotate then translate: `R(q) · p + t`.
#[inline]
pub fn transform_point<T: RealField>(
    q: &Quaternion<T>,
    t: &Vector3<T>,
    p: &Vector3<T>,
) -> Vector3<T> {
    unit_quaternion_rotate_point(q, p) + t
}

/// Compose a rig-from-world pose with a camera-from-rig pose.
///
/// Returns the camera-from-world pose `(q_rel ⊗ q_rig, R(q_rel) · t_rig + t_rel)`:
/// points are first moved into the rig frame, then into the camera frame.
pub fn compose_rig_pose<T: RealField>(
    rig_q: &Quaternion<T>,
    rig_t: &Vector3<T>,
    rel_q: &Quaternion<T>,
    rel_t: &Vector3<T>,
) -> (Quaternion<T>, Vector3<T>) {
    let q = quaternion_product(rel_q, rig_q);
    let t = unit_quaternion_rotate_point(rel_q, rig_t) + rel_t;
    (q, t)
}

/// Split a world-to-camera isometry into `([qx, qy, qz, qw], [tx, ty, tz])`.
pub fn iso3_to_params(pose: &Iso3) -> ([Real; 4], [Real; 3]) {
    let q = pose.rotation.quaternion();
    let t = pose.translation.vector;
    (quat_to_array(q), [t.x, t.y, t.z])
}

/// Build an isometry from `[qx, qy, qz, qw]` and `[tx, ty, tz]`.
///
/// The quaternion is normalized here because the result is a proper rigid
/// transform, not a parameter block.
pub fn iso3_from_params(q: &[Real], t: &[Real]) -> Iso3 {
    let rot = UnitQuaternion::from_quaternion(quat_from_slice(q));
    Iso3::from_parts(Translation3::from(vec3_from_slice(t)), rot)
}
