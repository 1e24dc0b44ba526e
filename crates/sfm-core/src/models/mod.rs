//! Camera projection models.
//!
//! A camera model maps normalized camera-plane coordinates `(x / z, y / z)`
//! plus an intrinsic parameter vector to pixel coordinates. Residuals are
//! generic over the model at compile time through [`CameraModel`]; the
//! runtime side ([`CameraModelKind`], [`CameraParams`]) selects a model by
//! name and carries its parameters through configuration files.
//!
//! Parameter layouts:
//!
//! | model            | params                                |
//! |------------------|---------------------------------------|
//! | `simple_pinhole` | `f, cx, cy`                           |
//! | `pinhole`        | `fx, fy, cx, cy`                      |
//! | `simple_radial`  | `f, cx, cy, k`                        |
//! | `radial`         | `f, cx, cy, k1, k2`                   |
//! | `opencv`         | `fx, fy, cx, cy, k1, k2, p1, p2`      |

mod opencv;
mod params;
mod pinhole;
mod radial;

pub use opencv::*;
pub use params::*;
pub use pinhole::*;
pub use radial::*;

use crate::{Real, Vec2};
use nalgebra::{RealField, Vector2};

/// Maximum number of fixed-point iterations used when undistorting.
pub const UNDISTORT_MAX_ITERS: usize = 100;
/// Update size below which undistortion stops early.
pub const UNDISTORT_EPS: Real = 1e-10;

/// Projection capability shared by all reprojection residuals.
///
/// Implementations must be pure and generic over the scalar type so the same
/// formula serves plain evaluation and automatic differentiation.
pub trait CameraModel: Send + Sync + 'static {
    /// Runtime tag of this model.
    const KIND: CameraModelKind;
    /// Number of intrinsic parameters.
    const NUM_PARAMS: usize;
    /// Indices of focal-length parameters.
    const FOCAL_LENGTH_IDXS: &'static [usize];
    /// Indices of principal-point parameters.
    const PRINCIPAL_POINT_IDXS: &'static [usize];
    /// Indices of the remaining (distortion) parameters.
    const EXTRA_PARAMS_IDXS: &'static [usize];

    /// Map normalized camera-plane coordinates to pixels.
    fn world_to_image<T: RealField>(params: &[T], x: T, y: T) -> Vector2<T>;

    /// Map pixels back to normalized camera-plane coordinates.
    fn image_to_world(params: &[Real], u: Real, v: Real) -> Vec2;
}

/// Invert a normalized-plane distortion by fixed-point iteration.
///
/// `delta(x, y)` returns the additive distortion at an undistorted point.
pub(crate) fn undistort_iterative<F>(xd: Real, yd: Real, delta: F) -> Vec2
where
    F: Fn(Real, Real) -> (Real, Real),
{
    let mut x = xd;
    let mut y = yd;
    for _ in 0..UNDISTORT_MAX_ITERS {
        let (dx, dy) = delta(x, y);
        let x_next = xd - dx;
        let y_next = yd - dy;
        let step = (x_next - x).abs() + (y_next - y).abs();
        x = x_next;
        y = y_next;
        if step < UNDISTORT_EPS {
            break;
        }
    }
    Vec2::new(x, y)
}

/// Dispatch on a [`CameraModelKind`], binding the concrete model type to `$model`.
///
/// ```
/// use sfm_core::{with_camera_model, CameraModel, CameraModelKind};
///
/// let n = with_camera_model!(CameraModelKind::Radial, M => M::NUM_PARAMS);
/// assert_eq!(n, 5);
/// ```
#[macro_export]
macro_rules! with_camera_model {
    ($kind:expr, $model:ident => $body:expr) => {
        match $kind {
            $crate::CameraModelKind::SimplePinhole => {
                type $model = $crate::SimplePinhole;
                $body
            }
            $crate::CameraModelKind::Pinhole => {
                type $model = $crate::Pinhole;
                $body
            }
            $crate::CameraModelKind::SimpleRadial => {
                type $model = $crate::SimpleRadial;
                $body
            }
            $crate::CameraModelKind::Radial => {
                type $model = $crate::Radial;
                $body
            }
            $crate::CameraModelKind::OpenCv => {
                type $model = $crate::OpenCv;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<C: CameraModel>(params: &[f64]) {
        for &(x, y) in &[(0.0, 0.0), (0.1, -0.2), (-0.3, 0.25), (0.35, 0.3)] {
            let px = C::world_to_image(params, x, y);
            let n = C::image_to_world(params, px.x, px.y);
            let err = (n - Vec2::new(x, y)).norm();
            assert!(err < 1e-8, "{:?}: err={err} at ({x}, {y})", C::KIND);
        }
    }

    #[test]
    fn image_to_world_inverts_world_to_image() {
        roundtrip::<SimplePinhole>(&[900.0, 320.0, 240.0]);
        roundtrip::<Pinhole>(&[900.0, 880.0, 320.0, 240.0]);
        roundtrip::<SimpleRadial>(&[900.0, 320.0, 240.0, -0.08]);
        roundtrip::<Radial>(&[900.0, 320.0, 240.0, -0.1, 0.02]);
        roundtrip::<OpenCv>(&[900.0, 880.0, 320.0, 240.0, -0.1, 0.02, 0.001, -0.0005]);
    }

    #[test]
    fn param_index_groups_cover_all_params() {
        fn check<C: CameraModel>() {
            let mut all: Vec<usize> = C::FOCAL_LENGTH_IDXS
                .iter()
                .chain(C::PRINCIPAL_POINT_IDXS)
                .chain(C::EXTRA_PARAMS_IDXS)
                .copied()
                .collect();
            all.sort_unstable();
            assert_eq!(all, (0..C::NUM_PARAMS).collect::<Vec<_>>(), "{:?}", C::KIND);
            assert_eq!(C::KIND.num_params(), C::NUM_PARAMS);
        }
        check::<SimplePinhole>();
        check::<Pinhole>();
        check::<SimpleRadial>();
        check::<Radial>();
        check::<OpenCv>();
    }

    #[test]
    fn zero_distortion_models_agree_with_pinhole() {
        let (x, y) = (0.12, -0.07);
        let base = Pinhole::world_to_image(&[800.0, 800.0, 500.0, 400.0], x, y);
        let simple = SimplePinhole::world_to_image(&[800.0, 500.0, 400.0], x, y);
        let radial = Radial::world_to_image(&[800.0, 500.0, 400.0, 0.0, 0.0], x, y);
        let opencv = OpenCv::world_to_image(
            &[800.0, 800.0, 500.0, 400.0, 0.0, 0.0, 0.0, 0.0],
            x,
            y,
        );
        assert!((base - simple).norm() < 1e-12);
        assert!((base - radial).norm() < 1e-12);
        assert!((base - opencv).norm() < 1e-12);
    }
}
