use nalgebra::{RealField, Vector2};

use super::{CameraModel, CameraModelKind};
use crate::{Real, Vec2};

/// Pinhole camera with a single focal length: `[f, cx, cy]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimplePinhole;

impl CameraModel for SimplePinhole {
    const KIND: CameraModelKind = CameraModelKind::SimplePinhole;
    const NUM_PARAMS: usize = 3;
    const FOCAL_LENGTH_IDXS: &'static [usize] = &[0];
    const PRINCIPAL_POINT_IDXS: &'static [usize] = &[1, 2];
    const EXTRA_PARAMS_IDXS: &'static [usize] = &[];

    fn world_to_image<T: RealField>(params: &[T], x: T, y: T) -> Vector2<T> {
        debug_assert_eq!(params.len(), Self::NUM_PARAMS);
        let f = params[0].clone();
        let cx = params[1].clone();
        let cy = params[2].clone();
        Vector2::new(f.clone() * x + cx, f * y + cy)
    }

    fn image_to_world(params: &[Real], u: Real, v: Real) -> Vec2 {
        let (f, cx, cy) = (params[0], params[1], params[2]);
        Vec2::new((u - cx) / f, (v - cy) / f)
    }
}

/// Pinhole camera with separate focal lengths: `[fx, fy, cx, cy]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pinhole;

impl CameraModel for Pinhole {
    const KIND: CameraModelKind = CameraModelKind::Pinhole;
    const NUM_PARAMS: usize = 4;
    const FOCAL_LENGTH_IDXS: &'static [usize] = &[0, 1];
    const PRINCIPAL_POINT_IDXS: &'static [usize] = &[2, 3];
    const EXTRA_PARAMS_IDXS: &'static [usize] = &[];

    fn world_to_image<T: RealField>(params: &[T], x: T, y: T) -> Vector2<T> {
        debug_assert_eq!(params.len(), Self::NUM_PARAMS);
        let fx = params[0].clone();
        let fy = params[1].clone();
        let cx = params[2].clone();
        let cy = params[3].clone();
        Vector2::new(fx * x + cx, fy * y + cy)
    }

    fn image_to_world(params: &[Real], u: Real, v: Real) -> Vec2 {
        let (fx, fy, cx, cy) = (params[0], params[1], params[2], params[3]);
        Vec2::new((u - cx) / fx, (v - cy) / fy)
    }
}
