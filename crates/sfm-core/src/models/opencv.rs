use nalgebra::{RealField, Vector2};

use super::{undistort_iterative, CameraModel, CameraModelKind};
use crate::{Real, Vec2};

/// OpenCV-style radial-tangential camera: `[fx, fy, cx, cy, k1, k2, p1, p2]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCv;

impl OpenCv {
    fn distortion<T: RealField>(k1: T, k2: T, p1: T, p2: T, x: T, y: T) -> (T, T) {
        let x2 = x.clone() * x.clone();
        let y2 = y.clone() * y.clone();
        let xy = x.clone() * y.clone();
        let r2 = x2.clone() + y2.clone();
        let radial = k1 * r2.clone() + k2 * r2.clone() * r2.clone();

        let two = T::one() + T::one();
        let dx = x * radial.clone()
            + two.clone() * p1.clone() * xy.clone()
            + p2.clone() * (r2.clone() + two.clone() * x2);
        let dy = y * radial + two.clone() * p2 * xy + p1 * (r2 + two * y2);
        (dx, dy)
    }
}

impl CameraModel for OpenCv {
    const KIND: CameraModelKind = CameraModelKind::OpenCv;
    const NUM_PARAMS: usize = 8;
    const FOCAL_LENGTH_IDXS: &'static [usize] = &[0, 1];
    const PRINCIPAL_POINT_IDXS: &'static [usize] = &[2, 3];
    const EXTRA_PARAMS_IDXS: &'static [usize] = &[4, 5, 6, 7];

    fn world_to_image<T: RealField>(params: &[T], x: T, y: T) -> Vector2<T> {
        debug_assert_eq!(params.len(), Self::NUM_PARAMS);
        let fx = params[0].clone();
        let fy = params[1].clone();
        let cx = params[2].clone();
        let cy = params[3].clone();

        let (dx, dy) = Self::distortion(
            params[4].clone(),
            params[5].clone(),
            params[6].clone(),
            params[7].clone(),
            x.clone(),
            y.clone(),
        );
        Vector2::new(fx * (x + dx) + cx, fy * (y + dy) + cy)
    }

    fn image_to_world(params: &[Real], u: Real, v: Real) -> Vec2 {
        let (fx, fy, cx, cy) = (params[0], params[1], params[2], params[3]);
        let (k1, k2, p1, p2) = (params[4], params[5], params[6], params[7]);
        undistort_iterative((u - cx) / fx, (v - cy) / fy, |x, y| {
            Self::distortion(k1, k2, p1, p2, x, y)
        })
    }
}
