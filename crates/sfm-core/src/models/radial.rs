use nalgebra::{RealField, Vector2};

use super::{undistort_iterative, CameraModel, CameraModelKind};
use crate::{Real, Vec2};

/// Single-focal camera with one radial coefficient: `[f, cx, cy, k]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleRadial;

impl SimpleRadial {
    fn distortion<T: RealField>(k: T, x: T, y: T) -> (T, T) {
        let r2 = x.clone() * x.clone() + y.clone() * y.clone();
        let radial = k * r2;
        (x * radial.clone(), y * radial)
    }
}

impl CameraModel for SimpleRadial {
    const KIND: CameraModelKind = CameraModelKind::SimpleRadial;
    const NUM_PARAMS: usize = 4;
    const FOCAL_LENGTH_IDXS: &'static [usize] = &[0];
    const PRINCIPAL_POINT_IDXS: &'static [usize] = &[1, 2];
    const EXTRA_PARAMS_IDXS: &'static [usize] = &[3];

    fn world_to_image<T: RealField>(params: &[T], x: T, y: T) -> Vector2<T> {
        debug_assert_eq!(params.len(), Self::NUM_PARAMS);
        let f = params[0].clone();
        let cx = params[1].clone();
        let cy = params[2].clone();
        let k = params[3].clone();

        let (dx, dy) = Self::distortion(k, x.clone(), y.clone());
        Vector2::new(f.clone() * (x + dx) + cx, f * (y + dy) + cy)
    }

    fn image_to_world(params: &[Real], u: Real, v: Real) -> Vec2 {
        let (f, cx, cy, k) = (params[0], params[1], params[2], params[3]);
        undistort_iterative((u - cx) / f, (v - cy) / f, |x, y| {
            Self::distortion(k, x, y)
        })
    }
}

/// Single-focal camera with two radial coefficients: `[f, cx, cy, k1, k2]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Radial;

impl Radial {
    fn distortion<T: RealField>(k1: T, k2: T, x: T, y: T) -> (T, T) {
        let r2 = x.clone() * x.clone() + y.clone() * y.clone();
        let radial = k1 * r2.clone() + k2 * r2.clone() * r2;
        (x * radial.clone(), y * radial)
    }
}

impl CameraModel for Radial {
    const KIND: CameraModelKind = CameraModelKind::Radial;
    const NUM_PARAMS: usize = 5;
    const FOCAL_LENGTH_IDXS: &'static [usize] = &[0];
    const PRINCIPAL_POINT_IDXS: &'static [usize] = &[1, 2];
    const EXTRA_PARAMS_IDXS: &'static [usize] = &[3, 4];

    fn world_to_image<T: RealField>(params: &[T], x: T, y: T) -> Vector2<T> {
        debug_assert_eq!(params.len(), Self::NUM_PARAMS);
        let f = params[0].clone();
        let cx = params[1].clone();
        let cy = params[2].clone();
        let k1 = params[3].clone();
        let k2 = params[4].clone();

        let (dx, dy) = Self::distortion(k1, k2, x.clone(), y.clone());
        Vector2::new(f.clone() * (x + dx) + cx, f * (y + dy) + cy)
    }

    fn image_to_world(params: &[Real], u: Real, v: Real) -> Vec2 {
        let (f, cx, cy, k1, k2) = (params[0], params[1], params[2], params[3], params[4]);
        undistort_iterative((u - cx) / f, (v - cy) / f, |x, y| {
            Self::distortion(k1, k2, x, y)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrel_distortion_pulls_points_inward() {
        let params: [f64; 4] = [800.0, 400.0, 300.0, -0.2];
        let px = SimpleRadial::world_to_image(&params, 0.4, 0.0);
        assert!(px.x < 400.0 + 800.0 * 0.4);
        assert!((px.y - 300.0).abs() < 1e-12);
    }
}
