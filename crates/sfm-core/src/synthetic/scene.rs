//! Synthetic scenes with known ground truth.
//!
//! Poses follow the world-to-camera convention used by every residual:
//! `p_cam = pose * p_world`.

use super::noise::{mix_key, unit_sample, UniformPixelNoise};
use crate::{CameraModel, Iso3, Pt3, Real, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// A 2D observation of a 3D point, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointObservation {
    /// Index into the scene's point list.
    pub point_idx: usize,
    /// Observed pixel coordinates.
    pub uv: Vec2,
}

/// Generate `n` deterministic points uniformly inside the box `[min, max]`.
pub fn points_in_box(n: usize, min: Vec3, max: Vec3, seed: u64) -> Vec<Pt3> {
    (0..n)
        .map(|i| {
            let coord = |axis: usize| {
                let s = unit_sample(mix_key(seed, i, axis));
                min[axis] + s * (max[axis] - min[axis])
            };
            Pt3::new(coord(0), coord(1), coord(2))
        })
        .collect()
}

/// World-to-camera pose of a camera at `eye` whose optical axis points at `target`.
pub fn look_at(eye: &Vec3, target: &Vec3) -> Iso3 {
    let cam_to_world = Iso3::face_towards(&Pt3::from(*eye), &Pt3::from(*target), &Vec3::y());
    cam_to_world.inverse()
}

/// `n` cameras on a horizontal arc of `arc` radians and radius `radius` around
/// `target`, all looking at it.
///
/// The arc is centered on the `-Z` side of the target.
pub fn poses_on_arc(n: usize, radius: Real, arc: Real, target: &Vec3) -> Vec<Iso3> {
    (0..n)
        .map(|i| {
            let t = if n > 1 {
                i as Real / (n - 1) as Real - 0.5
            } else {
                0.0
            };
            let angle = t * arc;
            let eye = target + Vec3::new(angle.sin(), 0.0, -angle.cos()) * radius;
            look_at(&eye, target)
        })
        .collect()
}

/// Project `points` into a camera; points at or behind the camera plane are skipped.
pub fn project_points<C: CameraModel>(
    params: &[Real],
    pose: &Iso3,
    points: &[Pt3],
) -> Vec<PointObservation> {
    points
        .iter()
        .enumerate()
        .filter_map(|(point_idx, pw)| {
            let pc = pose.transform_point(pw);
            if pc.z <= 0.0 {
                return None;
            }
            let uv = C::world_to_image(params, pc.x / pc.z, pc.y / pc.z);
            Some(PointObservation { point_idx, uv })
        })
        .collect()
}

/// Same as [`project_points`], with deterministic pixel noise keyed by `image_idx`.
pub fn project_points_noisy<C: CameraModel>(
    params: &[Real],
    pose: &Iso3,
    points: &[Pt3],
    image_idx: usize,
    noise: &UniformPixelNoise,
) -> Vec<PointObservation> {
    project_points::<C>(params, pose, points)
        .into_iter()
        .map(|obs| PointObservation {
            uv: noise.apply(image_idx, obs.point_idx, obs.uv),
            ..obs
        })
        .collect()
}

/// Normalized correspondences between a camera at the origin and a second
/// camera with world-to-camera pose `cam2_from_cam1`.
///
/// Points behind either camera are skipped.
pub fn two_view_correspondences(points: &[Pt3], cam2_from_cam1: &Iso3) -> (Vec<Vec2>, Vec<Vec2>) {
    let mut x1 = Vec::with_capacity(points.len());
    let mut x2 = Vec::with_capacity(points.len());
    for p in points {
        let p2 = cam2_from_cam1.transform_point(p);
        if p.z <= 0.0 || p2.z <= 0.0 {
            continue;
        }
        x1.push(Vec2::new(p.x / p.z, p.y / p.z));
        x2.push(Vec2::new(p2.x / p2.z, p2.y / p2.z));
    }
    (x1, x2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pinhole;

    #[test]
    fn points_stay_inside_box() {
        let min = Vec3::new(-1.0, -2.0, 3.0);
        let max = Vec3::new(1.0, 2.0, 4.0);
        let pts = points_in_box(200, min, max, 42);
        assert_eq!(pts.len(), 200);
        for p in &pts {
            for axis in 0..3 {
                assert!(p[axis] >= min[axis] && p[axis] <= max[axis]);
            }
        }
        assert_eq!(pts, points_in_box(200, min, max, 42));
    }

    #[test]
    fn arc_cameras_see_target_on_axis() {
        let target = Vec3::new(0.5, -0.2, 1.0);
        for pose in poses_on_arc(5, 4.0, 0.8, &target) {
            let pc = pose.transform_point(&Pt3::from(target));
            assert!(pc.z > 3.99 && pc.z < 4.01, "depth {}", pc.z);
            assert!(pc.x.abs() < 1e-9 && pc.y.abs() < 1e-9);
        }
    }

    #[test]
    fn projection_skips_points_behind_camera() {
        let pose = Iso3::identity();
        let points = vec![Pt3::new(0.0, 0.0, 2.0), Pt3::new(0.0, 0.0, -2.0)];
        let obs = project_points::<Pinhole>(&[100.0, 100.0, 50.0, 50.0], &pose, &points);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].point_idx, 0);
        assert_eq!(obs[0].uv, Vec2::new(50.0, 50.0));
    }
}
