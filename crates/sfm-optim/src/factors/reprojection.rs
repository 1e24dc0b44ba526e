//! Single-camera reprojection residuals.

use std::marker::PhantomData;

use nalgebra::{convert, DVector, Quaternion, RealField, SVector, Vector3};
use sfm_core::{
    iso3_to_params, quat_from_slice, transform_point, vec3_from_slice, CameraModel, Iso3, Vec2,
    QUAT_DIM, VEC3_DIM,
};

use super::CostFunction;

/// Project a camera-frame point and subtract the observation.
///
/// The perspective division is unguarded: a zero depth yields non-finite
/// residuals, which the solver is expected to handle.
pub(crate) fn reprojection_residual<C: CameraModel, T: RealField>(
    p_cam: Vector3<T>,
    camera: &[T],
    observed: &Vec2,
) -> SVector<T, 2> {
    let x = p_cam.x.clone() / p_cam.z.clone();
    let y = p_cam.y.clone() / p_cam.z.clone();
    let px = C::world_to_image(camera, x, y);
    SVector::<T, 2>::new(
        px.x.clone() - convert::<f64, T>(observed.x),
        px.y.clone() - convert::<f64, T>(observed.y),
    )
}

/// Reprojection error with variable pose, point and intrinsics.
///
/// Parameter blocks: `[rotation (4), translation (3), point (3), intrinsics (N)]`.
/// Residual: `predicted_pixel - observed_pixel`.
#[derive(Debug, Clone)]
pub struct ReprojectionFactor<C> {
    observed: Vec2,
    _model: PhantomData<fn() -> C>,
}

impl<C: CameraModel> ReprojectionFactor<C> {
    pub fn new(observed: Vec2) -> Self {
        Self {
            observed,
            _model: PhantomData,
        }
    }

    pub fn observed(&self) -> Vec2 {
        self.observed
    }

    /// Rotate and translate the point into the camera, then project it.
    pub fn residual<T: RealField>(
        &self,
        qvec: &[T],
        tvec: &[T],
        point: &[T],
        camera: &[T],
    ) -> SVector<T, 2> {
        let q = quat_from_slice(qvec);
        let t = vec3_from_slice(tvec);
        let p_cam = transform_point(&q, &t, &vec3_from_slice(point));
        reprojection_residual::<C, T>(p_cam, camera, &self.observed)
    }
}

impl<C: CameraModel> CostFunction for ReprojectionFactor<C> {
    const NUM_RESIDUALS: usize = 2;

    fn parameter_block_sizes(&self) -> Vec<usize> {
        vec![QUAT_DIM, VEC3_DIM, VEC3_DIM, C::NUM_PARAMS]
    }

    fn evaluate<T: RealField>(&self, params: &[&[T]]) -> DVector<T> {
        debug_assert_eq!(
            params.len(),
            4,
            "expected [rotation, translation, point, camera] parameter blocks"
        );
        let r = self.residual(params[0], params[1], params[2], params[3]);
        DVector::from_column_slice(r.as_slice())
    }
}

/// Reprojection error against a constant pose.
///
/// Parameter blocks: `[point (3), intrinsics (N)]`. The pose is captured at
/// construction, typically from an image whose registration is trusted.
#[derive(Debug, Clone)]
pub struct FixedPoseReprojectionFactor<C> {
    qvec: [f64; 4],
    tvec: [f64; 3],
    observed: Vec2,
    _model: PhantomData<fn() -> C>,
}

impl<C: CameraModel> FixedPoseReprojectionFactor<C> {
    /// Build from a quaternion `[qx, qy, qz, qw]` and a translation.
    pub fn new(qvec: [f64; 4], tvec: [f64; 3], observed: Vec2) -> Self {
        Self {
            qvec,
            tvec,
            observed,
            _model: PhantomData,
        }
    }

    /// Build from a world-to-camera pose.
    pub fn from_pose(pose: &Iso3, observed: Vec2) -> Self {
        let (qvec, tvec) = iso3_to_params(pose);
        Self::new(qvec, tvec, observed)
    }

    pub fn observed(&self) -> Vec2 {
        self.observed
    }

    pub fn residual<T: RealField>(&self, point: &[T], camera: &[T]) -> SVector<T, 2> {
        let [qx, qy, qz, qw] = self.qvec;
        let q = Quaternion::new(
            convert::<f64, T>(qw),
            convert::<f64, T>(qx),
            convert::<f64, T>(qy),
            convert::<f64, T>(qz),
        );
        let t = Vector3::new(
            convert::<f64, T>(self.tvec[0]),
            convert::<f64, T>(self.tvec[1]),
            convert::<f64, T>(self.tvec[2]),
        );
        let p_cam = transform_point(&q, &t, &vec3_from_slice(point));
        reprojection_residual::<C, T>(p_cam, camera, &self.observed)
    }
}

impl<C: CameraModel> CostFunction for FixedPoseReprojectionFactor<C> {
    const NUM_RESIDUALS: usize = 2;

    fn parameter_block_sizes(&self) -> Vec<usize> {
        vec![VEC3_DIM, C::NUM_PARAMS]
    }

    fn evaluate<T: RealField>(&self, params: &[&[T]]) -> DVector<T> {
        debug_assert_eq!(params.len(), 2, "expected [point, camera] parameter blocks");
        let r = self.residual(params[0], params[1]);
        DVector::from_column_slice(r.as_slice())
    }
}
