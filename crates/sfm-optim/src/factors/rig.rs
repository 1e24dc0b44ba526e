//! Reprojection residual for cameras mounted on a rigid rig.

use std::marker::PhantomData;

use nalgebra::{DVector, RealField, SVector};
use sfm_core::{
    compose_rig_pose, quat_from_slice, transform_point, vec3_from_slice, CameraModel, Vec2,
    QUAT_DIM, VEC3_DIM,
};

use super::reprojection::reprojection_residual;
use super::CostFunction;

/// Reprojection error through a rig pose composed with a camera-from-rig pose.
///
/// Parameter blocks:
/// `[rig rotation (4), rig translation (3), rel rotation (4), rel translation (3), point (3), intrinsics (N)]`.
///
/// The camera-from-world pose is `q = q_rel ⊗ q_rig`, `t = R(q_rel) · t_rig + t_rel`.
#[derive(Debug, Clone)]
pub struct RigReprojectionFactor<C> {
    observed: Vec2,
    _model: PhantomData<fn() -> C>,
}

impl<C: CameraModel> RigReprojectionFactor<C> {
    pub fn new(observed: Vec2) -> Self {
        Self {
            observed,
            _model: PhantomData,
        }
    }

    pub fn observed(&self) -> Vec2 {
        self.observed
    }

    #[allow(clippy::too_many_arguments)]
    pub fn residual<T: RealField>(
        &self,
        rig_qvec: &[T],
        rig_tvec: &[T],
        rel_qvec: &[T],
        rel_tvec: &[T],
        point: &[T],
        camera: &[T],
    ) -> SVector<T, 2> {
        let (q, t) = compose_rig_pose(
            &quat_from_slice(rig_qvec),
            &vec3_from_slice(rig_tvec),
            &quat_from_slice(rel_qvec),
            &vec3_from_slice(rel_tvec),
        );
        let p_cam = transform_point(&q, &t, &vec3_from_slice(point));
        reprojection_residual::<C, T>(p_cam, camera, &self.observed)
    }
}

impl<C: CameraModel> CostFunction for RigReprojectionFactor<C> {
    const NUM_RESIDUALS: usize = 2;

    fn parameter_block_sizes(&self) -> Vec<usize> {
        vec![
            QUAT_DIM,
            VEC3_DIM,
            QUAT_DIM,
            VEC3_DIM,
            VEC3_DIM,
            C::NUM_PARAMS,
        ]
    }

    fn evaluate<T: RealField>(&self, params: &[&[T]]) -> DVector<T> {
        debug_assert_eq!(params.len(), 6, "expected 6 parameter blocks");
        let r = self.residual(
            params[0], params[1], params[2], params[3], params[4], params[5],
        );
        DVector::from_column_slice(r.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{FixedPoseReprojectionFactor, ReprojectionFactor};
    use nalgebra::{Translation3, UnitQuaternion};
    use sfm_core::{iso3_to_params, Iso3, Radial};

    const CAMERA: [f64; 5] = [820.0, 330.0, 250.0, -0.08, 0.01];
    const IDENTITY_Q: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

    fn rig_pose() -> Iso3 {
        Iso3::from_parts(
            Translation3::new(0.2, -0.1, 3.5),
            UnitQuaternion::from_euler_angles(0.1, -0.25, 0.05),
        )
    }

    fn rel_pose() -> Iso3 {
        Iso3::from_parts(
            Translation3::new(-0.15, 0.02, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.3, 0.0),
        )
    }

    #[test]
    fn identity_relative_pose_reduces_to_single_camera() {
        let observed = Vec2::new(300.0, 270.0);
        let point = [0.3, 0.2, 0.5];
        let (rig_q, rig_t) = iso3_to_params(&rig_pose());

        let rig = RigReprojectionFactor::<Radial>::new(observed);
        let single = ReprojectionFactor::<Radial>::new(observed);
        let fixed = FixedPoseReprojectionFactor::<Radial>::from_pose(&rig_pose(), observed);

        let r_rig = rig.residual(&rig_q, &rig_t, &IDENTITY_Q, &[0.0; 3], &point, &CAMERA);
        let r_single = single.residual(&rig_q, &rig_t, &point, &CAMERA);
        let r_fixed = fixed.residual(&point, &CAMERA);
        assert!((r_rig - r_single).norm() < 1e-10);
        assert!((r_rig - r_fixed).norm() < 1e-10);
    }

    #[test]
    fn composed_pose_matches_single_camera_on_product() {
        let observed = Vec2::new(310.0, 240.0);
        let point = [-0.4, 0.1, 0.8];
        let (rig_q, rig_t) = iso3_to_params(&rig_pose());
        let (rel_q, rel_t) = iso3_to_params(&rel_pose());
        let (cam_q, cam_t) = iso3_to_params(&(rel_pose() * rig_pose()));

        let rig = RigReprojectionFactor::<Radial>::new(observed);
        let single = ReprojectionFactor::<Radial>::new(observed);
        let r_rig = rig.residual(&rig_q, &rig_t, &rel_q, &rel_t, &point, &CAMERA);
        let r_single = single.residual(&cam_q, &cam_t, &point, &CAMERA);
        assert!((r_rig - r_single).norm() < 1e-9, "{r_rig:?} vs {r_single:?}");
    }

    #[test]
    fn swapping_rig_and_relative_rotation_changes_residual() {
        let observed = Vec2::new(310.0, 240.0);
        let point = [-0.4, 0.1, 0.8];
        let (rig_q, _) = iso3_to_params(&rig_pose());
        let (rel_q, _) = iso3_to_params(&rel_pose());
        let t = [0.0, 0.0, 4.0];

        let rig = RigReprojectionFactor::<Radial>::new(observed);
        let a = rig.residual(&rig_q, &t, &rel_q, &[0.0; 3], &point, &CAMERA);
        let b = rig.residual(&rel_q, &t, &rig_q, &[0.0; 3], &point, &CAMERA);
        assert!((a - b).norm() > 1e-3);

        // Both identity: order is irrelevant.
        let c = rig.residual(&IDENTITY_Q, &t, &IDENTITY_Q, &[0.0; 3], &point, &CAMERA);
        let single = ReprojectionFactor::<Radial>::new(observed);
        let d = single.residual(&IDENTITY_Q, &t, &point, &CAMERA);
        assert!((c - d).norm() < 1e-12);
    }

    #[test]
    fn zero_depth_after_composition_is_non_finite() {
        let rig = RigReprojectionFactor::<Radial>::new(Vec2::new(0.0, 0.0));
        // Rig moves the point to depth 1, the relative pose pulls it back to 0.
        let r = rig.residual(
            &IDENTITY_Q,
            &[0.0, 0.0, 1.0],
            &IDENTITY_Q,
            &[0.0, 0.0, -1.0],
            &[0.1, 0.1, 0.0],
            &CAMERA,
        );
        assert!(r.iter().all(|v| !v.is_finite()));
    }

    #[test]
    fn declares_six_blocks() {
        let rig = RigReprojectionFactor::<Radial>::new(Vec2::zeros());
        assert_eq!(rig.parameter_block_sizes(), vec![4, 3, 4, 3, 3, 5]);
    }

    #[test]
    fn ground_truth_is_a_strict_local_minimum() {
        let (rig_q, rig_t) = iso3_to_params(&rig_pose());
        let (rel_q, rel_t) = iso3_to_params(&rel_pose());
        let point = [0.35, -0.25, 0.6];

        // With a zero observation the residual is the predicted pixel.
        let predicted = RigReprojectionFactor::<Radial>::new(Vec2::zeros())
            .residual::<f64>(&rig_q, &rig_t, &rel_q, &rel_t, &point, &CAMERA);
        let rig = RigReprojectionFactor::<Radial>::new(Vec2::new(predicted[0], predicted[1]));

        let blocks = vec![
            rig_q.to_vec(),
            rig_t.to_vec(),
            rel_q.to_vec(),
            rel_t.to_vec(),
            point.to_vec(),
            CAMERA.to_vec(),
        ];
        crate::factors::assert_strict_local_minimum(&rig, &blocks, 1e-4);
    }
}
