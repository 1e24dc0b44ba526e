//! Conversions between domain types and solver parameter blocks.
//!
//! Poses are split into a rotation block `[qx, qy, qz, qw]` and a translation
//! block `[tx, ty, tz]` so each half can carry its own manifold.

use anyhow::{ensure, Result};
use nalgebra::{DVector, Quaternion, UnitQuaternion};
use sfm_core::{
    iso3_from_params, iso3_to_params, quat_to_array, CameraModelKind, CameraParams, Iso3, Pt3,
    Vec3, QUAT_DIM, VEC3_DIM,
};

/// Rotation and translation blocks of a pose.
pub fn pose_to_blocks(pose: &Iso3) -> (DVector<f64>, DVector<f64>) {
    let (q, t) = iso3_to_params(pose);
    (DVector::from_row_slice(&q), DVector::from_row_slice(&t))
}

/// Rebuild a pose from its rotation and translation blocks.
pub fn pose_from_blocks(rotation: &DVector<f64>, translation: &DVector<f64>) -> Result<Iso3> {
    ensure!(
        rotation.len() == QUAT_DIM,
        "rotation block must have {} entries, got {}",
        QUAT_DIM,
        rotation.len()
    );
    ensure!(
        translation.len() == VEC3_DIM,
        "translation block must have {} entries, got {}",
        VEC3_DIM,
        translation.len()
    );
    ensure!(
        rotation.norm() > 0.0 && rotation.iter().all(|v| v.is_finite()),
        "rotation block is not a valid quaternion: {:?}",
        rotation.as_slice()
    );
    Ok(iso3_from_params(rotation.as_slice(), translation.as_slice()))
}

/// Quaternion block of a rotation.
pub fn rotation_to_block(rotation: &UnitQuaternion<f64>) -> DVector<f64> {
    DVector::from_row_slice(&quat_to_array(rotation.quaternion()))
}

/// Rotation from a quaternion block; the block is normalized.
pub fn rotation_from_block(block: &DVector<f64>) -> Result<UnitQuaternion<f64>> {
    ensure!(
        block.len() == QUAT_DIM,
        "rotation block must have {} entries, got {}",
        QUAT_DIM,
        block.len()
    );
    let q = Quaternion::new(block[3], block[0], block[1], block[2]);
    ensure!(
        q.norm() > 0.0 && q.coords.iter().all(|v| v.is_finite()),
        "rotation block is not a valid quaternion: {:?}",
        block.as_slice()
    );
    Ok(UnitQuaternion::from_quaternion(q))
}

pub fn vec3_to_block(v: &Vec3) -> DVector<f64> {
    DVector::from_row_slice(v.as_slice())
}

pub fn vec3_from_block(block: &DVector<f64>) -> Result<Vec3> {
    ensure!(
        block.len() == VEC3_DIM,
        "expected a 3-vector block, got {} entries",
        block.len()
    );
    Ok(Vec3::new(block[0], block[1], block[2]))
}

pub fn point_to_block(p: &Pt3) -> DVector<f64> {
    vec3_to_block(&p.coords)
}

pub fn point_from_block(block: &DVector<f64>) -> Result<Pt3> {
    vec3_from_block(block).map(Pt3::from)
}

pub fn camera_to_block(camera: &CameraParams) -> DVector<f64> {
    DVector::from_row_slice(&camera.params)
}

/// Rebuild validated camera parameters from an intrinsics block.
pub fn camera_from_block(model: CameraModelKind, block: &DVector<f64>) -> Result<CameraParams> {
    Ok(CameraParams::new(model, block.as_slice().to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Translation3;

    #[test]
    fn pose_blocks_roundtrip() {
        let pose = Iso3::from_parts(
            Translation3::new(0.5, -1.0, 2.0),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 0.1),
        );
        let (q, t) = pose_to_blocks(&pose);
        assert_eq!(q[3], pose.rotation.quaternion().w);
        let back = pose_from_blocks(&q, &t).unwrap();
        assert!((back.to_homogeneous() - pose.to_homogeneous()).norm() < 1e-12);
    }

    #[test]
    fn degenerate_rotation_block_is_rejected() {
        let zero = DVector::zeros(4);
        assert!(rotation_from_block(&zero).is_err());
        assert!(pose_from_blocks(&zero, &DVector::zeros(3)).is_err());
        assert!(rotation_from_block(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn rotation_block_is_normalized() {
        let block = DVector::from_row_slice(&[0.0, 0.0, 0.0, 2.0]);
        let q = rotation_from_block(&block).unwrap();
        assert!((q.angle()).abs() < 1e-12);
        assert_eq!(rotation_to_block(&q).as_slice(), &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn camera_block_is_validated() {
        let block = DVector::from_row_slice(&[-5.0, 10.0, 10.0]);
        assert!(camera_from_block(CameraModelKind::SimplePinhole, &block).is_err());
        let block = DVector::from_row_slice(&[5.0, 10.0, 10.0]);
        let cam = camera_from_block(CameraModelKind::SimplePinhole, &block).unwrap();
        assert_eq!(camera_to_block(&cam), block);
    }
}
