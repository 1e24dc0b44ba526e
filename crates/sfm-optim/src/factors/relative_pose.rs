//! Two-view epipolar residual.

use nalgebra::{DVector, RealField, SVector};
use sfm_core::{
    quat_from_slice, quaternion_to_rotation, skew, to_homogeneous, vec3_from_slice, Vec2,
    QUAT_DIM, VEC3_DIM,
};

use super::CostFunction;

/// Squared Sampson error of a normalized correspondence under `E = [t]× R`.
///
/// Parameter blocks: `[rotation (4), translation (3)]`, where the pose maps
/// camera-1 coordinates into camera 2. The translation is expected to lie on
/// the unit sphere; only its direction is observable.
///
/// Residual: `(x2ᵀ E x1)² / ((E x1)₀² + (E x1)₁² + (Eᵀ x2)₀² + (Eᵀ x2)₁²)`.
/// A vanishing denominator is not trapped.
#[derive(Debug, Clone)]
pub struct RelativePoseFactor {
    x1: Vec2,
    x2: Vec2,
}

impl RelativePoseFactor {
    /// `x1` and `x2` are normalized image coordinates in camera 1 and camera 2.
    pub fn new(x1: Vec2, x2: Vec2) -> Self {
        Self { x1, x2 }
    }

    pub fn correspondence(&self) -> (Vec2, Vec2) {
        (self.x1, self.x2)
    }

    pub fn residual<T: RealField>(&self, qvec: &[T], tvec: &[T]) -> SVector<T, 1> {
        let rotation = quaternion_to_rotation(&quat_from_slice(qvec));
        let essential = skew(&vec3_from_slice(tvec)) * rotation;

        let x1 = to_homogeneous::<T>(&self.x1);
        let x2 = to_homogeneous::<T>(&self.x2);

        let ex1 = &essential * &x1;
        let etx2 = essential.transpose() * &x2;
        let x2tex1 = x2.dot(&ex1);

        let numerator = x2tex1.clone() * x2tex1;
        let denominator = ex1[0].clone() * ex1[0].clone()
            + ex1[1].clone() * ex1[1].clone()
            + etx2[0].clone() * etx2[0].clone()
            + etx2[1].clone() * etx2[1].clone();

        SVector::<T, 1>::new(numerator / denominator)
    }
}

impl CostFunction for RelativePoseFactor {
    const NUM_RESIDUALS: usize = 1;

    fn parameter_block_sizes(&self) -> Vec<usize> {
        vec![QUAT_DIM, VEC3_DIM]
    }

    fn evaluate<T: RealField>(&self, params: &[&[T]]) -> DVector<T> {
        debug_assert_eq!(params.len(), 2, "expected [rotation, translation] parameter blocks");
        let r = self.residual(params[0], params[1]);
        DVector::from_column_slice(r.as_slice())
    }
}
