//! Forward-mode Jacobians of factors via dual numbers.
//!
//! The solver backend differentiates factors on its own; this module exposes
//! the same derivatives directly, one dense block per parameter block, for
//! diagnostics and tests.

use nalgebra::{DMatrix, DVector};
use num_dual::Dual64;

use crate::factors::{check_parameter_blocks, CostFunction, FactorError};

/// Residuals and per-block Jacobians of a factor at a parameter point.
#[derive(Debug, Clone)]
pub struct FactorEvaluation {
    pub residuals: DVector<f64>,
    /// `jacobians[i]` has shape `NUM_RESIDUALS x block_size(i)`.
    pub jacobians: Vec<DMatrix<f64>>,
}

/// Evaluate `factor` and its Jacobian with respect to every parameter.
///
/// Each parameter is seeded separately with a unit dual part, so the cost is
/// one dual evaluation per scalar parameter.
pub fn evaluate_with_jacobians<F: CostFunction>(
    factor: &F,
    params: &[&[f64]],
) -> Result<FactorEvaluation, FactorError> {
    let sizes: Vec<usize> = params.iter().map(|p| p.len()).collect();
    check_parameter_blocks(factor, &sizes)?;

    let residuals = factor.evaluate::<f64>(params);
    let rows = residuals.len();

    let mut jacobians = Vec::with_capacity(params.len());
    for (block_idx, block) in params.iter().enumerate() {
        let mut jac = DMatrix::<f64>::zeros(rows, block.len());
        for col in 0..block.len() {
            let seeded = seed(params, block_idx, col);
            let views: Vec<&[Dual64]> = seeded.iter().map(Vec::as_slice).collect();
            let r = factor.evaluate::<Dual64>(&views);
            for row in 0..rows {
                jac[(row, col)] = r[row].eps;
            }
        }
        jacobians.push(jac);
    }

    Ok(FactorEvaluation {
        residuals,
        jacobians,
    })
}

fn seed(params: &[&[f64]], block_idx: usize, col: usize) -> Vec<Vec<Dual64>> {
    params
        .iter()
        .enumerate()
        .map(|(b, values)| {
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let eps = if b == block_idx && i == col { 1.0 } else { 0.0 };
                    Dual64::new(v, eps)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{
        FixedPoseReprojectionFactor, RelativePoseFactor, ReprojectionFactor,
        RigReprojectionFactor,
    };
    use nalgebra::{Translation3, UnitQuaternion};
    use sfm_core::{iso3_to_params, Iso3, OpenCv, SimplePinhole, Vec2};

    fn central_difference<F: CostFunction>(
        factor: &F,
        params: &[&[f64]],
        block_idx: usize,
        col: usize,
    ) -> DVector<f64> {
        let h = 1e-6;
        let mut plus: Vec<Vec<f64>> = params.iter().map(|p| p.to_vec()).collect();
        let mut minus = plus.clone();
        plus[block_idx][col] += h;
        minus[block_idx][col] -= h;
        let plus_views: Vec<&[f64]> = plus.iter().map(Vec::as_slice).collect();
        let minus_views: Vec<&[f64]> = minus.iter().map(Vec::as_slice).collect();
        (factor.evaluate::<f64>(&plus_views) - factor.evaluate::<f64>(&minus_views)) / (2.0 * h)
    }

    fn assert_matches_finite_differences<F: CostFunction>(factor: &F, params: &[&[f64]], tol: f64) {
        let eval = evaluate_with_jacobians(factor, params).unwrap();
        assert_eq!(eval.residuals.len(), F::NUM_RESIDUALS);
        assert_eq!(eval.jacobians.len(), params.len());
        for (block_idx, jac) in eval.jacobians.iter().enumerate() {
            assert_eq!(jac.ncols(), params[block_idx].len());
            for col in 0..jac.ncols() {
                let fd = central_difference(factor, params, block_idx, col);
                let ad = jac.column(col);
                let scale = 1.0 + fd.amax();
                assert!(
                    (ad - &fd).amax() < tol * scale,
                    "block {block_idx} col {col}: ad={ad:?} fd={fd:?}"
                );
            }
        }
    }

    fn pose() -> Iso3 {
        Iso3::from_parts(
            Translation3::new(0.1, -0.3, 4.0),
            UnitQuaternion::from_euler_angles(0.2, -0.1, 0.3),
        )
    }

    #[test]
    fn reprojection_jacobian_matches_finite_differences() {
        let (q, t) = iso3_to_params(&pose());
        let camera = [700.0, 710.0, 320.0, 240.0, -0.12, 0.02, 0.001, -0.001];
        let factor = ReprojectionFactor::<OpenCv>::new(Vec2::new(300.0, 260.0));
        assert_matches_finite_differences(&factor, &[&q, &t, &[0.3, -0.2, 0.5], &camera], 1e-5);
    }

    #[test]
    fn fixed_pose_jacobian_matches_finite_differences() {
        let camera = [650.0, 300.0, 200.0];
        let factor =
            FixedPoseReprojectionFactor::<SimplePinhole>::from_pose(&pose(), Vec2::new(310.0, 180.0));
        assert_matches_finite_differences(&factor, &[&[0.3, -0.2, 0.5], &camera], 1e-5);
    }

    #[test]
    fn rig_jacobian_matches_finite_differences() {
        let (rig_q, rig_t) = iso3_to_params(&pose());
        let rel = Iso3::from_parts(
            Translation3::new(-0.2, 0.0, 0.05),
            UnitQuaternion::from_euler_angles(0.0, 0.15, -0.05),
        );
        let (rel_q, rel_t) = iso3_to_params(&rel);
        let camera = [650.0, 300.0, 200.0];
        let factor = RigReprojectionFactor::<SimplePinhole>::new(Vec2::new(290.0, 210.0));
        assert_matches_finite_differences(
            &factor,
            &[&rig_q, &rig_t, &rel_q, &rel_t, &[0.3, -0.2, 0.5], &camera],
            1e-5,
        );
    }

    #[test]
    fn relative_pose_jacobian_matches_finite_differences() {
        let (q, _) = iso3_to_params(&pose());
        let t = [0.8, 0.0, 0.6];
        let factor = RelativePoseFactor::new(Vec2::new(0.1, -0.2), Vec2::new(0.25, -0.15));
        assert_matches_finite_differences(&factor, &[&q, &t], 1e-6);
    }

    #[test]
    fn mismatched_blocks_are_rejected() {
        let factor = RelativePoseFactor::new(Vec2::zeros(), Vec2::zeros());
        let err = evaluate_with_jacobians(&factor, &[&[0.0, 0.0, 0.0, 1.0], &[1.0, 0.0]]).unwrap_err();
        assert_eq!(
            err,
            FactorError::BlockSize {
                block: 1,
                expected: 3,
                got: 2
            }
        );
    }
}
