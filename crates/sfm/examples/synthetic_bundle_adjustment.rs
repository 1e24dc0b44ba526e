//! Bundle adjustment with synthetic data.
//!
//! This example demonstrates the refinement workflow on a synthetic scene:
//! 1. Generate a point cloud and a ring of cameras looking at it
//! 2. Project the points with pixel noise
//! 3. Perturb poses, points and the focal length
//! 4. Refine with bundle adjustment and compare against ground truth
//!
//! Run with: `cargo run -p sfm --example synthetic_bundle_adjustment`

use anyhow::Result;
use sfm::bundle_adjustment::{
    BundleAdjustmentDataset, BundleAdjustmentOptions, ImageObservations,
    optimize_bundle_adjustment,
};
use sfm::prelude::*;
use sfm::synthetic::noise::UniformPixelNoise;
use sfm::synthetic::scene::{points_in_box, poses_on_arc, project_points_noisy};

fn main() -> Result<()> {
    println!("=== Bundle Adjustment (Synthetic Data) ===\n");

    let camera_gt =
        CameraParams::new(CameraModelKind::SimpleRadial, vec![700.0, 320.0, 240.0, -0.08])?;
    let points_gt = points_in_box(
        200,
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, 1.0),
        7,
    );
    let poses_gt = poses_on_arc(8, 6.0, 1.2, &Vec3::zeros());
    let noise = UniformPixelNoise {
        seed: 11,
        max_abs_px: 0.5,
    };

    println!(
        "Ground truth: f={:.1}, k={:.3}, {} images, {} points\n",
        camera_gt.params[0],
        camera_gt.params[3],
        poses_gt.len(),
        points_gt.len()
    );

    // Perturbed initial guesses
    let images = poses_gt
        .iter()
        .enumerate()
        .map(|(idx, pose)| {
            let observations = project_points_noisy::<SimpleRadial>(
                &camera_gt.params,
                pose,
                &points_gt,
                idx,
                &noise,
            );
            let jitter = Iso3::translation(0.02 * idx as f64, -0.01, 0.03);
            ImageObservations {
                camera_idx: 0,
                pose: if idx < 2 { *pose } else { jitter * pose },
                observations,
            }
        })
        .collect();
    let points_init = points_gt
        .iter()
        .map(|p| p + Vec3::new(0.02, -0.015, 0.01))
        .collect();
    let mut camera_init = camera_gt.clone();
    camera_init.params[0] = 680.0;
    camera_init.params[3] = 0.0;

    let dataset = BundleAdjustmentDataset::new(vec![camera_init], images, points_init)?;
    let opts = BundleAdjustmentOptions {
        robust_loss: RobustLoss::Huber { scale: 2.0 },
        constant_poses: vec![0, 1],
        ..Default::default()
    };
    let result = optimize_bundle_adjustment(&dataset, &opts, &BackendSolveOptions::default())?;

    println!("--- Result ---");
    println!("  Residuals:       {}", result.num_residuals);
    println!("  Cost:            {:.4e} -> {:.4e}", result.initial_cost, result.final_cost);
    println!("  Mean reproj err: {:.4} px", result.mean_reprojection_error);
    println!(
        "  Camera:          f={:.2}, k={:.4}",
        result.cameras[0].params[0], result.cameras[0].params[3]
    );

    let max_point_err = result
        .points
        .iter()
        .zip(&points_gt)
        .map(|(p, q)| (p - q).norm())
        .fold(0.0, f64::max);
    println!("  Max point error: {:.4}", max_point_err);

    Ok(())
}
