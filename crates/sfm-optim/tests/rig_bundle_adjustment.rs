//! Integration tests for rig bundle adjustment.
//!
//! A two-camera rig observes a synthetic point cloud from several snapshots.
//! The tests validate:
//! 1. Zero residuals at ground truth through the composed rig pose
//! 2. Recovery of a perturbed camera-from-rig pose against fixed structure
//! 3. Recovery of perturbed rig poses with the relative poses held constant

use nalgebra::{Translation3, UnitQuaternion};
use sfm_core::synthetic::scene::{points_in_box, poses_on_arc, project_points};
use sfm_core::{CameraModelKind, CameraParams, Iso3, Pinhole, Pt3, Vec3};
use sfm_optim::backend::{evaluate_residuals, BackendSolveOptions};
use sfm_optim::problems::rig_bundle_adjustment::*;

const NUM_SNAPSHOTS: usize = 4;

struct RigScene {
    cameras: Vec<CameraParams>,
    cams_from_rig: Vec<Iso3>,
    rigs_from_world: Vec<Iso3>,
    points: Vec<Pt3>,
}

fn rig_scene() -> RigScene {
    let cameras = vec![
        CameraParams::new(CameraModelKind::Pinhole, vec![520.0, 515.0, 320.0, 240.0]).unwrap(),
        CameraParams::new(CameraModelKind::Pinhole, vec![480.0, 482.0, 310.0, 250.0]).unwrap(),
    ];
    let cams_from_rig = vec![
        Iso3::identity(),
        Iso3::from_parts(
            Translation3::new(-0.3, 0.02, 0.01),
            UnitQuaternion::from_euler_angles(0.01, 0.05, -0.02),
        ),
    ];
    RigScene {
        cameras,
        cams_from_rig,
        rigs_from_world: poses_on_arc(NUM_SNAPSHOTS, 6.0, 0.6, &Vec3::zeros()),
        points: points_in_box(
            50,
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
            29,
        ),
    }
}

/// Observations come from `scene`; the initial guesses from the other arguments.
fn dataset(
    scene: &RigScene,
    cams_from_rig: &[Iso3],
    rigs_from_world: &[Iso3],
) -> RigBundleAdjustmentDataset {
    let rig = Rig {
        cameras: cams_from_rig
            .iter()
            .enumerate()
            .map(|(camera_idx, cam_from_rig)| RigCamera {
                camera_idx,
                cam_from_rig: *cam_from_rig,
            })
            .collect(),
    };
    let snapshots = scene
        .rigs_from_world
        .iter()
        .zip(rigs_from_world)
        .map(|(gt_rig_from_world, rig_from_world)| RigSnapshot {
            rig_idx: 0,
            rig_from_world: *rig_from_world,
            images: scene
                .cams_from_rig
                .iter()
                .enumerate()
                .map(|(rig_camera, cam_from_rig)| SnapshotImage {
                    rig_camera,
                    observations: project_points::<Pinhole>(
                        &scene.cameras[rig_camera].params,
                        &(cam_from_rig * gt_rig_from_world),
                        &scene.points,
                    ),
                })
                .collect(),
        })
        .collect();
    RigBundleAdjustmentDataset::new(scene.cameras.clone(), vec![rig], snapshots, scene.points.clone())
        .unwrap()
}

fn fixed_structure_options() -> RigBundleAdjustmentOptions {
    RigBundleAdjustmentOptions {
        refine_focal_length: false,
        refine_extra_params: false,
        constant_points: (0..50).collect(),
        ..Default::default()
    }
}

fn tight_solver() -> BackendSolveOptions {
    BackendSolveOptions {
        max_iters: 200,
        min_abs_decrease: Some(1e-20),
        min_rel_decrease: Some(1e-12),
        min_error: Some(1e-20),
        ..Default::default()
    }
}

fn assert_pose_close(est: &Iso3, gt: &Iso3, rot_tol: f64, trans_tol: f64, what: &str) {
    let rot = est.rotation.angle_to(&gt.rotation);
    let trans = (est.translation.vector - gt.translation.vector).norm();
    assert!(rot < rot_tol, "{what}: rotation error {rot}");
    assert!(trans < trans_tol, "{what}: translation error {trans}");
}

#[test]
fn ground_truth_has_zero_residuals() {
    let scene = rig_scene();
    let ds = dataset(&scene, &scene.cams_from_rig, &scene.rigs_from_world);
    let (ir, initial) =
        build_rig_bundle_adjustment_ir(&ds, &RigBundleAdjustmentOptions::default()).unwrap();

    assert_eq!(ir.residuals.len(), NUM_SNAPSHOTS * 2 * scene.points.len());
    let residuals = evaluate_residuals(&ir, &initial).unwrap();
    for (idx, r) in residuals.iter().enumerate() {
        assert_eq!(r.len(), 2);
        assert!(r.norm() < 1e-9, "residual {idx}: {}", r.norm());
    }
}

#[test]
fn recovers_relative_pose_of_second_camera() {
    let scene = rig_scene();
    let mut init_rel = scene.cams_from_rig.clone();
    init_rel[1] = Iso3::from_parts(
        Translation3::new(0.04, -0.03, 0.02),
        UnitQuaternion::from_euler_angles(-0.02, 0.015, 0.01),
    ) * init_rel[1];

    let ds = dataset(&scene, &init_rel, &scene.rigs_from_world);
    let opts = RigBundleAdjustmentOptions {
        constant_rig_poses: (0..NUM_SNAPSHOTS).collect(),
        ..fixed_structure_options()
    };
    let result = optimize_rig_bundle_adjustment(&ds, &opts, &tight_solver()).unwrap();

    assert!(result.final_cost < 1e-10, "final cost {}", result.final_cost);
    assert!(result.initial_cost > result.final_cost);
    assert_pose_close(&result.cams_from_rig[0][0], &Iso3::identity(), 1e-12, 1e-12, "reference");
    assert_pose_close(
        &result.cams_from_rig[0][1],
        &scene.cams_from_rig[1],
        1e-7,
        1e-6,
        "camera 1",
    );
    for (est, gt) in result.rigs_from_world.iter().zip(&scene.rigs_from_world) {
        assert_pose_close(est, gt, 1e-12, 1e-12, "constant rig pose");
    }
}

#[test]
fn recovers_rig_poses_with_constant_relative_poses() {
    let scene = rig_scene();
    let init_rigs: Vec<Iso3> = scene
        .rigs_from_world
        .iter()
        .enumerate()
        .map(|(i, pose)| {
            let s = (i as f64) - 1.5;
            Iso3::from_parts(
                Translation3::new(0.02 * s, 0.03, -0.05),
                UnitQuaternion::from_euler_angles(0.01 * s, -0.01, 0.02),
            ) * pose
        })
        .collect();

    let ds = dataset(&scene, &scene.cams_from_rig, &init_rigs);
    let opts = RigBundleAdjustmentOptions {
        refine_relative_poses: false,
        ..fixed_structure_options()
    };
    let result = optimize_rig_bundle_adjustment(&ds, &opts, &tight_solver()).unwrap();

    assert!(result.mean_reprojection_error < 1e-5);
    for (idx, (est, gt)) in result.rigs_from_world.iter().zip(&scene.rigs_from_world).enumerate() {
        assert_pose_close(est, gt, 1e-7, 1e-6, &format!("snapshot {idx}"));
    }
    for (est, gt) in result.cams_from_rig[0].iter().zip(&scene.cams_from_rig) {
        assert_pose_close(est, gt, 1e-12, 1e-12, "constant relative pose");
    }
}
