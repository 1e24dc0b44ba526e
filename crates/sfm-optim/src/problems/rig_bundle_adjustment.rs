//! Bundle adjustment of multi-camera rigs.
//!
//! Every synchronized capture (snapshot) has one rig-from-world pose; each
//! camera of the rig has a camera-from-rig pose shared by all snapshots of
//! that rig. The camera pose of an image is the composition
//! `cam_from_world = cam_from_rig * rig_from_world`.
//!
//! The first camera of each rig is the reference sensor: its relative pose is
//! always held constant.

use crate::backend::{solve_with_backend, BackendKind, BackendSolveOptions};
use crate::ir::{FactorKind, FixedMask, ManifoldKind, ParamId, ProblemIR, ResidualBlock, RobustLoss};
use crate::params::{
    camera_from_block, camera_to_block, point_from_block, point_to_block, pose_from_blocks,
    pose_to_blocks,
};
use crate::problems::{intrinsics_mask, mean_residual_norm, solved, track_lengths};
use anyhow::{anyhow, ensure, Result};
use log::{debug, info};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use sfm_core::synthetic::scene::PointObservation;
use sfm_core::{CameraParams, Iso3, Pt3, QUAT_DIM, VEC3_DIM};
use std::collections::HashMap;

/// One camera mounted on a rig.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigCamera {
    /// Index into [`RigBundleAdjustmentDataset::cameras`].
    pub camera_idx: usize,
    pub cam_from_rig: Iso3,
}

/// A rigid assembly of cameras; `cameras[0]` is the reference sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rig {
    pub cameras: Vec<RigCamera>,
}

/// Observations of one rig camera within a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotImage {
    /// Index into the rig's `cameras`.
    pub rig_camera: usize,
    pub observations: Vec<PointObservation>,
}

/// One synchronized capture of a rig.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigSnapshot {
    pub rig_idx: usize,
    pub rig_from_world: Iso3,
    pub images: Vec<SnapshotImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigBundleAdjustmentDataset {
    pub cameras: Vec<CameraParams>,
    pub rigs: Vec<Rig>,
    pub snapshots: Vec<RigSnapshot>,
    pub points: Vec<Pt3>,
}

impl RigBundleAdjustmentDataset {
    pub fn new(
        cameras: Vec<CameraParams>,
        rigs: Vec<Rig>,
        snapshots: Vec<RigSnapshot>,
        points: Vec<Pt3>,
    ) -> Result<Self> {
        ensure!(!snapshots.is_empty(), "need at least one snapshot");
        for (idx, camera) in cameras.iter().enumerate() {
            camera
                .validate()
                .map_err(|e| anyhow!("camera {}: {}", idx, e))?;
        }
        for (rig_idx, rig) in rigs.iter().enumerate() {
            ensure!(!rig.cameras.is_empty(), "rig {} has no cameras", rig_idx);
            for cam in &rig.cameras {
                ensure!(
                    cam.camera_idx < cameras.len(),
                    "rig {} references camera {}, but only {} cameras exist",
                    rig_idx,
                    cam.camera_idx,
                    cameras.len()
                );
            }
        }
        for (snap_idx, snapshot) in snapshots.iter().enumerate() {
            let rig = rigs.get(snapshot.rig_idx).ok_or_else(|| {
                anyhow!(
                    "snapshot {} references rig {}, but only {} rigs exist",
                    snap_idx,
                    snapshot.rig_idx,
                    rigs.len()
                )
            })?;
            for image in &snapshot.images {
                ensure!(
                    image.rig_camera < rig.cameras.len(),
                    "snapshot {} references rig camera {}, but rig {} has {} cameras",
                    snap_idx,
                    image.rig_camera,
                    snapshot.rig_idx,
                    rig.cameras.len()
                );
                for obs in &image.observations {
                    ensure!(
                        obs.point_idx < points.len(),
                        "snapshot {} observes point {}, but only {} points exist",
                        snap_idx,
                        obs.point_idx,
                        points.len()
                    );
                }
            }
        }
        Ok(Self {
            cameras,
            rigs,
            snapshots,
            points,
        })
    }

    pub fn track_lengths(&self) -> Vec<usize> {
        track_lengths(
            self.points.len(),
            self.snapshots
                .iter()
                .flat_map(|s| s.images.iter())
                .flat_map(|i| i.observations.iter().map(|o| &o.point_idx)),
        )
    }
}

/// Rig bundle adjustment options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigBundleAdjustmentOptions {
    pub robust_loss: RobustLoss,
    pub refine_focal_length: bool,
    pub refine_principal_point: bool,
    pub refine_extra_params: bool,
    /// Refine the camera-from-rig poses of non-reference cameras.
    pub refine_relative_poses: bool,
    /// Snapshot indices whose rig pose is held constant.
    pub constant_rig_poses: Vec<usize>,
    pub constant_points: Vec<usize>,
    pub min_track_length: usize,
}

impl Default for RigBundleAdjustmentOptions {
    fn default() -> Self {
        Self {
            robust_loss: RobustLoss::None,
            refine_focal_length: true,
            refine_principal_point: false,
            refine_extra_params: true,
            refine_relative_poses: true,
            constant_rig_poses: Vec::new(),
            constant_points: Vec::new(),
            min_track_length: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RigBundleAdjustmentResult {
    pub cameras: Vec<CameraParams>,
    /// `cams_from_rig[rig][camera]`.
    pub cams_from_rig: Vec<Vec<Iso3>>,
    pub rigs_from_world: Vec<Iso3>,
    pub points: Vec<Pt3>,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub num_residuals: usize,
    pub mean_reprojection_error: f64,
}

fn camera_key(idx: usize) -> String {
    format!("cam/{}", idx)
}

fn rig_rotation_key(snapshot: usize) -> String {
    format!("rig_rot/{}", snapshot)
}

fn rig_translation_key(snapshot: usize) -> String {
    format!("rig_trans/{}", snapshot)
}

fn rel_rotation_key(rig: usize, camera: usize) -> String {
    format!("rel_rot/{}/{}", rig, camera)
}

fn rel_translation_key(rig: usize, camera: usize) -> String {
    format!("rel_trans/{}/{}", rig, camera)
}

fn point_key(idx: usize) -> String {
    format!("point/{}", idx)
}

/// Rotation and translation blocks of one pose.
struct PoseIds {
    rotation: ParamId,
    translation: ParamId,
}

fn add_pose_blocks(
    ir: &mut ProblemIR,
    initial_map: &mut HashMap<String, DVector<f64>>,
    keys: (String, String),
    pose: &Iso3,
    constant: bool,
) -> PoseIds {
    let (q, t) = pose_to_blocks(pose);
    let (q_fixed, t_fixed) = if constant {
        (FixedMask::all_fixed(QUAT_DIM), FixedMask::all_fixed(VEC3_DIM))
    } else {
        (FixedMask::all_free(), FixedMask::all_free())
    };
    let rotation = ir.add_param_block(keys.0.clone(), QUAT_DIM, ManifoldKind::SO3, q_fixed, None);
    let translation =
        ir.add_param_block(keys.1.clone(), VEC3_DIM, ManifoldKind::Euclidean, t_fixed, None);
    initial_map.insert(keys.0, q);
    initial_map.insert(keys.1, t);
    PoseIds {
        rotation,
        translation,
    }
}

/// Build IR for rig bundle adjustment.
pub fn build_rig_bundle_adjustment_ir(
    dataset: &RigBundleAdjustmentDataset,
    opts: &RigBundleAdjustmentOptions,
) -> Result<(ProblemIR, HashMap<String, DVector<f64>>)> {
    let tracks = dataset.track_lengths();
    let min_track = opts.min_track_length.max(1);

    let mut ir = ProblemIR::new();
    let mut initial_map = HashMap::new();
    let mut camera_ids: HashMap<usize, ParamId> = HashMap::new();
    let mut rel_ids: HashMap<(usize, usize), PoseIds> = HashMap::new();
    let mut point_ids: HashMap<usize, ParamId> = HashMap::new();

    for (snap_idx, snapshot) in dataset.snapshots.iter().enumerate() {
        let rig = &dataset.rigs[snapshot.rig_idx];
        let usable = |image: &SnapshotImage| {
            image
                .observations
                .iter()
                .any(|o| tracks[o.point_idx] >= min_track)
        };
        if !snapshot.images.iter().any(&usable) {
            debug!("snapshot {} has no usable observations", snap_idx);
            continue;
        }

        let rig_pose = add_pose_blocks(
            &mut ir,
            &mut initial_map,
            (rig_rotation_key(snap_idx), rig_translation_key(snap_idx)),
            &snapshot.rig_from_world,
            opts.constant_rig_poses.contains(&snap_idx),
        );

        for image in snapshot.images.iter().filter(|i| usable(i)) {
            let rig_camera = &rig.cameras[image.rig_camera];
            let camera = &dataset.cameras[rig_camera.camera_idx];

            let cam_id = *camera_ids.entry(rig_camera.camera_idx).or_insert_with(|| {
                let key = camera_key(rig_camera.camera_idx);
                initial_map.insert(key.clone(), camera_to_block(camera));
                ir.add_param_block(
                    key,
                    camera.params.len(),
                    ManifoldKind::Euclidean,
                    intrinsics_mask(
                        camera.model,
                        opts.refine_focal_length,
                        opts.refine_principal_point,
                        opts.refine_extra_params,
                    ),
                    None,
                )
            });

            let rel = rel_ids
                .entry((snapshot.rig_idx, image.rig_camera))
                .or_insert_with(|| {
                    let constant = !opts.refine_relative_poses || image.rig_camera == 0;
                    add_pose_blocks(
                        &mut ir,
                        &mut initial_map,
                        (
                            rel_rotation_key(snapshot.rig_idx, image.rig_camera),
                            rel_translation_key(snapshot.rig_idx, image.rig_camera),
                        ),
                        &rig_camera.cam_from_rig,
                        constant,
                    )
                });
            let (rel_q, rel_t) = (rel.rotation, rel.translation);

            for obs in &image.observations {
                if tracks[obs.point_idx] < min_track {
                    continue;
                }
                let point_id = *point_ids.entry(obs.point_idx).or_insert_with(|| {
                    let key = point_key(obs.point_idx);
                    initial_map.insert(key.clone(), point_to_block(&dataset.points[obs.point_idx]));
                    let fixed = if opts.constant_points.contains(&obs.point_idx) {
                        FixedMask::all_fixed(VEC3_DIM)
                    } else {
                        FixedMask::all_free()
                    };
                    ir.add_param_block(key, VEC3_DIM, ManifoldKind::Euclidean, fixed, None)
                });

                ir.add_residual_block(ResidualBlock::new(
                    FactorKind::RigReprojection {
                        model: camera.model,
                        uv: [obs.uv.x, obs.uv.y],
                    },
                    vec![
                        rig_pose.rotation,
                        rig_pose.translation,
                        rel_q,
                        rel_t,
                        point_id,
                        cam_id,
                    ],
                    opts.robust_loss,
                ));
            }
        }
    }

    ensure!(
        !ir.residuals.is_empty(),
        "no observations left with track length >= {}",
        min_track
    );
    ir.validate()?;
    Ok((ir, initial_map))
}

/// Run rig bundle adjustment with the tiny-solver backend.
pub fn optimize_rig_bundle_adjustment(
    dataset: &RigBundleAdjustmentDataset,
    opts: &RigBundleAdjustmentOptions,
    backend_opts: &BackendSolveOptions,
) -> Result<RigBundleAdjustmentResult> {
    let (ir, initial_map) = build_rig_bundle_adjustment_ir(dataset, opts)?;
    info!(
        "rig bundle adjustment: {} rigs, {} snapshots, {} residuals",
        dataset.rigs.len(),
        dataset.snapshots.len(),
        ir.residuals.len()
    );
    let solution = solve_with_backend(BackendKind::TinySolver, &ir, &initial_map, backend_opts)?;

    let solved_pose = |keys: (String, String), fallback: &Iso3| -> Result<Iso3> {
        match (solved(&solution, &keys.0), solved(&solution, &keys.1)) {
            (Some(q), Some(t)) => pose_from_blocks(q, t),
            _ => Ok(*fallback),
        }
    };

    let cameras = dataset
        .cameras
        .iter()
        .enumerate()
        .map(|(idx, camera)| match solved(&solution, &camera_key(idx)) {
            Some(block) => camera_from_block(camera.model, block),
            None => Ok(camera.clone()),
        })
        .collect::<Result<Vec<_>>>()?;

    let cams_from_rig = dataset
        .rigs
        .iter()
        .enumerate()
        .map(|(rig_idx, rig)| {
            rig.cameras
                .iter()
                .enumerate()
                .map(|(cam, rc)| {
                    solved_pose(
                        (rel_rotation_key(rig_idx, cam), rel_translation_key(rig_idx, cam)),
                        &rc.cam_from_rig,
                    )
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let rigs_from_world = dataset
        .snapshots
        .iter()
        .enumerate()
        .map(|(idx, snapshot)| {
            solved_pose(
                (rig_rotation_key(idx), rig_translation_key(idx)),
                &snapshot.rig_from_world,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let points = dataset
        .points
        .iter()
        .enumerate()
        .map(|(idx, point)| match solved(&solution, &point_key(idx)) {
            Some(block) => point_from_block(block),
            None => Ok(*point),
        })
        .collect::<Result<Vec<_>>>()?;

    let mean_reprojection_error = mean_residual_norm(&ir, &solution.params)?;

    Ok(RigBundleAdjustmentResult {
        cameras,
        cams_from_rig,
        rigs_from_world,
        points,
        initial_cost: solution.initial_cost,
        final_cost: solution.final_cost,
        num_residuals: ir.residuals.len(),
        mean_reprojection_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfm_core::{CameraModelKind, Vec2};

    fn dataset() -> RigBundleAdjustmentDataset {
        let camera =
            CameraParams::new(CameraModelKind::Pinhole, vec![400.0, 400.0, 320.0, 240.0]).unwrap();
        let obs = |point_idx| PointObservation {
            point_idx,
            uv: Vec2::new(320.0, 240.0),
        };
        let rig = Rig {
            cameras: vec![
                RigCamera {
                    camera_idx: 0,
                    cam_from_rig: Iso3::identity(),
                },
                RigCamera {
                    camera_idx: 0,
                    cam_from_rig: Iso3::translation(-0.2, 0.0, 0.0),
                },
            ],
        };
        let snapshot = |x: f64| RigSnapshot {
            rig_idx: 0,
            rig_from_world: Iso3::translation(x, 0.0, 4.0),
            images: vec![
                SnapshotImage {
                    rig_camera: 0,
                    observations: vec![obs(0), obs(1)],
                },
                SnapshotImage {
                    rig_camera: 1,
                    observations: vec![obs(0)],
                },
            ],
        };
        RigBundleAdjustmentDataset::new(
            vec![camera],
            vec![rig],
            vec![snapshot(0.0), snapshot(0.3)],
            vec![Pt3::new(0.0, 0.0, 0.0), Pt3::new(0.1, 0.1, 0.0)],
        )
        .unwrap()
    }

    #[test]
    fn dataset_validates_rig_references() {
        let mut ds = dataset();
        ds.snapshots[0].rig_idx = 1;
        assert!(RigBundleAdjustmentDataset::new(ds.cameras, ds.rigs, ds.snapshots, ds.points).is_err());

        let mut ds = dataset();
        ds.snapshots[1].images[1].rig_camera = 2;
        assert!(RigBundleAdjustmentDataset::new(ds.cameras, ds.rigs, ds.snapshots, ds.points).is_err());

        let mut ds = dataset();
        ds.rigs[0].cameras[1].camera_idx = 5;
        assert!(RigBundleAdjustmentDataset::new(ds.cameras, ds.rigs, ds.snapshots, ds.points).is_err());
    }

    #[test]
    fn relative_poses_are_shared_across_snapshots() {
        let ds = dataset();
        let (ir, _) = build_rig_bundle_adjustment_ir(&ds, &RigBundleAdjustmentOptions::default()).unwrap();
        // Two snapshots, point 0 seen by both cameras, point 1 by camera 0.
        assert_eq!(ir.residuals.len(), 6);
        let rel_blocks = ir.params.iter().filter(|p| p.name.starts_with("rel_")).count();
        assert_eq!(rel_blocks, 4);
        let rig_blocks = ir.params.iter().filter(|p| p.name.starts_with("rig_")).count();
        assert_eq!(rig_blocks, 4);
    }

    #[test]
    fn reference_camera_is_constant() {
        let ds = dataset();
        let (ir, _) = build_rig_bundle_adjustment_ir(&ds, &RigBundleAdjustmentOptions::default()).unwrap();
        let block = |name: &str| &ir.params[ir.param_by_name(name).unwrap().0];
        assert!(block("rel_rot/0/0").fixed.is_all_fixed(4));
        assert!(block("rel_trans/0/0").fixed.is_all_fixed(3));
        assert!(block("rel_rot/0/1").fixed.is_empty());

        let opts = RigBundleAdjustmentOptions {
            refine_relative_poses: false,
            constant_rig_poses: vec![1],
            ..Default::default()
        };
        let (ir, _) = build_rig_bundle_adjustment_ir(&ds, &opts).unwrap();
        let block = |name: &str| &ir.params[ir.param_by_name(name).unwrap().0];
        assert!(block("rel_rot/0/1").fixed.is_all_fixed(4));
        assert!(block("rig_trans/1").fixed.is_all_fixed(3));
        assert!(block("rig_trans/0").fixed.is_empty());
    }

    #[test]
    fn residuals_use_rig_factor_layout() {
        let ds = dataset();
        let (ir, _) = build_rig_bundle_adjustment_ir(&ds, &RigBundleAdjustmentOptions::default()).unwrap();
        for residual in &ir.residuals {
            assert!(matches!(residual.factor, FactorKind::RigReprojection { .. }));
            assert_eq!(residual.params.len(), 6);
        }
    }
}
