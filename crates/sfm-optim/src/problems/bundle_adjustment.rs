//! Bundle adjustment of single cameras.
//!
//! Jointly refines camera intrinsics, world-to-camera poses and 3D points by
//! minimizing the reprojection error of every observation. Images listed in
//! [`BundleAdjustmentOptions::constant_poses`] use the fixed-pose residual, so
//! their pose never enters the solver.

use crate::backend::{solve_with_backend, BackendKind, BackendSolveOptions};
use crate::ir::{FactorKind, FixedMask, ManifoldKind, ParamId, ProblemIR, ResidualBlock, RobustLoss};
use crate::params::{
    camera_from_block, camera_to_block, point_from_block, point_to_block, pose_from_blocks,
    pose_to_blocks,
};
use crate::problems::{intrinsics_mask, mean_residual_norm, solved, track_lengths};
use anyhow::{ensure, Result};
use log::{debug, info};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use sfm_core::synthetic::scene::PointObservation;
use sfm_core::{iso3_to_params, CameraParams, Iso3, Pt3, QUAT_DIM, VEC3_DIM};
use std::collections::HashMap;

/// Observations made by one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageObservations {
    /// Index into [`BundleAdjustmentDataset::cameras`].
    pub camera_idx: usize,
    /// World-to-camera pose.
    pub pose: Iso3,
    pub observations: Vec<PointObservation>,
}

/// Cameras, images and points of a reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleAdjustmentDataset {
    pub cameras: Vec<CameraParams>,
    pub images: Vec<ImageObservations>,
    pub points: Vec<Pt3>,
}

impl BundleAdjustmentDataset {
    pub fn new(
        cameras: Vec<CameraParams>,
        images: Vec<ImageObservations>,
        points: Vec<Pt3>,
    ) -> Result<Self> {
        ensure!(!images.is_empty(), "need at least one image");
        for (idx, camera) in cameras.iter().enumerate() {
            camera
                .validate()
                .map_err(|e| anyhow::anyhow!("camera {}: {}", idx, e))?;
        }
        for (image_idx, image) in images.iter().enumerate() {
            ensure!(
                image.camera_idx < cameras.len(),
                "image {} references camera {}, but only {} cameras exist",
                image_idx,
                image.camera_idx,
                cameras.len()
            );
            for obs in &image.observations {
                ensure!(
                    obs.point_idx < points.len(),
                    "image {} observes point {}, but only {} points exist",
                    image_idx,
                    obs.point_idx,
                    points.len()
                );
            }
        }
        Ok(Self {
            cameras,
            images,
            points,
        })
    }

    pub fn num_observations(&self) -> usize {
        self.images.iter().map(|i| i.observations.len()).sum()
    }

    /// Number of observations of each point.
    pub fn track_lengths(&self) -> Vec<usize> {
        track_lengths(
            self.points.len(),
            self.images
                .iter()
                .flat_map(|i| i.observations.iter().map(|o| &o.point_idx)),
        )
    }
}

/// Bundle adjustment options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleAdjustmentOptions {
    pub robust_loss: RobustLoss,
    pub refine_focal_length: bool,
    pub refine_principal_point: bool,
    pub refine_extra_params: bool,
    /// Image indices whose pose is held constant.
    pub constant_poses: Vec<usize>,
    /// Point indices held constant.
    pub constant_points: Vec<usize>,
    /// Points observed fewer times are left out of the problem.
    pub min_track_length: usize,
}

impl Default for BundleAdjustmentOptions {
    fn default() -> Self {
        Self {
            robust_loss: RobustLoss::None,
            refine_focal_length: true,
            refine_principal_point: false,
            refine_extra_params: true,
            constant_poses: Vec::new(),
            constant_points: Vec::new(),
            min_track_length: 2,
        }
    }
}

/// Refined reconstruction.
///
/// Cameras, poses and points that did not take part in the problem are
/// returned unchanged.
#[derive(Debug, Clone)]
pub struct BundleAdjustmentResult {
    pub cameras: Vec<CameraParams>,
    pub poses: Vec<Iso3>,
    pub points: Vec<Pt3>,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub num_residuals: usize,
    /// Mean reprojection error after refinement, in pixels.
    pub mean_reprojection_error: f64,
}

fn camera_key(idx: usize) -> String {
    format!("cam/{}", idx)
}

fn rotation_key(idx: usize) -> String {
    format!("rot/{}", idx)
}

fn translation_key(idx: usize) -> String {
    format!("trans/{}", idx)
}

fn point_key(idx: usize) -> String {
    format!("point/{}", idx)
}

/// Build IR for bundle adjustment.
pub fn build_bundle_adjustment_ir(
    dataset: &BundleAdjustmentDataset,
    opts: &BundleAdjustmentOptions,
) -> Result<(ProblemIR, HashMap<String, DVector<f64>>)> {
    let tracks = dataset.track_lengths();
    let min_track = opts.min_track_length.max(1);

    let mut ir = ProblemIR::new();
    let mut initial_map = HashMap::new();
    let mut camera_ids: HashMap<usize, ParamId> = HashMap::new();
    let mut point_ids: HashMap<usize, ParamId> = HashMap::new();

    for (image_idx, image) in dataset.images.iter().enumerate() {
        let observations: Vec<&PointObservation> = image
            .observations
            .iter()
            .filter(|o| tracks[o.point_idx] >= min_track)
            .collect();
        if observations.is_empty() {
            debug!("image {} has no usable observations", image_idx);
            continue;
        }

        let camera = &dataset.cameras[image.camera_idx];
        let cam_id = *camera_ids.entry(image.camera_idx).or_insert_with(|| {
            let key = camera_key(image.camera_idx);
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

        let pose_ids = if opts.constant_poses.contains(&image_idx) {
            None
        } else {
            let (q, t) = pose_to_blocks(&image.pose);
            let q_id = ir.add_param_block(
                rotation_key(image_idx),
                QUAT_DIM,
                ManifoldKind::SO3,
                FixedMask::all_free(),
                None,
            );
            let t_id = ir.add_param_block(
                translation_key(image_idx),
                VEC3_DIM,
                ManifoldKind::Euclidean,
                FixedMask::all_free(),
                None,
            );
            initial_map.insert(rotation_key(image_idx), q);
            initial_map.insert(translation_key(image_idx), t);
            Some((q_id, t_id))
        };
        let (rotation, translation) = iso3_to_params(&image.pose);

        for obs in observations {
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

            let uv = [obs.uv.x, obs.uv.y];
            let residual = match pose_ids {
                Some((q_id, t_id)) => ResidualBlock::new(
                    FactorKind::Reprojection {
                        model: camera.model,
                        uv,
                    },
                    vec![q_id, t_id, point_id, cam_id],
                    opts.robust_loss,
                ),
                None => ResidualBlock::new(
                    FactorKind::FixedPoseReprojection {
                        model: camera.model,
                        rotation,
                        translation,
                        uv,
                    },
                    vec![point_id, cam_id],
                    opts.robust_loss,
                ),
            };
            ir.add_residual_block(residual);
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

/// Run bundle adjustment with the tiny-solver backend.
pub fn optimize_bundle_adjustment(
    dataset: &BundleAdjustmentDataset,
    opts: &BundleAdjustmentOptions,
    backend_opts: &BackendSolveOptions,
) -> Result<BundleAdjustmentResult> {
    let (ir, initial_map) = build_bundle_adjustment_ir(dataset, opts)?;
    info!(
        "bundle adjustment: {} images, {} points, {} residuals",
        dataset.images.len(),
        dataset.points.len(),
        ir.residuals.len()
    );
    let solution = solve_with_backend(BackendKind::TinySolver, &ir, &initial_map, backend_opts)?;

    let cameras = dataset
        .cameras
        .iter()
        .enumerate()
        .map(|(idx, camera)| match solved(&solution, &camera_key(idx)) {
            Some(block) => camera_from_block(camera.model, block),
            None => Ok(camera.clone()),
        })
        .collect::<Result<Vec<_>>>()?;

    let poses = dataset
        .images
        .iter()
        .enumerate()
        .map(|(idx, image)| {
            match (
                solved(&solution, &rotation_key(idx)),
                solved(&solution, &translation_key(idx)),
            ) {
                (Some(q), Some(t)) => pose_from_blocks(q, t),
                _ => Ok(image.pose),
            }
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

    Ok(BundleAdjustmentResult {
        cameras,
        poses,
        points,
        initial_cost: solution.initial_cost,
        final_cost: solution.final_cost,
        num_residuals: ir.residuals.len(),
        mean_reprojection_error,
    })
}
