use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use sfm_core::{CameraModelKind, QUAT_DIM, VEC3_DIM};
use std::collections::HashSet;

use crate::factors::{
    FactorVisitor, FixedPoseReprojectionFactor, RelativePoseFactor, ReprojectionFactor,
    RigReprojectionFactor,
};
use sfm_core::{with_camera_model, Vec2};

/// Identifier for a parameter block in the IR.
///
/// Stable within a `ProblemIR` instance; residual blocks use it to reference
/// their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Manifold a parameter block lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldKind {
    /// Unconstrained vector.
    Euclidean,
    /// Unit quaternion stored as `[qx, qy, qz, qw]`.
    SO3,
    /// Unit 3-vector, used for translation directions.
    S2,
}

impl ManifoldKind {
    /// Returns `true` if the ambient dimension matches the manifold storage.
    pub fn compatible_dim(self, dim: usize) -> bool {
        match self {
            ManifoldKind::Euclidean => dim > 0,
            ManifoldKind::SO3 => dim == QUAT_DIM,
            ManifoldKind::S2 => dim == VEC3_DIM,
        }
    }
}

/// Bounds for a single parameter index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub idx: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Set of fixed indices within a parameter block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedMask {
    fixed_indices: HashSet<usize>,
}

impl FixedMask {
    pub fn all_free() -> Self {
        Self::default()
    }

    pub fn all_fixed(dim: usize) -> Self {
        Self {
            fixed_indices: (0..dim).collect(),
        }
    }

    pub fn fix_indices(indices: &[usize]) -> Self {
        Self {
            fixed_indices: indices.iter().copied().collect(),
        }
    }

    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed_indices.contains(&idx)
    }

    /// Returns `true` if every index in `[0, dim)` is fixed.
    pub fn is_all_fixed(&self, dim: usize) -> bool {
        (0..dim).all(|i| self.is_fixed(i))
    }

    /// Fixed indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let mut sorted: Vec<usize> = self.fixed_indices.iter().copied().collect();
        sorted.sort_unstable();
        sorted.into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed_indices.is_empty()
    }
}

/// Robust loss applied to a residual block.
///
/// One residual block per observation, so the loss acts per observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
    Arctan {
        scale: f64,
    },
}

/// Backend-agnostic residual kinds.
///
/// Each kind implies its parameter layout and residual dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Parameters: `[rotation, translation, point, intrinsics]`.
    Reprojection { model: CameraModelKind, uv: [f64; 2] },
    /// Parameters: `[point, intrinsics]`; the pose is stored in the factor.
    FixedPoseReprojection {
        model: CameraModelKind,
        rotation: [f64; 4],
        translation: [f64; 3],
        uv: [f64; 2],
    },
    /// Parameters: `[rig rotation, rig translation, rel rotation, rel translation, point, intrinsics]`.
    RigReprojection { model: CameraModelKind, uv: [f64; 2] },
    /// Parameters: `[rotation, translation direction]`; `x1`, `x2` are normalized coordinates.
    RelativePose { x1: [f64; 2], x2: [f64; 2] },
}

/// Expected shape of one parameter of a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlot {
    pub role: &'static str,
    pub dim: usize,
    pub manifold: ManifoldKind,
}

impl ParamSlot {
    const fn new(role: &'static str, dim: usize, manifold: ManifoldKind) -> Self {
        Self {
            role,
            dim,
            manifold,
        }
    }
}

fn rotation(role: &'static str) -> ParamSlot {
    ParamSlot::new(role, QUAT_DIM, ManifoldKind::SO3)
}

fn vector3(role: &'static str) -> ParamSlot {
    ParamSlot::new(role, VEC3_DIM, ManifoldKind::Euclidean)
}

fn intrinsics(model: CameraModelKind) -> ParamSlot {
    ParamSlot::new("intrinsics", model.num_params(), ManifoldKind::Euclidean)
}

impl FactorKind {
    /// Residual dimension implied by the factor.
    pub fn residual_dim(&self) -> usize {
        match self {
            FactorKind::Reprojection { .. }
            | FactorKind::FixedPoseReprojection { .. }
            | FactorKind::RigReprojection { .. } => 2,
            FactorKind::RelativePose { .. } => 1,
        }
    }

    /// Expected parameter blocks, in order.
    pub fn param_layout(&self) -> Vec<ParamSlot> {
        match self {
            FactorKind::Reprojection { model, .. } => vec![
                rotation("rotation"),
                vector3("translation"),
                vector3("point"),
                intrinsics(*model),
            ],
            FactorKind::FixedPoseReprojection { model, .. } => {
                vec![vector3("point"), intrinsics(*model)]
            }
            FactorKind::RigReprojection { model, .. } => vec![
                rotation("rig rotation"),
                vector3("rig translation"),
                rotation("rel rotation"),
                vector3("rel translation"),
                vector3("point"),
                intrinsics(*model),
            ],
            FactorKind::RelativePose { .. } => vec![
                rotation("rotation"),
                ParamSlot::new("translation", VEC3_DIM, ManifoldKind::S2),
            ],
        }
    }

    /// Expected parameter block sizes, in order.
    pub fn param_dims(&self) -> Vec<usize> {
        self.param_layout().iter().map(|slot| slot.dim).collect()
    }

    /// Hand the concrete factor, monomorphized for the camera model, to `visitor`.
    pub fn visit<V: FactorVisitor>(&self, visitor: V) -> V::Output {
        match self {
            FactorKind::Reprojection { model, uv } => with_camera_model!(*model, M => {
                visitor.visit(ReprojectionFactor::<M>::new(Vec2::from(*uv)))
            }),
            FactorKind::FixedPoseReprojection {
                model,
                rotation,
                translation,
                uv,
            } => with_camera_model!(*model, M => {
                visitor.visit(FixedPoseReprojectionFactor::<M>::new(
                    *rotation,
                    *translation,
                    Vec2::from(*uv),
                ))
            }),
            FactorKind::RigReprojection { model, uv } => with_camera_model!(*model, M => {
                visitor.visit(RigReprojectionFactor::<M>::new(Vec2::from(*uv)))
            }),
            FactorKind::RelativePose { x1, x2 } => visitor.visit(RelativePoseFactor::new(
                Vec2::from(*x1),
                Vec2::from(*x2),
            )),
        }
    }
}

/// Parameter block definition in the IR.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub manifold: ManifoldKind,
    pub fixed: FixedMask,
    pub bounds: Option<Vec<Bound>>,
}

/// Residual block definition in the IR.
///
/// The order of `params` must match [`FactorKind::param_layout`].
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub residual_dim: usize,
}

impl ResidualBlock {
    /// Residual block with the dimension taken from the factor.
    pub fn new(factor: FactorKind, params: Vec<ParamId>, loss: RobustLoss) -> Self {
        Self {
            residual_dim: factor.residual_dim(),
            params,
            loss,
            factor,
        }
    }
}

/// Backend-agnostic optimization problem.
///
/// Backends compile this IR into solver-specific problems.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter block and returns its `ParamId`.
    pub fn add_param_block(
        &mut self,
        name: impl Into<String>,
        dim: usize,
        manifold: ManifoldKind,
        fixed: FixedMask,
        bounds: Option<Vec<Bound>>,
    ) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            manifold,
            fixed,
            bounds,
        });
        id
    }

    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Validates internal consistency and factor expectations.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (idx, param) in self.params.iter().enumerate() {
            ensure!(
                param.id.0 == idx,
                "param id mismatch: expected {}, got {:?}",
                idx,
                param.id
            );
            ensure!(
                names.insert(param.name.as_str()),
                "duplicate param name {}",
                param.name
            );
            ensure!(
                param.manifold.compatible_dim(param.dim),
                "param {} manifold {:?} incompatible with dim {}",
                param.name,
                param.manifold,
                param.dim
            );
            for fixed_idx in param.fixed.iter() {
                ensure!(
                    fixed_idx < param.dim,
                    "param {} fixed index {} out of range",
                    param.name,
                    fixed_idx
                );
            }
            for bound in param.bounds.iter().flatten() {
                ensure!(
                    bound.idx < param.dim,
                    "param {} bound index {} out of range",
                    param.name,
                    bound.idx
                );
                ensure!(
                    bound.lower <= bound.upper,
                    "param {} bound lower {} > upper {}",
                    param.name,
                    bound.lower,
                    bound.upper
                );
            }
        }

        for (r_idx, residual) in self.residuals.iter().enumerate() {
            ensure!(
                residual.residual_dim == residual.factor.residual_dim(),
                "residual {} dim {} does not match factor expectation {}",
                r_idx,
                residual.residual_dim,
                residual.factor.residual_dim()
            );

            let layout = residual.factor.param_layout();
            ensure!(
                residual.params.len() == layout.len(),
                "residual {} requires {} params, got {}",
                r_idx,
                layout.len(),
                residual.params.len()
            );
            for (id, slot) in residual.params.iter().zip(&layout) {
                let param = self.params.get(id.0).ok_or_else(|| {
                    anyhow!("residual {} references missing param {:?}", r_idx, id)
                })?;
                ensure!(
                    param.dim == slot.dim && param.manifold == slot.manifold,
                    "residual {} expects {}D {:?} {}, got {} with dim={} manifold={:?}",
                    r_idx,
                    slot.dim,
                    slot.manifold,
                    slot.role,
                    param.name,
                    param.dim,
                    param.manifold
                );
            }
        }

        Ok(())
    }
}
