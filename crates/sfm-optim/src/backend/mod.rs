//! Backend adapters that compile the IR into solver-specific problems.
//!
//! A backend translates the IR into a solver-native problem, applies manifolds
//! and constraints, runs the optimizer and returns the solved parameter map.
//! Costs reported in [`BackendSolution`] are computed here, independently of
//! the solver, as `0.5 * Σ ‖r‖²` over the unrobustified residuals.

mod tiny_solver_backend;
mod tiny_solver_manifolds;

use anyhow::{anyhow, Context, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::factors::{check_parameter_blocks, CostFunction, FactorError, FactorVisitor};
use crate::ir::ProblemIR;

pub use tiny_solver_backend::TinySolverBackend;
pub use tiny_solver_manifolds::UnitVector3Manifold;

/// Backend-agnostic solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSolveOptions {
    /// Maximum number of optimizer iterations.
    pub max_iters: usize,
    /// Verbosity level (backend-specific).
    pub verbosity: usize,
    /// Optional linear solver selection.
    pub linear_solver: Option<LinearSolverKind>,
    /// Absolute cost decrease threshold for early termination.
    pub min_abs_decrease: Option<f64>,
    /// Relative cost decrease threshold for early termination.
    pub min_rel_decrease: Option<f64>,
    /// Cost threshold for early termination.
    pub min_error: Option<f64>,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            verbosity: 0,
            linear_solver: Some(LinearSolverKind::SparseCholesky),
            min_abs_decrease: Some(1e-5),
            min_rel_decrease: Some(1e-5),
            min_error: Some(1e-10),
        }
    }
}

/// Linear solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverKind {
    SparseCholesky,
    SparseQR,
}

/// Solver output, keyed by IR parameter block names.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    pub params: HashMap<String, DVector<f64>>,
    /// Cost at the initial parameters.
    pub initial_cost: f64,
    /// Cost at the solution.
    pub final_cost: f64,
    /// Number of optimizer runs, restarts included.
    pub runs: usize,
    /// No run moved the parameters although the cost was above the
    /// termination threshold.
    pub stalled: bool,
}

/// Interface implemented by solver adapters.
pub trait OptimBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution>;
}

/// Supported solver backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// tiny-solver Levenberg-Marquardt.
    #[default]
    TinySolver,
}

/// Solve a problem with the selected backend.
pub fn solve_with_backend(
    backend: BackendKind,
    ir: &ProblemIR,
    initial: &HashMap<String, DVector<f64>>,
    opts: &BackendSolveOptions,
) -> Result<BackendSolution> {
    match backend {
        BackendKind::TinySolver => TinySolverBackend.solve(ir, initial, opts),
    }
}

struct EvaluateResidual<'a> {
    blocks: &'a [&'a [f64]],
}

impl FactorVisitor for EvaluateResidual<'_> {
    type Output = Result<DVector<f64>, FactorError>;

    fn visit<F: CostFunction + Clone + 'static>(self, factor: F) -> Self::Output {
        let sizes: Vec<usize> = self.blocks.iter().map(|b| b.len()).collect();
        check_parameter_blocks(&factor, &sizes)?;
        Ok(factor.evaluate::<f64>(self.blocks))
    }
}

/// Evaluate every residual block of `ir` at `params`, in IR order.
pub fn evaluate_residuals(
    ir: &ProblemIR,
    params: &HashMap<String, DVector<f64>>,
) -> Result<Vec<DVector<f64>>> {
    ir.residuals
        .iter()
        .enumerate()
        .map(|(r_idx, residual)| {
            let blocks = residual
                .params
                .iter()
                .map(|id| {
                    let block = ir
                        .params
                        .get(id.0)
                        .ok_or_else(|| anyhow!("residual {} references missing param {:?}", r_idx, id))?;
                    params
                        .get(&block.name)
                        .map(|v| v.as_slice())
                        .ok_or_else(|| anyhow!("no values for parameter {}", block.name))
                })
                .collect::<Result<Vec<&[f64]>>>()?;
            residual
                .factor
                .visit(EvaluateResidual { blocks: &blocks })
                .with_context(|| format!("evaluating residual {}", r_idx))
        })
        .collect()
}

/// `0.5 * Σ ‖r‖²` over residual vectors.
pub fn total_cost(residuals: &[DVector<f64>]) -> f64 {
    0.5 * residuals.iter().map(|r| r.norm_squared()).sum::<f64>()
}
