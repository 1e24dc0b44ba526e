use crate::backend::{
    evaluate_residuals, total_cost, BackendSolution, BackendSolveOptions, LinearSolverKind,
    OptimBackend, UnitVector3Manifold,
};
use crate::factors::{check_parameter_blocks, CostFunction, FactorError, FactorVisitor, SolverFactor};
use crate::ir::{ManifoldKind, ParamBlock, ProblemIR, ResidualBlock, RobustLoss};
use anyhow::{anyhow, ensure, Context, Result};
use log::{debug, info, warn};
use nalgebra::DVector;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_solver::factors::FactorImpl;
use tiny_solver::loss_functions::{ArctanLoss, CauchyLoss, HuberLoss, Loss};
use tiny_solver::manifold::so3::QuaternionManifold;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::{linear::sparse::LinearSolverType, LevenbergMarquardtOptimizer};

const MIN_DIAGONAL: f64 = 1e-6;
const MAX_DIAGONAL: f64 = 1e32;
const INITIAL_TRUST_REGION_RADIUS: f64 = 1e4;
const MIN_TRUST_REGION_RADIUS: f64 = 1e-6;
const TRUST_REGION_SHRINK: f64 = 1e-2;
const MAX_SOLVER_RUNS: usize = 16;

/// tiny-solver backend adapter.
#[derive(Debug, Clone, Copy)]
pub struct TinySolverBackend;

impl TinySolverBackend {
    /// Build the solver problem and the matching initial values.
    fn compile(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
    ) -> Result<(Problem, HashMap<String, DVector<f64>>)> {
        ir.validate()?;

        let mut problem = Problem::new();
        let mut values = HashMap::with_capacity(ir.params.len());

        for param in &ir.params {
            let init = initial.get(&param.name).ok_or_else(|| {
                anyhow!(
                    "initial values missing parameter {} (id {:?})",
                    param.name,
                    param.id
                )
            })?;
            ensure!(
                init.len() == param.dim,
                "initial dimension mismatch for {}: expected {}, got {}",
                param.name,
                param.dim,
                init.len()
            );

            set_manifold(&mut problem, param)?;
            for idx in param.fixed.iter() {
                problem.fix_variable(&param.name, idx);
            }
            for bound in param.bounds.iter().flatten() {
                problem.set_variable_bounds(&param.name, bound.idx, bound.lower, bound.upper);
            }

            values.insert(param.name.clone(), init.clone());
        }

        for (r_idx, residual) in ir.residuals.iter().enumerate() {
            let (factor, loss) =
                compile_factor(ir, residual).with_context(|| format!("residual {}", r_idx))?;
            let param_refs: Vec<&str> = residual
                .params
                .iter()
                .map(|id| ir.params[id.0].name.as_str())
                .collect();
            problem.add_residual_block(residual.residual_dim, &param_refs, factor, loss);
        }

        debug!(
            "compiled tiny-solver problem: {} parameter blocks, {} residual blocks",
            ir.params.len(),
            ir.residuals.len()
        );
        Ok((problem, values))
    }
}

impl OptimBackend for TinySolverBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let (problem, initial_values) = self.compile(ir, initial)?;
        let initial_cost = total_cost(&evaluate_residuals(ir, &initial_values)?);

        let options = to_optimizer_options(opts);
        let min_error = options.min_error_threshold;
        let min_rel_decrease = options.min_rel_error_decrease_threshold;

        // tiny-solver stops at the first rejected step, so a run that never
        // moves is retried from the same point with stronger damping.
        let mut params = initial_values;
        let mut cost = initial_cost;
        let mut radius = INITIAL_TRUST_REGION_RADIUS;
        let mut moved_once = false;
        let mut runs = 0;
        while runs < MAX_SOLVER_RUNS && cost > min_error {
            runs += 1;
            let optimizer = LevenbergMarquardtOptimizer::new(MIN_DIAGONAL, MAX_DIAGONAL, radius);
            let solved = optimizer
                .optimize(&problem, &params, Some(options.clone()))
                .ok_or_else(|| anyhow!("tiny-solver failed to converge"))?;

            let moved = solved.iter().any(|(name, v)| params.get(name) != Some(v));
            if !moved {
                if radius <= MIN_TRUST_REGION_RADIUS {
                    break;
                }
                radius *= TRUST_REGION_SHRINK;
                debug!(
                    "tiny-solver run {} made no step, retrying with radius {:.1e}",
                    runs, radius
                );
                continue;
            }

            moved_once = true;
            let mut candidate = params.clone();
            candidate.extend(solved);
            let candidate_cost = total_cost(&evaluate_residuals(ir, &candidate)?);
            let decrease = cost - candidate_cost;
            params = candidate;
            cost = candidate_cost;
            if !cost.is_finite() || decrease.abs() <= min_rel_decrease * cost.abs() {
                break;
            }
        }
        let final_cost = cost;
        let stalled = !moved_once && initial_cost > min_error;

        if stalled {
            warn!(
                "tiny-solver made no progress after {} runs, cost stays at {:.6e}",
                runs, initial_cost
            );
        } else if !final_cost.is_finite() {
            warn!("tiny-solver finished with non-finite cost");
        } else if final_cost > initial_cost {
            warn!(
                "tiny-solver increased the cost: {:.6e} -> {:.6e}",
                initial_cost, final_cost
            );
        }
        info!(
            "tiny-solver: {} residual blocks, {} runs, cost {:.6e} -> {:.6e}",
            ir.residuals.len(),
            runs,
            initial_cost,
            final_cost
        );

        Ok(BackendSolution {
            params,
            initial_cost,
            final_cost,
            runs,
            stalled,
        })
    }
}

fn set_manifold(problem: &mut Problem, param: &ParamBlock) -> Result<()> {
    if param.manifold == ManifoldKind::Euclidean {
        return Ok(());
    }
    // Fully fixed blocks never move, so they need no manifold.
    if param.fixed.is_all_fixed(param.dim) {
        return Ok(());
    }
    ensure!(
        param.fixed.is_empty(),
        "tiny-solver cannot partially fix {:?} manifold {}",
        param.manifold,
        param.name
    );
    ensure!(
        param.bounds.is_none(),
        "bounds are not supported on {:?} manifold {}",
        param.manifold,
        param.name
    );
    match param.manifold {
        ManifoldKind::SO3 => problem.set_variable_manifold(&param.name, Arc::new(QuaternionManifold)),
        ManifoldKind::S2 => problem.set_variable_manifold(&param.name, Arc::new(UnitVector3Manifold)),
        ManifoldKind::Euclidean => {}
    }
    Ok(())
}

fn to_optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    let mut options = OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        ..OptimizerOptions::default()
    };
    if let Some(solver) = opts.linear_solver {
        options.linear_solver_type = match solver {
            LinearSolverKind::SparseCholesky => LinearSolverType::SparseCholesky,
            LinearSolverKind::SparseQR => LinearSolverType::SparseQR,
        };
    }
    if let Some(v) = opts.min_abs_decrease {
        options.min_abs_error_decrease_threshold = v;
    }
    if let Some(v) = opts.min_rel_decrease {
        options.min_rel_error_decrease_threshold = v;
    }
    if let Some(v) = opts.min_error {
        options.min_error_threshold = v;
    }
    options
}

fn compile_loss(loss: RobustLoss) -> Result<Option<Box<dyn Loss + Send>>> {
    let (name, scale) = match loss {
        RobustLoss::None => return Ok(None),
        RobustLoss::Huber { scale } => ("huber", scale),
        RobustLoss::Cauchy { scale } => ("cauchy", scale),
        RobustLoss::Arctan { scale } => ("arctan", scale),
    };
    ensure!(
        scale.is_finite() && scale > 0.0,
        "{} loss scale must be positive and finite, got {}",
        name,
        scale
    );
    let compiled: Box<dyn Loss + Send> = match loss {
        RobustLoss::None => return Ok(None),
        RobustLoss::Huber { .. } => Box::new(HuberLoss::new(scale)),
        RobustLoss::Cauchy { .. } => Box::new(CauchyLoss::new(scale)),
        RobustLoss::Arctan { .. } => Box::new(ArctanLoss::new(scale)),
    };
    Ok(Some(compiled))
}

type CompiledFactor = (Box<dyn FactorImpl + Send>, Option<Box<dyn Loss + Send>>);

/// Instantiates the factor for its camera model after checking block sizes.
struct ToSolverFactor {
    sizes: Vec<usize>,
}

impl FactorVisitor for ToSolverFactor {
    type Output = Result<Box<dyn FactorImpl + Send>, FactorError>;

    fn visit<F: CostFunction + Clone + 'static>(self, factor: F) -> Self::Output {
        check_parameter_blocks(&factor, &self.sizes)?;
        Ok(Box::new(SolverFactor(factor)))
    }
}

fn compile_factor(ir: &ProblemIR, residual: &ResidualBlock) -> Result<CompiledFactor> {
    let loss = compile_loss(residual.loss)?;
    let sizes = residual.params.iter().map(|id| ir.params[id.0].dim).collect();
    let factor = residual.factor.visit(ToSolverFactor { sizes })?;
    Ok((factor, loss))
}
