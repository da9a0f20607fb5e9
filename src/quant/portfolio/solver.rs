//! # Constrained Minimization
//!
//! $$
//! \min_{x}\ f(x)\quad\text{s.t.}\quad A_{eq}x=b_{eq},\ \ a_j^\top x\ge b_j,\ \ l\le x\le u
//! $$
//!
//! Equalities are eliminated exactly with $x = x_p + Z y$ where $Z$ spans
//! $\ker A_{eq}$. Inequalities and bounds enter an augmented Lagrangian
//! $$
//! \mathcal L_\mu(y,\lambda)=f(x)+\sum_j\frac{\max(0,\lambda_j-\mu g_j(x))^2-\lambda_j^2}{2\mu},
//! $$
//! minimized over $y$ with Nelder-Mead between multiplier updates
//! $\lambda_j \leftarrow \max(0,\lambda_j-\mu g_j)$.

use std::time::Duration;
use std::time::Instant;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::solver::neldermead::NelderMead;
use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;

use super::data::dot;
use crate::error::FrontierError;
use crate::error::Result;

/// Whether a constraint must hold with equality or as `>=`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
  /// `a · x = b`
  Equality,
  /// `a · x >= b`
  Inequality,
}

/// Linear constraint descriptor `a · x (= | >=) b`.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct LinearConstraint {
  pub kind: ConstraintKind,
  pub coefficients: Vec<f64>,
  pub rhs: f64,
  /// Human readable name used in diagnostics.
  pub label: String,
}

impl LinearConstraint {
  pub fn equality(label: &str, coefficients: Vec<f64>, rhs: f64) -> Self {
    Self::new(ConstraintKind::Equality, coefficients, rhs, label.to_string())
  }

  pub fn at_least(label: &str, coefficients: Vec<f64>, rhs: f64) -> Self {
    Self::new(ConstraintKind::Inequality, coefficients, rhs, label.to_string())
  }

  /// `a · x - b`
  pub fn residual(&self, x: &[f64]) -> f64 {
    dot(&self.coefficients, x) - self.rhs
  }

  /// Non-negative amount by which `x` violates the constraint.
  pub fn violation(&self, x: &[f64]) -> f64 {
    let r = self.residual(x);
    match self.kind {
      ConstraintKind::Equality => r.abs(),
      ConstraintKind::Inequality => (-r).max(0.0),
    }
  }
}

/// Box bounds `lower <= x <= upper`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
  pub lower: Vec<f64>,
  pub upper: Vec<f64>,
}

impl Bounds {
  /// Same interval for every coordinate.
  pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
    Self {
      lower: vec![lower; n],
      upper: vec![upper; n],
    }
  }

  pub fn len(&self) -> usize {
    self.lower.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lower.is_empty()
  }

  pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
    x.iter()
      .zip(self.lower.iter().zip(self.upper.iter()))
      .map(|(v, (lo, hi))| v.max(*lo).min(*hi))
      .collect()
  }

  /// Bounds rewritten as `>=` constraints; infinite sides are skipped.
  fn as_constraints(&self) -> Vec<LinearConstraint> {
    let n = self.len();
    let mut out = Vec::with_capacity(2 * n);
    for i in 0..n {
      let mut e = vec![0.0; n];
      if self.lower[i].is_finite() {
        e[i] = 1.0;
        out.push(LinearConstraint::at_least("lower bound", e.clone(), self.lower[i]));
      }
      if self.upper[i].is_finite() {
        e[i] = -1.0;
        out.push(LinearConstraint::at_least("upper bound", e, -self.upper[i]));
      }
    }
    out
  }
}

/// Budgets and tolerances of [`minimize_constrained`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
  /// Multiplier updates before giving up.
  pub max_outer_iters: usize,
  /// Nelder-Mead iterations per subproblem.
  pub max_inner_iters: u64,
  /// Nelder-Mead simplex standard-deviation tolerance.
  pub sd_tolerance: f64,
  /// Relative objective change accepted as converged between outer iterations.
  pub objective_tolerance: f64,
  /// Largest constraint violation accepted as feasible.
  pub feasibility_tolerance: f64,
  pub initial_penalty: f64,
  pub penalty_growth: f64,
  pub max_penalty: f64,
  /// Edge length of the starting simplex in reduced coordinates.
  pub simplex_step: f64,
  /// Wall-clock budget for one minimization.
  pub max_duration: Option<Duration>,
}

impl Default for SolverOptions {
  fn default() -> Self {
    Self {
      max_outer_iters: 30,
      max_inner_iters: 2_000,
      sd_tolerance: 1e-12,
      objective_tolerance: 1e-7,
      feasibility_tolerance: 1e-6,
      initial_penalty: 100.0,
      penalty_growth: 10.0,
      max_penalty: 1e10,
      simplex_step: 0.05,
      max_duration: None,
    }
  }
}

/// Outcome of [`minimize_constrained`].
#[derive(Clone, Debug)]
pub struct Minimization {
  /// Final point, clamped to the bounds.
  pub x: Vec<f64>,
  /// Objective at `x`.
  pub cost: f64,
  pub success: bool,
  pub message: String,
  /// Total Nelder-Mead iterations across subproblems.
  pub iterations: u64,
  /// Largest constraint or bound violation before clamping.
  pub max_violation: f64,
}

/// Affine parametrization `x = origin + basis * y` of the equality-feasible set.
struct Reduction {
  origin: DVector<f64>,
  basis: DMatrix<f64>,
}

impl Reduction {
  fn new(n: usize, equalities: &[&LinearConstraint]) -> Result<Self> {
    if equalities.is_empty() {
      return Ok(Self {
        origin: DVector::zeros(n),
        basis: DMatrix::identity(n, n),
      });
    }

    let m = equalities.len();
    let a = DMatrix::from_fn(m, n, |i, j| equalities[i].coefficients[j]);
    let b = DVector::from_iterator(m, equalities.iter().map(|c| c.rhs));
    let pinv = a
      .clone()
      .pseudo_inverse(1e-12)
      .map_err(|err| FrontierError::OptimizationFailed(err.to_string()))?;
    let origin = &pinv * &b;

    if (&a * &origin - &b).amax() > 1e-9 {
      return Err(FrontierError::OptimizationFailed(
        "equality constraints are inconsistent".into(),
      ));
    }

    // Orthogonal projector onto ker(A); its unit eigenvectors span the null space.
    let projector = DMatrix::identity(n, n) - &pinv * &a;
    let eigen = projector.symmetric_eigen();
    let keep: Vec<usize> = (0..n).filter(|&k| eigen.eigenvalues[k] > 0.5).collect();
    let basis = DMatrix::from_fn(n, keep.len(), |i, j| eigen.eigenvectors[(i, keep[j])]);

    Ok(Self { origin, basis })
  }

  fn dim(&self) -> usize {
    self.basis.ncols()
  }

  fn expand(&self, y: &[f64]) -> Vec<f64> {
    let x = &self.origin + &self.basis * DVector::from_column_slice(y);
    x.iter().copied().collect()
  }

  fn project(&self, x: &[f64]) -> Vec<f64> {
    let shifted = DVector::from_column_slice(x) - &self.origin;
    (self.basis.transpose() * shifted).iter().copied().collect()
  }
}

struct AugmentedLagrangian<'a, O> {
  objective: &'a O,
  reduction: &'a Reduction,
  bounds: &'a Bounds,
  inequalities: &'a [LinearConstraint],
  multipliers: Vec<f64>,
  penalty: f64,
}

impl<O> CostFunction for AugmentedLagrangian<'_, O>
where
  O: CostFunction<Param = Vec<f64>, Output = f64>,
{
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, y: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let x = self.reduction.expand(y);
    let mut value = self.objective.cost(&self.bounds.clamp(&x))?;
    let mu = self.penalty;

    for (c, lambda) in self.inequalities.iter().zip(self.multipliers.iter()) {
      let shifted = (lambda - mu * c.residual(&x)).max(0.0);
      value += (shifted * shifted - lambda * lambda) / (2.0 * mu);
    }

    Ok(value)
  }
}

fn initial_simplex(y: &[f64], step: f64) -> Vec<Vec<f64>> {
  let mut simplex = Vec::with_capacity(y.len() + 1);
  simplex.push(y.to_vec());
  for i in 0..y.len() {
    let mut point = y.to_vec();
    point[i] += step;
    simplex.push(point);
  }
  simplex
}

fn max_violation(x: &[f64], constraints: &[LinearConstraint]) -> f64 {
  constraints
    .iter()
    .map(|c| c.violation(x))
    .fold(0.0, f64::max)
}

fn failed_to_run(err: argmin::core::Error) -> FrontierError {
  FrontierError::OptimizationFailed(err.to_string())
}

/// Minimize `objective` over `bounds` subject to linear `constraints`.
///
/// Returns `Err` only for malformed problems (dimension mismatch, inconsistent
/// equalities, objective errors). Budget exhaustion and infeasibility come back
/// as `Ok` with `success == false`.
pub fn minimize_constrained<O>(
  objective: &O,
  x0: &[f64],
  bounds: &Bounds,
  constraints: &[LinearConstraint],
  options: &SolverOptions,
) -> Result<Minimization>
where
  O: CostFunction<Param = Vec<f64>, Output = f64>,
{
  let n = x0.len();
  if bounds.lower.len() != n || bounds.upper.len() != n {
    return Err(FrontierError::OptimizationFailed(format!(
      "bounds cover {} of {n} variables",
      bounds.lower.len().min(bounds.upper.len())
    )));
  }
  if let Some(c) = constraints.iter().find(|c| c.coefficients.len() != n) {
    return Err(FrontierError::OptimizationFailed(format!(
      "constraint '{}' has {} coefficients for {n} variables",
      c.label,
      c.coefficients.len()
    )));
  }

  let equalities: Vec<&LinearConstraint> = constraints
    .iter()
    .filter(|c| c.kind == ConstraintKind::Equality)
    .collect();
  let mut inequalities: Vec<LinearConstraint> = constraints
    .iter()
    .filter(|c| c.kind == ConstraintKind::Inequality)
    .cloned()
    .collect();
  inequalities.extend(bounds.as_constraints());

  let reduction = Reduction::new(n, &equalities)?;
  let start = Instant::now();

  let finish = |y: &[f64], iterations: u64, success: bool, message: String| -> Result<Minimization> {
    let x = reduction.expand(y);
    let violation = max_violation(&x, constraints).max(max_violation(&x, &inequalities));
    let x = bounds.clamp(&x);
    let cost = objective.cost(&x).map_err(failed_to_run)?;
    Ok(Minimization {
      x,
      cost,
      success,
      message,
      iterations,
      max_violation: violation,
    })
  };

  if reduction.dim() == 0 {
    let x = reduction.expand(&[]);
    let feasible = max_violation(&x, &inequalities) <= options.feasibility_tolerance;
    let message = if feasible {
      "equality constraints determine the solution"
    } else {
      "equality constraints determine an infeasible point"
    };
    return finish(&[], 0, feasible, message.to_string());
  }

  let mut y = reduction.project(&bounds.clamp(x0));
  let mut multipliers = vec![0.0; inequalities.len()];
  let mut penalty = options.initial_penalty.max(f64::MIN_POSITIVE);
  let mut previous_cost: Option<f64> = None;
  let mut previous_violation = f64::INFINITY;
  let mut iterations = 0u64;

  for _ in 0..options.max_outer_iters {
    if let Some(limit) = options.max_duration {
      if start.elapsed() >= limit {
        return finish(&y, iterations, false, "time budget exhausted".to_string());
      }
    }

    let subproblem = AugmentedLagrangian {
      objective,
      reduction: &reduction,
      bounds,
      inequalities: &inequalities,
      multipliers: multipliers.clone(),
      penalty,
    };
    let solver = NelderMead::new(initial_simplex(&y, options.simplex_step))
      .with_sd_tolerance(options.sd_tolerance)
      .map_err(failed_to_run)?;
    let res = Executor::new(subproblem, solver)
      .configure(|state| state.max_iters(options.max_inner_iters))
      .run()
      .map_err(failed_to_run)?;

    iterations += res.state.get_iter();
    if let Some(best) = res.state.best_param {
      y = best;
    }

    let x = reduction.expand(&y);
    let violation = max_violation(&x, &inequalities);
    let cost = objective.cost(&bounds.clamp(&x)).map_err(failed_to_run)?;
    let stable = previous_cost
      .map(|p| (p - cost).abs() <= options.objective_tolerance * (1.0 + cost.abs()))
      .unwrap_or(false);

    let feasible = violation <= options.feasibility_tolerance;
    if feasible && (stable || previous_violation <= options.feasibility_tolerance) {
      return finish(&y, iterations, true, "converged".to_string());
    }
    if !feasible && penalty >= options.max_penalty && violation >= previous_violation * (1.0 - 1e-6) {
      return finish(&y, iterations, false, "constraints appear infeasible".to_string());
    }

    for (lambda, c) in multipliers.iter_mut().zip(inequalities.iter()) {
      *lambda = (*lambda - penalty * c.residual(&x)).max(0.0);
    }
    if violation > 0.25 * previous_violation {
      penalty = (penalty * options.penalty_growth).min(options.max_penalty);
    }
    previous_violation = violation;
    previous_cost = Some(cost);
  }

  finish(
    &y,
    iterations,
    false,
    "outer iteration limit reached".to_string(),
  )
}
