//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}\in[0,1]^N}\ \operatorname{CVaR}_\alpha(\mathbf{w})
//! \quad\text{s.t.}\quad \mathbf{1}^\top\mathbf{w}=1,\ \ 252\,\hat\mu^\top\mathbf{w}\ge r^\*
//! $$
//!
//! Long-only minimum-CVaR allocation for a single annual return target.

use tracing::trace;

use super::data::ReturnStatistics;
use super::risk::RiskEvaluator;
use super::risk::ILL_CONDITIONED_RISK;
use super::solver::minimize_constrained;
use super::solver::Bounds;
use super::solver::LinearConstraint;
use super::solver::SolverOptions;
use super::types::OptimizationOutcome;
use crate::error::FrontierError;

/// `1/N` allocation used as the starting point.
pub fn equal_weights(n: usize) -> Vec<f64> {
  if n == 0 {
    Vec::new()
  } else {
    vec![1.0 / n as f64; n]
  }
}

/// Full-investment and minimum-return constraint descriptors.
pub fn portfolio_constraints(annual_mean: &[f64], target_return: f64) -> Vec<LinearConstraint> {
  vec![
    LinearConstraint::equality("full investment", vec![1.0; annual_mean.len()], 1.0),
    LinearConstraint::at_least("minimum return", annual_mean.to_vec(), target_return),
  ]
}

/// Clamp to `[0, 1]` and rescale to unit sum.
fn normalize_weights(x: &[f64]) -> Option<Vec<f64>> {
  let clamped: Vec<f64> = x.iter().map(|v| v.clamp(0.0, 1.0)).collect();
  let total: f64 = clamped.iter().sum();
  if total > 1e-15 && total.is_finite() {
    Some(clamped.iter().map(|v| v / total).collect())
  } else {
    None
  }
}

/// Minimum-CVaR weights achieving at least `target_return` (annualized).
pub fn optimize_min_cvar(
  stats: &ReturnStatistics,
  target_return: f64,
  evaluator: &RiskEvaluator,
  options: &SolverOptions,
) -> OptimizationOutcome {
  let n = stats.n_assets();
  if n == 0 {
    return OptimizationOutcome::Failure {
      message: "no assets to allocate".into(),
    };
  }
  if evaluator.is_ill_conditioned() {
    return OptimizationOutcome::Failure {
      message: FrontierError::IllConditionedCovariance.to_string(),
    };
  }

  let constraints = portfolio_constraints(&stats.annualized_mean(), target_return);
  let bounds = Bounds::uniform(n, 0.0, 1.0);

  let res = match minimize_constrained(evaluator, &equal_weights(n), &bounds, &constraints, options)
  {
    Ok(res) => res,
    Err(err) => {
      return OptimizationOutcome::Failure {
        message: err.to_string(),
      }
    }
  };

  trace!(
    target_return,
    iterations = res.iterations,
    max_violation = res.max_violation,
    success = res.success,
    "min-cvar solve finished"
  );

  if !res.success {
    return OptimizationOutcome::Failure {
      message: format!(
        "{} after {} iterations (max violation {:.3e})",
        res.message, res.iterations, res.max_violation
      ),
    };
  }

  let Some(weights) = normalize_weights(&res.x) else {
    return OptimizationOutcome::Failure {
      message: "solver returned a zero allocation".into(),
    };
  };

  let achieved_return = stats.annualized_return(&weights);
  if achieved_return < target_return - options.feasibility_tolerance {
    return OptimizationOutcome::Failure {
      message: format!("achieved return {achieved_return:.6} misses target {target_return:.6}"),
    };
  }

  let risk = evaluator.risk(&weights);
  if risk >= ILL_CONDITIONED_RISK {
    return OptimizationOutcome::Failure {
      message: FrontierError::IllConditionedCovariance.to_string(),
    };
  }

  OptimizationOutcome::Success {
    volatility: stats.annualized_portfolio_volatility(&weights),
    weights,
    achieved_return,
    risk,
  }
}
