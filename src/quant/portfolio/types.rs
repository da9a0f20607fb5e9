//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\min_{\mathbf{w}} \operatorname{CVaR}_\alpha(\mathbf{w}^\top R)
//! \quad\text{s.t.}\quad \mathbf{1}^\top\mathbf{w}=1,\ \mu^\top\mathbf{w}\ge r^\*,\ 0\le w_i\le 1
//! $$
//!
//! Shared enums and result containers for Mean-CVaR optimization.

use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;

/// Trading days used to annualize daily means and volatilities.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Supported tail-risk estimators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RiskMethod {
  /// Empirical CVaR on the observed daily portfolio returns.
  #[default]
  Historical,
  /// CVaR of terminal returns over Cholesky-correlated simulated paths.
  #[value(aliases = ["mc", "montecarlo", "simulation"])]
  MonteCarlo,
}

/// One optimized portfolio on the efficient frontier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
  /// Annual target return requested from the optimizer.
  pub target_return: f64,
  /// Annualized expected return of the optimized weights.
  pub achieved_return: f64,
  /// Expected tail loss as a positive magnitude.
  pub risk: f64,
  /// Annualized portfolio volatility.
  pub volatility: f64,
  /// Long-only weights summing to one.
  pub weights: Vec<f64>,
}

/// Result of a single target-return optimization.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizationOutcome {
  /// Converged to a feasible minimum.
  Success {
    weights: Vec<f64>,
    achieved_return: f64,
    risk: f64,
    volatility: f64,
  },
  /// Solver did not reach a feasible converged point.
  Failure { message: String },
}

impl OptimizationOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success { .. })
  }

  /// Convert into a frontier point tagged with the requested target.
  pub fn into_point(self, target_return: f64) -> Option<FrontierPoint> {
    match self {
      Self::Success {
        weights,
        achieved_return,
        risk,
        volatility,
      } => Some(FrontierPoint {
        target_return,
        achieved_return,
        risk,
        volatility,
        weights,
      }),
      Self::Failure { .. } => None,
    }
  }
}
