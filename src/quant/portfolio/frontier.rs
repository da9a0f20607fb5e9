//! # Efficient Frontier
//!
//! $$
//! \mathcal F=\left\{\left(r_k,\ \min_{\mathbf{w}}\operatorname{CVaR}_\alpha(\mathbf{w})\ :\ 252\,\hat\mu^\top\mathbf{w}\ge r_k\right)\right\}_{k=1}^{N},
//! \qquad r_k\in\left[\mu_{\min}-0.1|\mu_{\min}|,\ \mu_{\max}+0.1|\mu_{\max}|\right]
//! $$
//!
//! Parallel sweep of the min-CVaR optimizer over a grid of annual return targets.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array1;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::data::ReturnStatistics;
use super::optimizers::optimize_min_cvar;
use super::risk::MonteCarloConfig;
use super::risk::RiskEvaluator;
use super::solver::SolverOptions;
use super::types::FrontierPoint;
use super::types::OptimizationOutcome;
use super::types::RiskMethod;
use crate::error::FrontierError;
use crate::error::Result;

/// Largest accepted grid resolution.
pub const MAX_FRONTIER_POINTS: usize = 1_000;

/// Frontier construction settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
  /// Tail-risk estimator minimized at every grid point.
  pub method: RiskMethod,
  /// CVaR confidence level; the tail probability is `1 - confidence`.
  pub confidence: f64,
  /// Number of target returns in the grid.
  pub points: usize,
  pub monte_carlo: MonteCarloConfig,
  pub solver: SolverOptions,
  /// Worker threads for the sweep; `None` uses the global rayon pool.
  pub workers: Option<usize>,
}

impl Default for FrontierConfig {
  fn default() -> Self {
    Self {
      method: RiskMethod::Historical,
      confidence: 0.99,
      points: 50,
      monte_carlo: MonteCarloConfig::default(),
      solver: SolverOptions::default(),
      workers: None,
    }
  }
}

impl FrontierConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.confidence > 0.0 && self.confidence < 1.0) {
      return Err(FrontierError::InvalidRequestParameters(format!(
        "confidence must lie in (0, 1), got {}",
        self.confidence
      )));
    }
    if self.points == 0 || self.points > MAX_FRONTIER_POINTS {
      return Err(FrontierError::InvalidRequestParameters(format!(
        "points must lie in [1, {MAX_FRONTIER_POINTS}], got {}",
        self.points
      )));
    }
    if self.monte_carlo.simulations == 0 || self.monte_carlo.horizon_days == 0 {
      return Err(FrontierError::InvalidRequestParameters(
        "Monte Carlo simulations and horizon must be positive".into(),
      ));
    }
    if self.workers == Some(0) {
      return Err(FrontierError::InvalidRequestParameters(
        "workers must be positive when set".into(),
      ));
    }
    Ok(())
  }
}

/// Linearly spaced annual return targets spanning the asset means widened by 10%.
///
/// A single point yields the lower bound only.
pub fn target_return_grid(stats: &ReturnStatistics, points: usize) -> Vec<f64> {
  let mean = stats.annualized_mean();
  if mean.is_empty() || points == 0 {
    return Vec::new();
  }

  let lo_mean = mean.iter().copied().fold(f64::INFINITY, f64::min);
  let hi_mean = mean.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let lo = lo_mean - 0.1 * lo_mean.abs();
  let hi = hi_mean + 0.1 * hi_mean.abs();

  if points == 1 {
    return vec![lo];
  }
  Array1::linspace(lo, hi, points).to_vec()
}

/// Cooperative cancellation flag checked between grid points.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }
}

/// Frontier points ordered by target return, with the settings that produced them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frontier {
  points: Vec<FrontierPoint>,
  asset_names: Vec<String>,
  config: FrontierConfig,
}

impl Frontier {
  /// Assemble a frontier, sorting points by target return.
  pub fn new(mut points: Vec<FrontierPoint>, asset_names: Vec<String>, config: FrontierConfig) -> Self {
    points.sort_by_key(|p| OrderedFloat(p.target_return));
    Self {
      points,
      asset_names,
      config,
    }
  }

  pub fn points(&self) -> &[FrontierPoint] {
    &self.points
  }

  pub fn asset_names(&self) -> &[String] {
    &self.asset_names
  }

  pub fn config(&self) -> &FrontierConfig {
    &self.config
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Point whose achieved return is closest to `target`; ties keep the earlier point.
  pub fn nearest(&self, target: f64) -> Option<&FrontierPoint> {
    self.points.iter().fold(None, |best, p| match best {
      Some(b) if (b.achieved_return - target).abs() <= (p.achieved_return - target).abs() => {
        Some(b)
      }
      _ => Some(p),
    })
  }
}

fn sweep(
  stats: &ReturnStatistics,
  grid: &[f64],
  evaluator: &RiskEvaluator,
  options: &SolverOptions,
  cancel: Option<&CancellationToken>,
) -> Result<Vec<Option<FrontierPoint>>> {
  grid
    .par_iter()
    .map(|&target| {
      if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(FrontierError::Cancelled);
      }
      match optimize_min_cvar(stats, target, evaluator, options) {
        OptimizationOutcome::Failure { message } => {
          debug!(target_return = target, %message, "dropping frontier point");
          Ok(None)
        }
        outcome => Ok(outcome.into_point(target)),
      }
    })
    .collect()
}

/// Optimize every grid target and keep the feasible points.
///
/// Monte Carlo builds draw one scenario set, seeded from `config.monte_carlo.seed`
/// when present, and share it across all grid points.
pub fn build_frontier(
  stats: &ReturnStatistics,
  config: &FrontierConfig,
  cancel: Option<&CancellationToken>,
) -> Result<Frontier> {
  config.validate()?;
  let started = Instant::now();

  let grid = target_return_grid(stats, config.points);
  let mut rng = match config.monte_carlo.seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  };
  let evaluator = RiskEvaluator::new(
    config.method,
    stats,
    config.confidence,
    &config.monte_carlo,
    &mut rng,
  );

  let results = match config.workers {
    Some(workers) => rayon::ThreadPoolBuilder::new()
      .num_threads(workers)
      .build()
      .map_err(|err| FrontierError::Internal(err.to_string()))?
      .install(|| sweep(stats, &grid, &evaluator, &config.solver, cancel)),
    None => sweep(stats, &grid, &evaluator, &config.solver, cancel),
  };

  let results = match results {
    Ok(results) => results,
    Err(FrontierError::Cancelled) => {
      warn!(grid_points = grid.len(), "frontier build cancelled");
      return Err(FrontierError::Cancelled);
    }
    Err(err) => return Err(err),
  };

  let points: Vec<FrontierPoint> = results.into_iter().flatten().collect();
  let dropped = grid.len() - points.len();

  info!(
    method = ?config.method,
    confidence = config.confidence,
    grid_points = grid.len(),
    feasible = points.len(),
    dropped,
    elapsed_ms = started.elapsed().as_millis() as u64,
    "built efficient frontier"
  );

  if points.is_empty() {
    let reason = if evaluator.is_ill_conditioned() {
      FrontierError::IllConditionedCovariance.to_string()
    } else {
      format!("none of {} target returns admitted a feasible portfolio", grid.len())
    };
    return Err(FrontierError::FrontierUnavailable(reason));
  }

  Ok(Frontier::new(
    points,
    stats.asset_names().to_vec(),
    config.clone(),
  ))
}
