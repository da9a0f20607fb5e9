//! # Tail Risk
//!
//! $$
//! \operatorname{VaR}_\alpha = q_\alpha(R_p),\qquad
//! \operatorname{CVaR}_\alpha = -\mathbb E\left[R_p \mid R_p \le \operatorname{VaR}_\alpha\right]
//! $$
//!
//! Historical and Monte Carlo estimators of portfolio expected shortfall.
//! Monte Carlo paths are correlated through the Cholesky factor
//! $\Sigma = LL^\top$, $r_t = \mu + L z_t$, and held buy-and-hold:
//! $$
//! R_p = \sum_i w_i G_i - 1,\qquad G_i = \prod_{t=1}^{T}(1 + r_{t,i}).
//! $$

use argmin::core::CostFunction;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::data::ReturnDefinition;
use super::data::ReturnStatistics;
use super::types::RiskMethod;
use crate::error::FrontierError;
use crate::error::Result;

/// Risk reported when the covariance admits no Cholesky factor.
///
/// Exceeds every attainable long-only CVaR loss.
pub const ILL_CONDITIONED_RISK: f64 = 1.0e6;

/// Monte Carlo settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
  /// Number of simulated paths.
  pub simulations: usize,
  /// Trading days per path.
  pub horizon_days: usize,
  /// Fixed seed for reproducible draws; `None` seeds from entropy.
  pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
  fn default() -> Self {
    Self {
      simulations: 10_000,
      horizon_days: 252,
      seed: None,
    }
  }
}

/// Quantile and tail mean of a return sample, both in return units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TailRisk {
  /// Empirical `alpha`-quantile of returns.
  pub var: f64,
  /// Mean of returns at or below `var`.
  pub cvar: f64,
}

impl TailRisk {
  /// VaR as a loss magnitude.
  pub fn var_loss(&self) -> f64 {
    -self.var
  }

  /// CVaR as a loss magnitude.
  pub fn cvar_loss(&self) -> f64 {
    -self.cvar
  }
}

/// Empirical VaR (linear interpolation between order statistics) and CVaR.
///
/// Reorders `returns` in place. Returns `None` for an empty sample.
pub fn tail_risk(returns: &mut [f64], alpha: f64) -> Option<TailRisk> {
  if returns.is_empty() {
    return None;
  }

  let n = returns.len();
  let pos = alpha.clamp(0.0, 1.0) * (n - 1) as f64;
  let lo = (pos.floor() as usize).min(n - 1);
  let frac = pos - lo as f64;

  let (_, lo_val, upper) = returns.select_nth_unstable_by(lo, f64::total_cmp);
  let lo_val = *lo_val;
  let var = if frac > 0.0 && !upper.is_empty() {
    let hi_val = upper.iter().copied().fold(f64::INFINITY, f64::min);
    lo_val + frac * (hi_val - lo_val)
  } else {
    lo_val
  };

  let (sum, count) = returns
    .iter()
    .filter(|r| **r <= var)
    .fold((0.0, 0usize), |(s, c), r| (s + r, c + 1));
  let cvar = if count > 0 { sum / count as f64 } else { var };

  Some(TailRisk { var, cvar })
}

/// Simulated per-path gross growth factors, shape `(paths, assets)`.
#[derive(Clone, Debug)]
pub struct ScenarioSet {
  growth: Array2<f64>,
  horizon_days: usize,
}

impl ScenarioSet {
  /// Draw correlated daily returns and compound them per asset.
  ///
  /// Fails with [`FrontierError::IllConditionedCovariance`] when the
  /// covariance is not positive definite.
  pub fn simulate<R: Rng + ?Sized>(
    stats: &ReturnStatistics,
    config: &MonteCarloConfig,
    rng: &mut R,
  ) -> Result<Self> {
    let n = stats.n_assets();
    let paths = config.simulations.max(1);
    let horizon = config.horizon_days.max(1);

    let chol = stats
      .covariance()
      .clone()
      .cholesky()
      .ok_or(FrontierError::IllConditionedCovariance)?;
    let l = chol.l();
    let l_t = Array2::from_shape_fn((n, n), |(i, j)| l[(j, i)]);
    let mean = Array1::from_iter(stats.mean().iter().copied());
    let definition = stats.returns().definition();

    let mut growth = Array2::<f64>::zeros((paths, n));
    for mut row in growth.rows_mut() {
      let shocks: Array2<f64> = Array2::random_using((horizon, n), StandardNormal, rng);
      let daily = shocks.dot(&l_t) + &mean;
      let path_growth = match definition {
        ReturnDefinition::Simple => daily.map_axis(Axis(0), |col| {
          col.iter().map(|r| (1.0 + r).max(0.0)).product::<f64>()
        }),
        ReturnDefinition::Log => daily.sum_axis(Axis(0)).mapv(f64::exp),
      };
      row.assign(&path_growth);
    }

    debug!(paths, horizon, assets = n, "simulated scenario set");

    Ok(Self {
      growth,
      horizon_days: horizon,
    })
  }

  pub fn paths(&self) -> usize {
    self.growth.nrows()
  }

  pub fn horizon_days(&self) -> usize {
    self.horizon_days
  }

  /// Terminal simple return of a buy-and-hold portfolio on every path.
  pub fn terminal_returns(&self, weights: &[f64]) -> Array1<f64> {
    self.growth.dot(&Array1::from(weights.to_vec())) - 1.0
  }
}

/// Historical CVaR loss of fixed weights over a `(days, assets)` simple-return matrix.
pub fn historical_cvar(weights: &[f64], simple_returns: &Array2<f64>, alpha: f64) -> Option<f64> {
  let mut port = simple_returns.dot(&Array1::from(weights.to_vec())).to_vec();
  tail_risk(&mut port, alpha).map(|t| t.cvar_loss())
}

/// One-shot Monte Carlo tail risk with fresh draws from `rng`.
pub fn monte_carlo_tail_risk<R: Rng + ?Sized>(
  weights: &[f64],
  stats: &ReturnStatistics,
  config: &MonteCarloConfig,
  alpha: f64,
  rng: &mut R,
) -> Result<TailRisk> {
  let scenarios = ScenarioSet::simulate(stats, config, rng)?;
  let mut terminal = scenarios.terminal_returns(weights).to_vec();
  tail_risk(&mut terminal, alpha).ok_or_else(|| FrontierError::Internal("no simulated paths".into()))
}

#[derive(Clone, Debug)]
enum RiskModel {
  Historical { simple_returns: Array2<f64> },
  MonteCarlo { scenarios: ScenarioSet },
  IllConditioned,
}

/// Portfolio CVaR evaluator usable as an optimizer objective.
#[derive(Clone, Debug)]
pub struct RiskEvaluator {
  alpha: f64,
  model: RiskModel,
}

impl RiskEvaluator {
  /// Evaluator over the observed daily history.
  pub fn historical(stats: &ReturnStatistics, confidence: f64) -> Self {
    Self {
      alpha: 1.0 - confidence,
      model: RiskModel::Historical {
        simple_returns: stats.returns().simple_returns(),
      },
    }
  }

  /// Evaluator over one fixed set of simulated paths drawn from `rng`.
  ///
  /// A covariance without Cholesky factor yields an evaluator that always
  /// reports [`ILL_CONDITIONED_RISK`].
  pub fn monte_carlo<R: Rng + ?Sized>(
    stats: &ReturnStatistics,
    confidence: f64,
    config: &MonteCarloConfig,
    rng: &mut R,
  ) -> Self {
    let model = match ScenarioSet::simulate(stats, config, rng) {
      Ok(scenarios) => RiskModel::MonteCarlo { scenarios },
      Err(err) => {
        warn!(error = %err, "falling back to sentinel risk for every portfolio");
        RiskModel::IllConditioned
      }
    };

    Self {
      alpha: 1.0 - confidence,
      model,
    }
  }

  /// Evaluator over pre-simulated paths.
  pub fn from_scenarios(scenarios: ScenarioSet, confidence: f64) -> Self {
    Self {
      alpha: 1.0 - confidence,
      model: RiskModel::MonteCarlo { scenarios },
    }
  }

  /// Dispatch on `method`; `rng` is only drawn from in Monte Carlo mode.
  pub fn new<R: Rng + ?Sized>(
    method: RiskMethod,
    stats: &ReturnStatistics,
    confidence: f64,
    config: &MonteCarloConfig,
    rng: &mut R,
  ) -> Self {
    match method {
      RiskMethod::Historical => Self::historical(stats, confidence),
      RiskMethod::MonteCarlo => Self::monte_carlo(stats, confidence, config, rng),
    }
  }

  /// Tail probability `1 - confidence`.
  pub fn alpha(&self) -> f64 {
    self.alpha
  }

  pub fn is_ill_conditioned(&self) -> bool {
    matches!(self.model, RiskModel::IllConditioned)
  }

  /// Portfolio returns the tail statistics are taken over.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Option<Array1<f64>> {
    match &self.model {
      RiskModel::Historical { simple_returns } => {
        Some(simple_returns.dot(&Array1::from(weights.to_vec())))
      }
      RiskModel::MonteCarlo { scenarios } => Some(scenarios.terminal_returns(weights)),
      RiskModel::IllConditioned => None,
    }
  }

  pub fn tail_risk(&self, weights: &[f64]) -> Option<TailRisk> {
    let mut returns = self.portfolio_returns(weights)?.to_vec();
    tail_risk(&mut returns, self.alpha)
  }

  /// CVaR as a positive loss magnitude, or the sentinel when undefined.
  pub fn risk(&self, weights: &[f64]) -> f64 {
    match self.tail_risk(weights) {
      Some(t) if t.cvar.is_finite() => t.cvar_loss(),
      _ => ILL_CONDITIONED_RISK,
    }
  }
}

impl CostFunction for RiskEvaluator {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    Ok(self.risk(x))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use nalgebra::DMatrix;
  use ndarray::array;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;
  use tracing_test::traced_test;

  use super::*;
  use crate::quant::portfolio::data::ReturnSeries;

  fn two_asset_stats() -> ReturnStatistics {
    let returns = array![
      [-0.04, 0.01],
      [0.02, -0.02],
      [0.01, 0.00],
      [-0.01, 0.03],
      [0.03, -0.01],
      [-0.02, 0.02],
      [0.00, -0.03],
      [0.02, 0.01],
    ];
    let series = ReturnSeries::new(
      vec!["A".to_string(), "B".to_string()],
      returns,
      ReturnDefinition::Simple,
    )
    .unwrap();
    ReturnStatistics::estimate(series)
  }

  #[test]
  fn tail_risk_interpolates_like_linear_percentile() {
    let mut returns = vec![0.2, -0.1, 0.1, 0.0];
    let t = tail_risk(&mut returns, 0.5).unwrap();

    assert_abs_diff_eq!(t.var, 0.05, epsilon = 1e-12);
    assert_abs_diff_eq!(t.cvar, -0.05, epsilon = 1e-12);
  }

  #[test]
  fn tail_risk_on_uniform_grid() {
    let mut returns: Vec<f64> = (-50..=50).rev().map(|i| i as f64 / 1000.0).collect();
    let t = tail_risk(&mut returns, 0.05).unwrap();

    assert_abs_diff_eq!(t.var, -0.045, epsilon = 1e-12);
    assert_abs_diff_eq!(t.cvar, -0.0475, epsilon = 1e-12);
    assert_abs_diff_eq!(t.cvar_loss(), 0.0475, epsilon = 1e-12);
  }

  #[test]
  fn tail_risk_of_empty_sample_is_none() {
    assert!(tail_risk(&mut [], 0.05).is_none());
  }

  #[test]
  fn cvar_magnitude_dominates_var_magnitude() {
    let mut rng = StdRng::seed_from_u64(11);
    let normal = Normal::new(-0.001, 0.02).unwrap();

    for alpha in [0.01, 0.05, 0.1] {
      let mut sample: Vec<f64> = (0..500).map(|_| normal.sample(&mut rng)).collect();
      let t = tail_risk(&mut sample, alpha).unwrap();

      assert!(t.var < 0.0);
      assert!(t.cvar <= t.var);
      assert!(t.cvar.abs() >= t.var.abs());
    }
  }

  #[test]
  fn historical_risk_is_positive_tail_loss() {
    let stats = two_asset_stats();
    let evaluator = RiskEvaluator::historical(&stats, 0.75);

    // Asset A alone: sorted returns -0.04, -0.02, -0.01, 0.0, ... with
    // alpha = 0.25 the quantile sits at position 1.75 between -0.02 and -0.01.
    let t = evaluator.tail_risk(&[1.0, 0.0]).unwrap();
    assert_abs_diff_eq!(t.var, -0.0125, epsilon = 1e-12);
    assert_abs_diff_eq!(t.cvar, -0.03, epsilon = 1e-12);
    assert_abs_diff_eq!(evaluator.risk(&[1.0, 0.0]), 0.03, epsilon = 1e-12);
    assert_abs_diff_eq!(
      historical_cvar(&[1.0, 0.0], &stats.returns().simple_returns(), 0.25).unwrap(),
      0.03,
      epsilon = 1e-12
    );
  }

  #[test]
  fn diversification_lowers_historical_cvar() {
    let stats = two_asset_stats();
    let evaluator = RiskEvaluator::historical(&stats, 0.75);

    let mixed = evaluator.risk(&[0.5, 0.5]);
    assert!(mixed < evaluator.risk(&[1.0, 0.0]));
    assert!(mixed < evaluator.risk(&[0.0, 1.0]));
  }

  #[test]
  fn cost_function_matches_risk() {
    let stats = two_asset_stats();
    let evaluator = RiskEvaluator::historical(&stats, 0.9);
    let w = vec![0.3, 0.7];

    assert_eq!(evaluator.cost(&w).unwrap(), evaluator.risk(&w));
  }

  #[test]
  #[traced_test]
  fn non_positive_definite_covariance_yields_sentinel() {
    let mut stats = two_asset_stats();
    stats.covariance = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);

    let mut rng = StdRng::seed_from_u64(1);
    let evaluator =
      RiskEvaluator::monte_carlo(&stats, 0.95, &MonteCarloConfig::default(), &mut rng);

    assert!(evaluator.is_ill_conditioned());
    assert_eq!(evaluator.risk(&[0.5, 0.5]), ILL_CONDITIONED_RISK);
    assert!(ILL_CONDITIONED_RISK > RiskEvaluator::historical(&stats, 0.95).risk(&[0.5, 0.5]));
    assert!(logs_contain("not positive definite"));
  }

  #[test]
  fn scenario_simulation_rejects_non_positive_definite_covariance() {
    let mut stats = two_asset_stats();
    stats.covariance = DMatrix::zeros(2, 2);

    let mut rng = StdRng::seed_from_u64(3);
    let err = ScenarioSet::simulate(&stats, &MonteCarloConfig::default(), &mut rng).unwrap_err();
    assert_eq!(err, FrontierError::IllConditionedCovariance);
  }

  #[test]
  fn fixed_seed_reproduces_scenarios() {
    let stats = two_asset_stats();
    let config = MonteCarloConfig {
      simulations: 200,
      horizon_days: 5,
      seed: None,
    };

    let a = ScenarioSet::simulate(&stats, &config, &mut StdRng::seed_from_u64(9)).unwrap();
    let b = ScenarioSet::simulate(&stats, &config, &mut StdRng::seed_from_u64(9)).unwrap();
    let c = ScenarioSet::simulate(&stats, &config, &mut StdRng::seed_from_u64(10)).unwrap();

    assert_eq!(a.paths(), 200);
    assert_eq!(a.horizon_days(), 5);
    assert_eq!(a.terminal_returns(&[0.4, 0.6]), b.terminal_returns(&[0.4, 0.6]));
    assert_ne!(a.terminal_returns(&[0.4, 0.6]), c.terminal_returns(&[0.4, 0.6]));
  }

  #[test]
  fn monte_carlo_cvar_matches_gaussian_closed_form() {
    let series = ReturnSeries::new(
      vec!["X".to_string()],
      array![[0.01], [-0.01]],
      ReturnDefinition::Log,
    )
    .unwrap();
    let mut stats = ReturnStatistics::estimate(series);
    stats.mean = nalgebra::DVector::from_vec(vec![0.0]);
    stats.covariance = DMatrix::from_row_slice(1, 1, &[1e-4]);

    let config = MonteCarloConfig {
      simulations: 40_000,
      horizon_days: 1,
      seed: None,
    };
    let t = monte_carlo_tail_risk(&[1.0], &stats, &config, 0.05, &mut StdRng::seed_from_u64(5))
      .unwrap();

    // exp(N(0, 0.01^2)) - 1 is close to N(0, 0.01^2) and its 5% expected
    // shortfall is about 0.01 * phi(1.645) / 0.05 ~= 0.0206.
    assert_abs_diff_eq!(t.cvar_loss(), 0.0206, epsilon = 0.001);
    assert!(t.cvar_loss() >= t.var_loss());
  }
}
