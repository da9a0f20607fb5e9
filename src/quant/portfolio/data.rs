//! # Portfolio Data Utilities
//!
//! $$
//! r_{t,i}=\frac{P_{t,i}}{P_{t-1,i}}-1,\qquad
//! \hat\Sigma=\frac{1}{T-1}\sum_{t=1}^{T}(r_t-\hat\mu)(r_t-\hat\mu)^\top
//! $$
//!
//! Price containers, return preprocessing and mean/covariance estimation.

use chrono::NaiveDate;
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::types::TRADING_DAYS_PER_YEAR;
use crate::error::FrontierError;
use crate::error::Result;

/// How consecutive prices are turned into returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnDefinition {
  /// Percentage change `P_t / P_{t-1} - 1`.
  #[default]
  Simple,
  /// Logarithmic return `ln(P_t / P_{t-1})`.
  Log,
}

/// Day-indexed price matrix, one row per trading day and one column per asset.
#[derive(Clone, Debug)]
pub struct PriceSeries {
  dates: Vec<NaiveDate>,
  asset_names: Vec<String>,
  prices: Array2<f64>,
}

impl PriceSeries {
  /// Validate and wrap a price matrix.
  pub fn new(dates: Vec<NaiveDate>, asset_names: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    let (rows, cols) = prices.dim();

    if cols == 0 {
      return Err(FrontierError::InvalidPriceSeries(
        "at least one asset is required".into(),
      ));
    }
    if dates.len() != rows {
      return Err(FrontierError::InvalidPriceSeries(format!(
        "{} dates supplied for {rows} price rows",
        dates.len()
      )));
    }
    if asset_names.len() != cols {
      return Err(FrontierError::InvalidPriceSeries(format!(
        "{} asset names supplied for {cols} price columns",
        asset_names.len()
      )));
    }
    if let Some(pair) = dates.windows(2).find(|pair| pair[0] >= pair[1]) {
      return Err(FrontierError::InvalidPriceSeries(format!(
        "dates must be strictly increasing ({} then {})",
        pair[0], pair[1]
      )));
    }
    if let Some(((row, col), price)) = prices
      .indexed_iter()
      .find(|(_, p)| !(p.is_finite() && **p > 0.0))
    {
      return Err(FrontierError::InvalidPriceSeries(format!(
        "price {price} for '{}' on {} is not strictly positive",
        asset_names[col], dates[row]
      )));
    }

    Ok(Self {
      dates,
      asset_names,
      prices,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn asset_names(&self) -> &[String] {
    &self.asset_names
  }

  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  /// Number of observations (trading days).
  pub fn len(&self) -> usize {
    self.prices.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.prices.nrows() == 0
  }

  pub fn n_assets(&self) -> usize {
    self.prices.ncols()
  }
}

/// Per-asset return matrix derived once from a [`PriceSeries`].
#[derive(Clone, Debug)]
pub struct ReturnSeries {
  definition: ReturnDefinition,
  asset_names: Vec<String>,
  returns: Array2<f64>,
}

impl ReturnSeries {
  /// Wrap an existing `(days, assets)` return matrix.
  pub fn new(
    asset_names: Vec<String>,
    returns: Array2<f64>,
    definition: ReturnDefinition,
  ) -> Result<Self> {
    if returns.nrows() == 0 {
      return Err(FrontierError::InsufficientData {
        required: 2,
        actual: 1,
      });
    }
    if asset_names.len() != returns.ncols() {
      return Err(FrontierError::InvalidPriceSeries(format!(
        "{} asset names supplied for {} return columns",
        asset_names.len(),
        returns.ncols()
      )));
    }
    if returns.iter().any(|r| !r.is_finite()) {
      return Err(FrontierError::InvalidPriceSeries(
        "returns must be finite".into(),
      ));
    }

    Ok(Self {
      definition,
      asset_names,
      returns,
    })
  }

  /// Convert consecutive prices to returns under `definition`.
  pub fn from_prices(prices: &PriceSeries, definition: ReturnDefinition) -> Result<Self> {
    if prices.len() < 2 {
      return Err(FrontierError::InsufficientData {
        required: 2,
        actual: prices.len(),
      });
    }

    let p = prices.prices();
    let ratio = &p.slice(s![1.., ..]) / &p.slice(s![..-1, ..]);
    let returns = match definition {
      ReturnDefinition::Simple => ratio - 1.0,
      ReturnDefinition::Log => ratio.mapv(f64::ln),
    };

    Ok(Self {
      definition,
      asset_names: prices.asset_names().to_vec(),
      returns,
    })
  }

  pub fn definition(&self) -> ReturnDefinition {
    self.definition
  }

  pub fn asset_names(&self) -> &[String] {
    &self.asset_names
  }

  /// Returns in the series' own definition, shape `(days, assets)`.
  pub fn returns(&self) -> &Array2<f64> {
    &self.returns
  }

  pub fn len(&self) -> usize {
    self.returns.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.returns.nrows() == 0
  }

  /// Returns expressed as simple returns, the unit all tail-risk math works in.
  pub fn simple_returns(&self) -> Array2<f64> {
    match self.definition {
      ReturnDefinition::Simple => self.returns.clone(),
      ReturnDefinition::Log => self.returns.mapv(f64::exp_m1),
    }
  }

  /// Daily simple portfolio returns for fixed weights.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Array1<f64> {
    self.simple_returns().dot(&Array1::from(weights.to_vec()))
  }
}

/// Sample mean vector and covariance matrix of a [`ReturnSeries`].
#[derive(Clone, Debug)]
pub struct ReturnStatistics {
  pub(crate) mean: DVector<f64>,
  pub(crate) covariance: DMatrix<f64>,
  pub(crate) returns: ReturnSeries,
  /// Daily mean of simple returns when the series holds log returns.
  pub(crate) simple_mean: Option<DVector<f64>>,
}

impl ReturnStatistics {
  /// Estimate daily mean and sample covariance (`T - 1` denominator).
  pub fn estimate(returns: ReturnSeries) -> Self {
    let r = returns.returns();
    let (t, n) = r.dim();
    let mean = r.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n));
    let centered = r - &mean;
    let denom = t.saturating_sub(1).max(1) as f64;
    let cov = centered.t().dot(&centered) / denom;
    let simple_mean = match returns.definition() {
      ReturnDefinition::Simple => None,
      ReturnDefinition::Log => {
        let simple = returns.simple_returns();
        let m = simple.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n));
        Some(DVector::from_iterator(n, m.iter().copied()))
      }
    };

    debug!(
      observations = t,
      assets = n,
      definition = ?returns.definition(),
      "estimated return statistics"
    );

    Self {
      mean: DVector::from_iterator(n, mean.iter().copied()),
      covariance: DMatrix::from_fn(n, n, |i, j| cov[[i, j]]),
      returns,
      simple_mean,
    }
  }

  /// Derive returns from prices and estimate their statistics.
  pub fn from_prices(prices: &PriceSeries, definition: ReturnDefinition) -> Result<Self> {
    Ok(Self::estimate(ReturnSeries::from_prices(prices, definition)?))
  }

  /// Daily mean return per asset.
  pub fn mean(&self) -> &DVector<f64> {
    &self.mean
  }

  /// Daily return covariance.
  pub fn covariance(&self) -> &DMatrix<f64> {
    &self.covariance
  }

  pub fn returns(&self) -> &ReturnSeries {
    &self.returns
  }

  pub fn asset_names(&self) -> &[String] {
    self.returns.asset_names()
  }

  pub fn n_assets(&self) -> usize {
    self.mean.len()
  }

  /// Daily mean simple return per asset, the unit tail risk is measured in.
  pub fn simple_mean(&self) -> &DVector<f64> {
    self.simple_mean.as_ref().unwrap_or(&self.mean)
  }

  /// Per-asset mean simple return scaled to a yearly horizon.
  pub fn annualized_mean(&self) -> Vec<f64> {
    self.simple_mean().iter().map(|m| m * TRADING_DAYS_PER_YEAR).collect()
  }

  /// Per-asset volatility scaled by the square root of time.
  pub fn annualized_volatility(&self) -> Vec<f64> {
    self
      .covariance
      .diagonal()
      .iter()
      .map(|v| (v.max(0.0) * TRADING_DAYS_PER_YEAR).sqrt())
      .collect()
  }

  /// Annualized expected return of a weight vector.
  pub fn annualized_return(&self, weights: &[f64]) -> f64 {
    portfolio_return(weights, self.simple_mean().as_slice()) * TRADING_DAYS_PER_YEAR
  }

  /// Annualized volatility `sqrt(252 w' Σ w)` of a weight vector.
  pub fn annualized_portfolio_volatility(&self, weights: &[f64]) -> f64 {
    portfolio_volatility(weights, &self.covariance) * TRADING_DAYS_PER_YEAR.sqrt()
  }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Expected portfolio return `w · μ` in the units of `mean`.
pub fn portfolio_return(weights: &[f64], mean: &[f64]) -> f64 {
  dot(weights, mean)
}

/// Portfolio standard deviation `sqrt(w' Σ w)` in the units of `covariance`.
pub fn portfolio_volatility(weights: &[f64], covariance: &DMatrix<f64>) -> f64 {
  let w = DVector::from_column_slice(weights);
  (w.transpose() * covariance * &w)[(0, 0)].max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn days(n: usize) -> Vec<NaiveDate> {
    (0..n)
      .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap())
      .collect()
  }

  fn names() -> Vec<String> {
    vec!["A".to_string(), "B".to_string()]
  }

  fn sample_prices() -> PriceSeries {
    let prices = array![[100.0, 50.0], [110.0, 50.0], [99.0, 55.0], [99.0, 55.0]];
    PriceSeries::new(days(4), names(), prices).unwrap()
  }

  #[test]
  fn simple_returns_are_percentage_changes() {
    let returns = ReturnSeries::from_prices(&sample_prices(), ReturnDefinition::Simple).unwrap();
    let r = returns.returns();

    assert_eq!(r.dim(), (3, 2));
    assert_abs_diff_eq!(r[[0, 0]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[1, 0]], -0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[1, 1]], 0.1, epsilon = 1e-12);
  }

  #[test]
  fn log_returns_convert_back_to_simple() {
    let prices = sample_prices();
    let log = ReturnSeries::from_prices(&prices, ReturnDefinition::Log).unwrap();
    let simple = ReturnSeries::from_prices(&prices, ReturnDefinition::Simple).unwrap();

    assert_abs_diff_eq!(log.returns()[[0, 0]], 1.1_f64.ln(), epsilon = 1e-12);
    for (a, b) in log.simple_returns().iter().zip(simple.returns().iter()) {
      assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
  }

  #[test]
  fn log_statistics_report_returns_in_simple_units() {
    let stats = ReturnStatistics::from_prices(&sample_prices(), ReturnDefinition::Log).unwrap();
    let w = [0.3, 0.7];

    let simple = stats.returns().portfolio_returns(&w);
    let expected = simple.mean().unwrap() * TRADING_DAYS_PER_YEAR;
    assert_abs_diff_eq!(stats.annualized_return(&w), expected, epsilon = 1e-12);
    assert!((stats.mean()[0] * TRADING_DAYS_PER_YEAR - stats.annualized_mean()[0]).abs() > 1e-6);
  }

  #[test]
  fn single_observation_is_insufficient() {
    let prices = PriceSeries::new(days(1), names(), array![[100.0, 50.0]]).unwrap();
    let err = ReturnSeries::from_prices(&prices, ReturnDefinition::Simple).unwrap_err();

    assert_eq!(
      err,
      FrontierError::InsufficientData {
        required: 2,
        actual: 1
      }
    );
  }

  #[test]
  fn non_positive_prices_are_rejected() {
    let err = PriceSeries::new(days(2), names(), array![[100.0, 50.0], [0.0, 51.0]]).unwrap_err();
    assert!(matches!(err, FrontierError::InvalidPriceSeries(_)));
  }

  #[test]
  fn shape_mismatch_is_rejected() {
    let err = PriceSeries::new(days(3), names(), array![[100.0, 50.0], [101.0, 51.0]]).unwrap_err();
    assert!(matches!(err, FrontierError::InvalidPriceSeries(_)));
  }

  #[test]
  fn mean_and_sample_covariance_match_hand_computation() {
    let stats = ReturnStatistics::from_prices(&sample_prices(), ReturnDefinition::Simple).unwrap();

    assert_abs_diff_eq!(stats.mean()[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.mean()[1], 0.1 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.covariance()[(0, 0)], 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.covariance()[(0, 1)], -0.005, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.covariance()[(1, 0)], stats.covariance()[(0, 1)], epsilon = 1e-15);
  }

  #[test]
  fn equal_weight_return_is_average_of_means() {
    assert_abs_diff_eq!(
      portfolio_return(&[0.5, 0.5], &[0.01, 0.02]),
      0.015,
      epsilon = 1e-15
    );
  }

  #[test]
  fn annualization_scales_mean_linearly_and_vol_by_root_time() {
    let stats = ReturnStatistics::from_prices(&sample_prices(), ReturnDefinition::Simple).unwrap();
    let w = [1.0, 0.0];

    assert_abs_diff_eq!(stats.annualized_return(&w), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(
      stats.annualized_portfolio_volatility(&w),
      (0.01_f64 * 252.0).sqrt(),
      epsilon = 1e-12
    );
    assert_abs_diff_eq!(
      stats.annualized_volatility()[0],
      (0.01_f64 * 252.0).sqrt(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn portfolio_returns_project_history_onto_weights() {
    let stats = ReturnStatistics::from_prices(&sample_prices(), ReturnDefinition::Simple).unwrap();
    let port = stats.returns().portfolio_returns(&[0.5, 0.5]);

    assert_eq!(port.len(), 3);
    assert_abs_diff_eq!(port[0], 0.05, epsilon = 1e-12);
    assert_abs_diff_eq!(port[1], 0.0, epsilon = 1e-12);
  }
}
