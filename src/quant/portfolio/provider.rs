//! # Price History Providers
//!
//! $$
//! P_{t,i}=P_{t-1,i}\exp\left(\mu_i+\sigma_i Z_{t,i}\right),\qquad Z_{t,i}\sim\mathcal N(0,1)
//! $$
//!
//! Source contract for price matrices plus a seeded multi-asset GBM generator
//! sampled on calendar days and reported on business days.

use chrono::Datelike;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::Weekday;
use impl_new_derive::ImplNew;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::StandardNormal;
use tracing::debug;

use super::data::PriceSeries;
use crate::error::FrontierError;
use crate::error::Result;

/// Anything able to supply a gap-free, day-indexed price matrix.
pub trait PriceHistoryProvider {
  fn price_history(&self) -> Result<PriceSeries>;
}

impl PriceHistoryProvider for PriceSeries {
  fn price_history(&self) -> Result<PriceSeries> {
    Ok(self.clone())
  }
}

/// Independent geometric Brownian motions with daily log drift and volatility.
#[derive(ImplNew, Clone, Debug)]
pub struct SyntheticGbmProvider {
  pub asset_names: Vec<String>,
  pub start_prices: Vec<f64>,
  /// Daily log drift per asset.
  pub drifts: Vec<f64>,
  /// Daily log volatility per asset.
  pub volatilities: Vec<f64>,
  pub start: NaiveDate,
  pub end: NaiveDate,
  pub seed: u64,
}

impl Default for SyntheticGbmProvider {
  fn default() -> Self {
    Self {
      asset_names: vec![
        "Asset A (Tech)".to_string(),
        "Asset B (Energy)".to_string(),
        "Asset C (Bonds)".to_string(),
        "Asset D (Gold)".to_string(),
      ],
      start_prices: vec![100.0, 50.0, 200.0, 75.0],
      drifts: vec![0.0002, 0.0001, 0.0003, 0.00005],
      volatilities: vec![0.015, 0.02, 0.01, 0.03],
      start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
      end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
      seed: 42,
    }
  }
}

impl SyntheticGbmProvider {
  fn validate(&self) -> Result<()> {
    let n = self.asset_names.len();
    if n == 0 {
      return Err(FrontierError::InvalidPriceSeries(
        "generator needs at least one asset".into(),
      ));
    }
    if self.start_prices.len() != n || self.drifts.len() != n || self.volatilities.len() != n {
      return Err(FrontierError::InvalidPriceSeries(format!(
        "generator parameter lengths differ from {n} assets"
      )));
    }
    if self.end <= self.start {
      return Err(FrontierError::InvalidPriceSeries(format!(
        "calendar end {} is not after start {}",
        self.end, self.start
      )));
    }
    Ok(())
  }
}

fn is_business_day(date: NaiveDate) -> bool {
  !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

impl PriceHistoryProvider for SyntheticGbmProvider {
  fn price_history(&self) -> Result<PriceSeries> {
    self.validate()?;

    let n = self.asset_names.len();
    let calendar_days = (self.end - self.start).num_days() as usize + 1;
    let mut rng = StdRng::seed_from_u64(self.seed);

    let mut dates = Vec::with_capacity(calendar_days);
    let mut rows: Vec<f64> = Vec::with_capacity(calendar_days * n);
    let mut current = self.start_prices.clone();

    for day in 0..calendar_days {
      let date = self.start + Duration::days(day as i64);
      if day > 0 {
        for i in 0..n {
          let z: f64 = StandardNormal.sample(&mut rng);
          current[i] *= (self.drifts[i] + self.volatilities[i] * z).exp();
        }
      }
      if is_business_day(date) {
        dates.push(date);
        rows.extend_from_slice(&current);
      }
    }

    debug!(
      calendar_days,
      business_days = dates.len(),
      assets = n,
      seed = self.seed,
      "generated synthetic price history"
    );

    let prices = Array2::from_shape_vec((dates.len(), n), rows)
      .map_err(|err| FrontierError::Internal(err.to_string()))?;

    PriceSeries::new(dates, self.asset_names.clone(), prices)
  }
}
