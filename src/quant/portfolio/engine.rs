//! # Frontier Session
//!
//! $$
//! \texttt{Uninitialized}\xrightarrow{\ \text{build}\ }\texttt{Ready}
//! $$
//!
//! Owns the return statistics and the write-once cached frontier, and answers
//! requests against it.

use std::sync::Arc;
use std::sync::OnceLock;

use tracing::debug;
use tracing::info;

use super::api::ErrorResponse;
use super::api::FrontierRequest;
use super::api::FrontierResponse;
use super::data::ReturnDefinition;
use super::data::ReturnStatistics;
use super::frontier::build_frontier;
use super::frontier::CancellationToken;
use super::frontier::Frontier;
use super::frontier::FrontierConfig;
use super::provider::PriceHistoryProvider;
use crate::error::FrontierError;
use crate::error::Result;

/// Lifecycle of a [`FrontierSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
  Uninitialized,
  Ready,
}

/// Query service over one set of return statistics.
#[derive(Debug)]
pub struct FrontierSession {
  statistics: ReturnStatistics,
  config: FrontierConfig,
  frontier: OnceLock<Arc<Frontier>>,
}

impl FrontierSession {
  pub fn new(statistics: ReturnStatistics, config: FrontierConfig) -> Self {
    Self {
      statistics,
      config,
      frontier: OnceLock::new(),
    }
  }

  /// Load prices from `provider` and estimate statistics under `definition`.
  pub fn from_provider<P: PriceHistoryProvider + ?Sized>(
    provider: &P,
    definition: ReturnDefinition,
    config: FrontierConfig,
  ) -> Result<Self> {
    let prices = provider.price_history()?;
    let statistics = ReturnStatistics::from_prices(&prices, definition)?;
    Ok(Self::new(statistics, config))
  }

  pub fn statistics(&self) -> &ReturnStatistics {
    &self.statistics
  }

  pub fn config(&self) -> &FrontierConfig {
    &self.config
  }

  pub fn state(&self) -> SessionState {
    if self.frontier.get().is_some() {
      SessionState::Ready
    } else {
      SessionState::Uninitialized
    }
  }

  pub fn is_ready(&self) -> bool {
    self.state() == SessionState::Ready
  }

  /// Cached frontier, if built.
  pub fn frontier(&self) -> Option<Arc<Frontier>> {
    self.frontier.get().cloned()
  }

  /// Build the frontier once. Later calls return the cached one.
  pub fn initialize(&self) -> Result<Arc<Frontier>> {
    self.initialize_cancellable(None)
  }

  pub fn initialize_cancellable(&self, cancel: Option<&CancellationToken>) -> Result<Arc<Frontier>> {
    if let Some(frontier) = self.frontier.get() {
      return Ok(Arc::clone(frontier));
    }

    let built = Arc::new(build_frontier(&self.statistics, &self.config, cancel)?);
    let frontier = self.frontier.get_or_init(|| built);
    info!(points = frontier.len(), "frontier session ready");
    Ok(Arc::clone(frontier))
  }

  /// Look up the cached frontier point nearest `target_return`.
  pub fn query(&self, target_return: f64) -> Result<FrontierResponse> {
    let frontier = self.frontier.get().ok_or_else(|| {
      FrontierError::FrontierUnavailable("frontier has not been initialized".into())
    })?;
    FrontierResponse::from_frontier(frontier, target_return)
  }

  /// Answer a request from the cache, or from a one-off frontier when it asks
  /// for different frontier parameters.
  pub fn handle(&self, request: &FrontierRequest) -> Result<FrontierResponse> {
    self.handle_cancellable(request, None)
  }

  /// [`Self::handle`] with a token checked between grid points of a one-off build.
  pub fn handle_cancellable(
    &self,
    request: &FrontierRequest,
    cancel: Option<&CancellationToken>,
  ) -> Result<FrontierResponse> {
    request.validate()?;
    let resolved = request.resolve(&self.config);

    if resolved == self.config {
      return self.query(request.target_return);
    }

    debug!(
      points = resolved.points,
      confidence = resolved.confidence,
      simulations = resolved.monte_carlo.simulations,
      "building uncached frontier for request"
    );
    let frontier = build_frontier(&self.statistics, &resolved, cancel)?;
    FrontierResponse::from_frontier(&frontier, request.target_return)
  }

  /// Status code and JSON body for a raw request body.
  pub fn respond(&self, body: &str) -> (u16, String) {
    self.respond_cancellable(body, None)
  }

  pub fn respond_cancellable(&self, body: &str, cancel: Option<&CancellationToken>) -> (u16, String) {
    let outcome = FrontierRequest::from_json(body)
      .and_then(|request| self.handle_cancellable(&request, cancel))
      .and_then(|response| {
        serde_json::to_string(&response).map_err(|err| FrontierError::Internal(err.to_string()))
      });

    match outcome {
      Ok(json) => (200, json),
      Err(err) => {
        debug!(error = %err, "request failed");
        let body = serde_json::to_string(&ErrorResponse::from(&err))
          .unwrap_or_else(|_| String::from(r#"{"error":"internal error"}"#));
        (err.status_code(), body)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use nalgebra::DMatrix;

  use super::*;
  use crate::quant::portfolio::provider::SyntheticGbmProvider;
  use crate::quant::portfolio::types::RiskMethod;

  fn config() -> FrontierConfig {
    FrontierConfig {
      points: 6,
      confidence: 0.95,
      ..FrontierConfig::default()
    }
  }

  fn session() -> FrontierSession {
    let provider = SyntheticGbmProvider {
      start: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
      end: NaiveDate::from_ymd_opt(2023, 12, 29).unwrap(),
      ..SyntheticGbmProvider::default()
    };
    FrontierSession::from_provider(&provider, ReturnDefinition::Simple, config()).unwrap()
  }

  #[test]
  fn uninitialized_session_reports_unavailable() {
    let session = session();

    assert_eq!(session.state(), SessionState::Uninitialized);
    assert!(matches!(
      session.query(0.1),
      Err(FrontierError::FrontierUnavailable(_))
    ));
    assert!(matches!(
      session.handle(&FrontierRequest::default()),
      Err(FrontierError::FrontierUnavailable(_))
    ));
  }

  #[test]
  fn initialize_builds_once() {
    let session = session();
    let first = session.initialize().unwrap();
    let second = session.initialize().unwrap();

    assert!(session.is_ready());
    assert!(Arc::ptr_eq(&first, &second));
  }

  #[test]
  fn cached_request_matches_direct_query() {
    let session = session();
    session.initialize().unwrap();

    let response = session.handle(&FrontierRequest::default()).unwrap();
    assert_eq!(response, session.query(0.10).unwrap());
    assert_abs_diff_eq!(response.weights.values().sum::<f64>(), 100.0, epsilon = 0.05);
    assert!(response.cvar_risk >= 0.0);
    assert_eq!(response.asset_names.len(), 4);
  }

  #[test]
  fn differing_request_builds_uncached_frontier() {
    let session = session();
    let cached = session.initialize().unwrap();

    let request = FrontierRequest {
      points: Some(3),
      ..FrontierRequest::default()
    };
    let response = session.handle(&request).unwrap();

    assert!(response.efficient_frontier.len() <= 3);
    assert!(Arc::ptr_eq(&cached, &session.frontier().unwrap()));
    assert_eq!(session.frontier().unwrap().config().points, 6);
  }

  #[test]
  fn cancelled_request_build_reports_cancellation() {
    let session = session();
    session.initialize().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let request = FrontierRequest {
      points: Some(4),
      ..FrontierRequest::default()
    };
    let err = session.handle_cancellable(&request, Some(&token)).unwrap_err();
    assert_eq!(err, FrontierError::Cancelled);
    assert_eq!(err.status_code(), 500);

    let (status, body) = session.respond_cancellable(r#"{"points": 4}"#, Some(&token));
    assert_eq!(status, 500);
    let parsed: ErrorResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed.error, FrontierError::Cancelled.to_string());

    // Cached lookups never build, so the token is irrelevant.
    assert!(session.handle_cancellable(&FrontierRequest::default(), Some(&token)).is_ok());
  }

  #[test]
  fn failed_initialization_stays_uninitialized() {
    let mut session = session();
    let n = session.statistics.n_assets();
    session.statistics.covariance =
      DMatrix::from_fn(n, n, |i, j| if i == j { 1e-4 } else { 2e-4 });
    session.config.method = RiskMethod::MonteCarlo;

    assert!(session.initialize().is_err());
    assert_eq!(session.state(), SessionState::Uninitialized);
  }

  #[test]
  fn respond_maps_errors_to_status_codes() {
    let session = session();

    let (status, body) = session.respond(r#"{"confidence": 2.0}"#);
    assert_eq!(status, 400);
    assert!(body.contains("\"error\""));

    let (status, body) = session.respond("");
    assert_eq!(status, 500);
    assert!(body.contains("not been initialized"));

    session.initialize().unwrap();
    let (status, body) = session.respond(r#"{"targetReturn": 0.05}"#);
    assert_eq!(status, 200);
    let parsed: FrontierResponse = serde_json::from_str(&body).unwrap();
    assert!(!parsed.efficient_frontier.is_empty());
  }
}
