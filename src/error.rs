//! # Errors
//!
//! $$
//! \mathcal{E} = \{\text{data},\ \text{numerics},\ \text{optimizer},\ \text{availability},\ \text{request}\}
//! $$
//!
//! Error taxonomy shared by the estimation, optimization and query layers.

use thiserror::Error;

/// Errors raised by the frontier pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrontierError {
  /// Too few price observations to form a single return.
  #[error("insufficient data: need at least {required} price observations, got {actual}")]
  InsufficientData {
    /// Required number of observations.
    required: usize,
    /// Observations actually supplied.
    actual: usize,
  },

  /// Price matrix violates the provider contract (shape, positivity, calendar).
  #[error("invalid price series: {0}")]
  InvalidPriceSeries(String),

  /// Covariance matrix admits no Cholesky factorization.
  #[error("covariance matrix is not positive definite")]
  IllConditionedCovariance,

  /// A single optimization did not converge to a feasible point.
  #[error("optimization failed: {0}")]
  OptimizationFailed(String),

  /// No usable frontier exists for the query.
  #[error("efficient frontier unavailable: {0}")]
  FrontierUnavailable(String),

  /// Malformed or out-of-range request input.
  #[error("invalid request parameters: {0}")]
  InvalidRequestParameters(String),

  /// Frontier computation was cancelled between grid points.
  #[error("frontier computation cancelled")]
  Cancelled,

  /// Unexpected internal failure (worker pool, serialization).
  #[error("internal error: {0}")]
  Internal(String),
}

impl FrontierError {
  /// HTTP-equivalent status for surfacing the error to a caller.
  pub fn status_code(&self) -> u16 {
    match self {
      Self::InvalidRequestParameters(_) => 400,
      _ => 500,
    }
  }
}

pub type Result<T> = std::result::Result<T, FrontierError>;
