//! # Request / Response
//!
//! $$
//! \text{pct}(x)=\tfrac{1}{100}\operatorname{round}\left(10^4\,x\right)
//! $$
//!
//! JSON shapes exchanged with frontier clients, in percentage units rounded to
//! two decimals.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::frontier::Frontier;
use super::frontier::FrontierConfig;
use super::frontier::MAX_FRONTIER_POINTS;
use super::types::RiskMethod;
use crate::error::FrontierError;
use crate::error::Result;

/// Largest accepted Monte Carlo path count.
pub const MAX_SIMULATIONS: usize = 1_000_000;

/// Target return used when a request omits one.
pub const DEFAULT_TARGET_RETURN: f64 = 0.10;

/// Frontier query. Omitted frontier parameters fall back to the session's.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontierRequest {
  /// Desired annual return as a fraction.
  pub target_return: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub points: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confidence: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub simulations: Option<usize>,
}

impl Default for FrontierRequest {
  fn default() -> Self {
    Self {
      target_return: DEFAULT_TARGET_RETURN,
      points: None,
      confidence: None,
      simulations: None,
    }
  }
}

impl FrontierRequest {
  /// Parse a JSON body; a blank body is the default request.
  pub fn from_json(body: &str) -> Result<Self> {
    if body.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_json::from_str(body).map_err(|err| FrontierError::InvalidRequestParameters(err.to_string()))
  }

  pub fn validate(&self) -> Result<()> {
    if !self.target_return.is_finite() {
      return Err(FrontierError::InvalidRequestParameters(
        "targetReturn must be a finite number".into(),
      ));
    }
    if let Some(points) = self.points {
      if !(1..=MAX_FRONTIER_POINTS).contains(&points) {
        return Err(FrontierError::InvalidRequestParameters(format!(
          "points must lie in [1, {MAX_FRONTIER_POINTS}], got {points}"
        )));
      }
    }
    if let Some(confidence) = self.confidence {
      if !(confidence > 0.0 && confidence < 1.0) {
        return Err(FrontierError::InvalidRequestParameters(format!(
          "confidence must lie in (0, 1), got {confidence}"
        )));
      }
    }
    if let Some(simulations) = self.simulations {
      if !(1..=MAX_SIMULATIONS).contains(&simulations) {
        return Err(FrontierError::InvalidRequestParameters(format!(
          "simulations must lie in [1, {MAX_SIMULATIONS}], got {simulations}"
        )));
      }
    }
    Ok(())
  }

  /// Frontier settings this request asks for, given the session's.
  ///
  /// `simulations` only applies to Monte Carlo sessions.
  pub fn resolve(&self, base: &FrontierConfig) -> FrontierConfig {
    let mut config = base.clone();
    if let Some(points) = self.points {
      config.points = points;
    }
    if let Some(confidence) = self.confidence {
      config.confidence = confidence;
    }
    if let (Some(simulations), RiskMethod::MonteCarlo) = (self.simulations, base.method) {
      config.monte_carlo.simulations = simulations;
    }
    config
  }
}

fn pct(x: f64) -> f64 {
  (x * 10_000.0).round() / 100.0
}

/// One frontier point in percent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontierCurvePoint {
  #[serde(rename = "return")]
  pub expected_return: f64,
  pub risk: f64,
}

/// Portfolio nearest the requested return plus the full frontier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierResponse {
  pub expected_return: f64,
  pub cvar_risk: f64,
  pub weights: BTreeMap<String, f64>,
  pub asset_names: Vec<String>,
  pub efficient_frontier: Vec<FrontierCurvePoint>,
}

impl FrontierResponse {
  pub fn from_frontier(frontier: &Frontier, target_return: f64) -> Result<Self> {
    let best = frontier.nearest(target_return).ok_or_else(|| {
      FrontierError::FrontierUnavailable("frontier has no feasible points".into())
    })?;

    let weights = frontier
      .asset_names()
      .iter()
      .zip(&best.weights)
      .map(|(name, w)| (name.clone(), pct(*w)))
      .collect();

    let efficient_frontier = frontier
      .points()
      .iter()
      .map(|p| FrontierCurvePoint {
        expected_return: pct(p.achieved_return),
        risk: pct(p.risk.abs()),
      })
      .collect();

    Ok(Self {
      expected_return: pct(best.achieved_return),
      cvar_risk: pct(best.risk.abs()),
      weights,
      asset_names: frontier.asset_names().to_vec(),
      efficient_frontier,
    })
  }
}

/// Error body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
  pub error: String,
}

impl From<&FrontierError> for ErrorResponse {
  fn from(err: &FrontierError) -> Self {
    Self {
      error: err.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::quant::portfolio::types::FrontierPoint;

  fn frontier() -> Frontier {
    let point = |achieved_return: f64, risk: f64, weights: Vec<f64>| FrontierPoint {
      target_return: achieved_return,
      achieved_return,
      risk,
      volatility: 0.1,
      weights,
    };
    Frontier::new(
      vec![
        point(0.05, 0.012344, vec![0.7, 0.3]),
        point(0.10, 0.02, vec![0.456789, 0.543211]),
        point(0.15, 0.031, vec![0.1, 0.9]),
      ],
      vec!["Bonds".into(), "Tech".into()],
      FrontierConfig::default(),
    )
  }

  #[test]
  fn blank_body_is_default_request() {
    let request = FrontierRequest::from_json("  ").unwrap();
    assert_eq!(request, FrontierRequest::default());
    assert_eq!(request.target_return, 0.10);
  }

  #[test]
  fn parses_camel_case_fields() {
    let request = FrontierRequest::from_json(
      r#"{"targetReturn": 0.12, "points": 20, "confidence": 0.95, "simulations": 500}"#,
    )
    .unwrap();

    assert_eq!(request.target_return, 0.12);
    assert_eq!(request.points, Some(20));
    assert_eq!(request.confidence, Some(0.95));
    assert_eq!(request.simulations, Some(500));
  }

  #[test]
  fn malformed_json_is_invalid_request() {
    for body in ["{", r#"{"points": -3}"#, r#"{"targetReturn": "high"}"#] {
      let err = FrontierRequest::from_json(body).unwrap_err();
      assert!(matches!(err, FrontierError::InvalidRequestParameters(_)), "{body}");
      assert_eq!(err.status_code(), 400);
    }
  }

  #[test]
  fn validation_enforces_ranges() {
    let bad = [
      FrontierRequest {
        target_return: f64::NAN,
        ..FrontierRequest::default()
      },
      FrontierRequest {
        points: Some(0),
        ..FrontierRequest::default()
      },
      FrontierRequest {
        points: Some(MAX_FRONTIER_POINTS + 1),
        ..FrontierRequest::default()
      },
      FrontierRequest {
        confidence: Some(1.0),
        ..FrontierRequest::default()
      },
      FrontierRequest {
        simulations: Some(0),
        ..FrontierRequest::default()
      },
    ];

    for request in bad {
      assert!(request.validate().is_err(), "{request:?}");
    }
    assert!(FrontierRequest::default().validate().is_ok());
  }

  #[test]
  fn resolve_overrides_only_supplied_fields() {
    let base = FrontierConfig::default();
    assert_eq!(FrontierRequest::default().resolve(&base), base);

    let request = FrontierRequest {
      points: Some(10),
      simulations: Some(500),
      ..FrontierRequest::default()
    };
    let resolved = request.resolve(&base);
    assert_eq!(resolved.points, 10);
    assert_eq!(resolved.confidence, base.confidence);
    assert_eq!(resolved.monte_carlo, base.monte_carlo);

    let mc_base = FrontierConfig {
      method: RiskMethod::MonteCarlo,
      ..FrontierConfig::default()
    };
    assert_eq!(request.resolve(&mc_base).monte_carlo.simulations, 500);
  }

  #[test]
  fn response_reports_nearest_point_in_percent() {
    let response = FrontierResponse::from_frontier(&frontier(), 0.11).unwrap();

    assert_eq!(response.expected_return, 10.0);
    assert_eq!(response.cvar_risk, 2.0);
    assert_eq!(response.weights["Bonds"], 45.68);
    assert_eq!(response.weights["Tech"], 54.32);
    assert_eq!(response.asset_names, vec!["Bonds".to_string(), "Tech".to_string()]);
    assert_eq!(response.efficient_frontier.len(), 3);
    assert_eq!(response.efficient_frontier[0].risk, 1.23);
  }

  #[test]
  fn response_serializes_with_wire_names() {
    let response = FrontierResponse::from_frontier(&frontier(), 0.0).unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["expectedReturn"], 5.0);
    assert!(json["cvarRisk"].is_number());
    assert!(json["assetNames"].is_array());
    assert_eq!(json["efficientFrontier"][2]["return"], 15.0);
  }

  #[test]
  fn empty_frontier_is_unavailable() {
    let empty = Frontier::new(Vec::new(), Vec::new(), FrontierConfig::default());
    let err = FrontierResponse::from_frontier(&empty, 0.1).unwrap_err();
    assert!(matches!(err, FrontierError::FrontierUnavailable(_)));
    assert_eq!(ErrorResponse::from(&err).error, err.to_string());
  }
}
