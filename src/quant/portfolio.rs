//! # Portfolio
//!
//! $$
//! \operatorname{CVaR}_\alpha(\mathbf{w}) = -\mathbb E\left[\mathbf{w}^\top R \mid \mathbf{w}^\top R \le \operatorname{VaR}_\alpha\right]
//! $$
//!
//! Mean-CVaR efficient frontier: return statistics, tail-risk evaluation,
//! constrained optimization, frontier construction and querying.

pub mod api;
pub mod data;
pub mod engine;
pub mod frontier;
pub mod optimizers;
pub mod provider;
pub mod risk;
pub mod solver;
pub mod types;

pub use api::ErrorResponse;
pub use api::FrontierCurvePoint;
pub use api::FrontierRequest;
pub use api::FrontierResponse;
pub use data::PriceSeries;
pub use data::ReturnDefinition;
pub use data::ReturnSeries;
pub use data::ReturnStatistics;
pub use data::portfolio_return;
pub use data::portfolio_volatility;
pub use engine::FrontierSession;
pub use engine::SessionState;
pub use frontier::CancellationToken;
pub use frontier::Frontier;
pub use frontier::FrontierConfig;
pub use frontier::build_frontier;
pub use frontier::target_return_grid;
pub use optimizers::optimize_min_cvar;
pub use provider::PriceHistoryProvider;
pub use provider::SyntheticGbmProvider;
pub use risk::ILL_CONDITIONED_RISK;
pub use risk::MonteCarloConfig;
pub use risk::RiskEvaluator;
pub use risk::ScenarioSet;
pub use risk::TailRisk;
pub use risk::historical_cvar;
pub use risk::monte_carlo_tail_risk;
pub use risk::tail_risk;
pub use solver::Bounds;
pub use solver::ConstraintKind;
pub use solver::LinearConstraint;
pub use solver::Minimization;
pub use solver::SolverOptions;
pub use solver::minimize_constrained;
pub use types::FrontierPoint;
pub use types::OptimizationOutcome;
pub use types::RiskMethod;
pub use types::TRADING_DAYS_PER_YEAR;
