//! # cvar-frontier
//!
//! $$
//! \min_{\mathbf{w}\ge 0,\ \mathbf{1}^\top\mathbf{w}=1}\ \operatorname{CVaR}_\alpha(\mathbf{w})
//! \quad\text{s.t.}\quad \mu^\top\mathbf{w}\ge r^\*
//! $$
//!
//! Long-only Mean-CVaR efficient frontiers with historical and Monte Carlo
//! tail-risk estimation.

pub mod error;
pub mod quant;

pub use error::FrontierError;
pub use error::Result;
