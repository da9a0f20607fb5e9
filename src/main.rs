use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap::ValueEnum;
use cvar_frontier::quant::portfolio::FrontierConfig;
use cvar_frontier::quant::portfolio::FrontierRequest;
use cvar_frontier::quant::portfolio::FrontierResponse;
use cvar_frontier::quant::portfolio::FrontierSession;
use cvar_frontier::quant::portfolio::ReturnDefinition;
use cvar_frontier::quant::portfolio::RiskMethod;
use cvar_frontier::quant::portfolio::SyntheticGbmProvider;
use prettytable::row;
use prettytable::Table;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
  Table,
  Json,
}

#[derive(Parser, Debug)]
#[command(name = "cvar-frontier")]
#[command(about = "Mean-CVaR efficient frontier over a synthetic four-asset universe")]
struct Cli {
  /// JSON file with frontier settings
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Desired annual return as a fraction
  #[arg(long, default_value_t = 0.10, allow_hyphen_values = true)]
  target_return: f64,

  /// Number of target returns on the frontier grid
  #[arg(long)]
  points: Option<usize>,

  /// CVaR confidence level in (0, 1)
  #[arg(long)]
  confidence: Option<f64>,

  /// Monte Carlo path count
  #[arg(long)]
  simulations: Option<usize>,

  /// Risk estimator
  #[arg(long, value_enum)]
  method: Option<RiskMethod>,

  /// Trading days per Monte Carlo path
  #[arg(long)]
  horizon_days: Option<usize>,

  /// Seed for Monte Carlo draws
  #[arg(long)]
  seed: Option<u64>,

  /// Seed for the synthetic price history
  #[arg(long, default_value_t = 42)]
  data_seed: u64,

  /// Worker threads for the frontier sweep
  #[arg(long)]
  workers: Option<usize>,

  /// Estimate statistics from log returns instead of simple returns
  #[arg(long)]
  log_returns: bool,

  #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
  format: OutputFormat,
}

fn load_config(cli: &Cli) -> anyhow::Result<FrontierConfig> {
  let mut config = match &cli.config {
    Some(path) => {
      let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
      serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?
    }
    None => FrontierConfig::default(),
  };

  if let Some(method) = cli.method {
    config.method = method;
  }
  if let Some(horizon_days) = cli.horizon_days {
    config.monte_carlo.horizon_days = horizon_days;
  }
  if cli.seed.is_some() {
    config.monte_carlo.seed = cli.seed;
  }
  if cli.workers.is_some() {
    config.workers = cli.workers;
  }
  Ok(config)
}

fn print_table(response: &FrontierResponse) {
  let mut summary = Table::new();
  summary.add_row(row!["Expected return (%)", response.expected_return]);
  summary.add_row(row!["CVaR (%)", response.cvar_risk]);
  summary.printstd();

  let mut weights = Table::new();
  weights.add_row(row!["Asset", "Weight (%)"]);
  for name in &response.asset_names {
    let weight = response.weights.get(name).copied().unwrap_or_default();
    weights.add_row(row![name, weight]);
  }
  weights.printstd();

  let mut curve = Table::new();
  curve.add_row(row!["Return (%)", "CVaR (%)"]);
  for point in &response.efficient_frontier {
    curve.add_row(row![point.expected_return, point.risk]);
  }
  curve.printstd();
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();

  let request = FrontierRequest {
    target_return: cli.target_return,
    points: cli.points,
    confidence: cli.confidence,
    simulations: cli.simulations,
  };
  request.validate()?;
  let config = request.resolve(&load_config(&cli)?);

  let definition = if cli.log_returns {
    ReturnDefinition::Log
  } else {
    ReturnDefinition::Simple
  };
  let provider = SyntheticGbmProvider {
    seed: cli.data_seed,
    ..SyntheticGbmProvider::default()
  };

  let session = FrontierSession::from_provider(&provider, definition, config)
    .context("loading price history")?;
  session.initialize().context("building efficient frontier")?;
  let response = session.handle(&request)?;

  match cli.format {
    OutputFormat::Table => print_table(&response),
    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
  }

  Ok(())
}
