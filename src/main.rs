//! fertilizer-strategy - Fertilizer Strategy Optimization Engine
//!
//! Runs a scenario file through the strategy manager and prints the result
//! as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Optimize, then sweep prices and run 2000 Monte Carlo samples
//! fertilizer-strategy optimize --scenario data/scenarios/corn_np.toml --sweep --monte-carlo 2000
//!
//! # Check a config file without running anything
//! fertilizer-strategy validate-config --config strategy_config.toml
//! ```
//!
//! # Environment Variables
//!
//! - `FERTILIZER_STRATEGY_CONFIG`: Path to the strategy config TOML
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fertilizer_strategy::analysis::{MonteCarloSummary, PriceShock};
use fertilizer_strategy::config::{self, MonteCarloConfig, StrategyConfig, CONFIG_ENV_VAR};
use fertilizer_strategy::scenario::ScenarioFile;
use fertilizer_strategy::storage::open_store;
use fertilizer_strategy::{ManagerSettings, ScenarioDelta, ScenarioOutcome, StrategyRecord};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fertilizer-strategy")]
#[command(about = "Fertilizer Strategy Optimization Engine")]
#[command(version)]
struct CliArgs {
    /// Strategy config TOML (overrides the default search order)
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Optimize the request in a scenario file
    Optimize {
        /// Scenario TOML holding curves, snapshots and the request
        #[arg(long)]
        scenario: PathBuf,
        /// Reprice the plan under every snapshot and a standard shock grid
        #[arg(long)]
        sweep: bool,
        /// Run a seeded Monte Carlo with this many samples
        #[arg(long, value_name = "N")]
        monte_carlo: Option<usize>,
    },

    /// Parse and validate a strategy config, then print it
    ValidateConfig,
}

// ============================================================================
// Report
// ============================================================================

#[derive(Serialize)]
struct OptimizeReport {
    strategy: StrategyRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    scenarios: Vec<ScenarioDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_sweep: Option<Vec<ScenarioOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shock_sweep: Option<Vec<ScenarioOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    monte_carlo: Option<MonteCarloSummary>,
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<StrategyConfig> {
    match path {
        Some(p) => StrategyConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(StrategyConfig::load()),
    }
}

async fn run_optimize(
    config: StrategyConfig,
    scenario_path: &Path,
    sweep: bool,
    monte_carlo: Option<usize>,
) -> Result<()> {
    let scenario = ScenarioFile::load(scenario_path)
        .with_context(|| format!("Failed to load scenario {}", scenario_path.display()))?;
    let store = open_store(&config.storage).context("Failed to open strategy store")?;
    let (manager, request, compare) = scenario
        .into_manager(store, ManagerSettings::current())
        .context("Failed to publish scenario snapshots")?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, cancelling optimization");
        shutdown_token.cancel();
    });

    let manager = std::sync::Arc::new(manager);
    let m = std::sync::Arc::clone(&manager);
    let req = request.clone();
    let record = tokio::task::spawn_blocking(move || m.optimize_cancellable(&req, Some(&cancel_token)))
        .await
        .context("Optimization task panicked")?
        .with_context(|| format!("Optimization failed for field {}", request.field_id))?;

    let mut scenarios = Vec::with_capacity(compare.len());
    for snapshot_id in &compare {
        scenarios.push(
            manager
                .scenario_delta(&record.strategy_id, snapshot_id)
                .with_context(|| format!("Scenario comparison against {snapshot_id} failed"))?,
        );
    }

    let (snapshot_sweep, shock_sweep) = if sweep {
        let ids = manager.prices().snapshot_ids();
        (
            Some(manager.reprice(&record.strategy_id, &ids)?),
            Some(manager.shock_sweep(&record.strategy_id, &PriceShock::standard_grid())?),
        )
    } else {
        (None, None)
    };

    let monte_carlo = match monte_carlo {
        Some(samples) => {
            let mc = MonteCarloConfig {
                samples,
                ..config.monte_carlo.clone()
            };
            Some(manager.monte_carlo(&record.strategy_id, &mc)?)
        }
        None => None,
    };

    let report = OptimizeReport {
        strategy: record,
        scenarios,
        snapshot_sweep,
        shock_sweep,
        monte_carlo,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_validate_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    info!(
        explicit = path.is_some(),
        storage = ?config.storage.backend,
        "Strategy config is valid"
    );
    print!("{}", config.to_toml()?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    match args.command {
        SubCommand::Optimize {
            scenario,
            sweep,
            monte_carlo,
        } => {
            let config = load_config(args.config.as_deref())?;
            config::init(config.clone());
            run_optimize(config, &scenario, sweep, monte_carlo).await
        }
        SubCommand::ValidateConfig => run_validate_config(args.config.as_deref()),
    }
}
