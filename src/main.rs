//! Wrap Cycler - multi-wallet wrap/unwrap cycles for a wrapped native asset
//!
//! Each configured wallet repeatedly wraps a random amount of the chain's native
//! asset into its ERC-20 form and unwraps it again, with paced, rate-limit aware
//! transaction submission. Wallets run one after another.

use anyhow::{Context, Result};
use tracing::info;

mod chain;
mod config;
mod coordination;
mod error;
mod tx;
mod wallet;

use chain::NodeConnector;
use config::{RunConfig, Settings};
use coordination::FleetOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Wrap Cycler v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let run_config = RunConfig::try_from(&settings)?;
    info!(
        "Loaded configuration: {} cycles per wallet, amounts {}-{} {}",
        run_config.cycles,
        settings.cycle.min_amount,
        settings.cycle.max_amount,
        run_config.native_symbol
    );

    wallet::setup_env_interactive(std::path::Path::new(wallet::ENV_FILE))
        .context("Wallet setup failed")?;
    let credentials =
        wallet::load_credentials(run_config.chain_id).context("Failed to load wallets")?;

    let connector = NodeConnector::new(&run_config)?;
    let fleet = FleetOrchestrator::new(connector, run_config);

    // Wallet failures are contained inside the fleet run; only errors above
    // this point end the process with a failure status
    let report = fleet.run(&credentials).await;

    for summary in &report.completed {
        info!(
            "Wallet #{} ({:?}): {} wraps, {} unwraps, {} skipped, stopped on {:?}, final {} native / {} wrapped",
            summary.wallet_index + 1,
            summary.address,
            summary.wraps,
            summary.unwraps,
            summary.skipped_unwraps,
            summary.stop_reason,
            ethers::utils::format_ether(summary.final_balances.native),
            ethers::utils::format_ether(summary.final_balances.wrapped)
        );
    }
    info!(
        "Wrap Cycler finished: {}/{} wallets completed",
        report.completed.len(),
        report.total()
    );
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wrap_cycler=debug,hyper=warn"));

    let json = std::env::var("WRAP_CYCLER_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
