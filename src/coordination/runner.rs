//! Per-wallet wrap/unwrap cycle loop

use crate::chain::{read_balances, Balances, ChainClient, GasPrices};
use crate::config::RunConfig;
use crate::error::CyclerResult;
use crate::tx::{AmountPlan, AmountPlanner, GasEstimator, RetryingSubmitter, TransactionOutcome};

use ethers::types::{Address, U256};
use ethers::utils::format_ether;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Randomised pause between chain operations
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    min_ms: u64,
    max_ms: u64,
}

impl Pacer {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    /// Uniform in `[min, max]` at millisecond granularity
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }

    pub async fn pause<R: Rng>(&self, rng: &mut R) {
        let delay = self.draw(rng);
        info!("Waiting {:.1}s...", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}

/// Why a wallet's loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CyclesCompleted,
    InsufficientNative,
}

/// Completion summary for one wallet
#[derive(Debug, Clone)]
pub struct WalletSummary {
    pub wallet_index: usize,
    pub address: Address,
    pub cycles_started: u32,
    pub wraps: u32,
    pub unwraps: u32,
    pub skipped_unwraps: u32,
    pub stop_reason: StopReason,
    pub final_balances: Balances,
}

/// Drives one wallet through the configured number of wrap/unwrap cycles
pub struct WalletCycleRunner {
    client: Arc<dyn ChainClient>,
    gas: GasEstimator,
    planner: AmountPlanner,
    submitter: RetryingSubmitter,
    pacer: Pacer,
    cycles: u32,
    native_symbol: String,
    wrapped_symbol: String,
    rng: StdRng,
}

impl WalletCycleRunner {
    pub fn new(client: Arc<dyn ChainClient>, config: &RunConfig) -> Self {
        Self {
            gas: GasEstimator::new(client.clone(), config),
            planner: AmountPlanner::new(config),
            submitter: RetryingSubmitter::new(config),
            pacer: Pacer::new(config.delay_min, config.delay_max),
            cycles: config.cycles,
            native_symbol: config.native_symbol.clone(),
            wrapped_symbol: config.wrapped_symbol.clone(),
            rng: StdRng::from_entropy(),
            client,
        }
    }

    /// Run every cycle for the wallet. `wallet_index` is zero based.
    pub async fn run(&mut self, wallet_index: usize) -> CyclerResult<WalletSummary> {
        let label = format!("[Wallet #{}]", wallet_index + 1);
        let address = self.client.address();

        let mut balances = self.balances(&label).await?;
        info!(
            "{} Initial balances [{:?}]: {}",
            label,
            address,
            self.describe(&balances)
        );

        let mut summary = WalletSummary {
            wallet_index,
            address,
            cycles_started: 0,
            wraps: 0,
            unwraps: 0,
            skipped_unwraps: 0,
            stop_reason: StopReason::CyclesCompleted,
            final_balances: balances,
        };

        for cycle in 1..=self.cycles {
            info!("{} Cycle {}/{}", label, cycle, self.cycles);
            summary.cycles_started = cycle;
            let gas = self.gas.quote().await;

            balances = self.balances(&label).await?;
            let wrap_amount = match self.planner.plan_wrap_amount(&balances, &mut self.rng) {
                AmountPlan::Ready(amount) => amount,
                AmountPlan::Insufficient { available, minimum } => {
                    error!(
                        "{} Insufficient native {} for wrapping: spendable {} after {} reserve, minimum {}",
                        label,
                        self.native_symbol,
                        format_ether(available),
                        format_ether(self.planner.reserve()),
                        format_ether(minimum)
                    );
                    summary.stop_reason = StopReason::InsufficientNative;
                    break;
                }
            };

            let outcome = self.wrap(&label, wrap_amount, gas).await?;
            log_outcome(&label, "Wrap", &outcome);
            summary.wraps += 1;
            self.pacer.pause(&mut self.rng).await;

            balances = self.balances(&label).await?;
            info!("{} After wrap: {}", label, self.describe(&balances));

            let unwrap_amount = match self.planner.plan_unwrap_amount(&balances, &mut self.rng) {
                AmountPlan::Ready(amount) => amount,
                AmountPlan::Insufficient { available, minimum } => {
                    error!(
                        "{} Insufficient {} for unwrapping: have {}, minimum {}",
                        label,
                        self.wrapped_symbol,
                        format_ether(available),
                        format_ether(minimum)
                    );
                    summary.skipped_unwraps += 1;
                    continue;
                }
            };

            let outcome = self.unwrap(&label, unwrap_amount, gas).await?;
            log_outcome(&label, "Unwrap", &outcome);
            summary.unwraps += 1;
            self.pacer.pause(&mut self.rng).await;

            balances = self.balances(&label).await?;
            info!("{} After unwrap: {}", label, self.describe(&balances));
        }

        summary.final_balances = balances;
        info!(
            "{} Completed ({:?}): {} cycles, {} wraps, {} unwraps, {} unwraps skipped, stop reason {:?}",
            label,
            address,
            summary.cycles_started,
            summary.wraps,
            summary.unwraps,
            summary.skipped_unwraps,
            summary.stop_reason
        );
        Ok(summary)
    }

    async fn wrap(
        &self,
        label: &str,
        amount: U256,
        gas: GasPrices,
    ) -> CyclerResult<TransactionOutcome> {
        info!("{} Wrapping {} {}", label, format_ether(amount), self.native_symbol);
        let client: &dyn ChainClient = self.client.as_ref();
        self.submitter
            .submit_and_confirm(
                "Wrap",
                move || client.submit_deposit(amount, gas),
                move |tx_hash| client.await_confirmation(tx_hash),
            )
            .await
            .map_err(|e| {
                error!("{} Wrap failed: {}", label, e);
                e
            })
    }

    async fn unwrap(
        &self,
        label: &str,
        amount: U256,
        gas: GasPrices,
    ) -> CyclerResult<TransactionOutcome> {
        info!("{} Unwrapping {} {}", label, format_ether(amount), self.wrapped_symbol);
        let client: &dyn ChainClient = self.client.as_ref();
        self.submitter
            .submit_and_confirm(
                "Unwrap",
                move || client.submit_withdraw(amount, gas),
                move |tx_hash| client.await_confirmation(tx_hash),
            )
            .await
            .map_err(|e| {
                error!("{} Unwrap failed: {}", label, e);
                e
            })
    }

    async fn balances(&self, label: &str) -> CyclerResult<Balances> {
        read_balances(self.client.as_ref()).await.map_err(|e| {
            warn!("{} Balance check failed: {}", label, e);
            e.into()
        })
    }

    fn describe(&self, balances: &Balances) -> String {
        format!(
            "{} {}, {} {}",
            format_ether(balances.native),
            self.native_symbol,
            format_ether(balances.wrapped),
            self.wrapped_symbol
        )
    }
}

fn log_outcome(label: &str, operation: &str, outcome: &TransactionOutcome) {
    debug!(
        "{} {} {:?} (receipt {:?}) mined in block {:?}, gas used {:?}",
        label,
        operation,
        outcome.tx_hash,
        outcome.receipt_hash,
        outcome.block_number,
        outcome.gas_used
    );
}
