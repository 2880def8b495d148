//! Sequential multi-wallet orchestration with per-wallet failure isolation

use super::runner::{WalletCycleRunner, WalletSummary};
use crate::chain::WalletConnector;
use crate::config::RunConfig;
use crate::error::CyclerResult;
use crate::wallet::WalletCredential;

use tracing::{error, info};

/// Outcome of a fleet run
#[derive(Debug, Default)]
pub struct FleetReport {
    /// Wallets whose loop ran to completion or stopped on insufficient balance
    pub completed: Vec<WalletSummary>,
    /// Zero-based indexes of wallets whose run raised an error
    pub failed: Vec<usize>,
}

impl FleetReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Runs every wallet in order; one wallet's failure never aborts the others
pub struct FleetOrchestrator<C: WalletConnector> {
    connector: C,
    config: RunConfig,
}

impl<C: WalletConnector> FleetOrchestrator<C> {
    pub fn new(connector: C, config: RunConfig) -> Self {
        Self { connector, config }
    }

    pub async fn run(&self, credentials: &[WalletCredential]) -> FleetReport {
        info!(
            "Starting wrap/unwrap cycles for {} wallets on chain {}",
            credentials.len(),
            self.config.chain_id
        );

        let mut report = FleetReport::default();
        for (index, credential) in credentials.iter().enumerate() {
            info!("======= Starting for Wallet #{} =======", index + 1);
            match self.run_wallet(index, credential).await {
                Ok(summary) => {
                    info!(
                        "======= Completed for Wallet #{} ({:?}) =======",
                        index + 1,
                        summary.address
                    );
                    report.completed.push(summary);
                }
                Err(e) => {
                    error!("Wallet #{} ({:?}) failed: {}", index + 1, credential.address(), e);
                    report.failed.push(index);
                }
            }
        }

        info!(
            "Run completed for all wallets: {} completed, {} failed",
            report.completed.len(),
            report.failed.len()
        );
        report
    }

    async fn run_wallet(
        &self,
        index: usize,
        credential: &WalletCredential,
    ) -> CyclerResult<WalletSummary> {
        let client = self.connector.connect(credential)?;
        WalletCycleRunner::new(client, &self.config).run(index).await
    }
}
