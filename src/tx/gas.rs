//! Fee quoting with fallback to the configured ceilings

use crate::chain::{ChainClient, FeeEstimate, GasPrices};
use crate::config::RunConfig;

use ethers::types::U256;
use ethers::utils::format_units;
use std::sync::Arc;
use tracing::{debug, warn};

/// Gas estimator for wrap/unwrap transactions
pub struct GasEstimator {
    client: Arc<dyn ChainClient>,
    /// Upper bounds, also used whenever the node has no fee market data
    ceiling: GasPrices,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(client: Arc<dyn ChainClient>, config: &RunConfig) -> Self {
        Self {
            client,
            ceiling: GasPrices {
                max_priority_fee_per_gas: config.max_priority_fee_per_gas,
                max_fee_per_gas: config.max_fee_per_gas,
            },
        }
    }

    /// Quote fees for the next transaction. Never fails.
    pub async fn quote(&self) -> GasPrices {
        match self.client.estimate_fees().await {
            Ok(estimate) => {
                let quote = self.bounded(estimate);
                debug!("Gas quote: {:?}", quote);
                quote
            }
            Err(e) => {
                warn!("Failed to fetch dynamic gas prices, using defaults: {}", e);
                self.ceiling
            }
        }
    }

    /// Fill missing fields from the ceilings and clamp the rest to them
    fn bounded(&self, estimate: FeeEstimate) -> GasPrices {
        let max_fee = estimate
            .max_fee_per_gas
            .map_or(self.ceiling.max_fee_per_gas, |fee| {
                capped("max fee", fee, self.ceiling.max_fee_per_gas)
            });
        let priority_fee = estimate
            .max_priority_fee_per_gas
            .map_or(self.ceiling.max_priority_fee_per_gas, |fee| {
                capped("priority fee", fee, self.ceiling.max_priority_fee_per_gas)
            });

        GasPrices {
            max_priority_fee_per_gas: std::cmp::min(priority_fee, max_fee),
            max_fee_per_gas: max_fee,
        }
    }

    /// Worst-case fee for `gas_limit` at the configured ceiling
    pub fn reserve_for(gas_limit: U256, ceiling: U256) -> U256 {
        gas_limit.saturating_mul(ceiling)
    }
}

/// Lower a live fee to its ceiling, saying so when it bites
fn capped(name: &str, live: U256, ceiling: U256) -> U256 {
    if live > ceiling {
        warn!(
            "Node suggests {} of {} gwei, capping at configured {} gwei; transaction may be slow to mine",
            name,
            format_units(live, "gwei").unwrap_or_else(|_| live.to_string()),
            format_units(ceiling, "gwei").unwrap_or_else(|_| ceiling.to_string())
        );
        ceiling
    } else {
        live
    }
}
