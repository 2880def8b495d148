//! Chain module - node access for a single wallet
//!
//! This module provides:
//! - The [`ChainClient`] seam used by the cycle engine
//! - An ethers-backed client bound to one signing wallet
//! - A connector that hands out per-wallet clients over one shared node connection

pub mod contract;
pub mod provider;

pub use provider::NodeConnector;

use crate::error::{CyclerResult, ProviderError};
use crate::wallet::WalletCredential;

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TxHash, U256};
use std::sync::Arc;

/// Native and wrapped balance of one address at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balances {
    pub native: U256,
    pub wrapped: U256,
}

/// Fee market data as reported by the node; either field may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// EIP-1559 fee parameters attached to a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPrices {
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
}

/// Contract-call and balance-query façade over a remote node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address the client signs for
    fn address(&self) -> Address;

    /// Native asset balance
    async fn native_balance(&self, address: Address) -> Result<U256, ProviderError>;

    /// Wrapped token balance (`balanceOf`)
    async fn wrapped_balance(&self, address: Address) -> Result<U256, ProviderError>;

    /// Current fee market data
    async fn estimate_fees(&self) -> Result<FeeEstimate, ProviderError>;

    /// Send `deposit()` carrying `amount` as value; returns the pending transaction hash
    async fn submit_deposit(&self, amount: U256, gas: GasPrices) -> Result<TxHash, ProviderError>;

    /// Send `withdraw(amount)`; returns the pending transaction hash
    async fn submit_withdraw(&self, amount: U256, gas: GasPrices)
        -> Result<TxHash, ProviderError>;

    /// Wait until the transaction is mined
    async fn await_confirmation(&self, tx_hash: TxHash)
        -> Result<TransactionReceipt, ProviderError>;
}

/// Read both balances for the client's own address
pub async fn read_balances(client: &dyn ChainClient) -> Result<Balances, ProviderError> {
    let address = client.address();
    let native = client.native_balance(address).await?;
    let wrapped = client.wrapped_balance(address).await?;
    Ok(Balances { native, wrapped })
}

/// Hands out a signer-bound [`ChainClient`] per wallet
#[cfg_attr(test, mockall::automock)]
pub trait WalletConnector: Send + Sync {
    fn connect(&self, credential: &WalletCredential) -> CyclerResult<Arc<dyn ChainClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::parse_ether;

    #[tokio::test]
    async fn test_read_balances_uses_own_address() {
        let owner = Address::repeat_byte(0x11);
        let mut client = MockChainClient::new();
        client.expect_address().return_const(owner);
        client
            .expect_native_balance()
            .withf(move |a| *a == owner)
            .returning(|_| Ok(parse_ether(1).unwrap()));
        client
            .expect_wrapped_balance()
            .withf(move |a| *a == owner)
            .returning(|_| Ok(U256::zero()));

        let balances = read_balances(&client).await.unwrap();
        assert_eq!(balances.native, parse_ether(1).unwrap());
        assert_eq!(balances.wrapped, U256::zero());
    }

    #[tokio::test]
    async fn test_read_balances_propagates_provider_error() {
        let mut client = MockChainClient::new();
        client.expect_address().return_const(Address::zero());
        client
            .expect_native_balance()
            .returning(|_| Err(ProviderError::other("connection refused")));

        let err = read_balances(&client).await.unwrap_err();
        assert!(!err.is_rate_limited());
    }
}
