//! Ethers-backed chain client bound to a single signing wallet

use super::contract;
use super::{ChainClient, FeeEstimate, GasPrices, WalletConnector};
use crate::config::RunConfig;
use crate::error::{CyclerError, CyclerResult, ProviderError};
use crate::wallet::WalletCredential;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::prelude::*;
use ethers::providers::{Http, JsonRpcClient, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Consecutive polls in which the node knows neither the receipt nor the
/// transaction before it is reported as dropped
const DROPPED_AFTER_MISSES: u32 = 10;

/// Shared node connection that hands out per-wallet clients
pub struct NodeConnector {
    provider: Provider<Http>,
    contract_address: Address,
    gas_limit: U256,
    confirmation_poll: Duration,
}

impl NodeConnector {
    /// Connect to the configured node
    pub fn new(config: &RunConfig) -> CyclerResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| CyclerError::Config(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?
            .interval(config.confirmation_poll);

        info!(
            "Using node {} (chain {}) with contract {:?}",
            config.rpc_url, config.chain_id, config.contract_address
        );

        Ok(Self {
            provider,
            contract_address: config.contract_address,
            gas_limit: config.gas_limit,
            confirmation_poll: config.confirmation_poll,
        })
    }
}

impl WalletConnector for NodeConnector {
    fn connect(&self, credential: &WalletCredential) -> CyclerResult<Arc<dyn ChainClient>> {
        Ok(Arc::new(EthersChainClient::new(
            self.provider.clone(),
            credential.signer().clone(),
            self.contract_address,
            self.gas_limit,
            self.confirmation_poll,
        )))
    }
}

/// [`ChainClient`] over HTTP JSON-RPC, signing with one local wallet
pub struct EthersChainClient<P: JsonRpcClient = Http> {
    client: SignerMiddleware<Provider<P>, LocalWallet>,
    contract_address: Address,
    gas_limit: U256,
    confirmation_poll: Duration,
}

impl<P: JsonRpcClient + 'static> EthersChainClient<P> {
    pub fn new(
        provider: Provider<P>,
        signer: LocalWallet,
        contract_address: Address,
        gas_limit: U256,
        confirmation_poll: Duration,
    ) -> Self {
        Self {
            client: SignerMiddleware::new(provider, signer),
            contract_address,
            gas_limit,
            confirmation_poll,
        }
    }

    fn provider(&self) -> &Provider<P> {
        self.client.inner()
    }

    /// Build an EIP-1559 call to the wrapped asset contract
    fn build_tx(&self, data: Bytes, value: U256, gas: GasPrices) -> TypedTransaction {
        Eip1559TransactionRequest::new()
            .from(self.client.address())
            .to(self.contract_address)
            .data(data)
            .value(value)
            .gas(self.gas_limit)
            .max_fee_per_gas(gas.max_fee_per_gas)
            .max_priority_fee_per_gas(gas.max_priority_fee_per_gas)
            .into()
    }

    async fn send(&self, tx: TypedTransaction) -> Result<TxHash, ProviderError> {
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| ProviderError::from_middleware(&e))?;
        Ok(pending.tx_hash())
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> ChainClient for EthersChainClient<P> {
    fn address(&self) -> Address {
        self.client.address()
    }

    async fn native_balance(&self, address: Address) -> Result<U256, ProviderError> {
        Ok(self.provider().get_balance(address, None).await?)
    }

    async fn wrapped_balance(&self, address: Address) -> Result<U256, ProviderError> {
        let call: TypedTransaction = TransactionRequest::new()
            .to(self.contract_address)
            .data(contract::balance_of_calldata(address))
            .into();

        let output = self.provider().call(&call, None).await?;
        contract::decode_balance(&output).map_err(|e| ProviderError::other(e.to_string()))
    }

    async fn estimate_fees(&self) -> Result<FeeEstimate, ProviderError> {
        let block = self
            .provider()
            .get_block(BlockNumber::Latest)
            .await?
            .ok_or_else(|| ProviderError::other("No latest block"))?;

        // Pre-London nodes expose no fee market
        if block.base_fee_per_gas.is_none() {
            debug!("Latest block has no base fee; fee market data unavailable");
            return Ok(FeeEstimate::default());
        }

        let (max_fee, priority_fee) = self.provider().estimate_eip1559_fees(None).await?;
        Ok(FeeEstimate {
            max_fee_per_gas: Some(max_fee),
            max_priority_fee_per_gas: Some(priority_fee),
        })
    }

    async fn submit_deposit(&self, amount: U256, gas: GasPrices) -> Result<TxHash, ProviderError> {
        let tx = self.build_tx(contract::deposit_calldata(), amount, gas);
        self.send(tx).await
    }

    async fn submit_withdraw(
        &self,
        amount: U256,
        gas: GasPrices,
    ) -> Result<TxHash, ProviderError> {
        let tx = self.build_tx(contract::withdraw_calldata(amount), U256::zero(), gas);
        self.send(tx).await
    }

    /// Poll for the receipt until the transaction is mined.
    ///
    /// Node errors are returned on the spot, so rate limits reach the
    /// submitter's backoff instead of being absorbed by the poll loop.
    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> Result<TransactionReceipt, ProviderError> {
        let mut misses = 0;

        loop {
            match self.provider().get_transaction_receipt(tx_hash).await? {
                Some(receipt) if receipt.block_number.is_some() => return Ok(receipt),
                Some(_) => misses = 0,
                None => {
                    if self.provider().get_transaction(tx_hash).await?.is_some() {
                        misses = 0;
                    } else {
                        misses += 1;
                        if misses >= DROPPED_AFTER_MISSES {
                            return Err(ProviderError::other(format!(
                                "Transaction {:?} dropped from mempool",
                                tx_hash
                            )));
                        }
                    }
                }
            }

            debug!("Transaction {:?} not mined yet", tx_hash);
            tokio::time::sleep(self.confirmation_poll).await;
        }
    }
}
