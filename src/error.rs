//! Error types for the wrap cycler

use ethers::providers::{JsonRpcError, MiddlewareError, RpcError};
use thiserror::Error;

/// JSON-RPC error code the node returns when it rejects a request for rate limiting
pub const RATE_LIMIT_CODE: i64 = -32017;

/// Failure reported by the remote node, classified by its JSON-RPC code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code:?})")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error without a JSON-RPC code (transport failures, dropped transactions, ...)
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    #[cfg(test)]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(Some(RATE_LIMIT_CODE), message)
    }

    /// Only rate limit rejections are eligible for retry
    pub fn is_rate_limited(&self) -> bool {
        self.code == Some(RATE_LIMIT_CODE)
    }

    /// Classify an ethers provider error
    pub fn from_rpc<E: RpcError>(err: &E) -> Self {
        Self::classify(err.as_error_response(), err.to_string())
    }

    /// Classify an error raised by a middleware stack (signer, nonce manager, ...)
    pub fn from_middleware<E: MiddlewareError>(err: &E) -> Self {
        Self::classify(err.as_error_response(), err.to_string())
    }

    fn classify(response: Option<&JsonRpcError>, message: String) -> Self {
        Self::new(response.map(|r| r.code), message)
    }
}

impl From<ethers::providers::ProviderError> for ProviderError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        Self::from_rpc(&err)
    }
}

/// Main error type for the cycler
#[derive(Error, Debug)]
pub enum CyclerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Max retries ({max_retries}) exceeded for rate limit error")]
    RetryExhausted { max_retries: u32 },

    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Contract error: {0}")]
    Contract(String),
}

/// Result type for cycler operations
pub type CyclerResult<T> = Result<T, CyclerError>;
