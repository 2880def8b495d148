//! Transaction submission with rate-limit aware confirmation retries

use crate::config::RunConfig;
use crate::error::{CyclerError, CyclerResult, ProviderError};

use ethers::types::{TransactionReceipt, TxHash, U64};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub tx_hash: TxHash,
    /// Hash carried by the confirmed receipt
    pub receipt_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: Option<ethers::types::U256>,
}

/// Submits once, then waits for the receipt with exponential backoff on rate limits
#[derive(Debug, Clone)]
pub struct RetryingSubmitter {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryingSubmitter {
    pub fn new(config: &RunConfig) -> Self {
        Self::with_policy(config.max_retries, config.retry_delay)
    }

    pub fn with_policy(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Submit a transaction and wait for its receipt.
    ///
    /// `submit` is invoked exactly once; only the confirmation wait is retried,
    /// and only when the node rejects it with the rate limit code.
    pub async fn submit_and_confirm<S, SFut, C, CFut>(
        &self,
        operation: &str,
        submit: S,
        mut confirm: C,
    ) -> CyclerResult<TransactionOutcome>
    where
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<TxHash, ProviderError>>,
        C: FnMut(TxHash) -> CFut,
        CFut: Future<Output = Result<TransactionReceipt, ProviderError>>,
    {
        let tx_hash = submit().await?;
        info!("{} submitted, tx hash: {:?}", operation, tx_hash);

        let receipt = self.confirm_with_retry(operation, tx_hash, &mut confirm).await?;

        if receipt.status == Some(U64::zero()) {
            return Err(CyclerError::Reverted {
                tx_hash: format!("{:?}", tx_hash),
            });
        }

        info!("{} confirmed: {:?}", operation, receipt.transaction_hash);
        Ok(TransactionOutcome {
            tx_hash,
            receipt_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            gas_used: receipt.gas_used,
        })
    }

    async fn confirm_with_retry<C, CFut>(
        &self,
        operation: &str,
        tx_hash: TxHash,
        confirm: &mut C,
    ) -> CyclerResult<TransactionReceipt>
    where
        C: FnMut(TxHash) -> CFut,
        CFut: Future<Output = Result<TransactionReceipt, ProviderError>>,
    {
        let mut delay = self.retry_delay;

        for attempt in 1..=self.max_retries {
            debug!(
                "Waiting for {} confirmation (attempt {}/{})",
                operation, attempt, self.max_retries
            );

            match confirm(tx_hash).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_rate_limited() => {
                    if attempt == self.max_retries {
                        break;
                    }
                    warn!(
                        "Rate limit exceeded, retrying ({}/{}) after {}ms...",
                        attempt,
                        self.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "{} confirmation still rate limited after {} attempts",
            operation, self.max_retries
        );
        Err(CyclerError::RetryExhausted {
            max_retries: self.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    fn receipt(status: u64) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: TxHash::repeat_byte(0xab),
            block_number: Some(U64::from(42u64)),
            status: Some(U64::from(status)),
            ..Default::default()
        }
    }

    /// Fails `failures` times with `error`, then returns a successful receipt
    fn flaky(
        failures: u32,
        error: ProviderError,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut(TxHash) -> std::future::Ready<Result<TransactionReceipt, ProviderError>> {
        move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                std::future::ready(Err(error.clone()))
            } else {
                std::future::ready(Ok(receipt(1)))
            }
        }
    }

    fn submit_ok() -> std::future::Ready<Result<TxHash, ProviderError>> {
        std::future::ready(Ok(TxHash::repeat_byte(0xab)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_without_retry() {
        let submitter = RetryingSubmitter::with_policy(5, Duration::from_millis(100));
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let outcome = assert_ok!(
            submitter
                .submit_and_confirm(
                    "Wrap",
                    submit_ok,
                    flaky(0, ProviderError::rate_limited("limit"), calls.clone())
                )
                .await
        );

        assert_eq!(outcome.tx_hash, TxHash::repeat_byte(0xab));
        assert_eq!(outcome.receipt_hash, TxHash::repeat_byte(0xab));
        assert_eq!(outcome.block_number, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_with_doubling_delay() {
        let submitter = RetryingSubmitter::with_policy(5, Duration::from_millis(100));
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        assert_ok!(
            submitter
                .submit_and_confirm(
                    "Wrap",
                    submit_ok,
                    flaky(3, ProviderError::rate_limited("limit"), calls.clone())
                )
                .await
        );

        // 3 retries: 100 + 200 + 400
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_retry_waits_twice_as_long() {
        let submitter = RetryingSubmitter::with_policy(5, Duration::from_millis(100));
        let attempts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = attempts.clone();

        assert_ok!(
            submitter
                .submit_and_confirm("Wrap", submit_ok, move |_| {
                    let mut seen = seen.lock().unwrap();
                    seen.push(Instant::now());
                    if seen.len() <= 3 {
                        std::future::ready(Err(ProviderError::rate_limited("limit")))
                    } else {
                        std::future::ready(Ok(receipt(1)))
                    }
                })
                .await
        );

        let attempts = attempts.lock().unwrap();
        let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_after_max_attempts() {
        let submitter = RetryingSubmitter::with_policy(3, Duration::from_millis(100));
        let calls = Arc::new(AtomicU32::new(0));

        let err = assert_err!(
            submitter
                .submit_and_confirm(
                    "Unwrap",
                    submit_ok,
                    flaky(3, ProviderError::rate_limited("limit"), calls.clone())
                )
                .await
        );

        assert!(matches!(err, CyclerError::RetryExhausted { max_retries: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_provider_error_propagates_immediately() {
        let submitter = RetryingSubmitter::with_policy(5, Duration::from_millis(100));
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let err = assert_err!(
            submitter
                .submit_and_confirm(
                    "Wrap",
                    submit_ok,
                    flaky(1, ProviderError::new(Some(-32000), "execution reverted"), calls.clone())
                )
                .await
        );

        assert!(matches!(err, CyclerError::Provider(ref e) if e.code == Some(-32000)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_submission_failure_is_not_retried() {
        let submitter = RetryingSubmitter::with_policy(5, Duration::from_millis(100));
        let calls = Arc::new(AtomicU32::new(0));

        let err = assert_err!(
            submitter
                .submit_and_confirm(
                    "Wrap",
                    || std::future::ready(Err(ProviderError::rate_limited("limit"))),
                    flaky(0, ProviderError::other("unused"), calls.clone())
                )
                .await
        );

        assert!(matches!(err, CyclerError::Provider(ref e) if e.is_rate_limited()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_error() {
        let submitter = RetryingSubmitter::with_policy(5, Duration::from_millis(100));

        let err = assert_err!(
            submitter
                .submit_and_confirm("Unwrap", submit_ok, |_| std::future::ready(Ok(receipt(0))))
                .await
        );

        assert!(matches!(err, CyclerError::Reverted { .. }));
    }
}
