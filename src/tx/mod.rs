//! Transaction planning and submission: fee quotes, amounts, confirmation retries

mod amount;
mod gas;
mod sender;

pub use amount::{AmountPlan, AmountPlanner};
pub use gas::GasEstimator;
pub use sender::{RetryingSubmitter, TransactionOutcome};
