//! Cycle orchestration
//!
//! The orchestration layer:
//! 1. Walks the configured wallets strictly in order
//! 2. Runs each wallet through its wrap/unwrap cycles
//! 3. Contains a failing wallet so the rest of the fleet still runs

pub mod fleet;
pub mod runner;

pub use fleet::FleetOrchestrator;
