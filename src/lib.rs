//! Cross-chain message relay
//!
//! Watches bridge contracts on every configured chain, proves each emitted
//! message against its source block's Merkle root, and executes it on the
//! destination chain with a managed nonce and fee policy.

pub mod api;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod dispatcher;
pub mod error;
pub mod hash;
pub mod listener;
pub mod metrics;
pub mod nonce;
pub mod orchestrator;
pub mod proof;
pub mod testing;
pub mod types;

pub use config::Config;
pub use error::RelayError;
pub use orchestrator::RelayOrchestrator;
