//! Relay error taxonomy
//!
//! Most code paths return `eyre::Result`; these variants are attached where
//! callers need to branch on the kind of failure (nonce conflicts trigger a
//! resync, configuration errors abort startup, and so on).

use thiserror::Error;

use crate::types::{ChainId, MessageKey};

#[derive(Debug, Error)]
pub enum RelayError {
    /// RPC or connection failure; retried with backoff
    #[error("transport error on chain {chain_id}: {reason}")]
    Transport { chain_id: ChainId, reason: String },

    /// Submission rejected because of a stale or future nonce
    #[error("nonce conflict on chain {chain_id}: {reason}")]
    NonceConflict { chain_id: ChainId, reason: String },

    /// No inclusion proof exists (yet) for the message's block
    #[error("proof unavailable for message {0}")]
    ProofUnavailable(MessageKey),

    /// Transaction mined but reverted
    #[error("transaction reverted on chain {chain_id}: {tx_hash}")]
    Reverted { chain_id: ChainId, tx_hash: String },

    /// Fatal configuration problem; the relay refuses to start
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported chain id {0}")]
    UnsupportedChain(ChainId),

    #[error("transaction {tx_id} exhausted {retries} retries")]
    RetriesExhausted { tx_id: u64, retries: u32 },

    #[error("unknown transaction id {0}")]
    UnknownTransaction(u64),

    #[error("transaction {tx_id} is {status}, cannot {action}")]
    InvalidState {
        tx_id: u64,
        status: String,
        action: &'static str,
    },

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl RelayError {
    /// Whether the error should trigger a nonce resync before retrying
    pub fn is_nonce_conflict(&self) -> bool {
        matches!(self, RelayError::NonceConflict { .. })
    }
}
