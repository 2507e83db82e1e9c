//! Chain access seams
//!
//! The relay core talks to chains only through these traits:
//!
//! - `SourceChain` - block tip, historical log ranges and live subscriptions
//! - `DestinationChain` - message status, nonce, fees, submission, receipts
//! - `StateRootOracle` - whether a source block's message root is finalized
//!
//! `evm` holds the alloy-backed implementations; `crate::testing` holds
//! in-memory doubles.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use eyre::Result;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::types::{ChainId, EventRecord, ExecutionCall, FeeBid, MessageKey, MessageStatus};

pub mod evm;
pub mod rpc;

pub use evm::{EvmDestinationChain, EvmSourceChain, EvmStateOracle};

/// Read side of a chain's bridge contract
#[async_trait]
pub trait SourceChain: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// Current chain tip
    async fn block_number(&self) -> Result<u64>;

    /// All bridge events in `[from_block, to_block]`, in log order
    async fn events_in_range(&self, from_block: u64, to_block: u64) -> Result<Vec<EventRecord>>;

    /// Open a push subscription to bridge events.
    ///
    /// Returns `Ok(None)` when the chain has no push transport configured.
    /// The receiver closing means the subscription dropped.
    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<EventRecord>>>;
}

/// A signed transaction ready for submission
#[derive(Debug, Clone)]
pub struct TxRequest {
    pub call: ExecutionCall,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fees: FeeBid,
}

/// Write side of a chain's bridge contract, bound to one signing identity
#[async_trait]
pub trait DestinationChain: Send + Sync {
    fn chain_id(&self) -> ChainId;

    fn signer_address(&self) -> Address;

    /// Execution status of a message on this chain's bridge
    async fn message_status(&self, key: MessageKey) -> Result<MessageStatus>;

    /// Next nonce for the signer, counting pending transactions
    async fn transaction_count(&self) -> Result<u64>;

    /// Current network fee data, before any relay multiplier
    async fn fee_estimate(&self) -> Result<FeeBid>;

    /// Sign and broadcast; returns the transaction hash
    async fn send_transaction(&self, request: TxRequest) -> Result<B256>;

    /// Wait for a receipt. `Ok(None)` if none arrived within `timeout`,
    /// otherwise `Ok(Some(success))`.
    async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration) -> Result<Option<bool>>;

    /// Native balance of the signer
    async fn balance(&self) -> Result<U256>;
}

/// Finalized state roots per source chain and block
#[async_trait]
pub trait StateRootOracle: Send + Sync {
    async fn is_finalized(&self, chain_id: ChainId, block_number: u64) -> Result<bool>;

    /// Root recorded for a source block; `None` when nothing is recorded
    async fn state_root(&self, chain_id: ChainId, block_number: u64) -> Result<Option<B256>>;
}
