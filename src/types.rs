//! Common types for the relay pipeline
//!
//! Messages, raw event observations, proofs and the transaction records
//! owned by the dispatchers.

use alloy::primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::compute_message_hash;

/// Native chain identifier (EVM chain id)
pub type ChainId = u64;

// ============================================================================
// Messages
// ============================================================================

/// Unique identity of a message across the relay: `(sourceChainId, nonce)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub source_chain_id: ChainId,
    pub nonce: u64,
}

impl MessageKey {
    pub fn new(source_chain_id: ChainId, nonce: u64) -> Self {
        Self {
            source_chain_id,
            nonce,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.source_chain_id, self.nonce)
    }
}

/// An outbound bridge message observed on a source chain.
///
/// Immutable once built; `message_hash` is the content hash over every other
/// field and doubles as the Merkle leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub nonce: u64,
    pub source_chain_id: ChainId,
    pub dest_chain_id: ChainId,
    pub sender: Address,
    pub target: Address,
    pub payload: Bytes,
    pub gas_limit: u64,
    pub timestamp: u64,
    pub message_hash: B256,
}

impl RelayMessage {
    /// Build a message and compute its content hash
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nonce: u64,
        source_chain_id: ChainId,
        dest_chain_id: ChainId,
        sender: Address,
        target: Address,
        payload: Bytes,
        gas_limit: u64,
        timestamp: u64,
    ) -> Self {
        let message_hash = compute_message_hash(
            nonce,
            source_chain_id,
            dest_chain_id,
            &sender,
            &target,
            &payload,
            gas_limit,
            timestamp,
        );
        Self {
            nonce,
            source_chain_id,
            dest_chain_id,
            sender,
            target,
            payload,
            gas_limit,
            timestamp,
            message_hash,
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.source_chain_id, self.nonce)
    }

    /// True if the stored hash matches the content
    pub fn verify_hash(&self) -> bool {
        compute_message_hash(
            self.nonce,
            self.source_chain_id,
            self.dest_chain_id,
            &self.sender,
            &self.target,
            &self.payload,
            self.gas_limit,
            self.timestamp,
        ) == self.message_hash
    }
}

// ============================================================================
// Event observations
// ============================================================================

/// Typed payload of a bridge contract event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A new outbound message was emitted on the source chain
    MessageSent(RelayMessage),
    /// A message was executed on this (destination) chain
    MessageExecuted { key: MessageKey, message_hash: B256 },
    /// The destination contract marked a message as failed
    MessageFailed { key: MessageKey, message_hash: B256 },
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageSent(_) => "message_sent",
            EventKind::MessageExecuted { .. } => "message_executed",
            EventKind::MessageFailed { .. } => "message_failed",
        }
    }
}

/// De-duplication key shared by the subscription and poll paths
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    Message(B256),
    Block {
        chain_id: ChainId,
        block_number: u64,
        kind: &'static str,
        log_index: u64,
    },
}

/// Raw observation produced by a chain listener.
///
/// Consumed once by the hub/orchestrator and then discarded.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub kind: EventKind,
    pub chain_id: ChainId,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub observed_at: DateTime<Utc>,
}

impl EventRecord {
    /// Key used by listeners to drop repeated observations
    pub fn dedupe_key(&self) -> EventKey {
        match &self.kind {
            EventKind::MessageSent(message) => EventKey::Message(message.message_hash),
            other => EventKey::Block {
                chain_id: self.chain_id,
                block_number: self.block_number,
                kind: other.as_str(),
                log_index: self.log_index,
            },
        }
    }
}

// ============================================================================
// Proofs
// ============================================================================

/// Inclusion proof of one leaf in the tree built for `(chain_id, block_number)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub root: B256,
    pub leaf: B256,
    pub proof: Vec<B256>,
    pub index: usize,
}

// ============================================================================
// Transactions
// ============================================================================

/// Transaction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Submitted,
    Replaced,
    Confirmed,
    Failed,
    Cancelled,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Submitted => "submitted",
            TxStatus::Replaced => "replaced",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
            TxStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Cancelled)
    }

    /// A transaction still occupying its nonce in the mempool
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TxStatus::Submitted | TxStatus::Replaced)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which destination entry point a transaction calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionCall {
    /// `executeMessage(message, proof, anchorBlock)`
    WithProof {
        message: RelayMessage,
        proof: Vec<B256>,
        anchor_block: u64,
    },
    /// `executeMessageTrusted(message)`
    Trusted { message: RelayMessage },
    /// Zero-value self transfer used to free a nonce
    Cancel,
}

impl ExecutionCall {
    pub fn mode(&self) -> &'static str {
        match self {
            ExecutionCall::WithProof { .. } => "proof",
            ExecutionCall::Trusted { .. } => "trusted",
            ExecutionCall::Cancel => "cancel",
        }
    }

    pub fn message(&self) -> Option<&RelayMessage> {
        match self {
            ExecutionCall::WithProof { message, .. } | ExecutionCall::Trusted { message } => {
                Some(message)
            }
            ExecutionCall::Cancel => None,
        }
    }
}

/// A transaction tracked by its owning dispatcher
#[derive(Debug, Clone, Serialize)]
pub struct PendingTransaction {
    pub tx_id: u64,
    pub dest_chain_id: ChainId,
    pub hash: Option<B256>,
    pub nonce: Option<u64>,
    pub status: TxStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub retries: u32,
    pub related_message: Option<MessageKey>,
    pub mode: &'static str,
    pub fees: Option<FeeBid>,
    pub last_error: Option<String>,
    /// The latest broadcast for this nonce is a cancellation
    pub cancel_sent: bool,
    #[serde(skip)]
    pub call: ExecutionCall,
}

/// Outcome of a dispatcher operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxResult {
    pub tx_id: Option<u64>,
    pub success: bool,
    pub status: TxStatus,
    pub hash: Option<B256>,
    pub nonce: Option<u64>,
    /// Destination already executed (or failed) the message; nothing was sent
    pub already_processed: bool,
    pub error: Option<String>,
}

impl TxResult {
    pub fn already_processed() -> Self {
        Self {
            tx_id: None,
            success: true,
            status: TxStatus::Confirmed,
            hash: None,
            nonce: None,
            already_processed: true,
            error: None,
        }
    }
}

/// Execution status reported by the destination bridge contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Unknown,
    Executed,
    Failed,
}

impl MessageStatus {
    /// Destination contract values: 0 = unknown, 1 = executed, 2 = failed
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MessageStatus::Executed,
            2 => MessageStatus::Failed,
            _ => MessageStatus::Unknown,
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, MessageStatus::Unknown)
    }
}

/// Fee bid for an EIP-1559 transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeBid {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> RelayMessage {
        RelayMessage::new(
            1,
            1,
            2,
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0xbb),
            Bytes::new(),
            200_000,
            1_700_000_000,
        )
    }

    #[test]
    fn test_message_key() {
        let message = sample_message();
        assert_eq!(message.key(), MessageKey::new(1, 1));
        assert_eq!(message.key().to_string(), "(1,1)");
    }

    #[test]
    fn test_message_hash_verifies() {
        let mut message = sample_message();
        assert!(message.verify_hash());
        message.gas_limit = 1;
        assert!(!message.verify_hash());
    }

    #[test]
    fn test_dedupe_key_uses_message_hash() {
        let message = sample_message();
        let record = EventRecord {
            kind: EventKind::MessageSent(message.clone()),
            chain_id: 1,
            block_number: 100,
            tx_hash: B256::ZERO,
            log_index: 0,
            observed_at: Utc::now(),
        };
        assert_eq!(record.dedupe_key(), EventKey::Message(message.message_hash));

        let executed = EventRecord {
            kind: EventKind::MessageExecuted {
                key: message.key(),
                message_hash: message.message_hash,
            },
            ..record
        };
        assert!(matches!(
            executed.dedupe_key(),
            EventKey::Block { block_number: 100, kind: "message_executed", .. }
        ));
    }

    #[test]
    fn test_tx_status_as_str() {
        assert_eq!(TxStatus::Pending.as_str(), "pending");
        assert_eq!(TxStatus::Submitted.as_str(), "submitted");
        assert_eq!(TxStatus::Replaced.as_str(), "replaced");
        assert_eq!(TxStatus::Confirmed.as_str(), "confirmed");
        assert_eq!(TxStatus::Failed.as_str(), "failed");
        assert_eq!(format!("{}", TxStatus::Cancelled), "cancelled");
    }

    #[test]
    fn test_message_status_from_u8() {
        assert_eq!(MessageStatus::from_u8(0), MessageStatus::Unknown);
        assert_eq!(MessageStatus::from_u8(1), MessageStatus::Executed);
        assert_eq!(MessageStatus::from_u8(2), MessageStatus::Failed);
        assert!(!MessageStatus::Unknown.is_final());
        assert!(MessageStatus::Failed.is_final());
    }
}
