//! In-memory chain doubles
//!
//! Used by unit tests and the `tests/` pipeline suite to drive listeners,
//! dispatchers and the orchestrator without a live node.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use eyre::{eyre, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::chain::{DestinationChain, SourceChain, StateRootOracle, TxRequest};
use crate::config::ChainProfile;
use crate::hash::keccak256;
use crate::types::{
    ChainId, EventKind, EventRecord, ExecutionCall, FeeBid, MessageKey, MessageStatus,
    RelayMessage,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Profile for a local chain with no confirmation depth, scanned from genesis
pub fn chain_profile(chain_id: ChainId) -> ChainProfile {
    ChainProfile {
        chain_id,
        name: format!("chain-{}", chain_id),
        rpc_urls: vec!["http://localhost:8545".to_string()],
        ws_url: None,
        bridge_address: "0x0000000000000000000000000000000000000001".to_string(),
        oracle_address: None,
        confirmations: 0,
        block_time_ms: 1_000,
        enabled: true,
        start_block: Some(0),
    }
}

/// Build a message with a deterministic sender, target and payload
pub fn sample_message(source_chain_id: ChainId, dest_chain_id: ChainId, nonce: u64) -> RelayMessage {
    RelayMessage::new(
        nonce,
        source_chain_id,
        dest_chain_id,
        Address::repeat_byte(0xaa),
        Address::repeat_byte(0xbb),
        Bytes::from(nonce.to_be_bytes().to_vec()),
        200_000,
        1_700_000_000 + nonce,
    )
}

fn tx_hash_for(chain_id: ChainId, block_number: u64, log_index: u64) -> B256 {
    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(&chain_id.to_be_bytes());
    buf.extend_from_slice(&block_number.to_be_bytes());
    buf.extend_from_slice(&log_index.to_be_bytes());
    B256::from(keccak256(&buf))
}

/// A `MessageSent` event for `message` at the given position
pub fn message_sent_event(message: RelayMessage, block_number: u64, log_index: u64) -> EventRecord {
    let chain_id = message.source_chain_id;
    EventRecord {
        kind: EventKind::MessageSent(message),
        chain_id,
        block_number,
        tx_hash: tx_hash_for(chain_id, block_number, log_index),
        log_index,
        observed_at: Utc::now(),
    }
}

/// A `MessageExecuted` event observed on `dest_chain_id`
pub fn message_executed_event(
    dest_chain_id: ChainId,
    message: &RelayMessage,
    block_number: u64,
    log_index: u64,
) -> EventRecord {
    EventRecord {
        kind: EventKind::MessageExecuted {
            key: message.key(),
            message_hash: message.message_hash,
        },
        chain_id: dest_chain_id,
        block_number,
        tx_hash: tx_hash_for(dest_chain_id, block_number, log_index),
        log_index,
        observed_at: Utc::now(),
    }
}

#[derive(Default)]
struct SourceState {
    tip: u64,
    events: Vec<EventRecord>,
    failing: bool,
    subscription: Option<mpsc::Receiver<EventRecord>>,
    subscribe_calls: u32,
    ranges: Vec<(u64, u64)>,
}

/// Source chain backed by a vector of events
pub struct MockSourceChain {
    chain_id: ChainId,
    state: Mutex<SourceState>,
}

impl MockSourceChain {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            state: Mutex::new(SourceState::default()),
        }
    }

    pub fn set_tip(&self, tip: u64) {
        lock(&self.state).tip = tip;
    }

    /// Make the event visible to range queries; raises the tip if needed
    pub fn push_event(&self, event: EventRecord) {
        let mut state = lock(&self.state);
        state.tip = state.tip.max(event.block_number);
        state.events.push(event);
    }

    /// Every RPC call errors while set
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Arm a push subscription; the returned sender feeds the next `subscribe()`
    pub fn arm_subscription(&self) -> mpsc::Sender<EventRecord> {
        let (tx, rx) = mpsc::channel(64);
        lock(&self.state).subscription = Some(rx);
        tx
    }

    pub fn subscribe_calls(&self) -> u32 {
        lock(&self.state).subscribe_calls
    }

    /// Block ranges requested so far
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        lock(&self.state).ranges.clone()
    }
}

#[async_trait]
impl SourceChain for MockSourceChain {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn block_number(&self) -> Result<u64> {
        let state = lock(&self.state);
        if state.failing {
            return Err(eyre!("connection refused"));
        }
        Ok(state.tip)
    }

    async fn events_in_range(&self, from_block: u64, to_block: u64) -> Result<Vec<EventRecord>> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(eyre!("connection refused"));
        }
        state.ranges.push((from_block, to_block));
        let mut events: Vec<EventRecord> = state
            .events
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<EventRecord>>> {
        let mut state = lock(&self.state);
        state.subscribe_calls += 1;
        if state.failing {
            return Err(eyre!("connection refused"));
        }
        Ok(state.subscription.take())
    }
}

struct DestinationState {
    next_nonce: u64,
    sent: Vec<TxRequest>,
    latest_by_nonce: BTreeMap<u64, B256>,
    calls_by_hash: HashMap<B256, (u64, ExecutionCall)>,
    mined: HashSet<u64>,
    statuses: HashMap<MessageKey, MessageStatus>,
    status_checks: usize,
    fees: FeeBid,
    balance: U256,
    send_failures: VecDeque<String>,
    revert_all: bool,
    withhold_receipts: bool,
    receipt_delay: Duration,
}

/// Destination chain that mines every submitted transaction on receipt query
pub struct MockDestinationChain {
    chain_id: ChainId,
    signer: Address,
    state: Mutex<DestinationState>,
}

impl MockDestinationChain {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            signer: Address::repeat_byte(0x11),
            state: Mutex::new(DestinationState {
                next_nonce: 0,
                sent: Vec::new(),
                latest_by_nonce: BTreeMap::new(),
                calls_by_hash: HashMap::new(),
                mined: HashSet::new(),
                statuses: HashMap::new(),
                status_checks: 0,
                fees: FeeBid {
                    max_fee_per_gas: 10_000_000_000,
                    max_priority_fee_per_gas: 1_000_000_000,
                },
                balance: U256::from(10u128.pow(18)),
                send_failures: VecDeque::new(),
                revert_all: false,
                withhold_receipts: false,
                receipt_delay: Duration::ZERO,
            }),
        }
    }

    /// Simulate transactions sent from the same key by someone else
    pub fn set_transaction_count(&self, count: u64) {
        lock(&self.state).next_nonce = count;
    }

    pub fn set_message_status(&self, key: MessageKey, status: MessageStatus) {
        lock(&self.state).statuses.insert(key, status);
    }

    pub fn set_fees(&self, fees: FeeBid) {
        lock(&self.state).fees = fees;
    }

    /// Queue an error returned by the next `send_transaction`
    pub fn fail_next_send(&self, error: &str) {
        lock(&self.state).send_failures.push_back(error.to_string());
    }

    /// Every mined transaction reverts while set
    pub fn set_revert(&self, revert: bool) {
        lock(&self.state).revert_all = revert;
    }

    /// `wait_for_receipt` times out while set
    pub fn set_withhold_receipts(&self, withhold: bool) {
        lock(&self.state).withhold_receipts = withhold;
    }

    /// Receipts arrive only after `delay`
    pub fn set_receipt_delay(&self, delay: Duration) {
        lock(&self.state).receipt_delay = delay;
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        lock(&self.state).sent.clone()
    }

    pub fn status_checks(&self) -> usize {
        lock(&self.state).status_checks
    }
}

#[async_trait]
impl DestinationChain for MockDestinationChain {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn message_status(&self, key: MessageKey) -> Result<MessageStatus> {
        let mut state = lock(&self.state);
        state.status_checks += 1;
        Ok(state
            .statuses
            .get(&key)
            .copied()
            .unwrap_or(MessageStatus::Unknown))
    }

    async fn transaction_count(&self) -> Result<u64> {
        Ok(lock(&self.state).next_nonce)
    }

    async fn fee_estimate(&self) -> Result<FeeBid> {
        Ok(lock(&self.state).fees)
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256> {
        let mut state = lock(&self.state);
        if let Some(error) = state.send_failures.pop_front() {
            return Err(eyre!(error));
        }
        if state.mined.contains(&request.nonce) {
            return Err(eyre!("nonce too low: {}", request.nonce));
        }
        if request.nonce > state.next_nonce {
            return Err(eyre!(
                "nonce too high: got {}, expected {}",
                request.nonce,
                state.next_nonce
            ));
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        buf.extend_from_slice(&request.nonce.to_be_bytes());
        buf.extend_from_slice(&(state.sent.len() as u64).to_be_bytes());
        let hash = B256::from(keccak256(&buf));

        state.latest_by_nonce.insert(request.nonce, hash);
        state
            .calls_by_hash
            .insert(hash, (request.nonce, request.call.clone()));
        state.next_nonce = state.next_nonce.max(request.nonce + 1);
        state.sent.push(request);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256, _timeout: Duration) -> Result<Option<bool>> {
        let delay = lock(&self.state).receipt_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = lock(&self.state);
        if state.withhold_receipts {
            return Ok(None);
        }
        let (nonce, call) = match state.calls_by_hash.get(&tx_hash) {
            Some(entry) => entry.clone(),
            None => return Err(eyre!("unknown transaction {}", tx_hash)),
        };
        if state.latest_by_nonce.get(&nonce) != Some(&tx_hash) {
            // replaced by a later bid for the same nonce
            return Ok(None);
        }
        state.mined.insert(nonce);
        if state.revert_all {
            return Ok(Some(false));
        }
        if let Some(message) = call.message() {
            state
                .statuses
                .insert(message.key(), MessageStatus::Executed);
        }
        Ok(Some(true))
    }

    async fn balance(&self) -> Result<U256> {
        Ok(lock(&self.state).balance)
    }
}

/// Oracle that reports blocks finalized up to a per-chain height.
///
/// Roots are only reported for blocks given one with `set_state_root`.
#[derive(Default)]
pub struct MockOracle {
    finalized: Mutex<HashMap<ChainId, u64>>,
    roots: Mutex<HashMap<(ChainId, u64), B256>>,
    finalize_all: bool,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every block on every chain counts as finalized
    pub fn all_finalized() -> Self {
        Self {
            finalize_all: true,
            ..Self::default()
        }
    }

    pub fn set_finalized(&self, chain_id: ChainId, height: u64) {
        lock(&self.finalized).insert(chain_id, height);
    }

    pub fn set_state_root(&self, chain_id: ChainId, block_number: u64, root: B256) {
        lock(&self.roots).insert((chain_id, block_number), root);
    }
}

#[async_trait]
impl StateRootOracle for MockOracle {
    async fn is_finalized(&self, chain_id: ChainId, block_number: u64) -> Result<bool> {
        if self.finalize_all {
            return Ok(true);
        }
        Ok(lock(&self.finalized)
            .get(&chain_id)
            .is_some_and(|&height| block_number <= height))
    }

    async fn state_root(&self, chain_id: ChainId, block_number: u64) -> Result<Option<B256>> {
        Ok(lock(&self.roots).get(&(chain_id, block_number)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeeBid;

    fn request(call: ExecutionCall, nonce: u64) -> TxRequest {
        TxRequest {
            call,
            nonce,
            gas_limit: 300_000,
            fees: FeeBid {
                max_fee_per_gas: 1,
                max_priority_fee_per_gas: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_mock_source_range_query() {
        let source = MockSourceChain::new(1);
        source.push_event(message_sent_event(sample_message(1, 2, 1), 12, 0));
        source.push_event(message_sent_event(sample_message(1, 2, 0), 10, 0));

        assert_eq!(source.block_number().await.unwrap(), 12);
        let events = source.events_in_range(0, 11).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, 10);
    }

    #[tokio::test]
    async fn test_mock_destination_mines_and_marks_executed() {
        let dest = MockDestinationChain::new(2);
        let message = sample_message(1, 2, 0);
        let hash = dest
            .send_transaction(request(
                ExecutionCall::Trusted {
                    message: message.clone(),
                },
                0,
            ))
            .await
            .unwrap();

        assert_eq!(dest.transaction_count().await.unwrap(), 1);
        assert_eq!(
            dest.wait_for_receipt(hash, Duration::from_secs(1)).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            dest.message_status(message.key()).await.unwrap(),
            MessageStatus::Executed
        );

        let err = dest
            .send_transaction(request(ExecutionCall::Cancel, 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nonce too low"));
    }

    #[tokio::test]
    async fn test_mock_oracle_heights() {
        let oracle = MockOracle::new();
        oracle.set_finalized(1, 100);
        assert!(oracle.is_finalized(1, 100).await.unwrap());
        assert!(!oracle.is_finalized(1, 101).await.unwrap());
        assert!(!oracle.is_finalized(2, 1).await.unwrap());
        assert!(MockOracle::all_finalized().is_finalized(9, 9).await.unwrap());

        assert_eq!(oracle.state_root(1, 100).await.unwrap(), None);
        oracle.set_state_root(1, 100, B256::repeat_byte(7));
        assert_eq!(
            oracle.state_root(1, 100).await.unwrap(),
            Some(B256::repeat_byte(7))
        );
    }
}
