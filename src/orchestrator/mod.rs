//! Relay orchestrator
//!
//! Drains the hub's merged event stream into a FIFO queue, then on every
//! batch tick takes up to `batch_size` messages and drives each through the
//! destination chain's dispatcher:
//!
//! 1. skip if `(source_chain_id, nonce)` is already processed
//! 2. prove inclusion if the oracle has finalized the source block
//! 3. otherwise fall back to trusted execution (when the policy allows)
//! 4. on success add the key to the processed set; on failure requeue at
//!    the tail until `max_retries` is spent, then mark it failed for good
//!
//! A message whose transaction is still unconfirmed is resumed on the same
//! nonce rather than submitted again. Once its attempts are spent that
//! transaction is cancelled, and the message only counts as failed after
//! the cancellation (or a revert) settles the nonce.
//!
//! Messages in one batch are submitted concurrently. Submissions to the
//! same destination still get ordered nonces through its sequencer.

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use eyre::Result;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chain::StateRootOracle;
use crate::config::{RelayerConfig, TrustPolicy};
use crate::dispatcher::{DispatcherHealth, TransactionDispatcher};
use crate::error::RelayError;
use crate::listener::{ListenerEvent, ListenerStatus, MultiChainHub};
use crate::metrics;
use crate::proof::ProofBuilder;
use crate::types::{
    ChainId, EventKind, EventRecord, MessageKey, PendingTransaction, ProofBundle, RelayMessage,
    TxResult, TxStatus,
};

pub mod stats;

pub use stats::{RelayStats, StatsSnapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A message waiting for submission
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: RelayMessage,
    pub block_number: u64,
    /// Failed submission attempts so far
    pub attempts: u32,
    /// Attempts spent; the in-flight transaction is being cancelled
    pub cancelling: bool,
    pub observed_at: DateTime<Utc>,
}

/// What happened to each message in one batch
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub confirmed: usize,
    pub already_processed: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub requeued: usize,
    pub failed: usize,
}

/// Full health view served by the HTTP surface
#[derive(Debug, Clone, Serialize)]
pub struct RelayHealth {
    pub running: bool,
    pub stats: StatsSnapshot,
    pub listeners: BTreeMap<ChainId, ListenerStatus>,
    pub dispatchers: BTreeMap<ChainId, DispatcherHealth>,
}

enum Outcome {
    Confirmed { mode: &'static str, result: TxResult },
    AlreadyProcessed,
    /// Already in the processed set when its turn came
    Skipped,
    /// Destination paused by its circuit breaker; no attempt consumed
    Deferred,
    Failed { reason: String, result: Option<TxResult> },
    /// Cancellation sent or attempted but the nonce is not settled yet
    Unresolved { reason: String },
    /// In-flight transaction cancelled or reverted; the message is given up
    Abandoned,
    Unroutable,
}

#[derive(Default)]
struct MessageQueue {
    items: VecDeque<QueuedMessage>,
    /// Keys queued or currently being processed
    keys: HashSet<MessageKey>,
}

struct RelayState {
    config: RelayerConfig,
    dispatchers: BTreeMap<ChainId, Arc<TransactionDispatcher>>,
    /// Keyed by destination chain: the oracle that roots source blocks there
    oracles: HashMap<ChainId, Arc<dyn StateRootOracle>>,
    proofs: Mutex<ProofBuilder>,
    queue: Mutex<MessageQueue>,
    processed: Mutex<HashSet<MessageKey>>,
    failed: Mutex<HashSet<MessageKey>>,
    stats: Arc<RelayStats>,
}

pub struct RelayOrchestrator {
    state: Arc<RelayState>,
    hub: Arc<MultiChainHub>,
    events: Mutex<Option<mpsc::Receiver<ListenerEvent>>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayOrchestrator {
    /// Wire the hub to the dispatchers.
    ///
    /// Dispatchers that fail to sync are dropped with an error log. Fails
    /// if no listener or no dispatcher is left, so the relay never runs
    /// without a route.
    pub async fn initialize(
        config: RelayerConfig,
        mut hub: MultiChainHub,
        dispatchers: Vec<Arc<TransactionDispatcher>>,
        oracles: HashMap<ChainId, Arc<dyn StateRootOracle>>,
    ) -> Result<Self> {
        if hub.is_empty() {
            return Err(RelayError::Configuration(
                "no chain listener initialized".to_string(),
            )
            .into());
        }
        let events = hub.take_events().ok_or_else(|| {
            RelayError::Configuration("hub event stream already taken".to_string())
        })?;

        let mut ready = BTreeMap::new();
        for dispatcher in dispatchers {
            let chain_id = dispatcher.chain_id();
            match dispatcher.initialize().await {
                Ok(()) => {
                    ready.insert(chain_id, dispatcher);
                }
                Err(e) => {
                    error!(
                        chain_id,
                        error = %format!("{:#}", e),
                        "Failed to initialize dispatcher; chain excluded as destination"
                    );
                }
            }
        }
        if ready.is_empty() {
            return Err(RelayError::Configuration(
                "no transaction dispatcher initialized".to_string(),
            )
            .into());
        }

        info!(
            sources = ?hub.chain_ids(),
            destinations = ?ready.keys().collect::<Vec<_>>(),
            oracles = oracles.len(),
            batch_size = config.batch_size,
            max_retries = config.max_retries,
            trust_policy = ?config.trust_policy,
            "Relay orchestrator initialized"
        );

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            state: Arc::new(RelayState {
                config,
                dispatchers: ready,
                oracles,
                proofs: Mutex::new(ProofBuilder::new()),
                queue: Mutex::new(MessageQueue::default()),
                processed: Mutex::new(HashSet::new()),
                failed: Mutex::new(HashSet::new()),
                stats: Arc::new(RelayStats::new()),
            }),
            hub: Arc::new(hub),
            events: Mutex::new(Some(events)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the listeners and the intake, batch and stats tasks
    pub fn start(&self) {
        let events = match lock(&self.events).take() {
            Some(events) => events,
            None => {
                warn!("Relay orchestrator already started");
                return;
            }
        };

        self.hub.start_all();

        let mut tasks = lock(&self.tasks);
        tasks.push(tokio::spawn(run_intake(
            self.state.clone(),
            events,
            self.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(run_batches(
            self.state.clone(),
            self.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(run_stats(
            self.state.clone(),
            self.hub.clone(),
            self.shutdown.subscribe(),
        )));
        metrics::UP.set(1.0);
        info!(
            batch_interval_ms = self.state.config.batch_interval_ms,
            stats_interval_ms = self.state.config.stats_interval_ms,
            "Relay orchestrator started"
        );
    }

    /// Stop accepting events, let the in-flight batch settle, then join all
    /// tasks
    pub async fn stop(&self) {
        info!("Stopping relay orchestrator");
        self.hub.stop_all().await;
        self.shutdown.send_replace(true);

        let handles: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Orchestrator task panicked");
            }
        }
        metrics::UP.set(0.0);
        info!(
            queued = self.queue_len(),
            processed = self.state.stats.messages_processed(),
            "Relay orchestrator stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        !lock(&self.tasks).is_empty() && !*self.shutdown.borrow()
    }

    /// Route one hub event into the queue / processed set
    pub fn handle_event(&self, event: ListenerEvent) {
        self.state.handle_event(event);
    }

    /// Drain up to `batch_size` queued messages and submit them
    pub async fn process_batch(&self) -> BatchReport {
        self.state.process_batch().await
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        self.state.stats.clone()
    }

    pub fn hub(&self) -> &MultiChainHub {
        &self.hub
    }

    pub fn dispatcher(&self, chain_id: ChainId) -> Option<Arc<TransactionDispatcher>> {
        self.state.dispatchers.get(&chain_id).cloned()
    }

    pub fn is_processed(&self, key: &MessageKey) -> bool {
        lock(&self.state.processed).contains(key)
    }

    pub fn is_failed(&self, key: &MessageKey) -> bool {
        lock(&self.state.failed).contains(key)
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.state.queue).items.len()
    }

    /// Root of the tree for a source block, if any messages are indexed
    pub fn proof_root(&self, chain_id: ChainId, block_number: u64) -> Option<B256> {
        lock(&self.state.proofs).get_root(chain_id, block_number)
    }

    pub fn pending_transactions(&self) -> Vec<PendingTransaction> {
        self.state
            .dispatchers
            .values()
            .flat_map(|d| d.pending_transactions())
            .collect()
    }

    pub async fn health(&self) -> RelayHealth {
        let mut dispatchers = BTreeMap::new();
        for (chain_id, dispatcher) in &self.state.dispatchers {
            dispatchers.insert(*chain_id, dispatcher.health().await);
        }
        RelayHealth {
            running: self.is_running(),
            stats: self.state.stats.snapshot(),
            listeners: self.hub.health(),
            dispatchers,
        }
    }
}

impl RelayState {
    fn handle_event(&self, event: ListenerEvent) {
        match event {
            ListenerEvent::NewEvent(record) => self.handle_record(record),
            ListenerEvent::ConnectionFailed { chain_id, reason } => {
                error!(
                    chain_id,
                    reason = %reason,
                    "Chain listener gave up reconnecting; chain paused until reinitialized"
                );
            }
        }
    }

    fn handle_record(&self, record: EventRecord) {
        let EventRecord {
            kind,
            chain_id,
            block_number,
            observed_at,
            ..
        } = record;

        match kind {
            EventKind::MessageSent(message) => {
                self.stats.inc_messages_received();
                if !message.verify_hash() {
                    warn!(
                        chain_id,
                        block_number,
                        nonce = message.nonce,
                        "Message hash does not match its contents, dropping"
                    );
                    return;
                }

                // every emitted message belongs in its block's tree, even
                // ones already relayed
                lock(&self.proofs).add_message(chain_id, block_number, message.clone());

                let key = message.key();
                if lock(&self.processed).contains(&key) || lock(&self.failed).contains(&key) {
                    self.drop_duplicate(chain_id, key);
                    return;
                }

                let mut queue = lock(&self.queue);
                if !queue.keys.insert(key) {
                    drop(queue);
                    self.drop_duplicate(chain_id, key);
                    return;
                }
                queue.items.push_back(QueuedMessage {
                    message,
                    block_number,
                    attempts: 0,
                    cancelling: false,
                    observed_at,
                });
                let depth = queue.items.len();
                drop(queue);

                self.set_queue_depth(depth);
                debug!(chain_id, block_number, message = %key, depth, "Message queued");
            }
            EventKind::MessageExecuted { key, .. } | EventKind::MessageFailed { key, .. } => {
                // executed (or rejected) on the destination by anyone
                if lock(&self.processed).insert(key) {
                    debug!(chain_id, message = %key, "Destination reports message final");
                }
            }
        }
    }

    fn drop_duplicate(&self, chain_id: ChainId, key: MessageKey) {
        self.stats.inc_duplicates_dropped();
        metrics::record_duplicate(chain_id, "orchestrator");
        debug!(chain_id, message = %key, "Duplicate message dropped");
    }

    fn set_queue_depth(&self, depth: usize) {
        self.stats.set_queue_depth(depth);
        metrics::set_queue_depth(depth);
    }

    async fn process_batch(&self) -> BatchReport {
        let batch: Vec<QueuedMessage> = {
            let mut queue = lock(&self.queue);
            let take = self.config.batch_size.min(queue.items.len());
            queue.items.drain(..take).collect()
        };
        if batch.is_empty() {
            return BatchReport::default();
        }
        debug!(size = batch.len(), "Processing batch");

        let outcomes = join_all(batch.iter().map(|item| self.process_one(item))).await;

        let mut report = BatchReport {
            attempted: batch.len(),
            ..Default::default()
        };
        for (item, outcome) in batch.into_iter().zip(outcomes) {
            self.apply_outcome(item, outcome, &mut report);
        }

        self.prune_proofs();
        let depth = lock(&self.queue).items.len();
        self.set_queue_depth(depth);

        if report.confirmed + report.failed + report.requeued > 0 {
            info!(
                attempted = report.attempted,
                confirmed = report.confirmed,
                already_processed = report.already_processed,
                requeued = report.requeued,
                failed = report.failed,
                queue_depth = depth,
                "Batch processed"
            );
        }
        report
    }

    async fn process_one(&self, item: &QueuedMessage) -> Outcome {
        let message = &item.message;
        let key = message.key();

        let dispatcher = match self.dispatchers.get(&message.dest_chain_id) {
            Some(d) => d,
            None => return Outcome::Unroutable,
        };
        let in_flight = dispatcher.in_flight_for(key);

        if item.cancelling {
            return match in_flight {
                Some(tx) => cancel_in_flight(dispatcher, tx).await,
                None => Outcome::Abandoned,
            };
        }
        if in_flight.is_none() && lock(&self.processed).contains(&key) {
            return Outcome::Skipped;
        }
        if !dispatcher.is_available() {
            return Outcome::Deferred;
        }

        let (mode, result) = if let Some(tx) = in_flight {
            debug!(message = %key, tx_id = tx.tx_id, "Resuming in-flight transaction");
            (tx.mode, dispatcher.resume(tx.tx_id).await)
        } else {
            match self.proof_for(item).await {
                Some(bundle) => (
                    "proof",
                    dispatcher
                        .submit_with_proof(message, &bundle, item.block_number)
                        .await,
                ),
                None => match self.config.trust_policy {
                    TrustPolicy::AllowTrusted => {
                        debug!(message = %key, "Proof unavailable, using trusted submission");
                        ("trusted", dispatcher.submit_trusted(message).await)
                    }
                    TrustPolicy::ProofOnly => {
                        return Outcome::Failed {
                            reason: RelayError::ProofUnavailable(key).to_string(),
                            result: None,
                        }
                    }
                },
            }
        };

        match result {
            Ok(result) if result.already_processed => Outcome::AlreadyProcessed,
            Ok(result) if result.success && result.status == TxStatus::Confirmed => {
                Outcome::Confirmed { mode, result }
            }
            Ok(result) => Outcome::Failed {
                reason: result
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("transaction {}", result.status)),
                result: Some(result),
            },
            Err(e) => Outcome::Failed {
                reason: format!("{:#}", e),
                result: None,
            },
        }
    }

    /// Proof for the message if its source block is rooted on the destination
    /// and the root recorded there matches the locally built one
    async fn proof_for(&self, item: &QueuedMessage) -> Option<ProofBundle> {
        let message = &item.message;
        let source = message.source_chain_id;

        let mut oracle_root = None;
        if let Some(oracle) = self.oracles.get(&message.dest_chain_id) {
            let checked = async {
                if !oracle.is_finalized(source, item.block_number).await? {
                    return Ok::<_, eyre::Report>(None);
                }
                oracle.state_root(source, item.block_number).await.map(Some)
            };
            match checked.await {
                Ok(Some(root)) => oracle_root = root,
                Ok(None) => {
                    debug!(
                        message = %message.key(),
                        block = item.block_number,
                        "Source block not finalized by oracle yet"
                    );
                    return None;
                }
                Err(e) => {
                    warn!(
                        dest_chain_id = message.dest_chain_id,
                        error = %e,
                        "Oracle query failed, treating proof as unavailable"
                    );
                    return None;
                }
            }
        }

        let bundle =
            lock(&self.proofs).generate_proof(source, item.block_number, &message.message_hash)?;
        match oracle_root {
            Some(root) if root != bundle.root => {
                warn!(
                    message = %message.key(),
                    source_chain_id = source,
                    block = item.block_number,
                    local_root = %bundle.root,
                    oracle_root = %root,
                    "Local message root differs from oracle root, treating proof as unavailable"
                );
                metrics::record_error(message.dest_chain_id, "root_mismatch");
                None
            }
            _ => Some(bundle),
        }
    }

    fn apply_outcome(&self, mut item: QueuedMessage, outcome: Outcome, report: &mut BatchReport) {
        let key = item.message.key();
        let dest = item.message.dest_chain_id;

        match outcome {
            Outcome::Confirmed { mode, result } => {
                self.mark_processed(key);
                self.stats.inc_messages_processed();
                self.stats.inc_tx_submitted();
                self.stats.inc_tx_confirmed();
                if mode == "proof" {
                    self.stats.inc_proof_submissions();
                } else {
                    self.stats.inc_trusted_submissions();
                }
                metrics::record_message_processed(dest, mode);
                let latency = (Utc::now() - item.observed_at).num_milliseconds().max(0);
                metrics::record_latency(dest, latency as f64 / 1000.0);
                info!(
                    message = %key,
                    dest_chain_id = dest,
                    mode,
                    tx_hash = ?result.hash,
                    nonce = ?result.nonce,
                    "Message relayed"
                );
                report.confirmed += 1;
            }
            Outcome::AlreadyProcessed => {
                self.mark_processed(key);
                self.stats.inc_messages_processed();
                self.stats.inc_already_processed();
                metrics::record_message_processed(dest, "already_processed");
                report.already_processed += 1;
            }
            Outcome::Skipped => {
                self.release_key(&key);
                debug!(message = %key, "Message became final while queued");
                report.skipped += 1;
            }
            Outcome::Deferred => {
                debug!(message = %key, dest_chain_id = dest, "Destination paused, deferring");
                lock(&self.queue).items.push_back(item);
                report.deferred += 1;
            }
            Outcome::Unresolved { reason } => {
                warn!(
                    message = %key,
                    dest_chain_id = dest,
                    error = %reason,
                    "In-flight transaction not settled yet, will cancel again"
                );
                lock(&self.queue).items.push_back(item);
                report.requeued += 1;
            }
            Outcome::Abandoned => {
                error!(
                    message = %key,
                    dest_chain_id = dest,
                    attempts = item.attempts,
                    "In-flight transaction settled without executing, message permanently failed"
                );
                self.mark_failed(key, dest);
                report.failed += 1;
            }
            Outcome::Unroutable => {
                error!(
                    message = %key,
                    error = %RelayError::UnsupportedChain(dest),
                    "No dispatcher for destination, dropping message"
                );
                self.mark_failed(key, dest);
                report.failed += 1;
            }
            Outcome::Failed { reason, result } => {
                if let Some(result) = &result {
                    if result.hash.is_some() {
                        self.stats.inc_tx_submitted();
                    }
                    if result.status == TxStatus::Failed && result.tx_id.is_some() {
                        self.stats.inc_tx_failed();
                    }
                }

                item.attempts += 1;
                if item.attempts <= self.config.max_retries {
                    warn!(
                        message = %key,
                        dest_chain_id = dest,
                        attempt = item.attempts,
                        max_retries = self.config.max_retries,
                        error = %reason,
                        "Relay attempt failed, requeueing"
                    );
                    self.stats.inc_requeued();
                    lock(&self.queue).items.push_back(item);
                    report.requeued += 1;
                } else if self.has_in_flight(dest, key) {
                    warn!(
                        message = %key,
                        dest_chain_id = dest,
                        attempts = item.attempts,
                        error = %reason,
                        "Retries exhausted with a transaction in flight, cancelling it"
                    );
                    item.cancelling = true;
                    lock(&self.queue).items.push_back(item);
                    report.requeued += 1;
                } else {
                    error!(
                        message = %key,
                        dest_chain_id = dest,
                        attempts = item.attempts,
                        error = %reason,
                        "Retries exhausted, message permanently failed"
                    );
                    self.mark_failed(key, dest);
                    report.failed += 1;
                }
            }
        }
    }

    fn has_in_flight(&self, dest: ChainId, key: MessageKey) -> bool {
        self.dispatchers
            .get(&dest)
            .is_some_and(|d| d.in_flight_for(key).is_some())
    }

    fn mark_processed(&self, key: MessageKey) {
        lock(&self.processed).insert(key);
        self.release_key(&key);
    }

    fn mark_failed(&self, key: MessageKey, dest: ChainId) {
        lock(&self.failed).insert(key);
        self.release_key(&key);
        self.stats.inc_messages_failed();
        metrics::record_message_failed(dest);
    }

    fn release_key(&self, key: &MessageKey) {
        lock(&self.queue).keys.remove(key);
    }

    /// Keep `proof_retention_blocks` behind the newest block per chain, and
    /// never drop a block that still has queued messages
    fn prune_proofs(&self) {
        let mut oldest_queued: HashMap<ChainId, u64> = HashMap::new();
        for item in lock(&self.queue).items.iter() {
            let entry = oldest_queued
                .entry(item.message.source_chain_id)
                .or_insert(item.block_number);
            *entry = (*entry).min(item.block_number);
        }

        let mut proofs = lock(&self.proofs);
        for chain_id in proofs.chains() {
            let Some(latest) = proofs.latest_block(chain_id) else {
                continue;
            };
            let mut keep_from = latest.saturating_sub(self.config.proof_retention_blocks);
            if let Some(&queued) = oldest_queued.get(&chain_id) {
                keep_from = keep_from.min(queued);
            }
            proofs.prune_old_blocks(chain_id, keep_from);
        }
    }
}

/// Cancel the transaction left in flight by a message out of attempts
async fn cancel_in_flight(dispatcher: &TransactionDispatcher, tx: PendingTransaction) -> Outcome {
    match dispatcher.cancel(tx.tx_id).await {
        Ok(result) if result.status == TxStatus::Confirmed => Outcome::Confirmed {
            mode: tx.mode,
            result,
        },
        Ok(result) if result.status.is_in_flight() => Outcome::Unresolved {
            reason: result
                .error
                .unwrap_or_else(|| format!("transaction {}", result.status)),
        },
        Ok(_) => Outcome::Abandoned,
        Err(e) => Outcome::Unresolved {
            reason: format!("{:#}", e),
        },
    }
}

async fn run_intake(
    state: Arc<RelayState>,
    mut events: mpsc::Receiver<ListenerEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => state.handle_event(event),
                None => {
                    warn!("Hub event stream closed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Event intake stopped");
}

async fn run_batches(state: Arc<RelayState>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(state.config.batch_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // runs to completion; shutdown is only observed between batches
                state.process_batch().await;
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Batch loop stopped");
}

async fn run_stats(
    state: Arc<RelayState>,
    hub: Arc<MultiChainHub>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(state.config.stats_interval_ms));
    // skip the immediate first tick
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let s = state.stats.snapshot();
                let lagging: Vec<ChainId> = hub
                    .health()
                    .values()
                    .filter(|h| !h.connected || h.parked)
                    .map(|h| h.chain_id)
                    .collect();
                info!(
                    received = s.messages_received,
                    processed = s.messages_processed,
                    failed = s.messages_failed,
                    duplicates = s.duplicates_dropped,
                    already_processed = s.already_processed,
                    tx_submitted = s.tx_submitted,
                    tx_confirmed = s.tx_confirmed,
                    tx_failed = s.tx_failed,
                    queue_depth = s.queue_depth,
                    disconnected_chains = ?lagging,
                    "Relay stats"
                );
            }
            _ = shutdown.changed() => break,
        }
    }
}
