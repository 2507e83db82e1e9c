//! Chain listener
//!
//! One listener per source chain runs two observation paths against the
//! bridge contract:
//!
//! - a live subscription, forwarding records as they arrive
//! - a fixed-interval poll over `[next_block, tip - confirmations]`, the
//!   reconciliation backstop for dropped subscriptions and missed blocks
//!
//! Both paths share one `SeenCache`, so downstream sees each event once.
//! Transport failures back off exponentially; after
//! `max_reconnect_attempts` the listener emits `ConnectionFailed` and parks
//! until `reinitialize()` is called.

use eyre::{Result, WrapErr};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chain::SourceChain;
use crate::config::{ChainProfile, ListenerConfig};
use crate::error::RelayError;
use crate::metrics;
use crate::types::{ChainId, EventRecord};

pub mod hub;
pub mod seen;

pub use hub::MultiChainHub;
pub use seen::SeenCache;

/// Output of a listener
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    NewEvent(EventRecord),
    ConnectionFailed { chain_id: ChainId, reason: String },
}

/// Point-in-time view of a listener
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub chain_id: ChainId,
    pub name: String,
    pub connected: bool,
    pub parked: bool,
    pub subscribed: bool,
    pub tip_block: u64,
    pub last_processed_block: u64,
    pub lag_blocks: u64,
    pub queue_depth: usize,
    pub reconnect_attempts: u32,
}

struct ListenerShared {
    profile: ChainProfile,
    config: ListenerConfig,
    source: Arc<dyn SourceChain>,
    events: mpsc::Sender<ListenerEvent>,
    seen: Mutex<SeenCache>,
    tip: AtomicU64,
    next_block: AtomicU64,
    connected: AtomicBool,
    parked: AtomicBool,
    subscribed: AtomicBool,
    reconnect_attempts: AtomicU32,
}

pub struct ChainListener {
    shared: Arc<ListenerShared>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChainListener {
    /// Connect to the chain and fix the reconciliation starting point.
    ///
    /// Fails with a transport error if the chain tip cannot be read.
    pub async fn initialize(
        profile: ChainProfile,
        config: ListenerConfig,
        source: Arc<dyn SourceChain>,
        events: mpsc::Sender<ListenerEvent>,
    ) -> Result<Self> {
        let tip = source
            .block_number()
            .await
            .map_err(|e| RelayError::Transport {
                chain_id: profile.chain_id,
                reason: e.to_string(),
            })
            .wrap_err_with(|| format!("Failed to connect listener for {}", profile.name))?;

        let next_block = profile
            .start_block
            .unwrap_or_else(|| tip.saturating_sub(profile.confirmations) + 1);

        info!(
            chain_id = profile.chain_id,
            chain_name = %profile.name,
            tip,
            next_block,
            confirmations = profile.confirmations,
            "Chain listener initialized"
        );
        metrics::set_latest_block(profile.chain_id, tip);
        metrics::set_listener_connected(profile.chain_id, true);

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(ListenerShared {
                seen: Mutex::new(SeenCache::new(config.seen_cache_size)),
                profile,
                config,
                source,
                events,
                tip: AtomicU64::new(tip),
                next_block: AtomicU64::new(next_block),
                connected: AtomicBool::new(true),
                parked: AtomicBool::new(false),
                subscribed: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
            }),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.shared.profile.chain_id
    }

    pub fn profile(&self) -> &ChainProfile {
        &self.shared.profile
    }

    /// Spawn the subscription and poll tasks
    pub fn start(&self) {
        let mut tasks = self.lock_tasks();
        if !tasks.is_empty() {
            debug!(chain_id = self.chain_id(), "Listener already running");
            return;
        }
        self.shutdown.send_replace(false);

        let shared = self.shared.clone();
        let shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(run_subscription(shared, shutdown)));

        let shared = self.shared.clone();
        let shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(run_poll(shared, shutdown)));

        info!(chain_id = self.chain_id(), "Chain listener started");
    }

    /// Signal both tasks and wait for them to exit
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(chain_id = self.chain_id(), error = %e, "Listener task panicked");
                }
            }
        }
        self.shared.subscribed.store(false, Ordering::Relaxed);
        info!(chain_id = self.chain_id(), "Chain listener stopped");
    }

    /// Reconnect a parked listener and restart its tasks
    pub async fn reinitialize(&self) -> Result<()> {
        self.stop().await;
        let tip = self
            .shared
            .source
            .block_number()
            .await
            .map_err(|e| RelayError::Transport {
                chain_id: self.chain_id(),
                reason: e.to_string(),
            })?;
        self.shared.tip.fetch_max(tip, Ordering::Relaxed);
        self.shared.reconnect_attempts.store(0, Ordering::Relaxed);
        self.shared.parked.store(false, Ordering::Relaxed);
        self.shared.connected.store(true, Ordering::Relaxed);
        metrics::set_listener_connected(self.chain_id(), true);
        info!(chain_id = self.chain_id(), tip, "Chain listener reinitialized");
        self.start();
        Ok(())
    }

    /// Run one reconciliation pass immediately; returns events forwarded
    pub async fn poll_now(&self) -> Result<usize> {
        poll_once(&self.shared).await
    }

    pub fn is_parked(&self) -> bool {
        self.shared.parked.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> ListenerStatus {
        let shared = &self.shared;
        let tip = shared.tip.load(Ordering::Relaxed);
        let last_processed = shared.next_block.load(Ordering::Relaxed).saturating_sub(1);
        ListenerStatus {
            chain_id: shared.profile.chain_id,
            name: shared.profile.name.clone(),
            connected: shared.connected.load(Ordering::Relaxed),
            parked: shared.parked.load(Ordering::Relaxed),
            subscribed: shared.subscribed.load(Ordering::Relaxed),
            tip_block: tip,
            last_processed_block: last_processed,
            lag_blocks: tip.saturating_sub(last_processed),
            queue_depth: shared.events.max_capacity() - shared.events.capacity(),
            reconnect_attempts: shared.reconnect_attempts.load(Ordering::Relaxed),
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ListenerShared {
    fn chain_id(&self) -> ChainId {
        self.profile.chain_id
    }

    /// Forward an event unless it was already seen. Returns whether it was sent.
    async fn emit(&self, event: EventRecord) -> bool {
        let fresh = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.dedupe_key());
        if !fresh {
            debug!(
                chain_id = self.chain_id(),
                block = event.block_number,
                kind = event.kind.as_str(),
                "Duplicate event dropped"
            );
            metrics::record_duplicate(self.chain_id(), "listener");
            return false;
        }

        self.tip.fetch_max(event.block_number, Ordering::Relaxed);
        metrics::record_event_observed(self.chain_id(), event.kind.as_str());
        debug!(
            chain_id = self.chain_id(),
            block = event.block_number,
            tx_hash = %event.tx_hash,
            kind = event.kind.as_str(),
            "New bridge event"
        );
        self.events.send(ListenerEvent::NewEvent(event)).await.is_ok()
    }

    fn mark_healthy(&self) {
        if self.reconnect_attempts.swap(0, Ordering::Relaxed) > 0 {
            info!(chain_id = self.chain_id(), "Chain connection recovered");
        }
        if !self.connected.swap(true, Ordering::Relaxed) {
            metrics::set_listener_connected(self.chain_id(), true);
        }
    }

    /// Count a transport failure and back off.
    ///
    /// Returns true when the caller should exit: the listener parked or a
    /// shutdown arrived during the backoff.
    async fn on_transport_failure(&self, reason: &str, shutdown: &mut watch::Receiver<bool>) -> bool {
        if self.parked.load(Ordering::Relaxed) {
            return true;
        }
        self.connected.store(false, Ordering::Relaxed);
        metrics::set_listener_connected(self.chain_id(), false);
        metrics::record_error(self.chain_id(), "transport");

        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        if attempt >= self.config.max_reconnect_attempts {
            if !self.parked.swap(true, Ordering::Relaxed) {
                error!(
                    chain_id = self.chain_id(),
                    attempts = attempt,
                    reason,
                    "Reconnect attempts exhausted, listener parked"
                );
                let _ = self
                    .events
                    .send(ListenerEvent::ConnectionFailed {
                        chain_id: self.chain_id(),
                        reason: reason.to_string(),
                    })
                    .await;
            }
            return true;
        }

        let backoff = self.config.reconnect_backoff(attempt);
        warn!(
            chain_id = self.chain_id(),
            attempt = attempt + 1,
            max_attempts = self.config.max_reconnect_attempts,
            backoff_ms = backoff.as_millis() as u64,
            reason,
            "Chain transport failure, backing off"
        );
        sleep_or_shutdown(backoff, shutdown).await
    }
}

/// Returns true if shutdown was signalled before the sleep finished
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => true,
    }
}

/// Scan `[next_block, tip - confirmations]` in `max_block_range` chunks
async fn poll_once(shared: &ListenerShared) -> Result<usize> {
    let chain_id = shared.chain_id();
    let tip = shared.source.block_number().await?;
    shared.tip.fetch_max(tip, Ordering::Relaxed);
    metrics::set_latest_block(chain_id, tip);

    let safe_block = tip.saturating_sub(shared.profile.confirmations);
    let mut from_block = shared.next_block.load(Ordering::Relaxed);
    if from_block > safe_block {
        return Ok(0);
    }

    let chunk = shared.config.max_block_range.max(1);
    let mut forwarded = 0usize;
    while from_block <= safe_block {
        let to_block = from_block.saturating_add(chunk - 1).min(safe_block);
        let events = shared
            .source
            .events_in_range(from_block, to_block)
            .await
            .wrap_err_with(|| format!("Failed to query blocks {}..={}", from_block, to_block))?;

        for event in events {
            if shared.emit(event).await {
                forwarded += 1;
            }
        }

        shared.next_block.store(to_block + 1, Ordering::Relaxed);
        from_block = to_block + 1;
    }

    metrics::record_successful_poll(chain_id, safe_block);
    if forwarded > 0 {
        info!(
            chain_id,
            forwarded,
            through_block = safe_block,
            "Poll reconciliation forwarded events"
        );
    }
    Ok(forwarded)
}

async fn run_poll(shared: Arc<ListenerShared>, mut shutdown: watch::Receiver<bool>) {
    let poll_interval = Duration::from_millis(shared.config.poll_interval_ms);
    loop {
        if shared.parked.load(Ordering::Relaxed) {
            break;
        }
        match poll_once(&shared).await {
            Ok(_) => {
                shared.mark_healthy();
                if sleep_or_shutdown(poll_interval, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                if shared.on_transport_failure(&format!("{:#}", e), &mut shutdown).await {
                    break;
                }
            }
        }
    }
    debug!(chain_id = shared.chain_id(), "Poll task exited");
}

async fn run_subscription(shared: Arc<ListenerShared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if shared.parked.load(Ordering::Relaxed) || *shutdown.borrow() {
            break;
        }
        let mut stream = match shared.source.subscribe().await {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                debug!(
                    chain_id = shared.chain_id(),
                    "No push transport configured, relying on poll reconciliation"
                );
                break;
            }
            Err(e) => {
                if shared.on_transport_failure(&format!("{:#}", e), &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        shared.subscribed.store(true, Ordering::Relaxed);
        shared.mark_healthy();
        info!(chain_id = shared.chain_id(), "Live subscription established");

        loop {
            tokio::select! {
                maybe_event = stream.recv() => match maybe_event {
                    Some(event) => {
                        shared.emit(event).await;
                    }
                    None => break,
                },
                _ = shutdown.changed() => {
                    shared.subscribed.store(false, Ordering::Relaxed);
                    return;
                }
            }
        }

        shared.subscribed.store(false, Ordering::Relaxed);
        if shared
            .on_transport_failure("subscription closed", &mut shutdown)
            .await
        {
            break;
        }
    }
    debug!(chain_id = shared.chain_id(), "Subscription task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chain_profile, message_sent_event, sample_message, MockSourceChain};

    fn fast_config() -> ListenerConfig {
        ListenerConfig {
            poll_interval_ms: 20,
            max_block_range: 10,
            reconnect_base_ms: 1,
            reconnect_max_ms: 5,
            max_reconnect_attempts: 2,
            seen_cache_size: 1_000,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<ListenerEvent>) -> ListenerEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for listener event")
            .expect("listener channel closed")
    }

    #[tokio::test]
    async fn test_initialize_fails_when_unreachable() {
        let source = Arc::new(MockSourceChain::new(1));
        source.set_failing(true);
        let (tx, _rx) = mpsc::channel(16);
        let result = ChainListener::initialize(chain_profile(1), fast_config(), source, tx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_poll_chunks_and_respects_confirmations() {
        let source = Arc::new(MockSourceChain::new(1));
        source.push_event(message_sent_event(sample_message(1, 2, 0), 5, 0));
        source.push_event(message_sent_event(sample_message(1, 2, 1), 25, 0));
        source.set_tip(30);

        let mut profile = chain_profile(1);
        profile.confirmations = 6;
        let (tx, mut rx) = mpsc::channel(16);
        let listener = ChainListener::initialize(profile, fast_config(), source.clone(), tx)
            .await
            .unwrap();

        assert_eq!(listener.poll_now().await.unwrap(), 1);
        assert_eq!(source.requested_ranges(), vec![(0, 9), (10, 19), (20, 24)]);
        assert_eq!(listener.status().last_processed_block, 24);

        match next_event(&mut rx).await {
            ListenerEvent::NewEvent(e) => assert_eq!(e.block_number, 5),
            other => panic!("unexpected event {:?}", other),
        }

        // block 25 becomes safe once the tip moves
        source.set_tip(31);
        assert_eq!(listener.poll_now().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_subscription_and_poll_dedupe() {
        let source = Arc::new(MockSourceChain::new(1));
        let event = message_sent_event(sample_message(1, 2, 7), 3, 0);
        source.push_event(event.clone());
        let push = source.arm_subscription();

        let (tx, mut rx) = mpsc::channel(16);
        let listener = ChainListener::initialize(chain_profile(1), fast_config(), source, tx)
            .await
            .unwrap();

        push.send(event.clone()).await.unwrap();
        listener.start();

        assert!(matches!(next_event(&mut rx).await, ListenerEvent::NewEvent(_)));
        // the poll path observes the same event and several poll cycles pass
        tokio::time::sleep(Duration::from_millis(100)).await;
        push.send(event).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_parks_after_max_attempts() {
        let source = Arc::new(MockSourceChain::new(1));
        let (tx, mut rx) = mpsc::channel(16);
        let listener =
            ChainListener::initialize(chain_profile(1), fast_config(), source.clone(), tx)
                .await
                .unwrap();

        source.set_failing(true);
        listener.start();

        match next_event(&mut rx).await {
            ListenerEvent::ConnectionFailed { chain_id, .. } => assert_eq!(chain_id, 1),
            other => panic!("unexpected event {:?}", other),
        }
        listener.stop().await;
        assert!(listener.is_parked());
        assert!(!listener.status().connected);

        source.set_failing(false);
        listener.reinitialize().await.unwrap();
        assert!(!listener.is_parked());
        assert!(listener.status().connected);
        listener.stop().await;
    }
}
