//! Multi-chain hub
//!
//! Owns one `ChainListener` per configured source chain and merges their
//! output into a single channel. A chain that fails to initialize is logged
//! and left out; the others keep running.

use eyre::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{ChainListener, ListenerEvent, ListenerStatus};
use crate::chain::SourceChain;
use crate::config::{ChainProfile, ListenerConfig};
use crate::error::RelayError;
use crate::types::ChainId;

const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

pub struct MultiChainHub {
    config: ListenerConfig,
    listeners: BTreeMap<ChainId, ChainListener>,
    events_tx: mpsc::Sender<ListenerEvent>,
    events_rx: Option<mpsc::Receiver<ListenerEvent>>,
}

impl MultiChainHub {
    pub fn new(config: ListenerConfig) -> Self {
        Self::with_capacity(config, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(config: ListenerConfig, capacity: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        Self {
            config,
            listeners: BTreeMap::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Initialize a listener per chain. Returns the ids that connected.
    pub async fn initialize(
        &mut self,
        chains: Vec<(ChainProfile, Arc<dyn SourceChain>)>,
    ) -> Vec<ChainId> {
        for (profile, source) in chains {
            let chain_id = profile.chain_id;
            if self.listeners.contains_key(&chain_id) {
                warn!(chain_id, "Duplicate chain listener requested, skipping");
                continue;
            }
            let name = profile.name.clone();
            match ChainListener::initialize(
                profile,
                self.config.clone(),
                source,
                self.events_tx.clone(),
            )
            .await
            {
                Ok(listener) => {
                    self.listeners.insert(chain_id, listener);
                }
                Err(e) => {
                    error!(
                        chain_id,
                        chain_name = %name,
                        error = %format!("{:#}", e),
                        "Failed to initialize chain listener; continuing without it"
                    );
                }
            }
        }

        let active: Vec<ChainId> = self.listeners.keys().copied().collect();
        info!(active_chains = ?active, "Multi-chain hub initialized");
        active
    }

    /// Take the merged event stream. Only the first call returns `Some`.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ListenerEvent>> {
        self.events_rx.take()
    }

    pub fn start_all(&self) {
        for listener in self.listeners.values() {
            listener.start();
        }
    }

    pub async fn stop_all(&self) {
        for listener in self.listeners.values() {
            listener.stop().await;
        }
        info!("All chain listeners stopped");
    }

    /// Restart a parked listener
    pub async fn reinitialize(&self, chain_id: ChainId) -> Result<()> {
        let listener = self
            .listeners
            .get(&chain_id)
            .ok_or(RelayError::UnsupportedChain(chain_id))?;
        listener.reinitialize().await
    }

    pub fn listener(&self, chain_id: ChainId) -> Option<&ChainListener> {
        self.listeners.get(&chain_id)
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.listeners.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Per-chain status, computed on demand
    pub fn health(&self) -> BTreeMap<ChainId, ListenerStatus> {
        self.listeners
            .iter()
            .map(|(&chain_id, listener)| (chain_id, listener.status()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chain_profile, message_sent_event, sample_message, MockSourceChain};
    use std::time::Duration;

    fn fast_config() -> ListenerConfig {
        ListenerConfig {
            poll_interval_ms: 20,
            max_block_range: 100,
            reconnect_base_ms: 1,
            reconnect_max_ms: 5,
            max_reconnect_attempts: 1,
            seen_cache_size: 1_000,
        }
    }

    #[tokio::test]
    async fn test_failed_chain_is_excluded() {
        let healthy = Arc::new(MockSourceChain::new(1));
        let broken = Arc::new(MockSourceChain::new(2));
        broken.set_failing(true);

        let mut hub = MultiChainHub::new(fast_config());
        let active = hub
            .initialize(vec![
                (chain_profile(1), healthy as Arc<dyn SourceChain>),
                (chain_profile(2), broken as Arc<dyn SourceChain>),
            ])
            .await;

        assert_eq!(active, vec![1]);
        assert!(hub.listener(2).is_none());
        assert!(hub.reinitialize(2).await.is_err());
    }

    #[tokio::test]
    async fn test_merges_events_from_all_chains() {
        let a = Arc::new(MockSourceChain::new(1));
        let b = Arc::new(MockSourceChain::new(2));
        a.push_event(message_sent_event(sample_message(1, 2, 0), 4, 0));
        b.push_event(message_sent_event(sample_message(2, 1, 0), 9, 0));

        let mut hub = MultiChainHub::new(fast_config());
        hub.initialize(vec![
            (chain_profile(1), a as Arc<dyn SourceChain>),
            (chain_profile(2), b as Arc<dyn SourceChain>),
        ])
        .await;
        let mut events = hub.take_events().unwrap();
        assert!(hub.take_events().is_none());

        hub.start_all();
        let mut chains = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let ListenerEvent::NewEvent(record) = event {
                chains.push(record.chain_id);
            }
        }
        chains.sort();
        assert_eq!(chains, vec![1, 2]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let health = hub.health();
        assert_eq!(health[&1].last_processed_block, 4);
        assert_eq!(health[&2].last_processed_block, 9);
        hub.stop_all().await;
    }

    #[tokio::test]
    async fn test_one_chain_failure_leaves_others_running() {
        let a = Arc::new(MockSourceChain::new(1));
        let b = Arc::new(MockSourceChain::new(2));

        let mut hub = MultiChainHub::new(fast_config());
        hub.initialize(vec![
            (chain_profile(1), a.clone() as Arc<dyn SourceChain>),
            (chain_profile(2), b.clone() as Arc<dyn SourceChain>),
        ])
        .await;
        let mut events = hub.take_events().unwrap();
        hub.start_all();

        b.set_failing(true);
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let ListenerEvent::ConnectionFailed { chain_id, .. } = event {
                assert_eq!(chain_id, 2);
                break;
            }
        }

        a.push_event(message_sent_event(sample_message(1, 2, 5), 1, 0));
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ListenerEvent::NewEvent(r) if r.chain_id == 1));

        let health = hub.health();
        assert!(health[&1].connected);
        assert!(health[&2].parked);
        hub.stop_all().await;
    }
}
