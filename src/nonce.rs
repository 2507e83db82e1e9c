//! Nonce sequencer
//!
//! Single-writer nonce allocation for one destination signer. Every
//! operation takes the same async mutex, so concurrent submissions on one
//! chain receive distinct, contiguous nonces in call order, while other
//! destination chains (each with their own sequencer) are unaffected.

use eyre::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::DestinationChain;
use crate::metrics;
use crate::types::ChainId;

/// Next nonce plus the nonces handed out but not yet confirmed or released
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NonceCursor {
    pub next: u64,
    pub in_flight: BTreeSet<u64>,
    /// Released nonces below `next`, reissued before fresh ones
    pub gaps: BTreeSet<u64>,
    pub synced: bool,
}

pub struct NonceSequencer {
    chain: Arc<dyn DestinationChain>,
    cursor: Mutex<NonceCursor>,
}

impl NonceSequencer {
    pub fn new(chain: Arc<dyn DestinationChain>) -> Self {
        Self {
            chain,
            cursor: Mutex::new(NonceCursor::default()),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    /// Fetch the authoritative next nonce and clear in-flight tracking
    pub async fn sync(&self) -> Result<u64> {
        let mut cursor = self.cursor.lock().await;
        self.sync_locked(&mut cursor).await
    }

    async fn sync_locked(&self, cursor: &mut NonceCursor) -> Result<u64> {
        let next = self.chain.transaction_count().await?;
        if cursor.synced && next != cursor.next {
            warn!(
                chain_id = self.chain_id(),
                local = cursor.next,
                chain = next,
                dropped_in_flight = cursor.in_flight.len(),
                "Nonce cursor resynced to chain value"
            );
        } else {
            info!(chain_id = self.chain_id(), next, "Nonce cursor synced");
        }
        cursor.next = next;
        cursor.in_flight.clear();
        cursor.gaps.clear();
        cursor.synced = true;
        Ok(next)
    }

    /// Resync after a submission failed with a nonce conflict
    pub async fn resync(&self) -> Result<u64> {
        metrics::record_nonce_resync(self.chain_id());
        self.sync().await
    }

    /// Allocate and reserve the next nonce. Syncs first if never synced.
    ///
    /// Values increase in call order, except that a released nonce below
    /// the cursor is handed out before any fresh one.
    pub async fn next_nonce(&self) -> Result<u64> {
        let mut cursor = self.cursor.lock().await;
        if !cursor.synced {
            self.sync_locked(&mut cursor).await?;
        }
        let nonce = match cursor.gaps.pop_first() {
            Some(gap) => gap,
            None => {
                let nonce = cursor.next;
                cursor.next += 1;
                nonce
            }
        };
        cursor.in_flight.insert(nonce);
        debug!(chain_id = self.chain_id(), nonce, "Nonce allocated");
        Ok(nonce)
    }

    /// Give back a nonce whose transaction was never broadcast.
    ///
    /// The most recently allocated nonce rolls the cursor back; an earlier
    /// one is kept as a gap and handed out by the next allocation.
    pub async fn release(&self, nonce: u64) {
        let mut cursor = self.cursor.lock().await;
        if !cursor.in_flight.remove(&nonce) {
            return;
        }
        cursor.gaps.insert(nonce);
        while let Some(top) = cursor.next.checked_sub(1) {
            if !cursor.gaps.remove(&top) {
                break;
            }
            cursor.next = top;
        }
        debug!(
            chain_id = self.chain_id(),
            nonce,
            next = cursor.next,
            gaps = cursor.gaps.len(),
            "Nonce released"
        );
    }

    /// Mark a nonce as consumed on chain
    pub async fn confirm(&self, nonce: u64) {
        let mut cursor = self.cursor.lock().await;
        cursor.in_flight.remove(&nonce);
    }

    pub async fn in_flight(&self) -> Vec<u64> {
        self.cursor.lock().await.in_flight.iter().copied().collect()
    }

    pub async fn cursor(&self) -> NonceCursor {
        self.cursor.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDestinationChain;

    fn sequencer(start: u64) -> (Arc<MockDestinationChain>, Arc<NonceSequencer>) {
        let chain = Arc::new(MockDestinationChain::new(2));
        chain.set_transaction_count(start);
        let seq = Arc::new(NonceSequencer::new(chain.clone()));
        (chain, seq)
    }

    #[tokio::test]
    async fn test_first_allocation_syncs() {
        let (_, seq) = sequencer(5);
        assert_eq!(seq.next_nonce().await.unwrap(), 5);
        assert_eq!(seq.next_nonce().await.unwrap(), 6);
        assert_eq!(seq.in_flight().await, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_concurrent_allocation_is_contiguous() {
        let (_, seq) = sequencer(0);
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let seq = seq.clone();
                tokio::spawn(async move { seq.next_nonce().await.unwrap() })
            })
            .collect();

        let mut nonces = Vec::new();
        for h in handles {
            nonces.push(h.await.unwrap());
        }
        nonces.sort();
        assert_eq!(nonces, (0..50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_allocation_follows_call_order() {
        let (_, seq) = sequencer(10);
        let a = seq.next_nonce().await.unwrap();
        let b = seq.next_nonce().await.unwrap();
        let c = seq.next_nonce().await.unwrap();
        assert!(a < b && b < c);
        assert_eq!((a, b, c), (10, 11, 12));
    }

    #[tokio::test]
    async fn test_release_last_rolls_back() {
        let (_, seq) = sequencer(0);
        let n = seq.next_nonce().await.unwrap();
        seq.release(n).await;
        assert_eq!(seq.next_nonce().await.unwrap(), n);
    }

    #[tokio::test]
    async fn test_release_earlier_is_reissued() {
        let (_, seq) = sequencer(0);
        let first = seq.next_nonce().await.unwrap();
        let second = seq.next_nonce().await.unwrap();
        seq.release(first).await;
        assert_eq!(seq.cursor().await.gaps.len(), 1);

        // the gap is filled before a fresh nonce is handed out
        assert_eq!(seq.next_nonce().await.unwrap(), first);
        assert_eq!(seq.next_nonce().await.unwrap(), second + 1);
        assert_eq!(seq.in_flight().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_release_collapses_trailing_gaps() {
        let (_, seq) = sequencer(0);
        let a = seq.next_nonce().await.unwrap();
        let b = seq.next_nonce().await.unwrap();
        seq.release(a).await;
        seq.release(b).await;
        let cursor = seq.cursor().await;
        assert_eq!(cursor.next, 0);
        assert!(cursor.gaps.is_empty());
    }

    #[tokio::test]
    async fn test_confirm_clears_in_flight() {
        let (_, seq) = sequencer(0);
        let n = seq.next_nonce().await.unwrap();
        seq.confirm(n).await;
        assert!(seq.in_flight().await.is_empty());
        assert_eq!(seq.next_nonce().await.unwrap(), n + 1);
    }

    #[tokio::test]
    async fn test_resync_resets_cursor() {
        let (chain, seq) = sequencer(0);
        seq.next_nonce().await.unwrap();
        seq.next_nonce().await.unwrap();
        chain.set_transaction_count(7);
        assert_eq!(seq.resync().await.unwrap(), 7);
        assert!(seq.in_flight().await.is_empty());
        assert_eq!(seq.next_nonce().await.unwrap(), 7);
    }
}
