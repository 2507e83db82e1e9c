//! Proof builder
//!
//! Accumulates observed messages per `(chain, block)` and serves roots and
//! inclusion proofs. Trees are built lazily and cached; adding a message to
//! a block drops that block's tree and every cached proof for it.
//!
//! Leaves are sorted before building so the root does not depend on the
//! order in which the subscription and poll paths delivered the messages.

use alloy::primitives::B256;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::types::{ChainId, ProofBundle, RelayMessage};

pub mod merkle;

pub use merkle::{verify_proof, MerkleTree};

#[derive(Default)]
struct BlockEntry {
    messages: BTreeMap<B256, RelayMessage>,
    tree: Option<MerkleTree>,
    proofs: HashMap<B256, ProofBundle>,
}

impl BlockEntry {
    fn tree(&mut self) -> Option<&MerkleTree> {
        if self.tree.is_none() {
            // BTreeMap keys iterate in ascending order
            let leaves: Vec<B256> = self.messages.keys().copied().collect();
            self.tree = MerkleTree::new(&leaves);
        }
        self.tree.as_ref()
    }
}

#[derive(Default)]
pub struct ProofBuilder {
    blocks: BTreeMap<(ChainId, u64), BlockEntry>,
}

impl ProofBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message under its source block. Returns false if the same
    /// content hash is already present for that block.
    pub fn add_message(&mut self, chain_id: ChainId, block_number: u64, message: RelayMessage) -> bool {
        let entry = self.blocks.entry((chain_id, block_number)).or_default();
        if entry.messages.contains_key(&message.message_hash) {
            return false;
        }
        debug!(
            chain_id,
            block_number,
            nonce = message.nonce,
            message_hash = %message.message_hash,
            "Message indexed for proof"
        );
        entry.messages.insert(message.message_hash, message);
        entry.tree = None;
        entry.proofs.clear();
        true
    }

    /// Tree over every message registered for the block, or `None` if empty
    pub fn build_tree(&mut self, chain_id: ChainId, block_number: u64) -> Option<&MerkleTree> {
        self.blocks.get_mut(&(chain_id, block_number))?.tree()
    }

    /// Inclusion proof for `leaf`. `None` means the message is unknown for
    /// this block, i.e. no proof is available.
    pub fn generate_proof(
        &mut self,
        chain_id: ChainId,
        block_number: u64,
        leaf: &B256,
    ) -> Option<ProofBundle> {
        let entry = self.blocks.get_mut(&(chain_id, block_number))?;
        if let Some(bundle) = entry.proofs.get(leaf) {
            return Some(bundle.clone());
        }

        let tree = entry.tree()?;
        let index = tree.index_of(leaf)?;
        let bundle = ProofBundle {
            root: tree.root(),
            leaf: *leaf,
            proof: tree.proof(index)?,
            index,
        };
        entry.proofs.insert(*leaf, bundle.clone());
        Some(bundle)
    }

    pub fn get_root(&mut self, chain_id: ChainId, block_number: u64) -> Option<B256> {
        self.build_tree(chain_id, block_number).map(MerkleTree::root)
    }

    /// Drop trees, messages and cached proofs for blocks below `keep_from`.
    /// Returns the number of blocks removed.
    pub fn prune_old_blocks(&mut self, chain_id: ChainId, keep_from: u64) -> usize {
        let stale: Vec<(ChainId, u64)> = self
            .blocks
            .range((chain_id, 0)..(chain_id, keep_from))
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            self.blocks.remove(key);
        }
        if !stale.is_empty() {
            debug!(chain_id, keep_from, pruned = stale.len(), "Pruned proof blocks");
        }
        stale.len()
    }

    /// Highest block with registered messages for a chain
    pub fn latest_block(&self, chain_id: ChainId) -> Option<u64> {
        self.blocks
            .range((chain_id, 0)..=(chain_id, u64::MAX))
            .next_back()
            .map(|((_, block), _)| *block)
    }

    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.blocks.keys().map(|(chain, _)| *chain).collect();
        chains.dedup();
        chains
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn message_count(&self) -> usize {
        self.blocks.values().map(|b| b.messages.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_message;

    #[test]
    fn test_proofs_verify_against_root() {
        let mut builder = ProofBuilder::new();
        let messages: Vec<_> = (0..5).map(|n| sample_message(1, 2, n)).collect();
        for m in &messages {
            assert!(builder.add_message(1, 100, m.clone()));
        }

        let root = builder.get_root(1, 100).unwrap();
        for m in &messages {
            let bundle = builder.generate_proof(1, 100, &m.message_hash).unwrap();
            assert_eq!(bundle.root, root);
            assert_eq!(bundle.leaf, m.message_hash);
            assert!(verify_proof(&bundle.leaf, &bundle.proof, &root));
        }
    }

    #[test]
    fn test_proof_does_not_verify_against_other_block() {
        let mut builder = ProofBuilder::new();
        let a = sample_message(1, 2, 1);
        builder.add_message(1, 100, a.clone());
        builder.add_message(1, 100, sample_message(1, 2, 2));
        builder.add_message(1, 101, sample_message(1, 2, 3));
        builder.add_message(1, 101, sample_message(1, 2, 4));

        let bundle = builder.generate_proof(1, 100, &a.message_hash).unwrap();
        let other_root = builder.get_root(1, 101).unwrap();
        assert!(!verify_proof(&bundle.leaf, &bundle.proof, &other_root));
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let mut builder = ProofBuilder::new();
        let m = sample_message(1, 2, 1);
        builder.add_message(1, 100, m.clone());
        builder.add_message(1, 100, sample_message(1, 2, 2));
        let root = builder.get_root(1, 100).unwrap();

        assert!(!builder.add_message(1, 100, m));
        assert_eq!(builder.get_root(1, 100).unwrap(), root);
        assert_eq!(builder.build_tree(1, 100).unwrap().leaf_count(), 2);
        assert_eq!(builder.message_count(), 2);
    }

    #[test]
    fn test_add_invalidates_cached_proof() {
        let mut builder = ProofBuilder::new();
        let m = sample_message(1, 2, 1);
        builder.add_message(1, 100, m.clone());
        let before = builder.generate_proof(1, 100, &m.message_hash).unwrap();

        builder.add_message(1, 100, sample_message(1, 2, 2));
        let after = builder.generate_proof(1, 100, &m.message_hash).unwrap();
        assert_ne!(before.root, after.root);
        assert_eq!(after.root, builder.get_root(1, 100).unwrap());
        assert!(verify_proof(&after.leaf, &after.proof, &after.root));
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let a = sample_message(1, 2, 1);
        let b = sample_message(1, 2, 2);
        let mut first = ProofBuilder::new();
        first.add_message(1, 7, a.clone());
        first.add_message(1, 7, b.clone());
        let mut second = ProofBuilder::new();
        second.add_message(1, 7, b);
        second.add_message(1, 7, a);
        assert_eq!(first.get_root(1, 7), second.get_root(1, 7));
    }

    #[test]
    fn test_unknown_message_has_no_proof() {
        let mut builder = ProofBuilder::new();
        builder.add_message(1, 100, sample_message(1, 2, 1));
        let unknown = sample_message(1, 2, 9).message_hash;
        assert!(builder.generate_proof(1, 100, &unknown).is_none());
        assert!(builder.generate_proof(1, 101, &unknown).is_none());
        assert!(builder.build_tree(1, 101).is_none());
        assert!(builder.get_root(3, 100).is_none());
    }

    #[test]
    fn test_prune_old_blocks() {
        let mut builder = ProofBuilder::new();
        for block in [10, 20, 30] {
            builder.add_message(1, block, sample_message(1, 2, block));
        }
        builder.add_message(2, 5, sample_message(2, 1, 5));

        assert_eq!(builder.prune_old_blocks(1, 25), 2);
        assert_eq!(builder.block_count(), 2);
        assert!(builder.get_root(1, 10).is_none());
        assert!(builder.get_root(1, 30).is_some());
        // other chains untouched
        assert!(builder.get_root(2, 5).is_some());
        assert_eq!(builder.latest_block(1), Some(30));
        assert_eq!(builder.chains(), vec![1, 2]);
    }
}
