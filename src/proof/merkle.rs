//! Sorted-pair keccak Merkle tree
//!
//! Leaves are padded with zero hashes to the next power of two. Each parent
//! is `keccak256(min(a, b) || max(a, b))`, so a proof is just the list of
//! siblings from leaf to root with no left/right flags.

use alloy::primitives::B256;

use crate::hash::hash_sorted_pair;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `layers[0]` holds the padded leaves, the last layer holds the root
    layers: Vec<Vec<B256>>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree over `leaves`. Returns `None` for an empty set.
    pub fn new(leaves: &[B256]) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let width = leaves.len().next_power_of_two();
        let mut level: Vec<B256> = leaves.to_vec();
        level.resize(width, B256::ZERO);

        let mut layers = vec![level];
        while layers.last().is_some_and(|l| l.len() > 1) {
            let below = &layers[layers.len() - 1];
            let next: Vec<B256> = below
                .chunks(2)
                .map(|pair| hash_sorted_pair(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }

        Some(Self {
            layers,
            leaf_count: leaves.len(),
        })
    }

    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(B256::ZERO)
    }

    /// Leaves without padding
    pub fn leaves(&self) -> &[B256] {
        &self.layers[0][..self.leaf_count]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn index_of(&self, leaf: &B256) -> Option<usize> {
        self.leaves().iter().position(|l| l == leaf)
    }

    /// Sibling path for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<Vec<B256>> {
        if index >= self.leaf_count {
            return None;
        }
        let mut proof = Vec::with_capacity(self.depth());
        let mut idx = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            proof.push(layer[idx ^ 1]);
            idx /= 2;
        }
        Some(proof)
    }
}

/// Recompute the root from `leaf` and `proof` and compare
pub fn verify_proof(leaf: &B256, proof: &[B256], root: &B256) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |acc, sibling| hash_sorted_pair(&acc, sibling));
    computed == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<B256> {
        (1..=n).map(B256::repeat_byte).collect()
    }

    #[test]
    fn test_empty_tree() {
        assert!(MerkleTree::new(&[]).is_none());
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaf = B256::repeat_byte(7);
        let tree = MerkleTree::new(&[leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert_eq!(tree.proof(0).unwrap(), Vec::<B256>::new());
        assert!(verify_proof(&leaf, &[], &tree.root()));
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(2);
        let tree = MerkleTree::new(&l).unwrap();
        assert_eq!(tree.root(), hash_sorted_pair(&l[0], &l[1]));
        assert_eq!(tree.proof(0).unwrap(), vec![l[1]]);
        assert_eq!(tree.proof(1).unwrap(), vec![l[0]]);
    }

    #[test]
    fn test_padding_to_power_of_two() {
        let l = leaves(3);
        let tree = MerkleTree::new(&l).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.depth(), 2);

        let left = hash_sorted_pair(&l[0], &l[1]);
        let right = hash_sorted_pair(&l[2], &B256::ZERO);
        assert_eq!(tree.root(), hash_sorted_pair(&left, &right));
        assert!(tree.proof(3).is_none());
    }

    #[test]
    fn test_every_leaf_verifies() {
        for n in 1..=9u8 {
            let l = leaves(n);
            let tree = MerkleTree::new(&l).unwrap();
            for (i, leaf) in l.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(verify_proof(leaf, &proof, &tree.root()), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn test_proof_rejected_against_other_root() {
        let a = MerkleTree::new(&leaves(4)).unwrap();
        let b = MerkleTree::new(&[B256::repeat_byte(0x99), B256::repeat_byte(0x98)]).unwrap();
        let proof = a.proof(2).unwrap();
        assert!(!verify_proof(&B256::repeat_byte(3), &proof, &b.root()));
        assert!(!verify_proof(&B256::repeat_byte(0x42), &proof, &a.root()));
    }
}
