//! Hash computation for relay messages and Merkle nodes
//!
//! The message hash must match the destination contract's recomputation:
//! keccak256(abi.encode(nonce, sourceChainId, destChainId, sender, target,
//! keccak256(payload), gasLimit, timestamp)), every value as a 32-byte word.

use alloy::primitives::{Address, B256};
use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Left-pad a u64 into a big-endian 32-byte ABI word
fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..32].copy_from_slice(&value.to_be_bytes());
    word
}

/// Left-pad a 20-byte address into a 32-byte ABI word
pub fn address_to_bytes32(addr: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(addr.as_slice());
    word
}

/// Compute the content hash of a relay message (the Merkle leaf)
#[allow(clippy::too_many_arguments)]
pub fn compute_message_hash(
    nonce: u64,
    source_chain_id: u64,
    dest_chain_id: u64,
    sender: &Address,
    target: &Address,
    payload: &[u8],
    gas_limit: u64,
    timestamp: u64,
) -> B256 {
    // abi.encode layout: 8 words * 32 bytes = 256 bytes
    let mut data = [0u8; 256];
    data[0..32].copy_from_slice(&u64_word(nonce));
    data[32..64].copy_from_slice(&u64_word(source_chain_id));
    data[64..96].copy_from_slice(&u64_word(dest_chain_id));
    data[96..128].copy_from_slice(&address_to_bytes32(sender));
    data[128..160].copy_from_slice(&address_to_bytes32(target));
    data[160..192].copy_from_slice(&keccak256(payload));
    data[192..224].copy_from_slice(&u64_word(gas_limit));
    data[224..256].copy_from_slice(&u64_word(timestamp));

    B256::from(keccak256(&data))
}

/// Hash two sibling nodes in canonical (ascending) order.
///
/// Ordering the pair makes verification independent of left/right position,
/// which is how the destination contract recomputes the root.
pub fn hash_sorted_pair(a: &B256, b: &B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut data = [0u8; 64];
    data[0..32].copy_from_slice(lo.as_slice());
    data[32..64].copy_from_slice(hi.as_slice());
    B256::from(keccak256(&data))
}

/// Convert bytes32 to a 0x-prefixed hex string
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        // keccak256("") is a well-known constant
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_message_hash_changes_with_every_field() {
        let sender = Address::repeat_byte(0xaa);
        let target = Address::repeat_byte(0xbb);
        let base = compute_message_hash(1, 1, 2, &sender, &target, b"", 200_000, 1000);

        assert_ne!(
            base,
            compute_message_hash(2, 1, 2, &sender, &target, b"", 200_000, 1000)
        );
        assert_ne!(
            base,
            compute_message_hash(1, 3, 2, &sender, &target, b"", 200_000, 1000)
        );
        assert_ne!(
            base,
            compute_message_hash(1, 1, 2, &target, &sender, b"", 200_000, 1000)
        );
        assert_ne!(
            base,
            compute_message_hash(1, 1, 2, &sender, &target, b"\x01", 200_000, 1000)
        );
        assert_ne!(
            base,
            compute_message_hash(1, 1, 2, &sender, &target, b"", 300_000, 1000)
        );
        // Deterministic
        assert_eq!(
            base,
            compute_message_hash(1, 1, 2, &sender, &target, b"", 200_000, 1000)
        );
    }

    #[test]
    fn test_sorted_pair_is_order_independent() {
        let a = B256::repeat_byte(1);
        let b = B256::repeat_byte(2);
        assert_eq!(hash_sorted_pair(&a, &b), hash_sorted_pair(&b, &a));
        assert_ne!(hash_sorted_pair(&a, &b), hash_sorted_pair(&a, &a));
    }

    #[test]
    fn test_address_to_bytes32() {
        let addr = Address::repeat_byte(0x11);
        let word = address_to_bytes32(&addr);
        assert_eq!(&word[0..12], &[0u8; 12]);
        assert_eq!(&word[12..32], addr.as_slice());
    }

    #[test]
    fn test_bytes32_to_hex() {
        let hex = bytes32_to_hex(&[0xab; 32]);
        assert!(hex.starts_with("0xabab"));
        assert_eq!(hex.len(), 66);
    }
}
