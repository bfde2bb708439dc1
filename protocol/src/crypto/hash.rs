//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **Keccak-256** for everything a wallet has to agree with: operation
//!   hashes, the signed-message envelope and address derivation. These must
//!   be bit-for-bit identical to what external signers compute, so they go
//!   through `alloy_primitives`.
//!
//! - **BLAKE3** for tally-internal fingerprints such as market state roots,
//!   where nobody outside the process needs to reproduce the digest.

use alloy_primitives::{eip191_hash_message, keccak256, Address, B256};

/// Keccak-256 of arbitrary bytes.
///
/// # Example
///
/// ```
/// use tally_protocol::crypto::keccak;
///
/// let digest = keccak(b"");
/// assert_eq!(
///     hex::encode(digest),
///     "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
/// );
/// ```
pub fn keccak(data: &[u8]) -> B256 {
    keccak256(data)
}

/// Wrap a 32-byte hash in the signed-message envelope and hash again.
///
/// This is the digest a wallet actually signs when asked to sign `hash`,
/// so recovery must run against it rather than against `hash` itself.
pub fn signed_message_hash(hash: &B256) -> B256 {
    eip191_hash_message(hash)
}

/// Deterministic address for the `index`-th contract deployed by
/// `deployer`. Lets a fresh market wire its components together without a
/// chain handing out addresses.
pub fn contract_address(deployer: &Address, index: u64) -> Address {
    let mut preimage = Vec::with_capacity(20 + 8);
    preimage.extend_from_slice(deployer.as_slice());
    preimage.extend_from_slice(&index.to_be_bytes());
    let digest = keccak256(&preimage);
    Address::from_slice(&digest[12..])
}

/// BLAKE3 digest as a fixed-size array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}
