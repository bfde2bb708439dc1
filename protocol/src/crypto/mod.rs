//! # Cryptographic Primitives for tally
//!
//! Everything that authenticates a ledger operation flows through here:
//!
//! - **secp256k1** keypairs and recoverable ECDSA signatures (`k256`).
//! - **Keccak-256** for operation hashes and addresses.
//! - **BLAKE3** for internal state fingerprints.
//!
//! These are thin, typed wrappers around audited implementations.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, contract_address, keccak, signed_message_hash};
pub use keys::{address_of, KeyError, Keypair};
pub use signatures::{recover_signer, SignatureError};
