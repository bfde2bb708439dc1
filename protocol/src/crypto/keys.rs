//! # Key Management
//!
//! secp256k1 keypairs and the address scheme built on them.
//!
//! An address is the last 20 bytes of keccak256 over the 64-byte
//! uncompressed public key (the SEC1 encoding minus its `0x04` tag). Every
//! signer, relayer and contract in tally is identified this way.
//!
//! Key bytes are never logged.

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::signed_message_hash;
use super::signatures::{sign_prehash, SignatureError};
use crate::config::{SECRET_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
}

/// A signing identity.
///
/// Deliberately not `Serialize`: exporting a secret is an explicit call to
/// [`Keypair::secret_bytes`].
///
/// # Examples
///
/// ```
/// use tally_protocol::crypto::{recover_signer, Keypair};
/// use tally_protocol::crypto::keccak;
///
/// let kp = Keypair::generate();
/// let hash = keccak(b"pay the relayer");
/// let sig = kp.sign_hash(&hash).unwrap();
/// assert_eq!(recover_signer(&hash, &sig).unwrap(), kp.address());
/// ```
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Import a keypair from a 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidSecretKey);
        }
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Import a keypair from a hex secret, with or without `0x`.
    pub fn from_secret_hex(secret: &str) -> Result<Self, KeyError> {
        let trimmed = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(trimmed).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Export the secret scalar.
    pub fn secret_bytes(&self) -> [u8; 32] {
        let bytes = self.signing_key.to_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        out
    }

    /// The verifying half of the pair.
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The address controlled by this keypair.
    pub fn address(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte hash the way a wallet does: the hash is wrapped in
    /// the signed-message envelope first.
    ///
    /// Returns `r || s || v` with `v` in {27, 28}.
    pub fn sign_hash(&self, hash: &B256) -> Result<[u8; SIGNATURE_LENGTH], SignatureError> {
        sign_prehash(&self.signing_key, &signed_message_hash(hash))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Derive the address of a verifying key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}
