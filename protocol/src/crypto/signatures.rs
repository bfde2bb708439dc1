//! # Signature Recovery
//!
//! tally never verifies a signature against a known public key. Instead it
//! *recovers* the signer's address from `(hash, signature)` and compares
//! that address against whoever the caller claims signed. This is the
//! only authentication path for pre-signed ledger operations.
//!
//! Signatures are 65 bytes, `r || s || v`. Both recovery-id conventions
//! seen in the wild are accepted (`v` ∈ {0, 1} and `v` ∈ {27, 28});
//! anything else is rejected before touching the curve. Recovery itself
//! is `alloy_primitives::Signature::recover_address_from_prehash`.

use alloy_primitives::{Address, Signature, B256, U256};
use k256::ecdsa::SigningKey;
use thiserror::Error;

use super::hash::signed_message_hash;
use crate::config::{RECOVERY_ID_OFFSET, SIGNATURE_LENGTH};

/// Errors during signing or recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("invalid signature length: expected 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("malformed signature scalars")]
    Malformed,

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("signing failed")]
    SigningFailed,
}

/// Sign an already-enveloped digest. Produces `v` in {27, 28}.
pub fn sign_prehash(
    key: &SigningKey,
    digest: &B256,
) -> Result<[u8; SIGNATURE_LENGTH], SignatureError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|_| SignatureError::SigningFailed)?;

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte() + RECOVERY_ID_OFFSET;
    Ok(out)
}

/// Recover the address that signed `hash`.
///
/// `hash` is the raw operation hash; the signed-message envelope is applied
/// here, matching [`crate::crypto::Keypair::sign_hash`].
pub fn recover_signer(hash: &B256, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(SignatureError::InvalidLength(signature.len()));
    }

    let v = signature[64];
    let y_parity = match v {
        0 | 1 => v == 1,
        27 | 28 => v - RECOVERY_ID_OFFSET == 1,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let r = U256::from_be_slice(&signature[..32]);
    let s = U256::from_be_slice(&signature[32..64]);
    if r.is_zero() || s.is_zero() {
        return Err(SignatureError::Malformed);
    }

    let digest = signed_message_hash(hash);
    Signature::new(r, s, y_parity)
        .recover_address_from_prehash(&digest)
        .map_err(|_| SignatureError::RecoveryFailed)
}
