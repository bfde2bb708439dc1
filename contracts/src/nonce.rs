//! # Nonce Registry
//!
//! Per-signer replay protection for pre-signed operations. Two mechanisms
//! work together:
//!
//! - a strictly increasing counter; a pre-signed operation must carry the
//!   signer's current value, and consuming it bumps the counter by one;
//! - a set of redeemed hashes per signer, which also lets a signer revoke a
//!   hash they have handed out but not yet seen redeemed.
//!
//! Neither ever shrinks.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRegistry {
    nonces: BTreeMap<Address, u64>,
    redeemed: BTreeMap<Address, BTreeSet<B256>>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The nonce the signer's next pre-signed operation must carry.
    pub fn current(&self, signer: &Address) -> u64 {
        self.nonces.get(signer).copied().unwrap_or(0)
    }

    /// Accept `supplied` only if it equals the current nonce, then advance.
    pub fn consume(&mut self, signer: &Address, supplied: u64) -> LedgerResult<()> {
        let current = self.current(signer);
        if supplied != current {
            return Err(LedgerError::ReplayRejected(format!(
                "nonce {supplied} does not match current nonce {current} for {signer}"
            )));
        }
        self.advance(signer);
        Ok(())
    }

    /// Advance unconditionally. Returns the nonce that was consumed.
    pub fn advance(&mut self, signer: &Address) -> u64 {
        let entry = self.nonces.entry(*signer).or_insert(0);
        let consumed = *entry;
        *entry = consumed.saturating_add(1);
        consumed
    }

    pub fn is_redeemed(&self, signer: &Address, hash: &B256) -> bool {
        self.redeemed
            .get(signer)
            .map(|set| set.contains(hash))
            .unwrap_or(false)
    }

    pub fn ensure_fresh(&self, signer: &Address, hash: &B256) -> LedgerResult<()> {
        if self.is_redeemed(signer, hash) {
            Err(LedgerError::ReplayRejected(format!(
                "hash {hash} already redeemed by {signer}"
            )))
        } else {
            Ok(())
        }
    }

    /// Record `hash` as spent for `signer`. Marking twice is a replay.
    pub fn mark_redeemed(&mut self, signer: &Address, hash: B256) -> LedgerResult<()> {
        self.ensure_fresh(signer, &hash)?;
        self.redeemed.entry(*signer).or_default().insert(hash);
        Ok(())
    }
}
