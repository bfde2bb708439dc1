//! # Ledger Errors
//!
//! One error type for every contract in the crate. A rejected transition
//! never leaves partial state behind, so callers only need to know *why* it
//! was rejected, never how far it got.

use alloy_primitives::U256;
use tally_protocol::crypto::SignatureError;
use thiserror::Error;

/// Why a ledger transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Signature missing, malformed, or recovering to someone other than
    /// the claimed signer.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Nonce mismatch, hash already redeemed, or a query resolved twice.
    #[error("replay rejected: {0}")]
    ReplayRejected(String),

    /// Balance, allowance, holding or custody too small.
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        /// What the account actually has.
        available: U256,
        /// What the transition needed.
        required: U256,
    },

    /// Malformed request: zero address, length mismatch, unknown asset,
    /// unknown selector, short call data, arithmetic overflow.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller lacks the role the operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// New trade requests are refused while the engine is paused.
    #[error("trading is paused")]
    Paused,

    /// Oracle payload could not be turned into the prices a trade needs.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<SignatureError> for LedgerError {
    fn from(err: SignatureError) -> Self {
        LedgerError::AuthenticationFailure(err.to_string())
    }
}

impl LedgerError {
    pub(crate) fn insufficient(available: U256, required: U256) -> Self {
        LedgerError::InsufficientFunds {
            available,
            required,
        }
    }

    pub(crate) fn overflow(context: &str) -> Self {
        LedgerError::InvalidArgument(format!("arithmetic overflow in {context}"))
    }
}
