//! # Asset Registry
//!
//! Tradable assets are identified by small integers. Ids come in pairs: an
//! even id is the asset itself, the following odd id is its *inverse* (a
//! position that gains when the asset's USD price falls). Both ids of a
//! pair share one price-feed symbol.
//!
//! The first two pairs are reserved for the platform's own tokens:
//!
//! | id | asset            |
//! |----|------------------|
//! | 0  | COIN             |
//! | 1  | COIN (inverse)   |
//! | 2  | CASH             |
//! | 3  | CASH (inverse)   |
//!
//! An id whose symbol is empty is unknown and cannot be traded.

use serde::{Deserialize, Serialize};
use std::fmt;
use tally_protocol::config::{CASH_SYMBOL, COIN_SYMBOL};

use crate::error::{LedgerError, LedgerResult};

pub type AssetId = u64;

pub const COIN_ID: AssetId = 0;
pub const COIN_INV: AssetId = 1;
pub const CASH_ID: AssetId = 2;
pub const CASH_INV: AssetId = 3;

/// Feeds listed at deployment, after the two native pairs.
const DEFAULT_FEEDS: [&str; 9] = ["BTC", "ETH", "XRP", "LTC", "DASH", "BCH", "XMR", "XEM", "EOS"];

/// Which native token pays for (and receives the proceeds of) a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentToken {
    Coin,
    Cash,
}

impl PaymentToken {
    /// Asset id priced in slot 0 of every oracle payload for this payment.
    pub fn self_asset(self) -> AssetId {
        match self {
            PaymentToken::Coin => COIN_ID,
            PaymentToken::Cash => CASH_ID,
        }
    }

    /// The other native token's regular id.
    pub fn counter_asset(self) -> AssetId {
        match self {
            PaymentToken::Coin => CASH_ID,
            PaymentToken::Cash => COIN_ID,
        }
    }

    pub fn counter(self) -> PaymentToken {
        match self {
            PaymentToken::Coin => PaymentToken::Cash,
            PaymentToken::Cash => PaymentToken::Coin,
        }
    }
}

impl fmt::Display for PaymentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentToken::Coin => write!(f, "COIN"),
            PaymentToken::Cash => write!(f, "CASH"),
        }
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Symbol table indexed by asset id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistry {
    symbols: Vec<String>,
}

impl Default for AssetRegistry {
    fn default() -> Self {
        let mut registry = Self {
            symbols: Vec::new(),
        };
        for symbol in [COIN_SYMBOL, CASH_SYMBOL].into_iter().chain(DEFAULT_FEEDS) {
            registry.push_pair(symbol, true);
        }
        registry
    }
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids (regular and inverse) allocated so far.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Price-feed symbol of `id`. Unknown or disabled ids are rejected.
    pub fn symbol(&self, id: AssetId) -> LedgerResult<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.symbols.get(index))
            .filter(|symbol| !symbol.is_empty())
            .map(String::as_str)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("unknown asset id {id}")))
    }

    pub fn is_inverse(id: AssetId) -> bool {
        id % 2 == 1
    }

    /// Append a new pair and return the regular id. Without an inverse the
    /// odd slot is allocated but left disabled.
    pub fn add_asset(&mut self, symbol: &str, with_inverse: bool) -> LedgerResult<AssetId> {
        validate_symbol(symbol)?;
        if symbol.is_empty() {
            return Err(LedgerError::InvalidArgument("new asset needs a symbol".into()));
        }
        Ok(self.push_pair(symbol, with_inverse))
    }

    /// Change the symbol of an existing id. An empty symbol disables it.
    pub fn edit_asset(&mut self, id: AssetId, symbol: &str) -> LedgerResult<()> {
        validate_symbol(symbol)?;
        let slot = usize::try_from(id)
            .ok()
            .and_then(|index| self.symbols.get_mut(index))
            .ok_or_else(|| LedgerError::InvalidArgument(format!("asset id {id} not allocated")))?;
        *slot = symbol.to_string();
        Ok(())
    }

    fn push_pair(&mut self, symbol: &str, with_inverse: bool) -> AssetId {
        let id = self.symbols.len() as AssetId;
        self.symbols.push(symbol.to_string());
        self.symbols.push(if with_inverse {
            symbol.to_string()
        } else {
            String::new()
        });
        id
    }
}

/// Symbols end up inside a URL query; only upper-case alphanumerics pass.
fn validate_symbol(symbol: &str) -> LedgerResult<()> {
    if symbol
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        Ok(())
    } else {
        Err(LedgerError::InvalidArgument(format!("invalid asset symbol {symbol:?}")))
    }
}
