//! # Price Oracle Gateway
//!
//! The engine never fetches prices itself. It hands a URL to an external
//! oracle, receives a query id back, and later gets called with the raw
//! response for that id. This module covers both sides of that exchange:
//!
//! - [`PriceOracle`], the request half, with [`QueuedOracle`] as the
//!   in-process implementation that records requests for an operator (or a
//!   test) to answer;
//! - URL construction, tolerant payload scanning, the offset table that
//!   maps each requested asset onto a payload slot, and valuation.
//!
//! ## Payload shape
//!
//! Responses look like JSON but are not guaranteed to be valid JSON:
//!
//! ```text
//! {"COIN":{"USD":0.1554},{"BTC":{"USD":8193.14},"ETH":{"USD":473.36}}
//! ```
//!
//! Braces may be unbalanced or missing. The scanner only looks for
//! `"USD":<decimal>` entries, in order, and the symbol key right before each
//! one when present.
//!
//! ## Offset table
//!
//! Slot 0 always holds the payment token's own price. A requested asset
//! whose symbol is the payment token's symbol reuses slot 0, a symbol seen
//! earlier in the same request reuses that slot, and any other symbol takes
//! the next free slot. The feed deduplicates symbols, so the table is what
//! keeps position `i` of a request pointed at the right price.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tally_protocol::config::{PRICE_DECIMALS, PRICE_SCALE, QUOTE_CURRENCY, URL_SUFFIX};

use crate::assets::{AssetId, AssetRegistry, PaymentToken};
use crate::error::{LedgerError, LedgerResult};

// ---------------------------------------------------------------------------
// Oracle collaborator
// ---------------------------------------------------------------------------

/// The request half of an external price oracle.
pub trait PriceOracle {
    /// Address the oracle calls back from.
    fn oracle_address(&self) -> Address;

    /// Ask for the prices behind `url`. Returns the id the callback will
    /// carry.
    fn request(&mut self, url: &str, gas_price: U256) -> LedgerResult<B256>;

    /// Withdraw a request the engine refused to track. No callback will be
    /// accepted for it.
    fn cancel(&mut self, query_id: &B256);
}

/// One outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub query_id: B256,
    pub url: String,
    pub gas_price: U256,
}

/// Records requests and hands out sequential query ids starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOracle {
    address: Address,
    next_id: u64,
    requests: Vec<OracleRequest>,
}

impl QueuedOracle {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            next_id: 1,
            requests: Vec::new(),
        }
    }

    pub fn requests(&self) -> &[OracleRequest] {
        &self.requests
    }

    pub fn last_request(&self) -> Option<&OracleRequest> {
        self.requests.last()
    }

    /// Drop a request once its callback has been delivered.
    pub fn complete(&mut self, query_id: &B256) -> Option<OracleRequest> {
        let index = self.requests.iter().position(|r| r.query_id == *query_id)?;
        Some(self.requests.remove(index))
    }
}

impl PriceOracle for QueuedOracle {
    fn oracle_address(&self) -> Address {
        self.address
    }

    fn request(&mut self, url: &str, gas_price: U256) -> LedgerResult<B256> {
        let query_id = B256::from(U256::from(self.next_id).to_be_bytes::<32>());
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| LedgerError::overflow("oracle query ids"))?;
        self.requests.push(OracleRequest {
            query_id,
            url: url.to_string(),
            gas_price,
        });
        tracing::debug!(%query_id, url, "oracle query queued");
        Ok(query_id)
    }

    fn cancel(&mut self, query_id: &B256) {
        if self.complete(query_id).is_some() {
            tracing::debug!(%query_id, "oracle query withdrawn");
        }
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// `base_url` followed by `SYMBOL,` for every requested id, then the quote
/// suffix. Duplicates are kept; the feed collapses them.
pub fn craft_url(base_url: &str, assets: &AssetRegistry, ids: &[AssetId]) -> LedgerResult<String> {
    let mut url = String::from(base_url);
    for id in ids {
        url.push_str(assets.symbol(*id)?);
        url.push(',');
    }
    url.push_str(URL_SUFFIX);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Payload scanning
// ---------------------------------------------------------------------------

/// One price entry found in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    /// Symbol key preceding the entry, when the payload has one.
    pub symbol: Option<String>,
    /// 18-decimal fixed point.
    pub price: U256,
}

/// Parse a non-negative decimal into 18-decimal fixed point. Digits beyond
/// the 18th fractional place are truncated.
pub fn parse_decimal(text: &str) -> LedgerResult<U256> {
    let malformed = || LedgerError::MalformedPayload(format!("not a decimal price: {text:?}"));
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(malformed());
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let scale = U256::from(PRICE_SCALE);
    let mut value = U256::ZERO;
    for digit in whole.bytes() {
        value = value
            .checked_mul(U256::from(10u64))
            .and_then(|v| v.checked_add(U256::from(digit - b'0')))
            .ok_or_else(malformed)?;
    }
    value = value.checked_mul(scale).ok_or_else(malformed)?;

    let mut place = scale;
    for digit in fraction.bytes().take(PRICE_DECIMALS as usize) {
        place /= U256::from(10u64);
        value = place
            .checked_mul(U256::from(digit - b'0'))
            .and_then(|step| value.checked_add(step))
            .ok_or_else(malformed)?;
    }
    Ok(value)
}

/// Find every `"USD":<decimal>` entry in `payload`, in order.
pub fn parse_payload(payload: &str) -> LedgerResult<Vec<PriceQuote>> {
    let needle = format!("\"{QUOTE_CURRENCY}\":");
    let mut quotes = Vec::new();
    let mut cursor = 0;

    while let Some(found) = payload[cursor..].find(&needle) {
        let at = cursor + found;
        let after = &payload[at + needle.len()..];
        let trimmed = after.trim_start();
        let number_len = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let number = &trimmed[..number_len];
        if number.is_empty() {
            return Err(LedgerError::MalformedPayload(format!(
                "price entry {} has no number",
                quotes.len()
            )));
        }

        quotes.push(PriceQuote {
            symbol: symbol_before(&payload[..at]),
            price: parse_decimal(number)?,
        });
        cursor = at + needle.len() + (after.len() - trimmed.len()) + number_len;
    }

    if quotes.is_empty() {
        return Err(LedgerError::MalformedPayload("no prices in payload".into()));
    }
    Ok(quotes)
}

/// The `"SYM"` key in `..."SYM":{` right before a quote entry.
fn symbol_before(prefix: &str) -> Option<String> {
    let rest = prefix.trim_end().strip_suffix('{')?;
    let rest = rest.trim_end().strip_suffix(':')?;
    let rest = rest.trim_end().strip_suffix('"')?;
    let start = rest.rfind('"')?;
    let symbol = &rest[start + 1..];
    if symbol.is_empty() {
        None
    } else {
        Some(symbol.to_string())
    }
}

// ---------------------------------------------------------------------------
// Offset table
// ---------------------------------------------------------------------------

/// Mapping from request position to payload slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    /// Symbol expected in each slot; slot 0 is the payment token.
    slot_symbols: Vec<String>,
    /// Slot for each requested position.
    slots: Vec<usize>,
}

impl OffsetTable {
    pub fn build(self_symbol: &str, symbols: &[&str]) -> Self {
        let mut slot_symbols = vec![self_symbol.to_string()];
        let mut slots = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match slot_symbols.iter().position(|s| s == symbol) {
                Some(slot) => slots.push(slot),
                None => {
                    slot_symbols.push(symbol.to_string());
                    slots.push(slot_symbols.len() - 1);
                }
            }
        }
        Self {
            slot_symbols,
            slots,
        }
    }

    /// Payload slot for request position `index`.
    pub fn slot(&self, index: usize) -> Option<usize> {
        self.slots.get(index).copied()
    }

    /// Distinct entries the payload must contain.
    pub fn required_entries(&self) -> usize {
        self.slot_symbols.len()
    }

    /// Check a scanned payload against the table: enough entries, and any
    /// named entry carries the expected symbol.
    pub fn verify(&self, quotes: &[PriceQuote]) -> LedgerResult<()> {
        if quotes.len() < self.required_entries() {
            return Err(LedgerError::MalformedPayload(format!(
                "expected {} prices, payload has {}",
                self.required_entries(),
                quotes.len()
            )));
        }
        for (slot, expected) in self.slot_symbols.iter().enumerate() {
            if let Some(found) = &quotes[slot].symbol {
                if found != expected {
                    return Err(LedgerError::MalformedPayload(format!(
                        "price slot {slot} is {found}, expected {expected}"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoding & valuation
// ---------------------------------------------------------------------------

/// `10^36 / price`: the price of an inverse position.
pub fn invert_price(price: U256) -> LedgerResult<U256> {
    if price.is_zero() {
        return Err(LedgerError::MalformedPayload("cannot invert a zero price".into()));
    }
    let scale = U256::from(PRICE_SCALE);
    Ok(scale * scale / price)
}

/// Turn a payload into `[self_price, price(ids[0]), price(ids[1]), ...]`,
/// inverting prices for odd ids.
pub fn decode_prices(
    assets: &AssetRegistry,
    ids: &[AssetId],
    payment: PaymentToken,
    payload: &str,
) -> LedgerResult<Vec<U256>> {
    let self_symbol = assets.symbol(payment.self_asset())?;
    let symbols = ids
        .iter()
        .map(|id| assets.symbol(*id))
        .collect::<LedgerResult<Vec<_>>>()?;

    let table = OffsetTable::build(self_symbol, &symbols);
    let quotes = parse_payload(payload)?;
    table.verify(&quotes)?;

    let self_price = quotes[0].price;
    if self_price.is_zero() {
        return Err(LedgerError::MalformedPayload("payment token price is zero".into()));
    }

    let mut prices = Vec::with_capacity(ids.len() + 1);
    prices.push(self_price);
    for (index, id) in ids.iter().enumerate() {
        let slot = table
            .slot(index)
            .ok_or_else(|| LedgerError::MalformedPayload(format!("no slot for asset {id}")))?;
        let price = quotes[slot].price;
        prices.push(if AssetRegistry::is_inverse(*id) {
            invert_price(price)?
        } else {
            price
        });
    }
    Ok(prices)
}

/// `Σ amounts[i] · prices[i + 1] / prices[0]`, dividing once at the end.
pub fn calculate_value(amounts: &[U256], prices: &[U256]) -> LedgerResult<U256> {
    if prices.len() != amounts.len() + 1 {
        return Err(LedgerError::InvalidArgument(format!(
            "{} amounts need {} prices, got {}",
            amounts.len(),
            amounts.len() + 1,
            prices.len()
        )));
    }
    let self_price = prices[0];
    if self_price.is_zero() {
        return Err(LedgerError::MalformedPayload("payment token price is zero".into()));
    }

    let mut total = U256::ZERO;
    for (amount, price) in amounts.iter().zip(&prices[1..]) {
        let leg = amount
            .checked_mul(*price)
            .ok_or_else(|| LedgerError::overflow("trade value"))?;
        total = total
            .checked_add(leg)
            .ok_or_else(|| LedgerError::overflow("trade value"))?;
    }
    Ok(total / self_price)
}
