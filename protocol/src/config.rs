//! # Protocol Configuration & Constants
//!
//! Every magic number in tally lives here. The ledger components in
//! `tally-contracts` and the operator CLI both read from this module, so a
//! constant defined twice is a bug waiting to diverge.
//!
//! Values fall into three groups: signature envelope parameters (fixed by
//! the wider secp256k1 ecosystem and not ours to change), token and asset
//! defaults for a fresh deployment, and oracle/fee defaults that an operator
//! can override through `MarketConfig`.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version, reported by `tally-node version`.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version tag written into the persisted deployment manifest. Bump when the
/// on-disk layout of a component changes.
pub const STORAGE_FORMAT_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// secp256k1 with public-key recovery, the same scheme every EVM wallet
/// produces when asked to sign a 32-byte hash.
pub const SIGNING_ALGORITHM: &str = "secp256k1-ecdsa-recoverable";

/// Secret key length in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Recoverable signature length: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Address length in bytes: the tail of keccak256(uncompressed pubkey).
pub const ADDRESS_LENGTH: usize = 20;

/// Offset added to the recovery id by wallets following the legacy
/// convention (`v` = 27 or 28).
pub const RECOVERY_ID_OFFSET: u8 = 27;

/// Prefix wrapped around a 32-byte hash before signing. Wallets apply it
/// to anything they sign as a "message", which keeps a pre-signed ledger
/// operation from ever being replayable as a raw transaction.
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Leading byte of every pre-signed operation hash preimage.
pub const OPERATION_HASH_DOMAIN: u8 = 0x01;

/// Leading byte of every revocation hash preimage. Must differ from
/// [`OPERATION_HASH_DOMAIN`].
pub const REVOKE_HASH_DOMAIN: u8 = 0x02;

// ---------------------------------------------------------------------------
// Token Defaults
// ---------------------------------------------------------------------------

/// Decimals of both native tokens.
pub const TOKEN_DECIMALS: u8 = 18;

/// Whole-token supply minted to the owner at deployment. Multiply by
/// `10^TOKEN_DECIMALS` for the base-unit supply.
pub const DEFAULT_TOTAL_SUPPLY_TOKENS: u64 = 107_142_857;

/// Ticker of the primary native token.
pub const COIN_SYMBOL: &str = "COIN";

/// Ticker of the secondary native token.
pub const CASH_SYMBOL: &str = "CASH";

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Oracle prices are fixed point with 18 decimals. 1.0 USD == 10^18.
pub const PRICE_DECIMALS: u32 = 18;

/// `10^PRICE_DECIMALS`.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Quote currency requested from the price feed.
pub const QUOTE_CURRENCY: &str = "USD";

/// Base URL used when a trade is paid in COIN. The payment token's own
/// symbol is always the first requested symbol so that slot 0 of the
/// response is its price.
pub const DEFAULT_COIN_URL: &str = "https://min-api.cryptocompare.com/data/pricemulti?fsyms=COIN,";

/// Base URL used when a trade is paid in CASH.
pub const DEFAULT_CASH_URL: &str = "https://min-api.cryptocompare.com/data/pricemulti?fsyms=CASH,";

/// Suffix closing every price request URL.
pub const URL_SUFFIX: &str = "&tsyms=USD";

/// Gas price forwarded to the oracle with each query (20 gwei).
pub const DEFAULT_ORACLE_GAS_PRICE: u64 = 20_000_000_000;

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Basis-point denominator. 10 000 bps == 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Default percentage fee on trade value: 0.5%.
pub const DEFAULT_FEE_BPS: u32 = 50;

/// Upper bound accepted for the percentage fee.
pub const MAX_FEE_BPS: u32 = 1_000;

/// Default flat USD fee in cents. Zero leaves the percentage fee alone.
pub const DEFAULT_FLAT_FEE_CENTS: u64 = 0;

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Most asset ids a single holdings read may cover.
pub const MAX_HOLDINGS_PAGE: u64 = 1_024;

/// Convert USD cents into an 18-decimal fixed-point USD amount.
pub fn cents_to_price_units(cents: u64) -> u128 {
    cents as u128 * (PRICE_SCALE / 100)
}
