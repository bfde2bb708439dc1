// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Tally Contracts
//!
//! Ledger logic for a tally deployment. Every contract is a plain value
//! whose methods are state transitions; a transition either commits in full
//! or returns an error and leaves the value as it was.
//!
//! - **Token**: fixed-supply token whose holders can sign operations
//!   off-line for a relayer to submit, reimbursing the relayer in tokens.
//! - **Investment**: buy/sell requests priced by an external oracle and
//!   settled against the holdings store and the bank.
//! - **Bank**: custody of the two native tokens.
//! - **Holdings**: per-user, per-asset positions.
//! - **Market**: owns one deployment of all of the above and persists it.
//!
//! ## Design Principles
//!
//! 1. All amounts are `U256` with checked arithmetic; an overflow is an
//!    error, never a wrap.
//! 2. Callers are explicit arguments. There is no ambient `msg.sender`.
//! 3. Cross-contract calls take the callee by `&mut`, so re-entry into a
//!    contract that is mid-transition does not type-check.
//! 4. Every contract state is serde-serializable for persistence.

pub mod access;
pub mod assets;
pub mod bank;
pub mod error;
pub mod holdings;
pub mod investment;
pub mod market;
pub mod nonce;
pub mod operation;
pub mod oracle;
pub mod receiver;
pub mod token;

pub use assets::{AssetId, AssetRegistry, PaymentToken, TradeSide};
pub use bank::Bank;
pub use error::{LedgerError, LedgerResult};
pub use holdings::HoldingsStore;
pub use investment::{FeeSchedule, Investment, LinkedContracts, Settlement, TradeIntent, TradeStatus};
pub use market::{Market, MarketConfig, MarketError, MarketResult, RelayReceipt};
pub use operation::{Authorization, Operation, RevokeRequest, SignedOperation};
pub use oracle::{PriceOracle, QueuedOracle};
pub use receiver::ApprovalReceiver;
pub use token::{MetaTxToken, TokenEvent, TokenMetadata};
