// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # tally Protocol: Core Library
//!
//! The primitives under the tally ledger: the things that have to be exactly
//! right before any balance moves.
//!
//! ## Architecture
//!
//! - **crypto**: secp256k1 keys, recoverable signatures, keccak/blake3
//!   hashing, the EIP-191 envelope and deterministic contract addresses.
//! - **storage**: sled-backed persistence of component states.
//! - **config**: protocol constants and deployment defaults.
//!
//! Ledger semantics (tokens, bank, holdings, investment engine) live in
//! `tally-contracts`, which builds on this crate.
//!
//! Address, hash and amount types are re-exported from `alloy-primitives`
//! so downstream crates agree on a single representation.

pub mod config;
pub mod crypto;
pub mod storage;

pub use alloy_primitives::{Address, B256, U256};
