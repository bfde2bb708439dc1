//! # Storage Module
//!
//! On-disk persistence for a tally deployment. Components are plain serde
//! structs; this module only knows how to put their bincode encodings into
//! sled trees keyed by contract address and get them back out.
//!
//! Bincode is for storage. JSON is for configuration and humans.

pub mod db;

pub use db::{decode, encode, DbError, DbResult, LedgerDb};
