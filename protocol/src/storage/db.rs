//! # LedgerDb: Persistent Storage Engine
//!
//! Persistence for a tally deployment, built on sled's embedded key-value
//! store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key                  | Value                          |
//! |-------------|----------------------|--------------------------------|
//! | `contracts` | `address` (20B)      | `bincode(component state)`     |
//! | `metadata`  | key (UTF-8)          | value (bytes)                  |
//!
//! Each ledger component (token, bank, holdings store, engine, oracle) is
//! stored whole under its own address. The `metadata` tree carries the
//! deployment manifest naming which address plays which role.
//!
//! ## Atomicity
//!
//! A market snapshot is one sled transaction spanning both trees, followed
//! by a flush. Either every component state and the manifest land, or none
//! of them do.

use alloy_primitives::Address;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl From<TransactionError<DbError>> for DbError {
    fn from(err: TransactionError<DbError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => DbError::Sled(inner),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Encode a value the way every tree stores it.
pub fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Decode a value written by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent storage for contract states and deployment metadata.
///
/// sled is thread-safe; `LedgerDb` can be shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    /// Component states keyed by contract address.
    contracts: Tree,
    /// Deployment manifest and other small records.
    metadata: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database cleaned up on drop. Meant for tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let contracts = db.open_tree("contracts")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            contracts,
            metadata,
        })
    }

    // -- Contract states ----------------------------------------------------

    /// Store one component's state under its address.
    pub fn put_contract<T: Serialize>(&self, address: &Address, state: &T) -> DbResult<()> {
        let bytes = encode(state)?;
        self.contracts.insert(address.as_slice(), bytes)?;
        Ok(())
    }

    /// Load a component's state. `None` when the address was never written.
    pub fn get_contract<T: DeserializeOwned>(&self, address: &Address) -> DbResult<Option<T>> {
        match self.contracts.get(address.as_slice())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`LedgerDb::get_contract`] but a missing entry is an error.
    pub fn require_contract<T: DeserializeOwned>(&self, address: &Address) -> DbResult<T> {
        self.get_contract(address)?
            .ok_or_else(|| DbError::NotFound(format!("contract {address}")))
    }

    /// Number of stored contract states.
    pub fn contract_count(&self) -> usize {
        self.contracts.len()
    }

    // -- Snapshots ----------------------------------------------------------

    /// Write pre-encoded component states and a manifest in one
    /// transaction across both trees, then flush. An empty manifest key
    /// aborts the whole snapshot.
    pub fn put_snapshot(
        &self,
        contracts: &[(Address, Vec<u8>)],
        manifest_key: &str,
        manifest: &[u8],
    ) -> DbResult<()> {
        (&self.contracts, &self.metadata).transaction(|(contracts_tx, metadata_tx)| {
            for (address, bytes) in contracts {
                contracts_tx.insert(address.as_slice(), bytes.as_slice())?;
            }
            if manifest_key.is_empty() {
                return Err(ConflictableTransactionError::Abort(DbError::InvalidKey(
                    "empty manifest key".into(),
                )));
            }
            metadata_tx.insert(manifest_key.as_bytes(), manifest)?;
            Ok(())
        })?;

        self.db.flush()?;
        tracing::debug!(
            components = contracts.len(),
            manifest = manifest_key,
            "snapshot persisted"
        );
        Ok(())
    }

    // -- Metadata -----------------------------------------------------------

    pub fn put_metadata(&self, key: &str, value: &[u8]) -> DbResult<()> {
        self.metadata.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        label: String,
        value: u64,
    }

    fn counter(value: u64) -> Counter {
        Counter {
            label: "visits".to_string(),
            value,
        }
    }

    #[test]
    fn contract_roundtrip() {
        let db = LedgerDb::open_temporary().unwrap();
        let address = Address::repeat_byte(0xAA);

        db.put_contract(&address, &counter(7)).unwrap();
        let loaded: Counter = db.get_contract(&address).unwrap().unwrap();
        assert_eq!(loaded, counter(7));
        assert_eq!(db.contract_count(), 1);
    }

    #[test]
    fn missing_contract_is_none() {
        let db = LedgerDb::open_temporary().unwrap();
        let loaded: Option<Counter> = db.get_contract(&Address::repeat_byte(1)).unwrap();
        assert!(loaded.is_none());
        let required: DbResult<Counter> = db.require_contract(&Address::repeat_byte(1));
        assert!(matches!(required, Err(DbError::NotFound(_))));
    }

    #[test]
    fn snapshot_writes_all_components_and_manifest() {
        let db = LedgerDb::open_temporary().unwrap();
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let entries = vec![
            (a, encode(&counter(1)).unwrap()),
            (b, encode(&counter(2)).unwrap()),
        ];

        db.put_snapshot(&entries, "manifest", b"v1").unwrap();

        assert_eq!(db.contract_count(), 2);
        assert_eq!(db.require_contract::<Counter>(&b).unwrap().value, 2);
        assert_eq!(db.get_metadata("manifest").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn aborted_snapshot_writes_nothing() {
        let db = LedgerDb::open_temporary().unwrap();
        let a = Address::repeat_byte(1);
        db.put_snapshot(&[(a, encode(&counter(1)).unwrap())], "manifest", b"v1")
            .unwrap();

        // The component insert precedes the abort inside the transaction.
        let entries = vec![
            (a, encode(&counter(2)).unwrap()),
            (Address::repeat_byte(2), encode(&counter(3)).unwrap()),
        ];
        let result = db.put_snapshot(&entries, "", b"v2");
        assert!(matches!(result, Err(DbError::InvalidKey(_))));

        assert_eq!(db.contract_count(), 1);
        assert_eq!(db.require_contract::<Counter>(&a).unwrap().value, 1);
        assert_eq!(db.get_metadata("manifest").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn overwrite_replaces_previous_state() {
        let db = LedgerDb::open_temporary().unwrap();
        let address = Address::repeat_byte(3);
        db.put_contract(&address, &counter(1)).unwrap();
        db.put_contract(&address, &counter(2)).unwrap();
        assert_eq!(db.require_contract::<Counter>(&address).unwrap().value, 2);
        assert_eq!(db.contract_count(), 1);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result: DbResult<Counter> = decode(&[0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(DbError::Serialization(_))));
    }

    #[test]
    fn reopen_from_disk_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let address = Address::repeat_byte(9);
        {
            let db = LedgerDb::open(dir.path()).unwrap();
            db.put_contract(&address, &counter(42)).unwrap();
            db.flush().unwrap();
        }
        let db = LedgerDb::open(dir.path()).unwrap();
        assert_eq!(db.require_contract::<Counter>(&address).unwrap().value, 42);
    }
}
