//! sled database wrapper with typed keys and bincode values.

use certchain_chain::{BlockchainError, ChainError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use std::path::Path;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Persisted chain failed validation: {0}")]
    Chain(#[from] ChainError),

    #[error("Stored ledger is unusable: {0}")]
    Ledger(#[from] BlockchainError),

    #[error("Block {0} missing from storage")]
    MissingBlock(u64),

    #[error("Stored chain diverges from the in-memory chain at block {0}")]
    Diverged(u64),

    #[error("Malformed block key: {0:02x?}")]
    MalformedKey(Vec<u8>),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

const BLOCK_PREFIX: &[u8] = b"block/";
const META_PREFIX: &[u8] = b"meta/";

/// A key in one of the store's namespaces.
///
/// Block indices are encoded big-endian so a prefix scan yields blocks in
/// chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Block(u64),
    Meta(&'static str),
}

impl Key {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Key::Block(index) => [BLOCK_PREFIX, index.to_be_bytes().as_slice()].concat(),
            Key::Meta(name) => [META_PREFIX, name.as_bytes()].concat(),
        }
    }

    fn decode_block(raw: &[u8]) -> Result<u64> {
        raw.strip_prefix(BLOCK_PREFIX)
            .and_then(|rest| <[u8; 8]>::try_from(rest).ok())
            .map(u64::from_be_bytes)
            .ok_or_else(|| StorageError::MalformedKey(raw.to_vec()))
    }
}

/// Wrapper around sled database with serialization helpers.
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a value under `key`.
    pub fn put<V: Serialize>(&self, key: Key, value: &V) -> Result<()> {
        self.db.insert(key.encode(), bincode::serialize(value)?)?;
        Ok(())
    }

    /// Retrieve and decode the value under `key`.
    pub fn get<V: DeserializeOwned>(&self, key: Key) -> Result<Option<V>> {
        self.db
            .get(key.encode())?
            .map(|bytes| bincode::deserialize(&bytes))
            .transpose()
            .map_err(StorageError::from)
    }

    pub fn remove(&self, key: Key) -> Result<()> {
        self.db.remove(key.encode())?;
        Ok(())
    }

    pub fn contains(&self, key: Key) -> Result<bool> {
        Ok(self.db.contains_key(key.encode())?)
    }

    /// Every stored block value in index order, with its index.
    pub fn scan_blocks<V: DeserializeOwned>(&self) -> impl Iterator<Item = Result<(u64, V)>> + '_ {
        self.db.scan_prefix(BLOCK_PREFIX).map(|entry| -> Result<(u64, V)> {
            let (key, value) = entry?;
            let index = Key::decode_block(&key)?;
            Ok((index, bincode::deserialize(&value)?))
        })
    }

    /// Apply multiple operations atomically through sled's `apply_batch`.
    pub fn batch(&self, operations: Vec<BatchOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in operations {
            match op {
                BatchOp::Put { key, value } => batch.insert(key.encode(), value),
                BatchOp::Remove(key) => batch.remove(key.encode()),
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// One write in an atomic batch.
pub enum BatchOp {
    Put { key: Key, value: Vec<u8> },
    Remove(Key),
}

impl BatchOp {
    pub fn put<V: Serialize>(key: Key, value: &V) -> Result<Self> {
        Ok(BatchOp::Put {
            key,
            value: bincode::serialize(value)?,
        })
    }
}
