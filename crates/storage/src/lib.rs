//! Persistent storage layer for certchain.
//!
//! Blocks are stored one bincode record per index next to the chain length
//! and the pending certificate pool. Nothing read back is trusted: loading
//! re-validates the whole chain before handing it out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! │               (Blockchain, CLI commands)                 │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   Storage Layer                          │
//! │  ┌─────────────────────────┐  ┌─────────────────────┐   │
//! │  │ ChainStore              │  │ Storage (DB)        │   │
//! │  │  - Blocks by index      │  │  - sled wrapper     │   │
//! │  │  - Chain length         │  │  - serialization    │   │
//! │  │  - Pending certificates │  │  - key helpers      │   │
//! │  └─────────────────────────┘  └─────────────────────┘   │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                    sled Database                         │
//! │              (Embedded Key-Value Store)                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use certchain_chain::BlockchainConfig;
//! use certchain_storage::{ChainStore, Storage};
//!
//! let storage = Storage::open("./data/db").unwrap();
//! let store = ChainStore::new(&storage);
//!
//! let ledger = store.load_blockchain(BlockchainConfig::default()).unwrap();
//! println!("{} blocks", ledger.chain().len());
//! store.save_blockchain(&ledger).unwrap();
//! ```

pub mod chain;
pub mod db;

// Re-export commonly used types
pub use chain::ChainStore;
pub use db::{BatchOp, Key, Result, Storage, StorageError};
