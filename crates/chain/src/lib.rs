//! Ledger orchestration for certchain.
//!
//! This crate brings the core primitives together into a working ledger:
//! - **Chain**: append-only block sequence with linkage, proof-of-work and
//!   merkle-root validation
//! - **Mempool**: ordered pool of pending certificates
//! - **Blockchain**: seals pending certificates into blocks
//! - **Export**: proof records and chain dumps as JSON
//!
//! # Example
//!
//! ```rust,no_run
//! use certchain_chain::{Blockchain, BlockchainConfig, ProofRecord};
//! use certchain_core::{Certificate, MiningControl};
//!
//! let mut ledger = Blockchain::new(BlockchainConfig::default()).unwrap();
//! ledger
//!     .submit(Certificate::issue("S-001", "Ada", "Compilers", "A"))
//!     .unwrap();
//!
//! let block = ledger.mine_pending(&MiningControl::new()).unwrap().unwrap();
//!
//! // Hand the proof to anyone who knows the block's merkle root.
//! let record = ProofRecord::from_chain(ledger.chain(), block.index(), 0).unwrap();
//! assert!(record.verify(&block.header.merkle_root));
//! ```

pub mod blockchain;
pub mod chain;
pub mod export;
pub mod mempool;

// Re-export commonly used types
pub use blockchain::{Blockchain, BlockchainConfig, BlockchainError, BlockchainStats};
pub use chain::{Chain, ChainError};
pub use export::{verify_record_json, BlockRecord, ChainExport, ExportError, ProofRecord};
pub use mempool::{Mempool, MempoolConfig, MempoolError, MempoolStats};
