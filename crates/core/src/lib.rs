//! Core ledger primitives for certchain.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Blake3 hashing
//! - Certificate records
//! - Merkle trees and inclusion proofs
//! - Blocks, block headers and the proof-of-work search

pub mod block;
pub mod certificate;
pub mod hash;
pub mod merkle;
pub mod pow;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockHeader, UnsealedBlock};
pub use certificate::{unix_now, Certificate, CertificateError};
pub use hash::{hash, hash_concat, Hash, H256};
pub use merkle::{
    certificates_root, merkle_root, verify, MerkleError, MerkleProof, MerkleTree, ProofStep, Side,
};
pub use pow::{Miner, MiningControl, MiningError, Seal};
