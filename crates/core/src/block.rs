//! Block and block header structures.
//!
//! A block starts life as an [`UnsealedBlock`]: certificates, merkle root and
//! a zero nonce. Mining is the only way to obtain a sealed [`Block`].

use crate::certificate::{unix_now, Certificate};
use crate::hash::{hash, Hash};
use crate::merkle::{certificates_root, MerkleError, MerkleProof, MerkleTree};
use crate::pow::{Miner, MiningControl, MiningError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The header of a block. Its hash is the block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position in the chain (0 for genesis).
    pub index: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Merkle root of the certificates.
    pub merkle_root: Hash,
    /// Hash of the previous block, [`Hash::ZERO`] for genesis.
    pub previous_hash: Hash,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Required leading zero hex digits of the block hash.
    pub difficulty: u32,
}

impl BlockHeader {
    /// Calculate the hash of this block header.
    pub fn hash(&self) -> Hash {
        let encoded = bincode::serialize(self).expect("serialization should not fail");
        hash(&encoded)
    }
}

/// A block that has not been mined yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsealedBlock {
    header: BlockHeader,
    transactions: Vec<Certificate>,
}

impl UnsealedBlock {
    /// Create a block on top of `previous_hash` stamped with the current time.
    pub fn new(
        index: u64,
        previous_hash: Hash,
        transactions: Vec<Certificate>,
        difficulty: u32,
    ) -> Self {
        let merkle_root = certificates_root(&transactions);

        Self {
            header: BlockHeader {
                index,
                timestamp: unix_now(),
                merkle_root,
                previous_hash,
                nonce: 0,
                difficulty,
            },
            transactions,
        }
    }

    /// Create the genesis block.
    pub fn genesis(transactions: Vec<Certificate>, difficulty: u32) -> Self {
        Self::new(0, Hash::ZERO, transactions, difficulty)
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.header.timestamp = timestamp;
        self
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Certificate] {
        &self.transactions
    }

    /// Mine on the calling thread.
    pub fn mine(self, control: &MiningControl) -> Result<Block, MiningError> {
        self.mine_with(&Miner::default(), control)
    }

    /// Mine with the given miner. On error the unsealed block is dropped;
    /// nothing about it is observable.
    pub fn mine_with(self, miner: &Miner, control: &MiningControl) -> Result<Block, MiningError> {
        let seal = miner.search(&self.header, control)?;

        let mut header = self.header;
        header.nonce = seal.nonce;

        info!(
            index = header.index,
            nonce = seal.nonce,
            attempts = seal.attempts,
            hash = %seal.hash,
            "block sealed"
        );

        Ok(Block {
            header,
            transactions: self.transactions,
            hash: seal.hash,
        })
    }
}

/// A sealed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Certificates in this block, in merkle leaf order.
    pub transactions: Vec<Certificate>,
    /// Stored block hash. Never trusted without [`Block::is_valid`].
    pub hash: Hash,
}

impl Block {
    /// Recompute the hash from the header.
    pub fn compute_hash(&self) -> Hash {
        self.header.hash()
    }

    /// Get the stored block hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.index == 0 && self.header.previous_hash == Hash::ZERO
    }

    /// Get the number of certificates in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// The stored hash equals the recomputed header hash and meets the
    /// block's difficulty.
    pub fn is_valid(&self) -> bool {
        let recomputed = self.compute_hash();
        recomputed == self.hash && recomputed.meets_difficulty(self.header.difficulty)
    }

    /// Verify the merkle root matches the certificates.
    pub fn verify_merkle_root(&self) -> bool {
        certificates_root(&self.transactions) == self.header.merkle_root
    }

    /// Rebuild the merkle tree over this block's certificates.
    pub fn merkle_tree(&self) -> MerkleTree {
        MerkleTree::build(&self.transactions)
    }

    /// Inclusion proof for the certificate at `tx_index`.
    pub fn proof_for(&self, tx_index: usize) -> Result<MerkleProof, MerkleError> {
        self.merkle_tree().proof_for(tx_index)
    }

    /// Position of the certificate for `(student_id, course)`, if present.
    pub fn position_of(&self, student_id: &str, course: &str) -> Option<usize> {
        self.transactions
            .iter()
            .position(|tx| tx.matches(student_id, course))
    }
}
