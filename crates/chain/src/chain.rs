//! The append-only block sequence and its integrity rules.

use certchain_core::{Block, Hash, MerkleError, MerkleProof};
use thiserror::Error;
use tracing::{debug, warn};

/// Structural violations and lookup failures, each tagged with the block
/// index it concerns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block {index} does not link to the chain tip (expected index {expected_index}, previous hash {expected_previous})")]
    Linkage {
        index: u64,
        expected_index: u64,
        expected_previous: Hash,
        found_previous: Hash,
    },

    #[error("block {index} fails proof-of-work (stored {stored}, recomputed {recomputed}, difficulty {difficulty})")]
    ProofOfWork {
        index: u64,
        stored: Hash,
        recomputed: Hash,
        difficulty: u32,
    },

    #[error("block {index} merkle root mismatch (stored {stored}, recomputed {recomputed})")]
    MerkleMismatch {
        index: u64,
        stored: Hash,
        recomputed: Hash,
    },

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("transaction index {tx_index} out of range for block {block_index} ({len} transactions)")]
    IndexOutOfRange {
        block_index: u64,
        tx_index: usize,
        len: usize,
    },
}

impl ChainError {
    /// The block the error refers to.
    pub fn block_index(&self) -> u64 {
        match self {
            ChainError::Linkage { index, .. }
            | ChainError::ProofOfWork { index, .. }
            | ChainError::MerkleMismatch { index, .. } => *index,
            ChainError::BlockNotFound(index) => *index,
            ChainError::IndexOutOfRange { block_index, .. } => *block_index,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// An ordered, contiguous sequence of sealed blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a chain from untrusted blocks (e.g. loaded from disk).
    ///
    /// The whole sequence is validated before the chain is returned.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self> {
        let chain = Self { blocks };
        chain.validate()?;
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The latest block.
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Index the next appended block must carry.
    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// `previous_hash` the next appended block must carry.
    pub fn tip_hash(&self) -> Hash {
        self.tip().map(Block::hash).unwrap_or(Hash::ZERO)
    }

    /// Get a block by index.
    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Append a sealed block.
    ///
    /// Checks linkage, then proof-of-work, then the merkle root. The chain
    /// is left unchanged when any check fails.
    pub fn append(&mut self, block: Block) -> Result<()> {
        if let Err(e) = check_block(&block, self.next_index(), self.tip_hash()) {
            warn!(error = %e, "block rejected");
            return Err(e);
        }

        debug!(index = block.index(), hash = %block.hash(), "block appended");
        self.blocks.push(block);
        Ok(())
    }

    /// Re-derive linkage, proof-of-work and merkle root for every block,
    /// returning the first failure.
    pub fn validate(&self) -> Result<()> {
        let mut previous = Hash::ZERO;
        for (position, block) in self.blocks.iter().enumerate() {
            check_block(block, position as u64, previous)?;
            previous = block.hash();
        }
        Ok(())
    }

    /// Inclusion proof for transaction `tx_index` of block `block_index`.
    pub fn proof_for(&self, block_index: u64, tx_index: usize) -> Result<MerkleProof> {
        let block = self
            .get(block_index)
            .ok_or(ChainError::BlockNotFound(block_index))?;

        block.proof_for(tx_index).map_err(|e| match e {
            MerkleError::IndexOutOfRange { index, len } => ChainError::IndexOutOfRange {
                block_index,
                tx_index: index,
                len,
            },
        })
    }

    /// Locate the first certificate for `(student_id, course)`.
    ///
    /// Returns `(block_index, tx_index)`.
    pub fn find_certificate(&self, student_id: &str, course: &str) -> Option<(u64, usize)> {
        self.blocks.iter().find_map(|block| {
            block
                .position_of(student_id, course)
                .map(|tx| (block.index(), tx))
        })
    }

    /// Published merkle root of a block.
    pub fn merkle_root_of(&self, block_index: u64) -> Option<Hash> {
        self.get(block_index).map(|b| b.header.merkle_root)
    }
}

/// Check one block against the position it occupies and its predecessor.
fn check_block(block: &Block, expected_index: u64, expected_previous: Hash) -> Result<()> {
    let index = block.index();

    if index != expected_index || block.header.previous_hash != expected_previous {
        return Err(ChainError::Linkage {
            index,
            expected_index,
            expected_previous,
            found_previous: block.header.previous_hash,
        });
    }

    if !block.is_valid() {
        return Err(ChainError::ProofOfWork {
            index,
            stored: block.hash(),
            recomputed: block.compute_hash(),
            difficulty: block.header.difficulty,
        });
    }

    if !block.verify_merkle_root() {
        return Err(ChainError::MerkleMismatch {
            index,
            stored: block.header.merkle_root,
            recomputed: block.merkle_tree().root(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::{verify, Certificate, MiningControl, UnsealedBlock};

    fn cert(id: &str, course: &str) -> Certificate {
        Certificate::new(id, format!("Student {id}"), course, "A", 1_700_000_000)
    }

    fn mine_next(chain: &Chain, certs: Vec<Certificate>, difficulty: u32) -> Block {
        UnsealedBlock::new(chain.next_index(), chain.tip_hash(), certs, difficulty)
            .mine(&MiningControl::new())
            .unwrap()
    }

    fn setup(blocks: usize) -> Chain {
        let mut chain = Chain::new();
        for b in 0..blocks {
            let certs = (0..3).map(|t| cert(&format!("S-{b}-{t}"), "Math")).collect();
            let block = mine_next(&chain, certs, 1);
            chain.append(block).unwrap();
        }
        chain
    }

    #[test]
    fn test_empty_chain() {
        let chain = Chain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.tip_hash(), Hash::ZERO);
        assert_eq!(chain.next_index(), 0);
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_append_and_validate() {
        let chain = setup(3);
        assert_eq!(chain.len(), 3);
        assert!(chain.validate().is_ok());
        assert!(chain.get(0).unwrap().is_genesis());
        assert_eq!(
            chain.get(2).unwrap().header.previous_hash,
            chain.get(1).unwrap().hash()
        );
    }

    #[test]
    fn test_append_wrong_previous_hash_fails() {
        let mut chain = setup(2);
        let bad = UnsealedBlock::new(2, Hash([0xFF; 32]), vec![cert("X", "Art")], 1)
            .mine(&MiningControl::new())
            .unwrap();

        let err = chain.append(bad).unwrap_err();
        assert!(matches!(err, ChainError::Linkage { index: 2, .. }));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_append_wrong_index_fails() {
        let mut chain = setup(1);
        let tip = chain.tip_hash();
        let bad = UnsealedBlock::new(5, tip, vec![], 0)
            .mine(&MiningControl::new())
            .unwrap();

        assert!(matches!(chain.append(bad), Err(ChainError::Linkage { .. })));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_genesis_must_use_zero_sentinel() {
        let mut chain = Chain::new();
        let bad = UnsealedBlock::new(0, Hash([1; 32]), vec![], 0)
            .mine(&MiningControl::new())
            .unwrap();
        assert!(matches!(chain.append(bad), Err(ChainError::Linkage { index: 0, .. })));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_append_bad_pow_fails() {
        let mut chain = setup(1);
        let mut block = mine_next(&chain, vec![cert("S", "Art")], 1);
        block.hash = Hash([0xAB; 32]);

        let err = chain.append(block).unwrap_err();
        assert!(matches!(err, ChainError::ProofOfWork { index: 1, .. }));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_append_merkle_mismatch_fails() {
        let mut chain = setup(1);
        let mut block = mine_next(&chain, vec![cert("S", "Art")], 1);
        block.transactions.push(cert("T", "Art"));

        let err = chain.append(block).unwrap_err();
        assert!(matches!(err, ChainError::MerkleMismatch { index: 1, .. }));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_validate_detects_tampered_transaction() {
        let chain = setup(3);
        let mut blocks = chain.clone().into_blocks();
        blocks[1].transactions[0].grade = "F".into();
        let tampered = Chain { blocks };

        let err = tampered.validate().unwrap_err();
        assert!(matches!(err, ChainError::MerkleMismatch { index: 1, .. }));
        assert_eq!(err.block_index(), 1);
        // The source chain is untouched.
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_broken_link() {
        let chain = setup(3);
        let mut blocks = chain.into_blocks();
        blocks.remove(1);

        let err = Chain::from_blocks(blocks).unwrap_err();
        assert!(matches!(err, ChainError::Linkage { index: 2, expected_index: 1, .. }));
    }

    #[test]
    fn test_validate_detects_rewritten_header() {
        let chain = setup(2);
        let mut blocks = chain.into_blocks();
        blocks[0].header.timestamp += 60;

        let err = Chain::from_blocks(blocks).unwrap_err();
        assert!(matches!(err, ChainError::ProofOfWork { index: 0, .. }));
    }

    #[test]
    fn test_from_blocks_roundtrip() {
        let chain = setup(3);
        let rebuilt = Chain::from_blocks(chain.blocks().to_vec()).unwrap();
        assert_eq!(rebuilt, chain);
    }

    #[test]
    fn test_proof_for() {
        let chain = setup(2);
        let proof = chain.proof_for(1, 2).unwrap();
        assert!(verify(&proof, &chain.merkle_root_of(1).unwrap()));

        assert_eq!(chain.proof_for(9, 0), Err(ChainError::BlockNotFound(9)));
        assert_eq!(
            chain.proof_for(1, 3),
            Err(ChainError::IndexOutOfRange {
                block_index: 1,
                tx_index: 3,
                len: 3
            })
        );
    }

    #[test]
    fn test_find_certificate() {
        let chain = setup(3);
        assert_eq!(chain.find_certificate("S-2-1", "Math"), Some((2, 1)));
        assert_eq!(chain.find_certificate("S-2-1", "Art"), None);
    }
}
