//! Main ledger orchestration.
//!
//! This module ties the chain, the pending pool and the miner together: it
//! snapshots pending certificates into a block, seals it and appends it.

use crate::chain::{Chain, ChainError};
use crate::mempool::{Mempool, MempoolConfig, MempoolError};
use certchain_core::{
    Block, Certificate, Hash, MerkleProof, Miner, MiningControl, MiningError, UnsealedBlock,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("mining error: {0}")]
    Mining(#[from] MiningError),

    #[error("chain already has a genesis block")]
    AlreadyInitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// Leading zero hex digits required of new block hashes.
    pub difficulty: u32,
    /// Maximum certificates per block.
    pub max_block_size: usize,
    /// Maximum pending certificates.
    pub max_pending: usize,
    /// Threads used for the nonce search.
    pub mining_workers: usize,
    /// Abandon a mining attempt after this many seconds.
    pub mining_timeout_secs: Option<u64>,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            difficulty: 3,
            max_block_size: 1000,
            max_pending: MempoolConfig::default().max_pending,
            mining_workers: 1,
            mining_timeout_secs: None,
        }
    }
}

impl BlockchainConfig {
    /// Reject settings that can never produce a block.
    pub fn validate(&self) -> Result<()> {
        if self.difficulty as usize > certchain_core::hash::HEX_LEN {
            return Err(BlockchainError::InvalidConfig(format!(
                "difficulty {} exceeds {} hex digits",
                self.difficulty,
                certchain_core::hash::HEX_LEN
            )));
        }
        if self.max_block_size == 0 {
            return Err(BlockchainError::InvalidConfig(
                "max_block_size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn mempool_config(&self) -> MempoolConfig {
        MempoolConfig {
            max_pending: self.max_pending,
        }
    }

    pub fn miner(&self) -> Miner {
        Miner::new(self.mining_workers)
    }

    /// Apply the configured timeout on top of a caller's control.
    fn mining_control(&self, control: &MiningControl) -> MiningControl {
        match self.mining_timeout_secs {
            Some(secs) => control.clone().with_timeout(Duration::from_secs(secs)),
            None => control.clone(),
        }
    }
}

/// The ledger: chain plus pending pool.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Chain,
    mempool: Mempool,
    config: BlockchainConfig,
}

impl Blockchain {
    /// Create an empty ledger.
    pub fn new(config: BlockchainConfig) -> Result<Self> {
        Self::from_parts(config, Chain::new(), Vec::new())
    }

    /// Assemble a ledger from an already validated chain and persisted
    /// pending certificates. Certificates already sealed in the chain are
    /// not queued again.
    pub fn from_parts(
        config: BlockchainConfig,
        chain: Chain,
        mut pending: Vec<Certificate>,
    ) -> Result<Self> {
        config.validate()?;
        let sealed: HashSet<Hash> = chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .map(Certificate::hash)
            .collect();
        let before = pending.len();
        pending.retain(|cert| !sealed.contains(&cert.hash()));
        if pending.len() < before {
            warn!(
                dropped = before - pending.len(),
                "pending certificates already sealed in the chain"
            );
        }
        let mempool = Mempool::restore(config.mempool_config(), pending);
        Ok(Self {
            chain,
            mempool,
            config,
        })
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// Queue a certificate for the next block.
    pub fn submit(&mut self, cert: Certificate) -> Result<()> {
        self.mempool.add(cert)?;
        Ok(())
    }

    /// Build the next unsealed block from the pending pool, or `None` when
    /// nothing is pending.
    pub fn prepare_block(&self) -> Option<UnsealedBlock> {
        if self.mempool.is_empty() {
            return None;
        }
        let transactions = self.mempool.snapshot(self.config.max_block_size);
        Some(UnsealedBlock::new(
            self.chain.next_index(),
            self.chain.tip_hash(),
            transactions,
            self.config.difficulty,
        ))
    }

    /// Mine an empty genesis block on a fresh ledger.
    pub fn init_genesis(&mut self, control: &MiningControl) -> Result<Block> {
        if !self.chain.is_empty() {
            return Err(BlockchainError::AlreadyInitialized);
        }
        let genesis = UnsealedBlock::genesis(Vec::new(), self.config.difficulty);
        self.seal_and_append(genesis, control)
    }

    /// Seal the pending certificates into a block and append it.
    ///
    /// Returns `Ok(None)` when the pool is empty. On cancellation or timeout
    /// the pool and the chain are unchanged.
    pub fn mine_pending(&mut self, control: &MiningControl) -> Result<Option<Block>> {
        let Some(unsealed) = self.prepare_block() else {
            return Ok(None);
        };
        let block = self.seal_and_append(unsealed, control)?;
        self.mempool.remove_included(&block.transactions);
        Ok(Some(block))
    }

    fn seal_and_append(
        &mut self,
        unsealed: UnsealedBlock,
        control: &MiningControl,
    ) -> Result<Block> {
        let index = unsealed.header().index;
        let count = unsealed.transactions().len();
        let control = self.config.mining_control(control);

        let block = match unsealed.mine_with(&self.config.miner(), &control) {
            Ok(block) => block,
            Err(e) => {
                warn!(index, error = %e, "mining abandoned");
                return Err(e.into());
            }
        };

        self.chain.append(block.clone())?;
        info!(index, certificates = count, hash = %block.hash(), "block appended");
        Ok(block)
    }

    /// Append a block sealed elsewhere.
    pub fn append(&mut self, block: Block) -> Result<()> {
        let included = block.transactions.clone();
        self.chain.append(block)?;
        self.mempool.remove_included(&included);
        Ok(())
    }

    /// Re-validate the whole chain.
    pub fn validate(&self) -> Result<()> {
        self.chain.validate()?;
        Ok(())
    }

    /// Inclusion proof for a certificate.
    pub fn proof_for(&self, block_index: u64, tx_index: usize) -> Result<MerkleProof> {
        Ok(self.chain.proof_for(block_index, tx_index)?)
    }

    /// Get ledger statistics.
    pub fn stats(&self) -> BlockchainStats {
        BlockchainStats {
            length: self.chain.len(),
            tip_hash: self.chain.tip().map(Block::hash),
            total_certificates: self.chain.iter().map(Block::tx_count).sum(),
            pending_certificates: self.mempool.len(),
            difficulty: self.config.difficulty,
        }
    }
}

/// Ledger statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockchainStats {
    /// Number of blocks.
    pub length: usize,
    /// Hash of the latest block.
    pub tip_hash: Option<Hash>,
    /// Certificates sealed into blocks.
    pub total_certificates: usize,
    /// Certificates waiting to be mined.
    pub pending_certificates: usize,
    /// Difficulty used for new blocks.
    pub difficulty: u32,
}
