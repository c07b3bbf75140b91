//! Block persistence and pending-pool snapshots.

use crate::db::{BatchOp, Key, Result, Storage, StorageError};
use certchain_chain::{Blockchain, BlockchainConfig, Chain};
use certchain_core::{Block, Certificate};
use tracing::{debug, info};

const CHAIN_LENGTH_KEY: Key = Key::Meta("chain_length");
const PENDING_KEY: Key = Key::Meta("pending");

/// Persists the chain as one bincode record per block.
pub struct ChainStore<'a> {
    storage: &'a Storage,
}

impl<'a> ChainStore<'a> {
    /// Create a new ChainStore wrapping the given storage.
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    // =========================================================================
    // Block Storage
    // =========================================================================

    /// Number of persisted blocks.
    pub fn stored_length(&self) -> Result<u64> {
        Ok(self.storage.get::<u64>(CHAIN_LENGTH_KEY)?.unwrap_or(0))
    }

    /// Check if any block has been persisted.
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.stored_length()? > 0)
    }

    /// Read a block by index without validating it.
    pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
        self.storage.get(Key::Block(index))
    }

    /// Load every persisted block and validate the sequence.
    ///
    /// Persisted data is never trusted: the chain is rebuilt through
    /// [`Chain::from_blocks`], which fails on the first broken block.
    pub fn load_chain(&self) -> Result<Chain> {
        let length = self.stored_length()?;
        let mut blocks: Vec<Block> = Vec::new();
        for entry in self.storage.scan_blocks::<Block>() {
            let (index, block) = entry?;
            if index >= length {
                break;
            }
            if index != blocks.len() as u64 {
                return Err(StorageError::MissingBlock(blocks.len() as u64));
            }
            blocks.push(block);
        }
        if (blocks.len() as u64) < length {
            return Err(StorageError::MissingBlock(blocks.len() as u64));
        }

        let chain = Chain::from_blocks(blocks)?;
        debug!(length, "chain loaded and validated");
        Ok(chain)
    }

    /// Write blocks the store does not have yet.
    ///
    /// The store is append-only like the chain: blocks already on disk must
    /// match the in-memory chain, and new blocks plus the new length are
    /// written in one batch.
    pub fn save_chain(&self, chain: &Chain) -> Result<usize> {
        let ops = self.append_ops(chain)?;
        let written = ops.len().saturating_sub(1);
        if written == 0 {
            return Ok(0);
        }

        self.storage.batch(ops)?;
        self.storage.flush()?;
        info!(written, length = chain.len(), "chain persisted");
        Ok(written)
    }

    /// Batch operations for the blocks past the stored length followed by
    /// the new length; empty when the store is up to date.
    fn append_ops(&self, chain: &Chain) -> Result<Vec<BatchOp>> {
        let stored = self.stored_length()?;
        if stored > chain.len() as u64 {
            return Err(StorageError::Diverged(chain.len() as u64));
        }
        if stored > 0 {
            let last = stored - 1;
            let on_disk = self
                .get_block(last)?
                .ok_or(StorageError::MissingBlock(last))?;
            if chain.get(last).map(Block::hash) != Some(on_disk.hash()) {
                return Err(StorageError::Diverged(last));
            }
        }

        let mut ops = Vec::new();
        for block in chain.blocks().iter().skip(stored as usize) {
            ops.push(BatchOp::put(Key::Block(block.index()), block)?);
        }
        if !ops.is_empty() {
            ops.push(BatchOp::put(CHAIN_LENGTH_KEY, &(chain.len() as u64))?);
        }
        Ok(ops)
    }

    // =========================================================================
    // Pending Pool
    // =========================================================================

    /// Replace the persisted pending certificates.
    pub fn save_pending(&self, pending: &[Certificate]) -> Result<()> {
        self.storage.put(PENDING_KEY, &pending.to_vec())?;
        self.storage.flush()
    }

    /// Load persisted pending certificates, oldest first.
    pub fn load_pending(&self) -> Result<Vec<Certificate>> {
        Ok(self.storage.get(PENDING_KEY)?.unwrap_or_default())
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Rebuild a ledger from the store under the given configuration.
    pub fn load_blockchain(&self, config: BlockchainConfig) -> Result<Blockchain> {
        let chain = self.load_chain()?;
        let pending = self.load_pending()?;
        Ok(Blockchain::from_parts(config, chain, pending)?)
    }

    /// Persist new blocks and the current pending pool in one batch, so a
    /// sealed certificate is never left behind in the stored pool.
    pub fn save_blockchain(&self, ledger: &Blockchain) -> Result<()> {
        let mut ops = self.append_ops(ledger.chain())?;
        let written = ops.len().saturating_sub(1);
        ops.push(BatchOp::put(PENDING_KEY, &ledger.mempool().pending().to_vec())?);

        self.storage.batch(ops)?;
        self.storage.flush()?;
        debug!(written, pending = ledger.mempool().len(), "ledger persisted");
        Ok(())
    }
}
