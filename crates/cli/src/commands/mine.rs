//! Mine pending certificates command.

use super::{run_interruptible, DataDir};
use anyhow::{Context, Result};
use certchain_chain::BlockchainError;
use certchain_core::{MiningControl, MiningError};
use certchain_storage::ChainStore;
use clap::Args;
use colored::Colorize;
use std::time::Instant;

#[derive(Args)]
pub struct MineArgs {
    /// Give up after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Threads used for the nonce search
    #[arg(short, long)]
    pub workers: Option<usize>,
}

pub fn run(args: MineArgs, data: &DataDir) -> Result<()> {
    let mut config = data.load_config()?;
    if let Some(secs) = args.timeout_secs {
        config.mining_timeout_secs = Some(secs);
    }
    if let Some(workers) = args.workers {
        config.mining_workers = workers;
    }

    let storage = data.open_storage()?;
    let store = ChainStore::new(&storage);
    let mut ledger = store.load_blockchain(config)?;

    if ledger.mempool().is_empty() {
        println!("{}", "Nothing to mine: no pending certificates.".yellow());
        return Ok(());
    }

    println!("{}", "Mining new block...".bold().cyan());
    println!(
        "  Pending:    {}",
        ledger.mempool().len().to_string().bright_cyan()
    );
    println!(
        "  Difficulty: {}",
        ledger.config().difficulty.to_string().bright_cyan()
    );
    println!("  {}", "Press Ctrl-C to stop.".bright_black());

    let started = Instant::now();
    let control = MiningControl::new();
    let worker_control = control.clone();
    let (ledger, mined) = run_interruptible(&control, move || {
        let mined = ledger.mine_pending(&worker_control);
        (ledger, mined)
    })?;

    let block = match mined {
        Ok(Some(block)) => block,
        Ok(None) => return Ok(()),
        Err(BlockchainError::Mining(MiningError::Cancelled)) => {
            println!();
            println!(
                "{}",
                "Mining cancelled. Pending certificates were kept.".yellow()
            );
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to mine block"),
    };

    store.save_blockchain(&ledger)?;

    println!();
    println!("{}  Block mined", "✓".green().bold());
    println!("    Index:        {}", block.index().to_string().bright_cyan());
    println!("    Hash:         {}", block.hash().to_hex().bright_yellow());
    println!(
        "    Merkle Root:  {}",
        block.header.merkle_root.to_hex().bright_black()
    );
    println!("    Nonce:        {}", block.header.nonce);
    println!("    Certificates: {}", block.tx_count());
    println!("    Elapsed:      {:.2?}", started.elapsed());
    println!();

    Ok(())
}
