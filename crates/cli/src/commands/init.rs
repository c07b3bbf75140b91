//! Initialize ledger command.

use super::{run_interruptible, DataDir};
use anyhow::{bail, Context, Result};
use certchain_chain::{Blockchain, BlockchainConfig};
use certchain_core::MiningControl;
use certchain_storage::ChainStore;
use clap::Args;
use colored::Colorize;
use std::fs;

#[derive(Args)]
pub struct InitArgs {
    /// Leading zero hex digits required of block hashes
    #[arg(long)]
    pub difficulty: Option<u32>,

    /// Maximum certificates per block
    #[arg(long)]
    pub max_block_size: Option<usize>,

    /// Threads used for the nonce search
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Give up mining a block after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

pub fn run(args: InitArgs, data: &DataDir) -> Result<()> {
    println!("{}", "Initializing certchain...".bold().cyan());
    println!();

    if data.is_initialized() {
        bail!("Ledger already initialized at {}", data.root().display());
    }

    let defaults = BlockchainConfig::default();
    let config = BlockchainConfig {
        difficulty: args.difficulty.unwrap_or(defaults.difficulty),
        max_block_size: args.max_block_size.unwrap_or(defaults.max_block_size),
        mining_workers: args.workers.unwrap_or(defaults.mining_workers),
        mining_timeout_secs: args.timeout_secs.or(defaults.mining_timeout_secs),
        ..defaults
    };
    config.validate()?;

    fs::create_dir_all(data.root())
        .with_context(|| format!("Failed to create data directory: {:?}", data.root()))?;
    let storage = data.open_storage()?;
    let store = ChainStore::new(&storage);
    if store.is_initialized()? {
        bail!("Storage at {} already holds blocks", data.db_path().display());
    }

    println!("{}  Created data directory", "✓".green().bold());
    println!(
        "    Mining genesis at difficulty {}...",
        config.difficulty.to_string().bright_cyan()
    );

    let mut ledger = Blockchain::new(config.clone())?;
    let control = MiningControl::new();
    let worker_control = control.clone();
    let (ledger, sealed) = run_interruptible(&control, move || {
        let sealed = ledger.init_genesis(&worker_control);
        (ledger, sealed)
    })?;
    let genesis = sealed.context("Failed to mine genesis block")?;

    store.save_blockchain(&ledger)?;
    data.save_config(&config)?;

    println!("{}  Created genesis block", "✓".green().bold());
    println!("    Hash:  {}", genesis.hash().to_hex().bright_yellow());
    println!("    Nonce: {}", genesis.header.nonce.to_string().bright_cyan());
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        data.config_path().display().to_string().bright_black()
    );

    println!();
    println!("{}", "Ledger initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to queue certificates",
        "certchain add".bright_cyan()
    );
    println!(
        "  • Use {} to seal them into a block",
        "certchain mine".bright_cyan()
    );
    println!(
        "  • Use {} to export a proof",
        "certchain prove".bright_cyan()
    );

    Ok(())
}
