//! Chain inspection commands.

use super::{format_timestamp, DataDir};
use anyhow::{bail, Result};
use certchain_core::Block;
use certchain_storage::{ChainStore, StorageError};
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct ChainArgs {
    /// Also list every certificate
    #[arg(short, long)]
    pub full: bool,
}

pub fn run(args: ChainArgs, data: &DataDir) -> Result<()> {
    let config = data.load_config()?;
    let storage = data.open_storage()?;
    let ledger = ChainStore::new(&storage).load_blockchain(config)?;
    let stats = ledger.stats();
    let pool = ledger.mempool().stats();

    println!();
    println!("{}", "Chain:".bold().cyan());
    println!();
    println!("  Blocks:       {}", stats.length.to_string().bright_cyan());
    println!(
        "  Certificates: {}",
        stats.total_certificates.to_string().bright_cyan()
    );
    println!(
        "  Pending:      {} / {}",
        pool.pending.to_string().bright_cyan(),
        pool.capacity
    );
    println!(
        "  Difficulty:   {}",
        stats.difficulty.to_string().bright_cyan()
    );
    println!();

    for block in ledger.chain().iter() {
        print_block(block, args.full);
    }

    Ok(())
}

fn print_block(block: &Block, full: bool) {
    println!(
        "  {} {} {}",
        format!("#{}", block.index()).bright_black(),
        block.hash().to_hex()[..16].bright_yellow(),
        format!("({} certificates)", block.tx_count()).bright_black()
    );
    println!(
        "      Previous:    {}",
        block.header.previous_hash.to_hex().bright_black()
    );
    println!(
        "      Merkle Root: {}",
        block.header.merkle_root.to_hex().bright_black()
    );
    println!(
        "      Nonce:       {}  Difficulty: {}",
        block.header.nonce, block.header.difficulty
    );
    println!(
        "      Timestamp:   {}",
        format_timestamp(block.header.timestamp).bright_black()
    );

    if full {
        for (i, cert) in block.transactions.iter().enumerate() {
            println!(
                "      {} {} {} {} {}",
                format!("{}.", i).bright_black(),
                cert.student_id.bright_cyan(),
                cert.name,
                cert.course,
                cert.grade.bold()
            );
        }
    }
    println!();
}

pub fn validate(data: &DataDir) -> Result<()> {
    // Fail before opening storage on an uninitialized directory.
    data.load_config()?;
    let storage = data.open_storage()?;

    match ChainStore::new(&storage).load_chain() {
        Ok(chain) => {
            println!(
                "{}  Chain is valid ({} blocks)",
                "✓".green().bold(),
                chain.len()
            );
            Ok(())
        }
        Err(StorageError::Chain(e)) => {
            println!(
                "{}  Chain is invalid at block {}: {}",
                "✗".red().bold(),
                e.block_index(),
                e
            );
            bail!("chain validation failed")
        }
        Err(e) => Err(e.into()),
    }
}
