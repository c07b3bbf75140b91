//! Merkle proof export and verification commands.

use super::DataDir;
use anyhow::{bail, Context, Result};
use certchain_chain::{verify_record_json, ProofRecord};
use certchain_core::Hash;
use certchain_storage::ChainStore;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

#[derive(Args)]
pub struct ProveArgs {
    /// Student identifier
    #[arg(long)]
    pub student_id: String,

    /// Course title
    #[arg(long)]
    pub course: String,

    /// Output file (defaults to merkle_proof_b{block}_t{tx}.json)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Proof record to check
    pub file: PathBuf,

    /// Published merkle root (hex); defaults to the root in the local chain
    #[arg(long)]
    pub root: Option<String>,
}

pub fn prove(args: ProveArgs, data: &DataDir) -> Result<()> {
    data.load_config()?;
    let storage = data.open_storage()?;
    let chain = ChainStore::new(&storage).load_chain()?;

    let (block_index, tx_index) = chain
        .find_certificate(&args.student_id, &args.course)
        .with_context(|| {
            format!(
                "No sealed certificate for student {} in {}",
                args.student_id, args.course
            )
        })?;
    let record = ProofRecord::from_chain(&chain, block_index, tx_index)?;

    let path = args
        .out
        .unwrap_or_else(|| PathBuf::from(record.file_name()));
    fs::write(&path, record.to_json()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{}  Proof written", "✓".green().bold());
    println!("    Block:       {}", block_index.to_string().bright_cyan());
    println!("    Position:    {}", tx_index.to_string().bright_cyan());
    println!("    Leaf:        {}", record.leaf_value.to_hex().bright_yellow());
    println!("    Merkle Root: {}", record.root.to_hex().bright_yellow());
    println!("    Steps:       {}", record.path.len());
    println!(
        "    File:        {}",
        path.display().to_string().bright_black()
    );

    Ok(())
}

pub fn verify(args: VerifyArgs, data: &DataDir) -> Result<()> {
    let contents = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let root = match args.root {
        Some(hex) => Hash::from_hex(&hex).with_context(|| format!("Invalid root: {}", hex))?,
        None => published_root(&contents, data)?,
    };

    if verify_record_json(&contents, &root) {
        println!(
            "{}  Proof is VALID against root {}",
            "✓".green().bold(),
            root.to_hex().bright_yellow()
        );
        Ok(())
    } else {
        println!(
            "{}  Proof is INVALID against root {}",
            "✗".red().bold(),
            root.to_hex().bright_yellow()
        );
        bail!("proof verification failed")
    }
}

/// Merkle root of the block the record refers to, from the local chain.
fn published_root(contents: &str, data: &DataDir) -> Result<Hash> {
    let record = ProofRecord::from_json(contents)?;
    data.load_config()?;
    let storage = data.open_storage()?;
    let chain = ChainStore::new(&storage).load_chain()?;
    chain
        .merkle_root_of(record.block_index)
        .with_context(|| format!("Block {} not in the local chain", record.block_index))
}
