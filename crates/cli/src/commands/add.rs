//! Queue a certificate command.

use super::DataDir;
use anyhow::{Context, Result};
use certchain_core::Certificate;
use certchain_storage::ChainStore;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct AddArgs {
    /// Student identifier
    #[arg(long)]
    pub student_id: String,

    /// Student name
    #[arg(long)]
    pub name: String,

    /// Course title
    #[arg(long)]
    pub course: String,

    /// Awarded grade
    #[arg(long)]
    pub grade: String,
}

pub fn run(args: AddArgs, data: &DataDir) -> Result<()> {
    let config = data.load_config()?;
    let storage = data.open_storage()?;
    let store = ChainStore::new(&storage);
    let mut ledger = store.load_blockchain(config)?;

    let cert = Certificate::issue(args.student_id, args.name, args.course, args.grade);
    let cert_hash = cert.hash();
    let student = cert.student_id.clone();
    let course = cert.course.clone();

    ledger.submit(cert).context("Certificate rejected")?;
    store.save_pending(ledger.mempool().pending())?;

    println!(
        "{}  Queued certificate for {} in {}",
        "✓".green().bold(),
        student.bright_cyan(),
        course.bright_cyan()
    );
    println!("    Hash:    {}", cert_hash.to_hex().bright_yellow());
    println!(
        "    Pending: {}",
        ledger.mempool().len().to_string().bright_cyan()
    );

    Ok(())
}
