//! Chain export command.

use super::DataDir;
use anyhow::{Context, Result};
use certchain_chain::ChainExport;
use certchain_storage::ChainStore;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

#[derive(Args)]
pub struct ExportArgs {
    /// Output file
    #[arg(short, long, default_value = "chain_export.json")]
    pub out: PathBuf,
}

pub fn run(args: ExportArgs, data: &DataDir) -> Result<()> {
    data.load_config()?;
    let storage = data.open_storage()?;
    let chain = ChainStore::new(&storage).load_chain()?;

    let export = ChainExport::from_chain(&chain);
    fs::write(&args.out, export.to_json()?)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;

    println!(
        "{}  Exported {} blocks to {}",
        "✓".green().bold(),
        export.length.to_string().bright_cyan(),
        args.out.display().to_string().bright_black()
    );

    Ok(())
}
