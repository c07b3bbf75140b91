//! CLI commands module.

use anyhow::{Context, Result};
use certchain_chain::BlockchainConfig;
use certchain_core::MiningControl;
use certchain_storage::Storage;
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

mod add;
mod chain;
mod export;
mod init;
mod mine;
mod proof;

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new ledger and mine its genesis block
    Init(init::InitArgs),
    /// Queue a certificate for the next block
    Add(add::AddArgs),
    /// Seal pending certificates into a block
    Mine(mine::MineArgs),
    /// Show the blocks in the chain
    Chain(chain::ChainArgs),
    /// Re-validate the stored chain
    Validate,
    /// Write an inclusion proof for a certificate
    Prove(proof::ProveArgs),
    /// Check a proof file against a published merkle root
    Verify(proof::VerifyArgs),
    /// Write the whole chain as JSON
    Export(export::ExportArgs),
}

pub fn run(cmd: Commands, data_dir: &Path) -> Result<()> {
    let data = DataDir::new(data_dir);
    match cmd {
        Commands::Init(args) => init::run(args, &data),
        Commands::Add(args) => add::run(args, &data),
        Commands::Mine(args) => mine::run(args, &data),
        Commands::Chain(args) => chain::run(args, &data),
        Commands::Validate => chain::validate(&data),
        Commands::Prove(args) => proof::prove(args, &data),
        Commands::Verify(args) => proof::verify(args, &data),
        Commands::Export(args) => export::run(args, &data),
    }
}

/// Layout of the data directory: `config.json` next to the sled database.
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path().exists()
    }

    pub fn load_config(&self) -> Result<BlockchainConfig> {
        let contents = fs::read_to_string(self.config_path())
            .context("Failed to read config.json. Did you run 'certchain init'?")?;
        serde_json::from_str(&contents).context("Invalid config.json")
    }

    pub fn save_config(&self, config: &BlockchainConfig) -> Result<()> {
        fs::write(self.config_path(), serde_json::to_string_pretty(config)?)
            .with_context(|| format!("Failed to write {}", self.config_path().display()))
    }

    pub fn open_storage(&self) -> Result<Storage> {
        Storage::open(self.db_path())
            .with_context(|| format!("Failed to open storage at {}", self.db_path().display()))
    }
}

/// Run blocking work while listening for Ctrl-C.
///
/// An interrupt cancels `control`; the work is still awaited so it can
/// observe the flag and return on its own.
pub fn run_interruptible<T, F>(control: &MiningControl, work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;

    runtime.block_on(async {
        let mut task = tokio::task::spawn_blocking(work);
        tokio::select! {
            joined = &mut task => joined.map_err(anyhow::Error::from),
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    return Err(anyhow::Error::from(e).context("Failed to listen for Ctrl-C"));
                }
                warn!("interrupt received, stopping the miner");
                control.cancel();
                task.await.map_err(anyhow::Error::from)
            }
        }
    })
}

/// Render a unix timestamp for display.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::<chrono::Utc>::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}
