//! certchain CLI entry point.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "certchain")]
#[command(about = "A proof-of-work ledger of academic certificates", long_about = None)]
struct Cli {
    /// Directory to store blockchain data
    #[arg(short, long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd, &cli.data_dir) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("certchain - A proof-of-work ledger of academic certificates");
            println!("Run 'certchain --help' for usage information.");
        }
    }
}
