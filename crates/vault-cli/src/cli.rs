use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vault",
    about = "Chain Vault: verify and repair blockchain stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with repair settings. Flags override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan a store for corruption without changing it
    Check(CheckArgs),
    /// Check a store and rebuild or quarantine it as needed
    Repair(CheckArgs),
    /// Print the quarantine name a file would get
    Fingerprint(FingerprintArgs),
    /// Create a store holding a signed demo chain
    InitDemo(InitDemoArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the store file
    pub db: PathBuf,
    /// Hex-encoded public key of the chain signer
    #[arg(long)]
    pub pubkey: String,
    /// Verification threads
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Report every faulty block instead of stopping at the first
    #[arg(long)]
    pub exhaustive: bool,
    /// Lock wait in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args)]
pub struct FingerprintArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct InitDemoArgs {
    /// Path of the store to create
    pub db: PathBuf,
    /// Number of blocks to append
    #[arg(short = 'n', long, default_value = "100")]
    pub blocks: u64,
    /// Maximum transactions per block
    #[arg(long, default_value = "4")]
    pub max_txns: u64,
}
