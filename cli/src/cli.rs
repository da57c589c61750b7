//! # CLI Interface
//!
//! Argument structure for the `beacon` binary using `clap` derive. The
//! tool is file-oriented: projects, pledges, and UTXO sets are JSON files
//! on disk, and every command reads some and writes others (or stdout).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Beacon crowdfunding operator tool.
///
/// Creates project files, inspects them, verifies pledge files against a
/// UTXO set, and assembles pledges into a claim transaction.
#[derive(Parser, Debug)]
#[command(name = "beacon", about = "Assurance-contract crowdfunding tool", version)]
pub struct BeaconCli {
    /// Log verbosity level: trace, debug, info, warn, error.
    #[arg(long, env = "BEACON_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// Log output format: pretty or json.
    #[arg(long, env = "BEACON_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Project file operations.
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Pledge file operations.
    #[command(subcommand)]
    Pledge(PledgeCommands),

    /// Contract assembly.
    #[command(subcommand)]
    Contract(ContractCommands),
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a new project file with a fresh auth key.
    Create(ProjectCreateArgs),
    /// Show a project file's contents and identity.
    Show(ProjectShowArgs),
}

#[derive(Args, Debug)]
pub struct ProjectCreateArgs {
    /// Project title.
    #[arg(long)]
    pub title: String,

    /// Longer project description.
    #[arg(long, default_value = "")]
    pub memo: String,

    /// Destination address the goal is paid to (bcn1...).
    #[arg(long)]
    pub address: String,

    /// Goal amount in satoshis.
    #[arg(long)]
    pub goal: u64,

    /// Where to write the project file.
    #[arg(long, short = 'o')]
    pub out: PathBuf,

    /// Where to write the owner keychain seed (sealed under the
    /// passphrase given with --passphrase).
    #[arg(long)]
    pub seed_out: Option<PathBuf>,

    /// Passphrase sealing the keychain seed. Required with --seed-out.
    #[arg(long, env = "BEACON_PASSPHRASE")]
    pub passphrase: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProjectShowArgs {
    /// Path to the project file.
    pub file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum PledgeCommands {
    /// Verify a pledge file against a project and a UTXO set.
    Verify(PledgeVerifyArgs),
}

#[derive(Args, Debug)]
pub struct PledgeVerifyArgs {
    /// Path to the project file.
    #[arg(long)]
    pub project: PathBuf,

    /// Path to the pledge file.
    #[arg(long)]
    pub pledge: PathBuf,

    /// Path to a JSON file listing unspent outputs.
    #[arg(long)]
    pub utxos: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ContractCommands {
    /// Combine pledge files into a claim transaction.
    Assemble(ContractAssembleArgs),
}

#[derive(Args, Debug)]
pub struct ContractAssembleArgs {
    /// Path to the project file.
    #[arg(long)]
    pub project: PathBuf,

    /// Pledge files to combine.
    #[arg(long = "pledge", required = true)]
    pub pledges: Vec<PathBuf>,

    /// Require the pledged total to equal the goal exactly.
    #[arg(long)]
    pub strict: bool,
}
