//! # Beacon CLI
//!
//! Entry point for the `beacon` binary. Parses arguments, initializes
//! logging, and dispatches to the command implementations.
//!
//! - `project create` / `project show` — project file management
//! - `pledge verify` — check a pledge against a project and a UTXO set
//! - `contract assemble` — combine pledges into a claim transaction

mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;

use cli::{BeaconCli, Commands, ContractCommands, PledgeCommands, ProjectCommands};
use logging::LogFormat;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = BeaconCli::parse();
    logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Project(ProjectCommands::Create(args)) => commands::project_create(args),
        Commands::Project(ProjectCommands::Show(args)) => commands::project_show(args),
        Commands::Pledge(PledgeCommands::Verify(args)) => commands::pledge_verify(args).await,
        Commands::Contract(ContractCommands::Assemble(args)) => commands::contract_assemble(args),
    }
}
