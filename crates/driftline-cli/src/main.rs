//! Driftline CLI - inspect and drive an offline-first sync store
//!
//! Status, forced sync cycles, change-log maintenance, and conflict
//! resolution from the terminal.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use cli::{Cli, Commands, ConflictCommands, DeviceCommands, LogCommands};
use commands::common::resolve_db_path;
use error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("driftline_core=info".parse().unwrap())
                .add_directive("driftline_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Status { json } => commands::status::run_status(json, &db_path)?,
        Commands::Sync => commands::sync::run_sync(&db_path).await?,
        Commands::Log { command } => match command {
            LogCommands::List { limit, json } => {
                commands::log::run_log_list(limit, json, &db_path)?;
            }
            LogCommands::Failed { limit, json } => {
                commands::log::run_log_failed(limit, json, &db_path)?;
            }
            LogCommands::Reset => commands::log::run_log_reset(&db_path)?,
            LogCommands::Cleanup { days } => commands::log::run_log_cleanup(days, &db_path)?,
        },
        Commands::Conflicts { command } => match command {
            ConflictCommands::List { limit, json } => {
                commands::conflicts::run_conflicts_list(limit, json, &db_path)?;
            }
            ConflictCommands::Resolve { id, resolution, by } => {
                commands::conflicts::run_conflicts_resolve(
                    id,
                    resolution.into(),
                    by.as_deref(),
                    &db_path,
                )?;
            }
        },
        Commands::Device { command } => match command {
            DeviceCommands::Show { json } => commands::device::run_device_show(json, &db_path)?,
            DeviceCommands::Rename { name } => {
                commands::device::run_device_rename(&name, &db_path)?;
            }
        },
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
