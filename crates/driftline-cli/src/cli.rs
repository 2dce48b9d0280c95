use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use driftline_core::models::ConflictResolution;

#[derive(Parser)]
#[command(name = "driftline")]
#[command(about = "Inspect and drive an offline-first sync store from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local sync store
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync state, pending changes, and device identity
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync cycle against the configured remote endpoint
    Sync,
    /// Inspect and maintain the change log
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// List and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Show or rename this installation's device identity
    Device {
        #[command(subcommand)]
        command: DeviceCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// List changes awaiting push
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List changes that exhausted their push retries
    Failed {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Return failed changes to the pending pool
    Reset,
    /// Delete synced changes older than the retention window
    Cleanup {
        /// Retention window in days
        #[arg(long, default_value = "7")]
        days: i64,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List recorded sync conflicts
    List {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a resolution decision for a conflict
    Resolve {
        /// Conflict id (see `driftline conflicts list`)
        id: i64,
        /// Which side wins
        #[arg(long, value_enum)]
        resolution: ResolutionArg,
        /// Who resolved it
        #[arg(long, value_name = "NAME")]
        by: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// Show the device record
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename this installation
    Rename {
        /// New display name
        name: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    Local,
    Server,
}

impl From<ResolutionArg> for ConflictResolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::Local => Self::Local,
            ResolutionArg::Server => Self::Server,
        }
    }
}
