use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] driftline_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(
        "Sync is not configured. Set DRIFTLINE_SYNC_URL and DRIFTLINE_SYNC_TOKEN to enable `driftline sync`."
    )]
    SyncNotConfigured,
}
