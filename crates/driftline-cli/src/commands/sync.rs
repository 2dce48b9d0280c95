use std::path::Path;
use std::sync::Arc;

use driftline_core::sync::{RemoteChangeApplier, RemoteChange, SyncOutcome};

use crate::commands::common::open_runtime;
use crate::error::CliError;

/// CLI-side applier: the CLI owns no entity repositories, so remote changes
/// are logged and land in the sync log only (the engine records each
/// applied version durably). Host applications supply a real applier.
struct LogOnlyApplier;

impl RemoteChangeApplier for LogOnlyApplier {
    fn apply(&self, change: &RemoteChange) -> driftline_core::Result<()> {
        tracing::info!(
            entity_type = %change.entity_type,
            entity_id = %change.entity_id,
            operation = change.operation.as_str(),
            version = change.version,
            "Remote change received"
        );
        Ok(())
    }
}

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;

    let Some((engine, monitor)) = runtime.build_engine(Arc::new(LogOnlyApplier))? else {
        return Err(CliError::SyncNotConfigured);
    };

    let outcome = engine.sync_now().await;
    engine.destroy();
    monitor.destroy();

    match outcome? {
        SyncOutcome::Completed(report) => {
            println!(
                "Sync completed: pushed {}, pulled {}, applied {}, conflicts {} ({} ms)",
                report.pushed, report.pulled, report.applied, report.conflicts, report.duration_ms
            );
            if report.push_failed > 0 {
                println!(
                    "{} changes failed to push; see `driftline log failed`",
                    report.push_failed
                );
            }
        }
        SyncOutcome::Skipped => println!("Sync skipped: another cycle is in progress"),
    }

    Ok(())
}
