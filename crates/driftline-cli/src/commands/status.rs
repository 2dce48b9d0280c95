use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::commands::common::{format_relative_time, open_runtime};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusItem {
    state: String,
    pending: i64,
    failed: i64,
    total_entries: i64,
    last_sync_version: i64,
    last_sync_at: Option<i64>,
    last_error: Option<String>,
    unresolved_conflicts: i64,
    device_id: String,
    device_name: String,
    platform: String,
    sync_configured: bool,
}

pub fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;

    let record = runtime.state().current()?;
    let counts = runtime.changelog().counts()?;
    let device = runtime.device().info()?;
    let unresolved = runtime.conflicts().unresolved_count()?;

    if as_json {
        let item = StatusItem {
            state: record.status.to_string(),
            pending: counts.pending,
            failed: counts.failed,
            total_entries: counts.total,
            last_sync_version: record.last_sync_version,
            last_sync_at: record.last_sync_at,
            last_error: record.last_error,
            unresolved_conflicts: unresolved,
            device_id: device.id,
            device_name: device.name,
            platform: device.platform,
            sync_configured: runtime.is_sync_configured(),
        };
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    println!("State:      {}", record.status);
    println!("Pending:    {} changes ({} failed)", counts.pending, counts.failed);

    match record.last_sync_at {
        Some(timestamp) => println!(
            "Last sync:  {} (version {})",
            format_relative_time(timestamp, now_ms),
            record.last_sync_version
        ),
        None => println!("Last sync:  never"),
    }

    if let Some(error) = &record.last_error {
        println!("Last error: {error}");
    }

    println!("Conflicts:  {unresolved} unresolved");
    println!("Device:     {} ({})", device.name, device.id);

    match runtime.settings().remote_url.as_deref() {
        Some(url) => println!("Mode:       remote sync via {url}"),
        None => println!("Mode:       local-only"),
    }

    Ok(())
}
