use std::path::Path;

use driftline_core::models::ConflictResolution;

use crate::commands::common::{conflict_to_item, format_conflict_lines, open_runtime, ConflictItem};
use crate::error::CliError;

pub fn run_conflicts_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let conflicts = runtime.conflicts().list(limit)?;

    if as_json {
        let items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_conflicts_resolve(
    id: i64,
    resolution: ConflictResolution,
    resolved_by: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let record = runtime.conflicts().resolve(id, resolution, resolved_by)?;

    println!(
        "Conflict #{} on {}/{} resolved: {}",
        record.id, record.entity_type, record.entity_id, resolution
    );
    Ok(())
}
