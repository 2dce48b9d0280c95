use std::path::Path;

use crate::commands::common::{entry_to_item, format_entry_lines, open_runtime, ChangeLogItem};
use crate::error::CliError;

pub fn run_log_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let entries = runtime.changelog().pending(limit)?;

    if as_json {
        let items = entries.iter().map(entry_to_item).collect::<Vec<ChangeLogItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No changes awaiting push.");
        return Ok(());
    }

    for line in format_entry_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_log_failed(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let entries = runtime.changelog().failed(limit)?;

    if as_json {
        let items = entries.iter().map(entry_to_item).collect::<Vec<ChangeLogItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No failed changes.");
        return Ok(());
    }

    for line in format_entry_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_log_reset(db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let restored = runtime.changelog().reset_failed()?;
    println!("Returned {restored} changes to the pending pool");
    Ok(())
}

pub fn run_log_cleanup(days: i64, db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let deleted = runtime.changelog().cleanup(days)?;
    println!("Deleted {deleted} synced changes older than {days} days");
    Ok(())
}
