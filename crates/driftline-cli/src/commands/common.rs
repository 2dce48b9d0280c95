use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use driftline_core::models::{ChangeLogEntry, ConflictRecord};
use driftline_core::{SyncRuntime, SyncSettings};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ChangeLogItem {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub version: i64,
    pub synced: bool,
    pub retry_count: i64,
    pub sync_error: Option<String>,
    pub timestamp: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub conflicting_fields: Vec<String>,
    pub resolution: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: i64,
    pub relative_time: String,
}

/// Resolve the store path: flag, then env, then the platform data dir
pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("DRIFTLINE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("driftline")
        .join("driftline.db")
}

/// Build settings from the environment (remote endpoint optional)
pub fn settings_from_env() -> SyncSettings {
    let mut settings = SyncSettings::new();

    if let (Ok(url), Ok(token)) = (
        env::var("DRIFTLINE_SYNC_URL"),
        env::var("DRIFTLINE_SYNC_TOKEN"),
    ) {
        if !url.trim().is_empty() && !token.trim().is_empty() {
            settings = settings.with_remote(url, token);
        }
    }

    if let Some(seconds) = env::var("DRIFTLINE_SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
    {
        settings = settings.with_sync_interval(std::time::Duration::from_secs(seconds));
    }

    settings
}

/// Open the runtime over the store at `db_path`
pub fn open_runtime(db_path: &Path) -> Result<SyncRuntime, CliError> {
    Ok(SyncRuntime::bootstrap(db_path, settings_from_env())?)
}

pub fn entry_to_item(entry: &ChangeLogEntry) -> ChangeLogItem {
    let now_ms = Utc::now().timestamp_millis();
    ChangeLogItem {
        id: entry.id.to_string(),
        entity_type: entry.entity_type.clone(),
        entity_id: entry.entity_id.clone(),
        operation: entry.operation.to_string(),
        version: entry.version,
        synced: entry.synced,
        retry_count: entry.retry_count,
        sync_error: entry.sync_error.clone(),
        timestamp: entry.timestamp,
        relative_time: format_relative_time(entry.timestamp, now_ms),
    }
}

pub fn format_entry_lines(entries: &[ChangeLogEntry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let id = entry.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let target = format!("{}/{}", entry.entity_type, entry.entity_id);
            let relative_time = format_relative_time(entry.timestamp, now_ms);

            let operation = entry.operation.as_str();
            match entry.sync_error.as_deref() {
                Some(error) => format!(
                    "{short_id:<13}  {operation:<7} v{:<4} {target:<30}  {relative_time:<10}  {error}",
                    entry.version
                ),
                None => format!(
                    "{short_id:<13}  {operation:<7} v{:<4} {target:<30}  {relative_time}",
                    entry.version
                ),
            }
        })
        .collect()
}

pub fn conflict_to_item(conflict: &ConflictRecord) -> ConflictItem {
    let now_ms = Utc::now().timestamp_millis();
    ConflictItem {
        id: conflict.id,
        entity_type: conflict.entity_type.clone(),
        entity_id: conflict.entity_id.clone(),
        conflicting_fields: conflict.conflicting_fields.clone(),
        resolution: conflict.resolution.map(|resolution| resolution.to_string()),
        resolved_by: conflict.resolved_by.clone(),
        created_at: conflict.created_at,
        relative_time: format_relative_time(conflict.created_at, now_ms),
    }
}

pub fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    conflicts
        .iter()
        .map(|conflict| {
            let target = format!("{}/{}", conflict.entity_type, conflict.entity_id);
            let fields = conflict.conflicting_fields.join(", ");
            let relative_time = format_relative_time(conflict.created_at, now_ms);
            let status = conflict
                .resolution
                .map_or_else(|| "unresolved".to_string(), |resolution| resolution.to_string());

            format!(
                "#{:<5} {target:<30}  {status:<10}  {relative_time:<10}  [{fields}]",
                conflict.id
            )
        })
        .collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
