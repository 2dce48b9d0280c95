use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use driftline_core::models::{ChangeOperation, ChangePayload};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::commands::common::{
    entry_to_item, format_conflict_lines, format_entry_lines, format_relative_time, open_runtime,
    resolve_db_path,
};
use crate::commands::conflicts::{run_conflicts_list, run_conflicts_resolve};
use crate::commands::log::{run_log_cleanup, run_log_list, run_log_reset};
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

fn unique_test_db_path() -> PathBuf {
    static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("driftline-cli-test-{timestamp}-{sequence}.db"))
}

fn cleanup_db_files(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
}

#[test]
fn resolve_db_path_prefers_explicit_flag() {
    let explicit = PathBuf::from("/tmp/explicit.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn entry_items_carry_operation_and_version() {
    let db_path = unique_test_db_path();
    let runtime = open_runtime(&db_path).unwrap();

    let entry = runtime
        .changelog()
        .record(
            "task",
            "t-1",
            ChangeOperation::Create,
            ChangePayload::new(Some(json!({"title": "a"})), None),
            &runtime.device().id().unwrap(),
        )
        .unwrap();

    let item = entry_to_item(&entry);
    assert_eq!(item.operation, "create");
    assert_eq!(item.version, 1);
    assert!(!item.synced);

    let lines = format_entry_lines(&[entry]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("task/t-1"));
    assert!(lines[0].contains("create"));

    cleanup_db_files(&db_path);
}

#[test]
fn log_commands_round_trip_on_a_fresh_store() {
    let db_path = unique_test_db_path();

    run_log_list(10, false, &db_path).unwrap();
    run_log_list(10, true, &db_path).unwrap();
    run_log_reset(&db_path).unwrap();
    run_log_cleanup(7, &db_path).unwrap();
    run_status(false, &db_path).unwrap();
    run_status(true, &db_path).unwrap();

    cleanup_db_files(&db_path);
}

#[test]
fn conflict_listing_and_resolution() {
    let db_path = unique_test_db_path();
    let record = {
        let runtime = open_runtime(&db_path).unwrap();
        runtime
            .conflicts()
            .record(
                "task",
                "t-1",
                &json!({"title": "local"}),
                &json!({"title": "server"}),
            )
            .unwrap()
    };

    run_conflicts_list(10, false, &db_path).unwrap();
    run_conflicts_resolve(
        record.id,
        driftline_core::models::ConflictResolution::Server,
        Some("tester"),
        &db_path,
    )
    .unwrap();

    let runtime = open_runtime(&db_path).unwrap();
    assert_eq!(runtime.conflicts().unresolved_count().unwrap(), 0);
    let lines = format_conflict_lines(&runtime.conflicts().list(10).unwrap());
    assert!(lines[0].contains("server"));
    assert!(lines[0].contains("title"));

    cleanup_db_files(&db_path);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_sync_requires_sync_configuration() {
    // Only meaningful when the environment carries no sync credentials
    if std::env::var("DRIFTLINE_SYNC_URL").is_ok() {
        return;
    }

    let db_path = unique_test_db_path();

    let error = run_sync(&db_path).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));

    cleanup_db_files(&db_path);
}

#[test]
fn run_completions_writes_bash_script_file() {
    let output_path = std::env::temp_dir().join(format!(
        "driftline-completions-test-{}.bash",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos())
    ));

    crate::commands::completions::run_completions(
        crate::cli::CompletionShell::Bash,
        Some(&output_path),
    )
    .unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_driftline()"));
    assert!(script.contains("complete -F _driftline"));

    let _ = std::fs::remove_file(output_path);
}
