use std::path::Path;

use chrono::Utc;

use crate::commands::common::{format_relative_time, open_runtime};
use crate::error::CliError;

pub fn run_device_show(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let device = runtime.device().info()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&device)?);
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    println!("Id:         {}", device.id);
    println!("Name:       {}", device.name);
    println!("Platform:   {}", device.platform);
    if let Some(version) = &device.app_version {
        println!("Version:    {version}");
    }
    match device.last_sync_at {
        Some(timestamp) => println!("Last sync:  {}", format_relative_time(timestamp, now_ms)),
        None => println!("Last sync:  never"),
    }
    Ok(())
}

pub fn run_device_rename(name: &str, db_path: &Path) -> Result<(), CliError> {
    let runtime = open_runtime(db_path)?;
    let device = runtime.device().update_name(name)?;
    println!("Device renamed to {}", device.name);
    Ok(())
}
