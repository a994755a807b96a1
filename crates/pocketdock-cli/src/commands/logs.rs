//! Logs command: reads per-instance history.jsonl files.

use crate::output;
use anyhow::Result;
use clap::Args;
use pocketdock_core::{find_project_root, list_instance_dirs};
use pocketdock_error::Error;
use std::path::Path;

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// Container name (all instances if omitted)
    pub container: Option<String>,

    /// Number of entries to show
    #[arg(long, default_value_t = 10)]
    pub last: usize,

    /// Filter by entry type (run, session, detach)
    #[arg(long = "type")]
    pub entry_type: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Executes the logs command.
pub async fn execute(args: LogsArgs) -> Result<()> {
    let root = find_project_root(None).ok_or(Error::ProjectNotInitialized)?;

    let dirs: Vec<_> = list_instance_dirs(&root)
        .into_iter()
        .filter(|dir| match &args.container {
            Some(name) => dir.file_name().is_some_and(|n| n.to_string_lossy() == *name),
            None => true,
        })
        .collect();

    let mut entries = Vec::new();
    for dir in &dirs {
        entries.extend(read_history(dir));
    }
    if let Some(wanted) = &args.entry_type {
        entries.retain(|entry| entry["type"].as_str() == Some(wanted));
    }
    entries.sort_by(|a, b| {
        a["timestamp"]
            .as_str()
            .unwrap_or("")
            .cmp(b["timestamp"].as_str().unwrap_or(""))
    });
    let start = entries.len().saturating_sub(args.last);
    let entries = &entries[start..];

    if args.json {
        return output::print_json(&entries);
    }
    if entries.is_empty() {
        println!("No log entries.");
        return Ok(());
    }
    println!(
        "{:<14} {:<8} {:<40} {:<6} {}",
        "INSTANCE", "TYPE", "COMMAND", "EXIT", "TIMESTAMP"
    );
    for entry in entries {
        println!(
            "{:<14} {:<8} {:<40} {:<6} {}",
            entry["_instance"].as_str().unwrap_or(""),
            entry["type"].as_str().unwrap_or(""),
            output::truncate(entry["command"].as_str().unwrap_or(""), 40),
            entry["exit_code"]
                .as_i64()
                .map(|c| c.to_string())
                .unwrap_or_default(),
            entry["timestamp"].as_str().unwrap_or(""),
        );
    }
    Ok(())
}

fn read_history(instance_dir: &Path) -> Vec<serde_json::Value> {
    let instance = instance_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Ok(text) = std::fs::read_to_string(instance_dir.join("logs/history.jsonl")) else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let mut entry: serde_json::Value = serde_json::from_str(line).ok()?;
            entry["_instance"] = serde_json::Value::String(instance.clone());
            Some(entry)
        })
        .collect()
}
