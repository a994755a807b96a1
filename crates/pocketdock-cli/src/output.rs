//! Human and JSON output helpers.

use anyhow::Result;
use pocketdock_core::units::format_bytes;
use pocketdock_core::{ContainerInfo, ContainerListItem, DoctorReport};
use serde::Serialize;

/// Prints any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_container_list(items: &[ContainerListItem]) {
    if items.is_empty() {
        println!("No pocketdock containers.");
        return;
    }
    println!(
        "{:<14} {:<16} {:<10} {:<28} {:<8} {}",
        "ID", "NAME", "STATUS", "IMAGE", "PERSIST", "PROJECT"
    );
    for item in items {
        println!(
            "{:<14} {:<16} {:<10} {:<28} {:<8} {}",
            item.id,
            item.name,
            item.status,
            truncate(&item.image, 28),
            if item.persist { "yes" } else { "no" },
            item.project
        );
    }
}

pub fn print_container_info(info: &ContainerInfo) {
    println!("Name:       {}", info.name);
    println!("ID:         {}", short_id(&info.id));
    println!("Status:     {}", info.status);
    println!("Image:      {}", info.image);
    if let Some(created) = info.created_at {
        println!("Created:    {created}");
    }
    if let Some(uptime) = info.uptime_seconds {
        println!("Uptime:     {}s", uptime);
    }
    if info.memory_limit_bytes > 0 {
        println!(
            "Memory:     {} / {} ({:.1}%)",
            format_bytes(info.memory_usage_bytes),
            format_bytes(info.memory_limit_bytes),
            info.memory_percent
        );
    } else if info.memory_usage_bytes > 0 {
        println!("Memory:     {}", format_bytes(info.memory_usage_bytes));
    }
    if info.cpu_percent > 0.0 {
        println!("CPU:        {:.1}%", info.cpu_percent);
    }
    if info.pids > 0 {
        println!("PIDs:       {}", info.pids);
    }
    println!(
        "Network:    {}",
        if info.network {
            info.ip_address.as_str()
        } else {
            "none"
        }
    );
    if !info.processes.is_empty() {
        println!("Processes:  {}", info.processes.len());
    }
}

pub fn print_doctor_report(report: &DoctorReport) {
    println!("Healthy instances:    {}", report.healthy);
    if report.orphaned_containers.is_empty() && report.stale_instance_dirs.is_empty() {
        println!("No problems found.");
        return;
    }
    if !report.orphaned_containers.is_empty() {
        println!("Orphaned containers (no instance dir):");
        for name in &report.orphaned_containers {
            println!("  {name}");
        }
    }
    if !report.stale_instance_dirs.is_empty() {
        println!("Stale instance dirs (no container):");
        for name in &report.stale_instance_dirs {
            println!("  {name}");
        }
    }
}

pub fn short_id(id: &str) -> &str {
    if id.len() > 12 {
        &id[..12]
    } else {
        id
    }
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len.saturating_sub(3)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abc123def456789"), "abc123def456");
        assert_eq!(short_id("short"), "short");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 20), "hello");
        assert_eq!(truncate("hello world this is long", 15), "hello world ...");
    }
}
