//! Assembly of [`ContainerInfo`] from engine API responses.

use crate::types::ContainerInfo;
use chrono::{DateTime, Utc};
use pocketdock_engine::types::{ContainerInspect, ContainerStats, TopResponse};
use std::collections::HashMap;

/// Engine sentinel for "never started".
const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

pub(crate) fn build_container_info(
    inspect: &ContainerInspect,
    stats: Option<&ContainerStats>,
    top: Option<&TopResponse>,
    name: &str,
) -> ContainerInfo {
    let status = inspect.state.status.clone();
    let created_at = parse_engine_timestamp(&inspect.created);

    let started_at = if inspect.state.started_at.is_empty()
        || inspect.state.started_at == ZERO_TIME
    {
        None
    } else {
        parse_engine_timestamp(&inspect.state.started_at)
    };
    let uptime_seconds = match started_at {
        Some(started) if status == "running" => {
            u64::try_from((Utc::now() - started).num_seconds()).ok()
        }
        _ => None,
    };

    let (memory_usage_bytes, memory_limit_bytes, memory_percent) = stats
        .map(|s| {
            let usage = s.memory_stats.usage;
            let limit = s.memory_stats.limit;
            let percent = if limit > 0 {
                round2(usage as f64 / limit as f64 * 100.0)
            } else {
                0.0
            };
            (usage, limit, percent)
        })
        .unwrap_or_default();

    let ip_address = inspect.network_settings.ip_address.clone();

    ContainerInfo {
        id: inspect.id.clone(),
        name: name.to_string(),
        status,
        image: inspect.config.image.clone(),
        created_at,
        started_at,
        uptime_seconds,
        memory_usage_bytes,
        memory_limit_bytes,
        memory_percent,
        cpu_percent: stats.map(compute_cpu_percent).unwrap_or_default(),
        pids: stats.map(|s| s.pids_stats.current).unwrap_or_default(),
        network: !ip_address.is_empty(),
        ip_address,
        processes: top.map(extract_processes).unwrap_or_default(),
    }
}

/// CPU usage over the stats window, from the engine's paired
/// cpu/precpu samples.
pub(crate) fn compute_cpu_percent(stats: &ContainerStats) -> f64 {
    let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
        - stats.precpu_stats.cpu_usage.total_usage as f64;
    let system_delta =
        stats.cpu_stats.system_cpu_usage as f64 - stats.precpu_stats.system_cpu_usage as f64;
    let online = f64::from(stats.cpu_stats.online_cpus);
    if system_delta > 0.0 && online > 0.0 {
        round2(cpu_delta / system_delta * online * 100.0)
    } else {
        0.0
    }
}

fn extract_processes(top: &TopResponse) -> Vec<HashMap<String, String>> {
    top.processes
        .iter()
        .map(|row| {
            top.titles
                .iter()
                .zip(row.iter())
                .map(|(title, value)| (title.clone(), value.clone()))
                .collect()
        })
        .collect()
}

/// Parses an engine RFC3339 timestamp, tolerating the nanosecond
/// precision Podman emits.
pub(crate) fn parse_engine_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketdock_engine::types::{CpuStats, CpuUsage, MemoryStats, PidsStats};

    fn stats(usage: u64, limit: u64) -> ContainerStats {
        ContainerStats {
            memory_stats: MemoryStats { usage, limit },
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 2_000_000,
                },
                system_cpu_usage: 10_000_000,
                online_cpus: 4,
            },
            precpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 1_000_000,
                },
                system_cpu_usage: 6_000_000,
                online_cpus: 4,
            },
            pids_stats: PidsStats { current: 3 },
        }
    }

    #[test]
    fn test_cpu_percent_from_deltas() {
        // delta 1e6 over system delta 4e6 across 4 cpus = 100%.
        assert!((compute_cpu_percent(&stats(0, 0)) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cpu_percent_zero_without_system_delta() {
        let mut s = stats(0, 0);
        s.precpu_stats.system_cpu_usage = s.cpu_stats.system_cpu_usage;
        assert_eq!(compute_cpu_percent(&s), 0.0);
    }

    #[test]
    fn test_memory_percent() {
        let inspect = ContainerInspect {
            id: "abc".to_string(),
            created: "2024-01-15T10:30:00Z".to_string(),
            state: pocketdock_engine::types::InspectState {
                status: "running".to_string(),
                running: true,
                exit_code: 0,
                started_at: "2024-01-15T10:30:01Z".to_string(),
            },
            config: pocketdock_engine::types::InspectConfig::default(),
            host_config: pocketdock_engine::types::InspectHostConfig::default(),
            network_settings: pocketdock_engine::types::NetworkSettings::default(),
        };
        let s = stats(32 * 1024 * 1024, 64 * 1024 * 1024);
        let info = build_container_info(&inspect, Some(&s), None, "pd-test");
        assert_eq!(info.memory_limit_bytes, 64 * 1024 * 1024);
        assert_eq!(info.memory_usage_bytes, 32 * 1024 * 1024);
        assert!((info.memory_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(info.pids, 3);
        assert!(info.uptime_seconds.is_some());
    }

    #[test]
    fn test_nanosecond_timestamps_parse() {
        let parsed = parse_engine_timestamp("2024-01-15T10:30:00.123456789+00:00");
        assert!(parsed.is_some());
    }

    #[test]
    fn test_zero_started_at_means_never_started() {
        let inspect = ContainerInspect {
            id: "abc".to_string(),
            created: "2024-01-15T10:30:00Z".to_string(),
            state: pocketdock_engine::types::InspectState {
                status: "created".to_string(),
                running: false,
                exit_code: 0,
                started_at: ZERO_TIME.to_string(),
            },
            config: pocketdock_engine::types::InspectConfig::default(),
            host_config: pocketdock_engine::types::InspectHostConfig::default(),
            network_settings: pocketdock_engine::types::NetworkSettings::default(),
        };
        let info = build_container_info(&inspect, None, None, "pd-test");
        assert!(info.started_at.is_none());
        assert!(info.uptime_seconds.is_none());
    }

    #[test]
    fn test_processes_zip_titles() {
        let top = TopResponse {
            titles: vec!["PID".to_string(), "CMD".to_string()],
            processes: vec![vec!["1".to_string(), "sleep infinity".to_string()]],
        };
        let procs = extract_processes(&top);
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0]["PID"], "1");
        assert_eq!(procs[0]["CMD"], "sleep infinity");
    }
}
