//! Public value types returned by container operations.

use chrono::{DateTime, Utc};
use pocketdock_transport::StreamKind;
use serde::Serialize;
use std::collections::HashMap;

/// Outcome of a blocking or streaming exec.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecResult {
    /// Exit code of the command; -1 denotes a timeout.
    pub exit_code: i64,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// True if the command hit its timeout.
    pub timed_out: bool,
    /// True if output was dropped at the accumulation cap.
    pub truncated: bool,
}

impl ExecResult {
    /// True if the command exited 0 and did not time out.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// One frame's worth of output from a streaming or detached exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Which stream the data came from.
    pub kind: StreamKind,
    /// Decoded payload text.
    pub data: String,
}

impl StreamChunk {
    pub(crate) fn from_frame(frame: &pocketdock_transport::Frame) -> Self {
        Self {
            kind: frame.kind,
            data: String::from_utf8_lossy(&frame.data).into_owned(),
        }
    }
}

/// Live snapshot of a container's state and resource usage.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    /// Full container id.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Engine status keyword (`running`, `exited`, ...).
    pub status: String,
    /// Image name.
    pub image: String,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last start time, when the container has been started.
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since start, when running.
    pub uptime_seconds: Option<u64>,
    /// Memory in use, in bytes.
    pub memory_usage_bytes: u64,
    /// Memory limit, in bytes (0 = unlimited).
    pub memory_limit_bytes: u64,
    /// Memory usage as a percentage of the limit.
    pub memory_percent: f64,
    /// CPU usage percentage over the stats sampling window.
    pub cpu_percent: f64,
    /// Number of processes.
    pub pids: u64,
    /// True if the container has a network address.
    pub network: bool,
    /// Primary IP address (empty when off-network).
    pub ip_address: String,
    /// Process list, one column-name -> value map per process.
    pub processes: Vec<HashMap<String, String>>,
}

/// One row of the managed-container listing.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerListItem {
    /// Short (12 char) container id.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Engine state keyword.
    pub status: String,
    /// Image name.
    pub image: String,
    /// Creation timestamp from the managed label (RFC3339).
    pub created_at: String,
    /// Whether shutdown stops rather than removes this container.
    pub persist: bool,
    /// Project the container belongs to (empty if none).
    pub project: String,
}

/// Result of cross-referencing local instance dirs with the engine.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    /// Containers in the engine with no local instance directory.
    pub orphaned_containers: Vec<String>,
    /// Local instance directories with no engine container.
    pub stale_instance_dirs: Vec<String>,
    /// Count of instances present on both sides.
    pub healthy: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_result_ok() {
        let ok = ExecResult {
            exit_code: 0,
            ..Default::default()
        };
        assert!(ok.ok());

        let failed = ExecResult {
            exit_code: 2,
            ..Default::default()
        };
        assert!(!failed.ok());

        let timed_out = ExecResult {
            exit_code: 0,
            timed_out: true,
            ..Default::default()
        };
        assert!(!timed_out.ok());
    }
}
