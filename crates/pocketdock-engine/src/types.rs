//! Docker-compatible API types.
//!
//! Only the fields the client actually consumes are modeled; the engine
//! sends much more and serde ignores it. Control-plane types are
//! PascalCase per the engine API; the stats endpoint is snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Container create
// ============================================================================

/// Request body for `POST /containers/create`.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateRequest {
    /// Image name.
    pub image: String,
    /// Command to run (the sandbox default keeps the container alive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    /// Environment variables as `KEY=value`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// OCI labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    /// Ports exposed by the container.
    #[allow(clippy::zero_sized_map_values)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<HashMap<String, HashMap<(), ()>>>,
    /// Host configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
}

/// Host configuration for resource limits and host bindings.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    /// Memory limit in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    /// CPU quota in units of 1e-9 CPUs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nano_cpus: Option<i64>,
    /// Volume binds as `host:container`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    /// Host devices passed through.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMapping>,
    /// Port bindings keyed by `port/proto`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_bindings: Option<HashMap<String, Vec<PortBinding>>>,
    /// Network mode (`bridge`, `none`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
}

/// A host device mapping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    /// Device path on the host.
    pub path_on_host: String,
    /// Device path inside the container.
    pub path_in_container: String,
    /// Cgroup permissions string.
    pub cgroup_permissions: String,
}

/// A single port binding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    /// Host IP to bind (empty for all).
    pub host_ip: String,
    /// Host port as a string.
    pub host_port: String,
}

/// Response from `POST /containers/create`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateResponse {
    /// New container id.
    pub id: String,
    /// Engine warnings.
    #[serde(default)]
    pub warnings: Vec<String>,
}

// ============================================================================
// Container list / inspect
// ============================================================================

/// One entry from `GET /containers/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    /// Container id.
    pub id: String,
    /// Container names (Docker prefixes them with `/`).
    #[serde(default)]
    pub names: Vec<String>,
    /// Image name.
    #[serde(default)]
    pub image: String,
    /// State keyword (`running`, `exited`, ...).
    #[serde(default)]
    pub state: String,
    /// Human status string.
    #[serde(default)]
    pub status: String,
    /// Labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Response from `GET /containers/{id}/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    /// Container id.
    pub id: String,
    /// Creation timestamp (RFC3339).
    #[serde(default)]
    pub created: String,
    /// Runtime state.
    pub state: InspectState,
    /// Creation-time configuration.
    #[serde(default)]
    pub config: InspectConfig,
    /// Host configuration.
    #[serde(default)]
    pub host_config: InspectHostConfig,
    /// Network settings.
    #[serde(default)]
    pub network_settings: NetworkSettings,
}

/// Container state from inspect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectState {
    /// Status keyword.
    #[serde(default)]
    pub status: String,
    /// Whether the container is running.
    #[serde(default)]
    pub running: bool,
    /// Exit code of the init process.
    #[serde(default)]
    pub exit_code: i64,
    /// Start timestamp (RFC3339; a zero date when never started).
    #[serde(default)]
    pub started_at: String,
}

/// Container config from inspect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectConfig {
    /// Image name.
    #[serde(default)]
    pub image: String,
    /// Labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Host config from inspect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectHostConfig {
    /// Memory limit in bytes (0 = unlimited).
    #[serde(default)]
    pub memory: i64,
    /// CPU quota in units of 1e-9 CPUs (0 = unlimited).
    #[serde(default)]
    pub nano_cpus: i64,
    /// Port bindings.
    #[serde(default)]
    pub port_bindings: Option<HashMap<String, Option<Vec<InspectPortBinding>>>>,
}

/// Port binding from inspect (deserialization side).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectPortBinding {
    /// Host port as a string.
    #[serde(default)]
    pub host_port: String,
}

/// Network settings from inspect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    /// Primary IP address (empty when detached from networks).
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
}

// ============================================================================
// Stats / top
// ============================================================================

/// One-shot stats snapshot from `GET /containers/{id}/stats`.
///
/// Unlike the control plane, this endpoint uses snake_case keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStats {
    /// Memory usage and limit.
    #[serde(default)]
    pub memory_stats: MemoryStats,
    /// Current CPU sample.
    #[serde(default)]
    pub cpu_stats: CpuStats,
    /// Previous CPU sample, for delta computation.
    #[serde(default)]
    pub precpu_stats: CpuStats,
    /// PID accounting.
    #[serde(default)]
    pub pids_stats: PidsStats,
}

/// Memory accounting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    /// Bytes in use.
    #[serde(default)]
    pub usage: u64,
    /// Cgroup limit in bytes.
    #[serde(default)]
    pub limit: u64,
}

/// One CPU sample.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    /// Per-container usage counters.
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    /// Host CPU time at sample.
    #[serde(default)]
    pub system_cpu_usage: u64,
    /// Number of online CPUs.
    #[serde(default)]
    pub online_cpus: u32,
}

/// Per-container CPU counters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    /// Total consumed CPU time in nanoseconds.
    #[serde(default)]
    pub total_usage: u64,
}

/// PID accounting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PidsStats {
    /// Current number of processes.
    #[serde(default)]
    pub current: u64,
}

/// Response from `GET /containers/{id}/top`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TopResponse {
    /// Column titles.
    #[serde(default)]
    pub titles: Vec<String>,
    /// One row per process, aligned with `titles`.
    #[serde(default)]
    pub processes: Vec<Vec<String>>,
}

// ============================================================================
// Exec
// ============================================================================

/// Request body for `POST /containers/{id}/exec`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreateRequest {
    /// Attach stdin (sessions only).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub attach_stdin: bool,
    /// Attach stdout.
    pub attach_stdout: bool,
    /// Attach stderr.
    pub attach_stderr: bool,
    /// Allocate a TTY. Kept false so the engine produces demux frames.
    pub tty: bool,
    /// Command and arguments.
    pub cmd: Vec<String>,
}

/// Response from exec create.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreateResponse {
    /// Exec instance id.
    pub id: String,
}

/// Request body for `POST /exec/{id}/start`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecStartRequest {
    /// Detach from the stream (always false here; detaching is handled
    /// client-side so output can be captured).
    pub detach: bool,
    /// TTY mode.
    pub tty: bool,
}

/// Response from `GET /exec/{id}/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecInspect {
    /// Exit code; 0 default while running.
    #[serde(default)]
    pub exit_code: i64,
    /// Whether the exec is still running.
    #[serde(default)]
    pub running: bool,
    /// PID of the exec's root process.
    #[serde(default)]
    pub pid: i64,
}

// ============================================================================
// Images / commit
// ============================================================================

/// Response from `POST /commit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitResponse {
    /// New image id.
    pub id: String,
}

/// One entry from `GET /images/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    /// Image id.
    pub id: String,
    /// Repository tags.
    #[serde(default)]
    pub repo_tags: Vec<String>,
    /// Creation time (unix seconds).
    #[serde(default)]
    pub created: i64,
    /// Size in bytes.
    #[serde(default)]
    pub size: i64,
}

/// One progress line from the image build stream.
#[derive(Debug, Default, Deserialize)]
pub struct BuildProgress {
    /// Human-readable progress text.
    #[serde(default)]
    pub stream: Option<String>,
    /// Error message, if the build failed.
    #[serde(default)]
    pub error: Option<String>,
}
