//! Project directories, instance metadata, and the doctor check.
//!
//! A project is a host directory containing `.pocketdock/pocketdock.yaml`.
//! Persistent containers get an instance directory under
//! `.pocketdock/instances/<name>/` with `logs/` and `data/` subdirectories
//! and a machine-written `instance.toml`.

use crate::persistence;
use crate::types::DoctorReport;
use chrono::Utc;
use pocketdock_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PROJECT_DIR: &str = ".pocketdock";
const CONFIG_FILENAME: &str = "pocketdock.yaml";
const INSTANCES_DIR: &str = "instances";
const METADATA_FILENAME: &str = "instance.toml";

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# Project configuration for pocketdock
project_name: {project_name}
default_profile: minimal
default_persist: false

logging:
  auto_log: true
  max_log_size: \"10MB\"
  max_logs_per_instance: 100
  retention_days: 30
";

/// Walks up from `start` (default: cwd) looking for a project marker.
///
/// Returns the directory containing `.pocketdock/`, or `None`.
#[must_use]
pub fn find_project_root(start: Option<&Path>) -> Option<PathBuf> {
    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    loop {
        if current.join(PROJECT_DIR).join(CONFIG_FILENAME).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Creates `.pocketdock/pocketdock.yaml` (and `instances/`) under `path`.
///
/// An existing config file is left untouched. Returns the project root.
///
/// # Errors
///
/// Returns `Io` on filesystem failures.
pub fn init_project(path: Option<&Path>, project_name: Option<&str>) -> Result<PathBuf> {
    let root = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().map_err(Error::Io)?,
    };
    let pd_dir = root.join(PROJECT_DIR);
    std::fs::create_dir_all(&pd_dir).map_err(Error::Io)?;

    let config_path = pd_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let name = project_name
            .map(ToString::to_string)
            .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "project".to_string());
        let content = DEFAULT_CONFIG_TEMPLATE.replace("{project_name}", &name);
        std::fs::write(&config_path, content).map_err(Error::Io)?;
    }
    std::fs::create_dir_all(pd_dir.join(INSTANCES_DIR)).map_err(Error::Io)?;
    Ok(root)
}

/// Reads `project_name` from the project config, falling back to the
/// root directory's name.
#[must_use]
pub fn project_name(project_root: &Path) -> String {
    let config = crate::config::load_config(Some(project_root));
    if !config.project_name.is_empty() {
        return config.project_name;
    }
    project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Creates `.pocketdock/instances/<name>/` with `logs/` and `data/`.
///
/// # Errors
///
/// Returns `Io` on filesystem failures.
pub fn ensure_instance_dir(project_root: &Path, instance_name: &str) -> Result<PathBuf> {
    let instance_dir = project_root
        .join(PROJECT_DIR)
        .join(INSTANCES_DIR)
        .join(instance_name);
    std::fs::create_dir_all(instance_dir.join("logs")).map_err(Error::Io)?;
    std::fs::create_dir_all(instance_dir.join("data")).map_err(Error::Io)?;
    Ok(instance_dir)
}

/// Lists instance directories under the project.
#[must_use]
pub fn list_instance_dirs(project_root: &Path) -> Vec<PathBuf> {
    let instances = project_root.join(PROJECT_DIR).join(INSTANCES_DIR);
    let Ok(entries) = std::fs::read_dir(instances) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Removes an instance directory. Returns true if one was removed.
///
/// # Errors
///
/// Returns `Io` on filesystem failures.
pub fn remove_instance_dir(project_root: &Path, instance_name: &str) -> Result<bool> {
    let instance_dir = project_root
        .join(PROJECT_DIR)
        .join(INSTANCES_DIR)
        .join(instance_name);
    if !instance_dir.is_dir() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&instance_dir).map_err(Error::Io)?;
    Ok(true)
}

/// Machine-written per-instance metadata (`instance.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceMetadata {
    /// Container identity.
    pub container: ContainerMeta,
    /// Resource limits at creation time.
    pub resources: ResourceMeta,
    /// Who wrote this file.
    pub provenance: ProvenanceMeta,
}

/// Container identity block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMeta {
    /// Container id (full hex, or `(pending)` before creation).
    pub id: String,
    /// Container name.
    pub name: String,
    /// Image name.
    pub image: String,
    /// Project name.
    pub project: String,
    /// Creation timestamp (RFC3339).
    pub created_at: String,
    /// Persist flag.
    pub persist: bool,
}

/// Resource limits block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Memory limit as given (`256m`), empty if unlimited.
    pub mem_limit: String,
    /// CPU percentage, 0 if unlimited.
    pub cpu_percent: u32,
}

/// Provenance block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvenanceMeta {
    /// Command line that created the instance.
    pub created_by: String,
    /// PID of the creating process.
    pub pid: u32,
}

impl InstanceMetadata {
    /// Builds metadata for the current process.
    #[must_use]
    pub fn new(
        container_id: &str,
        name: &str,
        image: &str,
        project: &str,
        persist: bool,
        mem_limit: &str,
        cpu_percent: u32,
    ) -> Self {
        Self {
            container: ContainerMeta {
                id: container_id.to_string(),
                name: name.to_string(),
                image: image.to_string(),
                project: project.to_string(),
                created_at: Utc::now().to_rfc3339(),
                persist,
            },
            resources: ResourceMeta {
                mem_limit: mem_limit.to_string(),
                cpu_percent,
            },
            provenance: ProvenanceMeta {
                created_by: std::env::args().collect::<Vec<_>>().join(" "),
                pid: std::process::id(),
            },
        }
    }
}

/// Writes `instance.toml` into the instance directory.
///
/// # Errors
///
/// Returns `Io` on filesystem failures.
pub fn write_instance_metadata(instance_dir: &Path, metadata: &InstanceMetadata) -> Result<()> {
    let body = toml::to_string_pretty(metadata)
        .map_err(|e| Error::invalid_input(format!("metadata encode failed: {e}")))?;
    let content = format!("# Maintained by pocketdock. Do not edit.\n\n{body}");
    std::fs::write(instance_dir.join(METADATA_FILENAME), content).map_err(Error::Io)
}

/// Reads `instance.toml` from an instance directory, if present.
#[must_use]
pub fn read_instance_metadata(instance_dir: &Path) -> Option<InstanceMetadata> {
    let text = std::fs::read_to_string(instance_dir.join(METADATA_FILENAME)).ok()?;
    toml::from_str(&text).ok()
}

/// Cross-references local instance directories with engine containers.
///
/// # Errors
///
/// `ProjectNotInitialized` outside a project; engine errors propagate.
pub async fn doctor(
    project_root: Option<&Path>,
    socket_path: Option<&Path>,
) -> Result<DoctorReport> {
    let root = match project_root {
        Some(root) => root.to_path_buf(),
        None => find_project_root(None).ok_or(Error::ProjectNotInitialized)?,
    };
    if !root.join(PROJECT_DIR).join(CONFIG_FILENAME).is_file() {
        return Err(Error::ProjectNotInitialized);
    }

    let name = project_name(&root);
    let local: std::collections::BTreeSet<String> = list_instance_dirs(&root)
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();

    let items = persistence::list_containers(socket_path, Some(name.as_str())).await?;
    let remote: std::collections::BTreeSet<String> =
        items.into_iter().map(|item| item.name).collect();

    Ok(DoctorReport {
        orphaned_containers: remote.difference(&local).cloned().collect(),
        stale_instance_dirs: local.difference(&remote).cloned().collect(),
        healthy: local.intersection(&remote).count(),
    })
}
