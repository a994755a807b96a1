//! Container discovery, resume, destroy, and prune.
//!
//! These operate by name against the engine's label index rather than a
//! live handle, so they work across process restarts.

use crate::container::{labels, Container, CreateSpec, DEFAULT_TIMEOUT};
use crate::types::ContainerListItem;
use pocketdock_engine::types::ContainerInspect;
use pocketdock_engine::EngineClient;
use pocketdock_error::{Error, Result};
use pocketdock_transport::detect_socket;
use std::path::{Path, PathBuf};

async fn resolve_socket(socket_path: Option<&Path>) -> Result<PathBuf> {
    match socket_path {
        Some(path) => Ok(path.to_path_buf()),
        None => detect_socket().await,
    }
}

async fn find_by_name(engine: &EngineClient, name: &str) -> Result<String> {
    let filter = format!("{}={name}", labels::INSTANCE);
    let containers = engine.list_containers(Some(&filter)).await?;
    containers
        .first()
        .map(|c| c.id.clone())
        .ok_or_else(|| Error::ContainerNotFound(name.to_string()))
}

/// Lists all managed containers, optionally scoped to a project.
///
/// # Errors
///
/// `EngineUnavailable` without a socket; engine errors propagate.
pub async fn list_containers(
    socket_path: Option<&Path>,
    project: Option<&str>,
) -> Result<Vec<ContainerListItem>> {
    let socket = resolve_socket(socket_path).await?;
    let engine = EngineClient::new(&socket);
    let filter = match project {
        Some(project) => format!("{}={project}", labels::PROJECT),
        None => format!("{}=true", labels::MANAGED),
    };
    let raw = engine.list_containers(Some(&filter)).await?;
    Ok(raw
        .into_iter()
        .map(|c| {
            let name = c
                .labels
                .get(labels::INSTANCE)
                .cloned()
                .or_else(|| {
                    c.names
                        .first()
                        .map(|n| n.trim_start_matches('/').to_string())
                })
                .unwrap_or_default();
            ContainerListItem {
                id: c.id.chars().take(12).collect(),
                name,
                status: if c.state.is_empty() {
                    "unknown".to_string()
                } else {
                    c.state.clone()
                },
                image: c.image,
                created_at: c.labels.get(labels::CREATED_AT).cloned().unwrap_or_default(),
                persist: c
                    .labels
                    .get(labels::PERSIST)
                    .is_some_and(|v| v.eq_ignore_ascii_case("true")),
                project: c.labels.get(labels::PROJECT).cloned().unwrap_or_default(),
            }
        })
        .collect())
}

/// Resumes a container by name, starting it if stopped.
///
/// The reconstructed handle recovers image, limits, persist flag,
/// project, and data path from the engine; its active-operation set
/// starts empty.
///
/// # Errors
///
/// `ContainerNotFound` when no container carries the name.
pub async fn resume_container(name: &str, socket_path: Option<&Path>) -> Result<Container> {
    let socket = resolve_socket(socket_path).await?;
    let engine = EngineClient::new(&socket);
    let container_id = find_by_name(&engine, name).await?;

    let inspect = engine.inspect_container(&container_id).await?;
    if !inspect.state.running {
        engine.start_container(&container_id).await?;
    }

    let spec = recover_spec(&inspect);
    let container_labels = &inspect.config.labels;
    let persist = container_labels
        .get(labels::PERSIST)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let project = container_labels
        .get(labels::PROJECT)
        .cloned()
        .unwrap_or_default();
    let data_path = container_labels
        .get(labels::DATA_PATH)
        .cloned()
        .unwrap_or_default();
    let auto_log = crate::config::load_config(crate::projects::find_project_root(None).as_deref())
        .auto_log;

    tracing::debug!(name, id = %container_id, "container resumed");
    Ok(Container::assemble(
        engine,
        socket,
        container_id,
        name.to_string(),
        DEFAULT_TIMEOUT,
        persist,
        project,
        data_path,
        spec,
        auto_log,
    ))
}

/// Stops a container by name without removing it.
///
/// # Errors
///
/// `ContainerNotFound` when no container carries the name.
pub async fn stop_container(name: &str, socket_path: Option<&Path>) -> Result<()> {
    let socket = resolve_socket(socket_path).await?;
    let engine = EngineClient::new(&socket);
    let container_id = find_by_name(&engine, name).await?;
    engine.stop_container(&container_id, 10).await
}

/// Removes a container by name, running or not, and cleans up its
/// instance directory.
///
/// # Errors
///
/// `ContainerNotFound` when no container carries the name.
pub async fn destroy_container(name: &str, socket_path: Option<&Path>) -> Result<()> {
    let socket = resolve_socket(socket_path).await?;
    let engine = EngineClient::new(&socket);
    let container_id = find_by_name(&engine, name).await?;

    let data_path = engine
        .inspect_container(&container_id)
        .await
        .ok()
        .and_then(|inspect| inspect.config.labels.get(labels::DATA_PATH).cloned())
        .unwrap_or_default();

    engine.remove_container(&container_id, true).await?;

    if !data_path.is_empty() {
        let dir = Path::new(&data_path);
        if dir.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::debug!(path = %dir.display(), error = %e, "instance dir cleanup failed");
            }
        }
    }
    Ok(())
}

/// Removes all stopped managed containers, optionally scoped to a
/// project. Returns the number removed.
///
/// # Errors
///
/// Engine errors propagate; individual removals that race with the
/// engine are skipped.
pub async fn prune(socket_path: Option<&Path>, project: Option<&str>) -> Result<usize> {
    let socket = resolve_socket(socket_path).await?;
    let engine = EngineClient::new(&socket);
    let filter = match project {
        Some(project) => format!("{}={project}", labels::PROJECT),
        None => format!("{}=true", labels::MANAGED),
    };
    let raw = engine.list_containers(Some(&filter)).await?;

    let mut removed = 0;
    for container in raw {
        if container.state.eq_ignore_ascii_case("running") {
            continue;
        }
        match engine.remove_container(&container.id, true).await {
            Ok(()) => removed += 1,
            Err(e) if e.is_missing() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

fn recover_spec(inspect: &ContainerInspect) -> CreateSpec {
    let ports = inspect
        .host_config
        .port_bindings
        .as_ref()
        .map(|bindings| {
            bindings
                .iter()
                .filter_map(|(key, binding)| {
                    let container: u16 = key.split('/').next()?.parse().ok()?;
                    let host: u16 = binding.as_ref()?.first()?.host_port.parse().ok()?;
                    Some((host, container))
                })
                .collect()
        })
        .unwrap_or_default();

    CreateSpec {
        image: inspect.config.image.clone(),
        labels: inspect.config.labels.clone(),
        env: Vec::new(),
        workdir: None,
        network_mode: None,
        mem_limit_bytes: inspect.host_config.memory,
        nano_cpus: inspect.host_config.nano_cpus,
        binds: Vec::new(),
        devices: Vec::new(),
        ports,
    }
}
