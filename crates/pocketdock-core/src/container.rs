//! The container handle and its run modes.
//!
//! A [`Container`] is a long-lived value bound to one engine-side
//! container. It owns the set of active operations (streams, detached
//! processes, sessions) and tears every one of them down on
//! [`shutdown`](Container::shutdown). Container state is never cached:
//! every operation that depends on it asks the engine.

use crate::callbacks::CallbackRegistry;
use crate::config;
use crate::info::build_container_info;
use crate::logger::InstanceLogger;
use crate::ops::{self, SharedOps};
use crate::process::{kill_exec_process, DetachedProcess};
use crate::profiles;
use crate::projects;
use crate::session::Session;
use crate::stream::ExecStream;
use crate::types::{ContainerInfo, ExecResult, StreamChunk};
use crate::units::parse_size;
use chrono::Utc;
use pocketdock_engine::types::{
    ContainerCreateRequest, DeviceMapping, HostConfig, PortBinding,
};
use pocketdock_engine::{archive, EngineClient};
use pocketdock_error::{Error, Result};
use pocketdock_transport::{detect_socket, StreamKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Image used when neither `image` nor `profile` is given.
pub const DEFAULT_IMAGE: &str = "pocketdock/minimal";

/// Default blocking-exec timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default output accumulation cap for blocking runs: 10 MiB.
pub const DEFAULT_MAX_OUTPUT: usize = 10 * 1024 * 1024;

const SIGTERM: i32 = 15;
const STOP_TIMEOUT_SECS: u32 = 10;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) mod labels {
    pub const MANAGED: &str = "pocketdock.managed";
    pub const INSTANCE: &str = "pocketdock.instance";
    pub const PROFILE: &str = "pocketdock.profile";
    pub const PROJECT: &str = "pocketdock.project";
    pub const PERSIST: &str = "pocketdock.persist";
    pub const CREATED_AT: &str = "pocketdock.created-at";
    pub const DATA_PATH: &str = "pocketdock.data-path";
}

/// Options for [`create_new_container`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Image to run. Overrides `profile` when set.
    pub image: Option<String>,
    /// Named image profile to resolve the image from.
    pub profile: Option<String>,
    /// Container name; auto-generated (`pd-<8 hex>`) when `None`.
    pub name: Option<String>,
    /// Default timeout for blocking execs on the handle.
    pub timeout: Duration,
    /// Memory limit as a size string (`256m`, `1g`).
    pub mem_limit: Option<String>,
    /// CPU cap as a percentage of one CPU (50 = half a core).
    pub cpu_percent: Option<u32>,
    /// If true, `shutdown` stops but does not remove the container.
    pub persist: bool,
    /// Host-to-container bind mounts.
    pub volumes: Vec<(String, String)>,
    /// Host device paths passed through.
    pub devices: Vec<String>,
    /// Host-to-container port mappings.
    pub ports: Vec<(u16, u16)>,
    /// Environment variables as `KEY=value`.
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub workdir: Option<String>,
    /// Network mode; a profile with networking off implies `none`.
    pub network_mode: Option<String>,
    /// Project tag; auto-detected from `.pocketdock/` for persistent
    /// containers when `None`.
    pub project: Option<String>,
    /// Engine socket override; auto-detected when `None`.
    pub socket: Option<PathBuf>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            image: None,
            profile: None,
            name: None,
            timeout: DEFAULT_TIMEOUT,
            mem_limit: None,
            cpu_percent: None,
            persist: false,
            volumes: Vec::new(),
            devices: Vec::new(),
            ports: Vec::new(),
            env: Vec::new(),
            workdir: None,
            network_mode: None,
            project: None,
            socket: None,
        }
    }
}

/// Options for the run modes.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Timeout for blocking runs; the handle default when `None`.
    pub timeout: Option<Duration>,
    /// Output accumulation cap for blocking runs.
    pub max_output: usize,
    /// Ring buffer capacity for detached runs.
    pub buffer_capacity: usize,
    /// Language shorthand: `python` runs via `python3 -c` instead of
    /// `sh -c`.
    pub lang: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_output: DEFAULT_MAX_OUTPUT,
            buffer_capacity: crate::buffer::DEFAULT_CAPACITY,
            lang: None,
        }
    }
}

/// Everything needed to recreate the engine-side container, kept for
/// `reboot(fresh)`.
#[derive(Debug, Clone)]
pub(crate) struct CreateSpec {
    pub image: String,
    pub labels: HashMap<String, String>,
    pub env: Vec<String>,
    pub workdir: Option<String>,
    pub network_mode: Option<String>,
    pub mem_limit_bytes: i64,
    pub nano_cpus: i64,
    pub binds: Vec<String>,
    pub devices: Vec<String>,
    pub ports: Vec<(u16, u16)>,
}

impl CreateSpec {
    pub(crate) fn to_request(&self) -> ContainerCreateRequest {
        let host_config = HostConfig {
            memory: (self.mem_limit_bytes > 0).then_some(self.mem_limit_bytes),
            nano_cpus: (self.nano_cpus > 0).then_some(self.nano_cpus),
            binds: self.binds.clone(),
            devices: self
                .devices
                .iter()
                .map(|d| DeviceMapping {
                    path_on_host: d.clone(),
                    path_in_container: d.clone(),
                    cgroup_permissions: "rwm".to_string(),
                })
                .collect(),
            port_bindings: build_port_bindings(&self.ports),
            network_mode: self.network_mode.clone(),
        };
        ContainerCreateRequest {
            image: self.image.clone(),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            env: self.env.clone(),
            working_dir: self.workdir.clone(),
            labels: Some(self.labels.clone()),
            exposed_ports: build_exposed_ports(&self.ports),
            host_config: Some(host_config),
        }
    }
}

struct ContainerInner {
    engine: EngineClient,
    socket_path: PathBuf,
    id: RwLock<String>,
    name: String,
    default_timeout: Duration,
    persist: bool,
    project: String,
    data_path: String,
    spec: CreateSpec,
    callbacks: Arc<CallbackRegistry>,
    ops: SharedOps,
    shutdown: AtomicBool,
    logger: Option<InstanceLogger>,
}

/// Handle to a running container.
///
/// Cheap to clone; clones share the same engine-side container and
/// active-operation set.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        engine: EngineClient,
        socket_path: PathBuf,
        container_id: String,
        name: String,
        default_timeout: Duration,
        persist: bool,
        project: String,
        data_path: String,
        spec: CreateSpec,
        auto_log: bool,
    ) -> Self {
        let logger = (!data_path.is_empty())
            .then(|| InstanceLogger::new(Path::new(&data_path), auto_log));
        Self {
            inner: Arc::new(ContainerInner {
                engine,
                socket_path,
                id: RwLock::new(container_id),
                name,
                default_timeout,
                persist,
                project,
                data_path,
                spec,
                callbacks: Arc::new(CallbackRegistry::new()),
                ops: SharedOps::default(),
                shutdown: AtomicBool::new(false),
                logger,
            }),
        }
    }

    /// Full container id (hex).
    #[must_use]
    pub fn id(&self) -> String {
        self.inner.id.read().unwrap().clone()
    }

    /// Container name (e.g. `pd-a1b2c3d4`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Path of the engine socket this handle speaks to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.inner.socket_path
    }

    /// Whether shutdown stops rather than removes the container.
    #[must_use]
    pub fn persist(&self) -> bool {
        self.inner.persist
    }

    /// Project this container belongs to (empty if none).
    #[must_use]
    pub fn project(&self) -> &str {
        &self.inner.project
    }

    /// Instance data directory (empty if none).
    #[must_use]
    pub fn data_path(&self) -> &str {
        &self.inner.data_path
    }

    // ------------------------------------------------------------------
    // Run modes
    // ------------------------------------------------------------------

    /// Executes a command and blocks until it finishes.
    ///
    /// Output accumulates up to `max_output` bytes total; beyond that
    /// the result is truncated. On timeout the exec is killed
    /// best-effort and the result carries `timed_out` with exit code -1
    /// and whatever output arrived before the deadline.
    ///
    /// # Errors
    ///
    /// Engine and transport errors propagate; a command that merely
    /// fails or times out is an `Ok` result.
    pub async fn run(&self, command: &str, opts: RunOptions) -> Result<ExecResult> {
        self.ensure_active()?;
        let cmd = build_command(command, opts.lang.as_deref());
        let container_id = self.id();
        let started_at = Utc::now();
        let started = Instant::now();

        let exec_id = self.map_op(self.inner.engine.exec_create(&container_id, &cmd, false).await).await?;
        let mut reader = self.map_op(self.inner.engine.exec_start_stream(&exec_id).await).await?;

        let token = CancellationToken::new();
        let _guard = ops::register_stream(&self.inner.ops, token.clone());

        let timeout = opts.timeout.unwrap_or(self.inner.default_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();
        let mut total = 0usize;
        let mut truncated = false;
        let mut timed_out = false;

        loop {
            let frame = tokio::select! {
                () = token.cancelled() => {
                    return Err(Error::ShutDown(self.inner.name.clone()));
                }
                next = tokio::time::timeout_at(deadline, reader.next_frame()) => match next {
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                    Ok(Ok(Some(frame))) => frame,
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => return Err(e),
                },
            };

            let mut payload = &frame.data[..];
            if total + payload.len() > opts.max_output {
                payload = &payload[..opts.max_output.saturating_sub(total)];
                truncated = true;
            }
            total += payload.len();
            match frame.kind {
                StreamKind::Stdout => stdout.extend_from_slice(payload),
                StreamKind::Stderr => stderr.extend_from_slice(payload),
            }
            if truncated {
                break;
            }
        }
        drop(reader);

        let exit_code = if timed_out {
            kill_exec_process(&self.inner.engine, &container_id, &exec_id, SIGTERM).await;
            -1
        } else {
            self.map_op(self.inner.engine.exec_exit_code(&exec_id).await).await?
        };

        let result = ExecResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            timed_out,
            truncated,
        };
        if let Some(logger) = &self.inner.logger {
            logger.log_run(command, &result, started_at);
        }
        Ok(result)
    }

    /// Executes a command and returns a lazy stream of output chunks.
    ///
    /// # Errors
    ///
    /// Fails if the exec cannot be created or started.
    pub async fn run_stream(&self, command: &str, opts: RunOptions) -> Result<ExecStream> {
        self.ensure_active()?;
        let cmd = build_command(command, opts.lang.as_deref());
        let container_id = self.id();

        let exec_id = self.map_op(self.inner.engine.exec_create(&container_id, &cmd, false).await).await?;
        let reader = self.map_op(self.inner.engine.exec_start_stream(&exec_id).await).await?;

        let token = CancellationToken::new();
        let guard = ops::register_stream(&self.inner.ops, token.clone());
        let stream = ExecStream::new(
            exec_id,
            container_id,
            self.inner.engine.clone(),
            reader,
            token.clone(),
            guard,
        );
        if self.inner.shutdown.load(Ordering::SeqCst) {
            token.cancel();
            return Err(Error::ShutDown(self.inner.name.clone()));
        }
        Ok(stream)
    }

    /// Executes a command in the background and returns its handle.
    ///
    /// Output flows into the process's ring buffer and the handle's
    /// registered callbacks.
    ///
    /// # Errors
    ///
    /// Fails if the exec cannot be created or started.
    pub async fn run_detached(
        &self,
        command: &str,
        opts: RunOptions,
    ) -> Result<Arc<DetachedProcess>> {
        self.ensure_active()?;
        let cmd = build_command(command, opts.lang.as_deref());
        let container_id = self.id();

        let exec_id = self.map_op(self.inner.engine.exec_create(&container_id, &cmd, false).await).await?;
        let reader = self.map_op(self.inner.engine.exec_start_stream(&exec_id).await).await?;

        let guard = ops::reserve_process(&self.inner.ops);
        let op_id = guard.id();
        let log = self
            .inner
            .logger
            .as_ref()
            .map(|l| l.start_detach_log(command));
        let process = DetachedProcess::spawn(
            self.inner.engine.clone(),
            container_id,
            exec_id,
            reader,
            self.inner.callbacks.clone(),
            opts.buffer_capacity,
            log,
            guard,
        );
        ops::attach_process(&self.inner.ops, op_id, process.clone());
        if self.inner.shutdown.load(Ordering::SeqCst) {
            process.abort();
            return Err(Error::ShutDown(self.inner.name.clone()));
        }
        Ok(process)
    }

    /// Opens a persistent shell session.
    ///
    /// # Errors
    ///
    /// Fails if the shell exec cannot be created or started.
    pub async fn session(&self) -> Result<Arc<Session>> {
        self.ensure_active()?;
        let container_id = self.id();
        let guard = ops::reserve_session(&self.inner.ops);
        let op_id = guard.id();
        let session = match Session::open(
            self.inner.engine.clone(),
            &container_id,
            self.inner.logger.as_ref(),
            guard,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => return Err(self.map_op_err(e).await),
        };
        ops::attach_session(&self.inner.ops, op_id, session.clone());
        if self.inner.shutdown.load(Ordering::SeqCst) {
            let _ = session.close().await;
            return Err(Error::ShutDown(self.inner.name.clone()));
        }
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    /// Registers a callback for stdout chunks from detached processes.
    pub fn on_stdout(&self, f: impl Fn(&StreamChunk) + Send + Sync + 'static) {
        self.inner.callbacks.on_stdout(f);
    }

    /// Registers a callback for stderr chunks from detached processes.
    pub fn on_stderr(&self, f: impl Fn(&StreamChunk) + Send + Sync + 'static) {
        self.inner.callbacks.on_stderr(f);
    }

    /// Registers a callback for detached process exits.
    pub fn on_exit(&self, f: impl Fn(i64) + Send + Sync + 'static) {
        self.inner.callbacks.on_exit(f);
    }

    // ------------------------------------------------------------------
    // File operations
    // ------------------------------------------------------------------

    /// Writes a file into the container, creating parent directories.
    ///
    /// # Errors
    ///
    /// Engine, transport, and archive errors propagate.
    pub async fn write_file(&self, path: &str, content: impl AsRef<[u8]>) -> Result<()> {
        self.ensure_active()?;
        let (dir, file_name) = split_container_path(path)?;
        // The archive endpoint 404s when the destination is missing.
        self.run(&format!("mkdir -p '{dir}'"), RunOptions::default())
            .await?;
        let tar = archive::pack_file(&file_name, content.as_ref())?;
        self.map_op(self.inner.engine.put_archive(&self.id(), &dir, tar).await)
            .await
    }

    /// Reads a file from the container.
    ///
    /// # Errors
    ///
    /// Returns a not-found I/O error when the path does not exist.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.ensure_active()?;
        let tar = self
            .map_op(self.inner.engine.get_archive(&self.id(), path).await)
            .await?;
        archive::unpack_first_file(&tar)
    }

    /// Lists directory entries inside the container.
    ///
    /// # Errors
    ///
    /// Returns a not-found I/O error when the directory is missing.
    pub async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        let result = self
            .run(&format!("ls -1A '{path}'"), RunOptions::default())
            .await?;
        if !result.ok() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("ls failed: {}", result.stderr.trim()),
            )));
        }
        Ok(result
            .stdout
            .lines()
            .filter(|l| !l.is_empty() && *l != "." && *l != "..")
            .map(ToString::to_string)
            .collect())
    }

    /// Copies a host file or directory tree into the container.
    ///
    /// # Errors
    ///
    /// Rejects missing sources and symlinks; engine errors propagate.
    pub async fn push(&self, src: &str, dest: &str) -> Result<()> {
        self.ensure_active()?;
        let (dest_dir, arcname) = split_container_path(dest)?;
        let tar = archive::pack_path(Path::new(src), &arcname)?;
        self.map_op(self.inner.engine.put_archive(&self.id(), &dest_dir, tar).await)
            .await
    }

    /// Copies a container file or directory tree to the host.
    ///
    /// # Errors
    ///
    /// Returns a not-found I/O error when the source is missing.
    pub async fn pull(&self, src: &str, dest: &str) -> Result<()> {
        self.ensure_active()?;
        let tar = self
            .map_op(self.inner.engine.get_archive(&self.id(), src).await)
            .await?;
        archive::unpack_to(&tar, Path::new(dest))
    }

    // ------------------------------------------------------------------
    // Introspection and lifecycle
    // ------------------------------------------------------------------

    /// Returns a live snapshot of the container's state and usage.
    ///
    /// Inspect always runs; stats and top are queried concurrently and
    /// only when the container is running.
    ///
    /// # Errors
    ///
    /// `ContainerGone` when the container has been removed externally.
    pub async fn info(&self) -> Result<ContainerInfo> {
        self.ensure_active()?;
        let container_id = self.id();
        let inspect = self
            .map_op(self.inner.engine.inspect_container(&container_id).await)
            .await?;

        let (stats, top) = if inspect.state.running {
            let (stats, top) = tokio::join!(
                self.inner.engine.container_stats(&container_id),
                self.inner.engine.container_top(&container_id),
            );
            (stats.ok(), top.ok())
        } else {
            (None, None)
        };

        Ok(build_container_info(
            &inspect,
            stats.as_ref(),
            top.as_ref(),
            &self.inner.name,
        ))
    }

    /// Restarts the container.
    ///
    /// `fresh = false` restarts in place: the filesystem survives, all
    /// processes die. `fresh = true` removes the container and creates a
    /// new one from the same spec; the handle follows the new id.
    ///
    /// # Errors
    ///
    /// Engine errors propagate; `ContainerGone` once the container has
    /// been removed externally.
    pub async fn reboot(&self, fresh: bool) -> Result<()> {
        self.ensure_active()?;
        let container_id = self.id();
        if !fresh {
            return self
                .map_op(
                    self.inner
                        .engine
                        .restart_container(&container_id, STOP_TIMEOUT_SECS)
                        .await,
                )
                .await;
        }

        match self
            .inner
            .engine
            .stop_container(&container_id, STOP_TIMEOUT_SECS)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_running() || e.is_missing() => {}
            Err(e) => return Err(e),
        }
        match self.inner.engine.remove_container(&container_id, true).await {
            Ok(()) => {}
            Err(e) if e.is_missing() => {}
            Err(e) => return Err(e),
        }

        let new_id = self
            .inner
            .engine
            .create_container(&self.inner.name, &self.inner.spec.to_request())
            .await?;
        self.inner.engine.start_container(&new_id).await?;
        tracing::debug!(name = %self.inner.name, old = %container_id, new = %new_id, "fresh reboot");
        *self.inner.id.write().unwrap() = new_id;
        Ok(())
    }

    /// Commits the container's filesystem as a new image and returns
    /// the image id.
    ///
    /// A name without a tag gets `latest`.
    ///
    /// # Errors
    ///
    /// Engine errors propagate.
    pub async fn snapshot(&self, image_name: &str) -> Result<String> {
        self.ensure_active()?;
        let (repo, tag) = match image_name.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag),
            _ => (image_name, "latest"),
        };
        self.map_op(
            self.inner
                .engine
                .commit_container(&self.id(), repo, tag)
                .await,
        )
        .await
    }

    /// Tears down every active operation, then stops the container and,
    /// unless it is persistent, removes it.
    ///
    /// Teardown continues past individual failures; idempotent. New
    /// operations started during or after shutdown fail with
    /// `ShutDown`.
    ///
    /// # Errors
    ///
    /// `ShutdownFailed` aggregating any step that failed, unless the
    /// container ended up stopped/removed as required.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(name = %self.inner.name, "shutdown");
        let drained = ops::drain(&self.inner.ops);
        let mut failures: Vec<String> = Vec::new();

        for process in drained.processes.values() {
            if process.is_running() {
                let _ = process.kill(SIGTERM).await;
            }
            if process.wait(Some(SHUTDOWN_GRACE)).await.is_err() {
                process.abort();
            }
        }
        for token in drained.streams.values() {
            token.cancel();
        }
        for session in drained.sessions.values() {
            if let Err(e) = session.close().await {
                failures.push(format!("session close: {e}"));
            }
        }

        let container_id = self.id();
        match self
            .inner
            .engine
            .stop_container(&container_id, STOP_TIMEOUT_SECS)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_running() || e.is_missing() => {}
            Err(e) => failures.push(format!("stop: {e}")),
        }
        if !self.inner.persist {
            match self.inner.engine.remove_container(&container_id, true).await {
                Ok(()) => {}
                Err(e) if e.is_missing() => {}
                Err(e) => failures.push(format!("remove: {e}")),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ShutdownFailed(failures.join("; ")))
        }
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn ensure_active(&self) -> Result<()> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(Error::ShutDown(self.inner.name.clone()));
        }
        Ok(())
    }

    /// Maps engine errors from handle-bound operations: a 404 on a
    /// container this handle was bound to means it was removed
    /// externally, and a 409 is enriched with the current state.
    async fn map_op<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(v) => Ok(v),
            Err(e) => Err(self.map_op_err(e).await),
        }
    }

    async fn map_op_err(&self, err: Error) -> Error {
        match err {
            Error::ContainerNotFound(_) => Error::ContainerGone(self.inner.name.clone()),
            Error::ContainerNotRunning {
                id,
                status: None,
                exit_code: None,
            } => match self.inner.engine.inspect_container(&self.id()).await {
                Ok(inspect) => Error::ContainerNotRunning {
                    id,
                    status: Some(inspect.state.status),
                    exit_code: Some(inspect.state.exit_code),
                },
                Err(_) => Error::ContainerNotRunning {
                    id,
                    status: None,
                    exit_code: None,
                },
            },
            other => other,
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id())
            .field("name", &self.inner.name)
            .field("persist", &self.inner.persist)
            .finish_non_exhaustive()
    }
}

/// Creates and starts a new container, returning its handle.
///
/// # Errors
///
/// `EngineUnavailable` when no socket is found, `ImageNotFound` when
/// the image is missing, plus transport errors.
pub async fn create_new_container(opts: CreateOptions) -> Result<Container> {
    let profile_info = match (&opts.image, &opts.profile) {
        (None, Some(name)) => Some(profiles::resolve_profile(name)?),
        _ => None,
    };
    let image = opts
        .image
        .clone()
        .or_else(|| profile_info.map(|p| p.image_tag.to_string()))
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string());
    let name = opts.name.clone().unwrap_or_else(generate_name);

    let socket_path = match &opts.socket {
        Some(path) => path.clone(),
        None => detect_socket().await?,
    };
    let engine = EngineClient::new(&socket_path);

    let mem_limit_bytes = match &opts.mem_limit {
        Some(s) => i64::try_from(parse_size(s)?)
            .map_err(|_| Error::invalid_input(format!("memory limit too large: {s}")))?,
        None => 0,
    };
    let nano_cpus = opts.cpu_percent.map_or(0, |p| i64::from(p) * 10_000_000);

    // Persistent containers get an instance directory in the project.
    let mut project = opts.project.clone().unwrap_or_default();
    let mut data_path = String::new();
    let mut auto_log = true;
    if opts.persist {
        if let Some(root) = projects::find_project_root(None) {
            if project.is_empty() {
                project = projects::project_name(&root);
            }
            let instance_dir = projects::ensure_instance_dir(&root, &name)?;
            data_path = instance_dir.display().to_string();
            auto_log = config::load_config(Some(root.as_path())).auto_log;
            projects::write_instance_metadata(
                &instance_dir,
                &projects::InstanceMetadata::new(
                    "(pending)",
                    &name,
                    &image,
                    &project,
                    opts.persist,
                    opts.mem_limit.as_deref().unwrap_or(""),
                    opts.cpu_percent.unwrap_or(0),
                ),
            )?;
        }
    }

    let mut label_map = HashMap::from([
        (labels::MANAGED.to_string(), "true".to_string()),
        (labels::INSTANCE.to_string(), name.clone()),
        (labels::PERSIST.to_string(), opts.persist.to_string()),
        (labels::CREATED_AT.to_string(), Utc::now().to_rfc3339()),
    ]);
    if let Some(profile) = &opts.profile {
        label_map.insert(labels::PROFILE.to_string(), profile.clone());
    }
    if !project.is_empty() {
        label_map.insert(labels::PROJECT.to_string(), project.clone());
    }
    if !data_path.is_empty() {
        label_map.insert(labels::DATA_PATH.to_string(), data_path.clone());
    }

    let network_mode = opts.network_mode.clone().or_else(|| {
        profile_info.and_then(|p| (!p.network_default).then(|| "none".to_string()))
    });
    let spec = CreateSpec {
        image: image.clone(),
        labels: label_map,
        env: opts.env.clone(),
        workdir: opts.workdir.clone(),
        network_mode,
        mem_limit_bytes,
        nano_cpus,
        binds: opts
            .volumes
            .iter()
            .map(|(host, container)| format!("{host}:{container}"))
            .collect(),
        devices: opts.devices.clone(),
        ports: opts.ports.clone(),
    };

    let container_id = engine.create_container(&name, &spec.to_request()).await?;
    engine.start_container(&container_id).await?;
    tracing::info!(%name, id = %container_id, %image, "container started");

    if !data_path.is_empty() {
        projects::write_instance_metadata(
            Path::new(&data_path),
            &projects::InstanceMetadata::new(
                &container_id,
                &name,
                &image,
                &project,
                opts.persist,
                opts.mem_limit.as_deref().unwrap_or(""),
                opts.cpu_percent.unwrap_or(0),
            ),
        )?;
    }

    Ok(Container::assemble(
        engine,
        socket_path,
        container_id,
        name,
        opts.timeout,
        opts.persist,
        project,
        data_path,
        spec,
        auto_log,
    ))
}

/// Generates a short random container name like `pd-a1b2c3d4`.
#[must_use]
pub fn generate_name() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("pd-{}", &hex[..8])
}

fn build_command(command: &str, lang: Option<&str>) -> Vec<String> {
    match lang {
        Some("python") => vec![
            "python3".to_string(),
            "-c".to_string(),
            command.to_string(),
        ],
        Some(interpreter) => vec![
            interpreter.to_string(),
            "-c".to_string(),
            command.to_string(),
        ],
        None => vec!["sh".to_string(), "-c".to_string(), command.to_string()],
    }
}

/// Splits a container path into (parent directory, basename).
fn split_container_path(path: &str) -> Result<(String, String)> {
    let trimmed = path.trim_end_matches('/');
    let Some((dir, name)) = trimmed.rsplit_once('/') else {
        return Err(Error::invalid_input(format!(
            "container path must be absolute: {path:?}"
        )));
    };
    if name.is_empty() {
        return Err(Error::invalid_input(format!(
            "container path has no file name: {path:?}"
        )));
    }
    let dir = if dir.is_empty() { "/" } else { dir };
    Ok((dir.to_string(), name.to_string()))
}

fn build_exposed_ports(ports: &[(u16, u16)]) -> Option<HashMap<String, HashMap<(), ()>>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|(_, container)| (format!("{container}/tcp"), HashMap::new()))
            .collect(),
    )
}

fn build_port_bindings(ports: &[(u16, u16)]) -> Option<HashMap<String, Vec<PortBinding>>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|(host, container)| {
                (
                    format!("{container}/tcp"),
                    vec![PortBinding {
                        host_ip: String::new(),
                        host_port: host.to_string(),
                    }],
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_name_format() {
        let name = generate_name();
        assert!(name.starts_with("pd-"));
        assert_eq!(name.len(), 11);
        assert!(name[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_build_command_default_shell() {
        assert_eq!(
            build_command("echo hi", None),
            vec!["sh", "-c", "echo hi"]
        );
    }

    #[test]
    fn test_build_command_python() {
        assert_eq!(
            build_command("print(1)", Some("python")),
            vec!["python3", "-c", "print(1)"]
        );
    }

    #[test]
    fn test_split_container_path() {
        assert_eq!(
            split_container_path("/tmp/file.txt").unwrap(),
            ("/tmp".to_string(), "file.txt".to_string())
        );
        assert_eq!(
            split_container_path("/t.bin").unwrap(),
            ("/".to_string(), "t.bin".to_string())
        );
        assert!(split_container_path("relative.txt").is_err());
        assert!(split_container_path("/").is_err());
    }

    #[test]
    fn test_create_spec_request_shape() {
        let spec = CreateSpec {
            image: "pocketdock/minimal".to_string(),
            labels: HashMap::new(),
            env: vec!["A=1".to_string()],
            workdir: Some("/work".to_string()),
            network_mode: Some("none".to_string()),
            mem_limit_bytes: 64 * 1024 * 1024,
            nano_cpus: 500_000_000,
            binds: vec!["/h:/c".to_string()],
            devices: vec!["/dev/null".to_string()],
            ports: vec![(8080, 80)],
        };
        let request = spec.to_request();
        assert_eq!(request.cmd.as_deref().unwrap(), ["sleep", "infinity"]);
        let hc = request.host_config.unwrap();
        assert_eq!(hc.memory, Some(64 * 1024 * 1024));
        assert_eq!(hc.nano_cpus, Some(500_000_000));
        assert_eq!(hc.network_mode.as_deref(), Some("none"));
        assert_eq!(hc.devices[0].cgroup_permissions, "rwm");
        let bindings = hc.port_bindings.unwrap();
        assert_eq!(bindings["80/tcp"][0].host_port, "8080");
        assert!(request.exposed_ports.unwrap().contains_key("80/tcp"));
    }

    #[test]
    fn test_snapshot_tag_split() {
        // Exercised indirectly through snapshot(); the splitting rule
        // itself is what matters.
        let split = |name: &str| match name.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
            _ => (name.to_string(), "latest".to_string()),
        };
        assert_eq!(split("img"), ("img".to_string(), "latest".to_string()));
        assert_eq!(split("img:v1"), ("img".to_string(), "v1".to_string()));
        assert_eq!(
            split("registry:5000/img"),
            ("registry:5000/img".to_string(), "latest".to_string())
        );
    }
}
