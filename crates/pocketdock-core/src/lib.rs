//! Container sandboxes over the Docker-compatible REST API.
//!
//! pocketdock manages OCI containers as sandboxes by speaking directly
//! to a local engine (rootless Podman preferred, Docker supported) over
//! its Unix socket. A [`Container`] handle runs commands in three modes
//! (blocking, streaming, detached), moves files via tar archives, opens
//! persistent shell [`Session`]s, and snapshots or resumes state across
//! invocations.
//!
//! ```no_run
//! use pocketdock_core::{create_new_container, CreateOptions, RunOptions};
//!
//! # async fn demo() -> pocketdock_error::Result<()> {
//! let container = create_new_container(CreateOptions::default()).await?;
//! let result = container.run("echo hello", RunOptions::default()).await?;
//! assert_eq!(result.stdout, "hello\n");
//! container.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod callbacks;
pub mod config;
pub mod container;
mod info;
pub mod logger;
mod ops;
pub mod persistence;
pub mod process;
pub mod profiles;
pub mod projects;
pub mod session;
pub mod stream;
pub mod types;
pub mod units;

pub use buffer::{BufferSnapshot, RingBuffer};
pub use callbacks::CallbackRegistry;
pub use config::{load_config, PocketDockConfig};
pub use container::{
    create_new_container, generate_name, Container, CreateOptions, RunOptions, DEFAULT_IMAGE,
    DEFAULT_MAX_OUTPUT, DEFAULT_TIMEOUT,
};
pub use logger::InstanceLogger;
pub use persistence::{
    destroy_container, list_containers, prune, resume_container, stop_container,
};
pub use process::DetachedProcess;
pub use profiles::{list_profiles, resolve_profile, ProfileInfo};
pub use projects::{
    doctor, ensure_instance_dir, find_project_root, init_project, list_instance_dirs,
    InstanceMetadata,
};
pub use session::Session;
pub use stream::ExecStream;
pub use types::{ContainerInfo, ContainerListItem, DoctorReport, ExecResult, StreamChunk};

pub use pocketdock_error::{Error, Result};
pub use pocketdock_transport::StreamKind;
