//! Error types shared across the pocketdock crates.
//!
//! One enum covers the whole taxonomy: transport failures, engine error
//! responses mapped to container states, and handle-lifecycle errors.
//! Crates higher in the stack add context but never define parallel
//! error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across all pocketdock crates.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced by the pocketdock stack.
#[derive(Debug, Error)]
pub enum Error {
    /// No container engine socket could be found.
    ///
    /// Raised when auto-detection exhausts every candidate path without
    /// finding a socket that answers `GET /_ping`.
    #[error("no container engine socket found (probed: {}). {hint}", .probed.join(", "))]
    EngineUnavailable {
        /// Socket paths that were probed, in order.
        probed: Vec<String>,
        /// Platform-specific hint on how to start an engine.
        hint: String,
    },

    /// A specific socket path could not be connected to.
    #[error("cannot connect to socket at {path}: {detail}")]
    SocketConnection {
        /// The socket path that failed.
        path: PathBuf,
        /// The underlying connect error.
        detail: String,
    },

    /// Protocol-level failure talking to the engine: malformed response,
    /// mid-stream disconnect, or an unexpected HTTP status.
    #[error("socket communication error: {0}")]
    SocketCommunication(String),

    /// The engine returned 404 for a container id or name.
    #[error("container {0} not found")]
    ContainerNotFound(String),

    /// The engine returned 409 because the container is stopped.
    ///
    /// Recoverable: `reboot` or `resume` brings the container back.
    #[error("container {id} is not running{}", state_suffix(.status, .exit_code))]
    ContainerNotRunning {
        /// Container id or name.
        id: String,
        /// Current status reported by the engine, when known.
        status: Option<String>,
        /// Exit code of the container's init process, when known.
        exit_code: Option<i64>,
    },

    /// A container a handle was bound to has been removed externally.
    #[error("container {0} was removed externally")]
    ContainerGone(String),

    /// The named image is not present in the engine's store.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Operation attempted on a session that has been closed.
    #[error("session is closed")]
    SessionClosed,

    /// A project-scoped operation was called outside a `.pocketdock/`
    /// project directory.
    #[error("no .pocketdock/ project directory found. Run `pocketdock init` first.")]
    ProjectNotInitialized,

    /// An operation did not complete within its allotted time.
    ///
    /// Run-mode timeouts are reported through `ExecResult::timed_out`
    /// instead; this variant covers waits that have no result to attach
    /// the flag to.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Operation attempted on a handle that has been shut down.
    #[error("container {0} has been shut down")]
    ShutDown(String),

    /// Teardown completed, but one or more cleanup steps failed.
    #[error("shutdown completed with errors: {0}")]
    ShutdownFailed(String),

    /// Caller-supplied input was rejected before reaching the engine.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn state_suffix(status: &Option<String>, exit_code: &Option<i64>) -> String {
    match (status, exit_code) {
        (Some(s), Some(c)) => format!(" (status: {s}, exit code: {c})"),
        (Some(s), None) => format!(" (status: {s})"),
        _ => String::new(),
    }
}

impl Error {
    /// Creates a communication error from any displayable cause.
    #[must_use]
    pub fn communication(detail: impl Into<String>) -> Self {
        Self::SocketCommunication(detail.into())
    }

    /// Creates a not-running error with no state detail.
    #[must_use]
    pub fn not_running(id: impl Into<String>) -> Self {
        Self::ContainerNotRunning {
            id: id.into(),
            status: None,
            exit_code: None,
        }
    }

    /// Creates an invalid-input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Returns true if the error means no engine is reachable at all.
    ///
    /// Used by the CLI to select its "engine not reachable" exit code.
    #[must_use]
    pub const fn is_engine_unreachable(&self) -> bool {
        matches!(
            self,
            Self::EngineUnavailable { .. } | Self::SocketConnection { .. }
        )
    }

    /// Returns true if this is a container-not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ContainerNotFound(_))
    }

    /// Returns true if this is a container-not-running error.
    #[must_use]
    pub const fn is_not_running(&self) -> bool {
        matches!(self, Self::ContainerNotRunning { .. })
    }

    /// Returns true if the container is gone or was never found.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::ContainerNotFound(_) | Self::ContainerGone(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_unavailable_lists_probed_paths() {
        let err = Error::EngineUnavailable {
            probed: vec![
                "/run/podman/podman.sock".to_string(),
                "/var/run/docker.sock".to_string(),
            ],
            hint: "Try: systemctl --user start podman.socket".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/run/podman/podman.sock"));
        assert!(msg.contains("/var/run/docker.sock"));
        assert!(msg.contains("podman.socket"));
        assert!(err.is_engine_unreachable());
    }

    #[test]
    fn test_not_running_without_state() {
        let err = Error::not_running("abc123");
        assert_eq!(err.to_string(), "container abc123 is not running");
        assert!(err.is_not_running());
    }

    #[test]
    fn test_not_running_with_state() {
        let err = Error::ContainerNotRunning {
            id: "abc123".to_string(),
            status: Some("exited".to_string()),
            exit_code: Some(137),
        };
        assert_eq!(
            err.to_string(),
            "container abc123 is not running (status: exited, exit code: 137)"
        );
    }

    #[test]
    fn test_gone_is_missing() {
        assert!(Error::ContainerGone("abc".to_string()).is_missing());
        assert!(Error::ContainerNotFound("abc".to_string()).is_missing());
        assert!(!Error::SessionClosed.is_missing());
    }

    #[test]
    fn test_image_not_found_names_image() {
        let err = Error::ImageNotFound("pocketdock/minimal".to_string());
        assert_eq!(err.to_string(), "image not found: pocketdock/minimal");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
