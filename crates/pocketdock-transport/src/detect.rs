//! Container engine socket auto-detection.

use crate::http::HttpClient;
use pocketdock_error::{Error, Result};
use std::path::PathBuf;

/// Environment variable overriding socket auto-detection.
pub const SOCKET_ENV: &str = "POCKETDOCK_SOCKET";

/// Auto-detects an available container engine socket.
///
/// Probe order:
/// 1. `POCKETDOCK_SOCKET` env var
/// 2. Podman rootless: `$XDG_RUNTIME_DIR/podman/podman.sock`
/// 3. Podman system: `/run/podman/podman.sock`
/// 4. Docker: `/var/run/docker.sock`
/// 5. On macOS: Podman machine and Docker Desktop user sockets
///
/// A candidate wins only if it exists, accepts a connection, and answers
/// `GET /_ping` with 200 — a stale socket file left behind by a stopped
/// engine does not.
///
/// # Errors
///
/// Returns `EngineUnavailable` with the probed list and a platform start
/// hint when every candidate fails.
pub async fn detect_socket() -> Result<PathBuf> {
    let candidates = candidate_sockets();
    let mut probed = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        probed.push(candidate.display().to_string());
        if !candidate.exists() {
            continue;
        }
        if ping_ok(&candidate).await {
            tracing::debug!(socket = %candidate.display(), "engine socket detected");
            return Ok(candidate);
        }
        tracing::debug!(socket = %candidate.display(), "socket present but not answering");
    }

    Err(Error::EngineUnavailable {
        probed,
        hint: platform_hint().to_string(),
    })
}

async fn ping_ok(path: &std::path::Path) -> bool {
    let client = HttpClient::new(path);
    matches!(client.request("GET", "/_ping", None).await, Ok(resp) if resp.status == 200)
}

fn candidate_sockets() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(explicit) = std::env::var(SOCKET_ENV) {
        if !explicit.is_empty() {
            candidates.push(PathBuf::from(explicit));
        }
    }

    if let Ok(xdg) = std::env::var("XDG_RUNTIME_DIR") {
        if !xdg.is_empty() {
            candidates.push(PathBuf::from(xdg).join("podman/podman.sock"));
        }
    }

    candidates.push(PathBuf::from("/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/var/run/docker.sock"));

    #[cfg(target_os = "macos")]
    if let Ok(home) = std::env::var("HOME") {
        candidates.push(
            PathBuf::from(&home).join(".local/share/containers/podman/machine/podman.sock"),
        );
        candidates.push(PathBuf::from(&home).join(".docker/run/docker.sock"));
    }

    candidates
}

const fn platform_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "Is Podman or Docker running? Try: podman machine start"
    } else {
        "Is Podman or Docker running? Try: systemctl --user start podman.socket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_candidates_present() {
        let candidates = candidate_sockets();
        let rendered: Vec<String> = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        assert!(rendered.contains(&"/run/podman/podman.sock".to_string()));
        assert!(rendered.contains(&"/var/run/docker.sock".to_string()));
    }

    #[test]
    fn test_hint_mentions_an_engine() {
        assert!(platform_hint().contains("Podman"));
    }
}
