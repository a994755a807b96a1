//! Typed wrappers over the Docker-compatible REST endpoints.
//!
//! One logical operation per method, one connection per call. Paths are
//! unversioned (`/containers/create`, not `/v4.0.0/libpod/...`) so the
//! same client speaks to Podman and Docker.

use crate::types::{
    BuildProgress, CommitResponse, ContainerCreateRequest, ContainerCreateResponse,
    ContainerInspect, ContainerStats, ContainerSummary, ExecCreateRequest, ExecCreateResponse,
    ExecInspect, ExecStartRequest, ImageSummary, TopResponse,
};
use bytes::Bytes;
use pocketdock_error::{Error, Result};
use pocketdock_transport::{ExecStreamReader, HttpClient, HttpResponse, RequestBody};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Client for one engine socket.
///
/// Cheap to clone and share; holds no connection state.
#[derive(Debug, Clone)]
pub struct EngineClient {
    http: HttpClient,
    socket_path: PathBuf,
}

impl EngineClient {
    /// Creates a client for the given socket path.
    #[must_use]
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            http: HttpClient::new(socket_path.as_ref()),
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Returns the socket path this client speaks to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    // ------------------------------------------------------------------
    // System
    // ------------------------------------------------------------------

    /// Pings the engine; returns the body (`OK`) on success.
    ///
    /// # Errors
    ///
    /// Returns a communication error on any non-200 answer.
    pub async fn ping(&self) -> Result<String> {
        let resp = self.http.request("GET", "/_ping", None).await?;
        if resp.status != 200 {
            return Err(Error::communication(format!(
                "ping failed: HTTP {}",
                resp.status
            )));
        }
        Ok(resp.body_text().trim().to_string())
    }

    // ------------------------------------------------------------------
    // Container lifecycle
    // ------------------------------------------------------------------

    /// Creates a container, returning its id.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` when the engine has no such image.
    pub async fn create_container(
        &self,
        name: &str,
        request: &ContainerCreateRequest,
    ) -> Result<String> {
        let path = format!("/containers/create?name={}", urlencoding::encode(name));
        let resp = self.post_json(&path, request).await?;
        if resp.status == 404 {
            return Err(Error::ImageNotFound(request.image.clone()));
        }
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "create failed: HTTP {}: {}",
                resp.status,
                resp.body_text()
            )));
        }
        let created: ContainerCreateResponse = parse_json(&resp)?;
        for warning in &created.warnings {
            tracing::debug!(warning = %warning, "engine create warning");
        }
        Ok(created.id)
    }

    /// Starts a created container. 304 (already started) is success.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn start_container(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .request("POST", &format!("/containers/{id}/start"), None)
            .await?;
        if matches!(resp.status, 204 | 304) {
            return Ok(());
        }
        check_container_response(&resp, id)
    }

    /// Stops a running container. 304 (already stopped) is success.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        let resp = self
            .http
            .request("POST", &format!("/containers/{id}/stop?t={timeout_secs}"), None)
            .await?;
        if matches!(resp.status, 204 | 304) {
            return Ok(());
        }
        check_container_response(&resp, id)
    }

    /// Restarts a container in place.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn restart_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        let resp = self
            .http
            .request(
                "POST",
                &format!("/containers/{id}/restart?t={timeout_secs}"),
                None,
            )
            .await?;
        if resp.status == 204 {
            return Ok(());
        }
        check_container_response(&resp, id)
    }

    /// Removes a container.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let resp = self
            .http
            .request("DELETE", &format!("/containers/{id}?force={force}"), None)
            .await?;
        if matches!(resp.status, 200 | 204) {
            return Ok(());
        }
        check_container_response(&resp, id)
    }

    /// Inspects a container.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        let resp = self
            .http
            .request("GET", &format!("/containers/{id}/json"), None)
            .await?;
        check_container_response(&resp, id)?;
        parse_json(&resp)
    }

    /// Fetches a one-shot stats snapshot.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn container_stats(&self, id: &str) -> Result<ContainerStats> {
        let resp = self
            .http
            .request(
                "GET",
                &format!("/containers/{id}/stats?stream=false&one-shot=true"),
                None,
            )
            .await?;
        check_container_response(&resp, id)?;
        parse_json(&resp)
    }

    /// Lists processes running inside a container.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn container_top(&self, id: &str) -> Result<TopResponse> {
        let resp = self
            .http
            .request("GET", &format!("/containers/{id}/top"), None)
            .await?;
        check_container_response(&resp, id)?;
        parse_json(&resp)
    }

    /// Lists containers (including stopped), optionally filtered by label.
    ///
    /// # Errors
    ///
    /// Returns a communication error on any non-2xx status.
    pub async fn list_containers(
        &self,
        label_filter: Option<&str>,
    ) -> Result<Vec<ContainerSummary>> {
        let mut path = "/containers/json?all=true".to_string();
        if let Some(label) = label_filter {
            let filters = serde_json::json!({ "label": [label] }).to_string();
            path.push_str(&format!("&filters={}", urlencoding::encode(&filters)));
        }
        let resp = self.http.request("GET", &path, None).await?;
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "list containers failed: HTTP {}: {}",
                resp.status,
                resp.body_text()
            )));
        }
        parse_json(&resp)
    }

    /// Commits a container's filesystem as a new image.
    ///
    /// # Errors
    ///
    /// Maps engine statuses per the container error taxonomy.
    pub async fn commit_container(&self, id: &str, repo: &str, tag: &str) -> Result<String> {
        let path = format!(
            "/commit?container={}&repo={}&tag={}",
            urlencoding::encode(id),
            urlencoding::encode(repo),
            urlencoding::encode(tag)
        );
        let resp = self.http.request("POST", &path, None).await?;
        check_container_response(&resp, id)?;
        let commit: CommitResponse = parse_json(&resp)?;
        Ok(commit.id)
    }

    // ------------------------------------------------------------------
    // Exec
    // ------------------------------------------------------------------

    /// Creates an exec instance, returning its id.
    ///
    /// # Errors
    ///
    /// Maps 404/409 to the container error taxonomy; also recognizes
    /// Podman's `container state improper` 500 for stopped containers.
    pub async fn exec_create(
        &self,
        container_id: &str,
        cmd: &[String],
        attach_stdin: bool,
    ) -> Result<String> {
        let request = ExecCreateRequest {
            attach_stdin,
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
            cmd: cmd.to_vec(),
        };
        let resp = self
            .post_json(&format!("/containers/{container_id}/exec"), &request)
            .await?;
        if resp.status >= 400 {
            let body = resp.body_text();
            if resp.status == 404 {
                return Err(Error::ContainerNotFound(container_id.to_string()));
            }
            if resp.status == 409 || body.contains("container state improper") {
                return Err(Error::not_running(container_id));
            }
            return Err(Error::communication(format!(
                "exec create failed: HTTP {}: {body}",
                resp.status
            )));
        }
        let created: ExecCreateResponse = parse_json(&resp)?;
        Ok(created.id)
    }

    /// Starts an exec instance and returns the demultiplexing stream
    /// reader over the upgraded connection.
    ///
    /// # Errors
    ///
    /// Returns a communication error if the engine rejects the start.
    pub async fn exec_start_stream(&self, exec_id: &str) -> Result<ExecStreamReader> {
        let request = ExecStartRequest {
            detach: false,
            tty: false,
        };
        let body = RequestBody::json(
            serde_json::to_vec(&request)
                .map_err(|e| Error::communication(format!("failed to encode request: {e}")))?,
        );
        let (status, headers, conn) = self
            .http
            .request_stream("POST", &format!("/exec/{exec_id}/start"), Some(body))
            .await?;
        if status >= 400 {
            return Err(Error::communication(format!(
                "exec start failed: HTTP {status}"
            )));
        }
        Ok(ExecStreamReader::new(conn, &headers))
    }

    /// Inspects an exec instance.
    ///
    /// # Errors
    ///
    /// Returns a communication error on any non-2xx status.
    pub async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect> {
        let resp = self
            .http
            .request("GET", &format!("/exec/{exec_id}/json"), None)
            .await?;
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "exec inspect failed: HTTP {}: {}",
                resp.status,
                resp.body_text()
            )));
        }
        parse_json(&resp)
    }

    /// Reads an exec's exit code after its stream has ended.
    ///
    /// # Errors
    ///
    /// Returns a communication error on any non-2xx status.
    pub async fn exec_exit_code(&self, exec_id: &str) -> Result<i64> {
        Ok(self.exec_inspect(exec_id).await?.exit_code)
    }

    /// Resizes the TTY of an interactive exec.
    ///
    /// # Errors
    ///
    /// Returns a communication error on any non-2xx status.
    pub async fn exec_resize(&self, exec_id: &str, height: u32, width: u32) -> Result<()> {
        let resp = self
            .http
            .request(
                "POST",
                &format!("/exec/{exec_id}/resize?h={height}&w={width}"),
                None,
            )
            .await?;
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "exec resize failed: HTTP {}",
                resp.status
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Archive
    // ------------------------------------------------------------------

    /// Downloads a path from the container as a tar archive.
    ///
    /// # Errors
    ///
    /// 404 here means the *path* is missing, reported as a not-found
    /// I/O error naming it.
    pub async fn get_archive(&self, container_id: &str, path: &str) -> Result<Bytes> {
        let url = format!(
            "/containers/{container_id}/archive?path={}",
            urlencoding::encode(path)
        );
        let resp = self.http.request("GET", &url, None).await?;
        if resp.status == 404 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("path not found in container: {path}"),
            )));
        }
        check_container_response(&resp, container_id)?;
        Ok(resp.body)
    }

    /// Uploads a tar archive into a directory inside the container.
    ///
    /// # Errors
    ///
    /// 404 here means the destination directory is missing.
    pub async fn put_archive(&self, container_id: &str, dest_dir: &str, tar: Bytes) -> Result<()> {
        let url = format!(
            "/containers/{container_id}/archive?path={}",
            urlencoding::encode(dest_dir)
        );
        let resp = self
            .http
            .request("PUT", &url, Some(RequestBody::tar(tar)))
            .await?;
        if resp.status == 404 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("destination path not found in container: {dest_dir}"),
            )));
        }
        check_container_response(&resp, container_id)
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Lists images in the engine store.
    ///
    /// # Errors
    ///
    /// Returns a communication error on any non-2xx status.
    pub async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let resp = self.http.request("GET", "/images/json", None).await?;
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "list images failed: HTTP {}: {}",
                resp.status,
                resp.body_text()
            )));
        }
        parse_json(&resp)
    }

    /// Builds an image from an in-memory tar context.
    ///
    /// The engine streams JSONL progress; lines are surfaced at debug
    /// level and an `error` line fails the call.
    ///
    /// # Errors
    ///
    /// Returns a communication error when the build fails.
    pub async fn build_image(&self, context_tar: Bytes, tag: &str) -> Result<()> {
        let path = format!("/build?t={}", urlencoding::encode(tag));
        let resp = self
            .http
            .request("POST", &path, Some(RequestBody::tar(context_tar)))
            .await?;
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "image build failed: HTTP {}: {}",
                resp.status,
                resp.body_text()
            )));
        }
        for line in resp.body_text().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let progress: BuildProgress = serde_json::from_str(line).unwrap_or_default();
            if let Some(err) = progress.error {
                return Err(Error::communication(format!("image build failed: {err}")));
            }
            if let Some(text) = progress.stream {
                let text = text.trim();
                if !text.is_empty() {
                    tracing::debug!(step = text, "build progress");
                }
            }
        }
        Ok(())
    }

    /// Exports an image as a tar archive.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` when the engine has no such image.
    pub async fn save_image(&self, name: &str) -> Result<Bytes> {
        let path = format!("/images/{}/get", urlencoding::encode(name));
        let resp = self.http.request("GET", &path, None).await?;
        if resp.status == 404 {
            return Err(Error::ImageNotFound(name.to_string()));
        }
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "image save failed: HTTP {}: {}",
                resp.status,
                resp.body_text()
            )));
        }
        Ok(resp.body)
    }

    /// Imports images from a tar archive produced by `save_image`.
    ///
    /// # Errors
    ///
    /// Returns a communication error when the engine rejects the load.
    pub async fn load_image(&self, tar: Bytes) -> Result<()> {
        let resp = self
            .http
            .request("POST", "/images/load?quiet=true", Some(RequestBody::tar(tar)))
            .await?;
        if resp.status >= 400 {
            return Err(Error::communication(format!(
                "image load failed: HTTP {}: {}",
                resp.status,
                resp.body_text()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<HttpResponse> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| Error::communication(format!("failed to encode request: {e}")))?;
        self.http
            .request("POST", path, Some(RequestBody::json(encoded)))
            .await
    }
}

/// Maps an engine error response onto the container error taxonomy.
///
/// 404 means the container does not exist; 409 means it exists but is
/// not running. Everything else 4xx/5xx is a communication error
/// carrying the body.
fn check_container_response(resp: &HttpResponse, container_id: &str) -> Result<()> {
    match resp.status {
        s if s < 400 => Ok(()),
        404 => Err(Error::ContainerNotFound(container_id.to_string())),
        409 => Err(Error::not_running(container_id)),
        _ => Err(Error::communication(format!(
            "HTTP {}: {}",
            resp.status,
            resp.body_text()
        ))),
    }
}

fn parse_json<T: DeserializeOwned>(resp: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&resp.body)
        .map_err(|e| Error::communication(format!("malformed response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pocketdock_transport::Headers;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Headers::default(),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    #[test]
    fn test_status_mapping_ok() {
        assert!(check_container_response(&response(200, ""), "abc").is_ok());
        assert!(check_container_response(&response(204, ""), "abc").is_ok());
    }

    #[test]
    fn test_status_mapping_not_found() {
        let err = check_container_response(&response(404, ""), "abc").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_status_mapping_not_running() {
        let err = check_container_response(&response(409, ""), "abc").unwrap_err();
        assert!(err.is_not_running());
    }

    #[test]
    fn test_status_mapping_other_carries_body() {
        let err =
            check_container_response(&response(500, "internal engine error"), "abc").unwrap_err();
        assert!(err.to_string().contains("internal engine error"));
    }

    #[test]
    fn test_parse_json_error_is_communication() {
        let resp = response(200, "not json");
        let parsed: Result<ContainerCreateResponse> = parse_json(&resp);
        assert!(matches!(
            parsed.unwrap_err(),
            Error::SocketCommunication(_)
        ));
    }
}
