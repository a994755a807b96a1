//! Minimal HTTP/1.1 client over a Unix domain socket.
//!
//! Each request opens its own connection, writes the request line and
//! headers with `Host: localhost`, and reads the response. Bodies are
//! handled as `Content-Length`, chunked transfer encoding, or
//! read-to-EOF. Exec-start responses upgrade into an [`ExecStreamReader`]
//! that demultiplexes the engine's frame protocol.

use crate::demux::{Frame, FrameDecoder};
use bytes::{Bytes, BytesMut};
use pocketdock_error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

/// Content type for JSON control-endpoint bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type for tar archive uploads.
pub const CONTENT_TYPE_TAR: &str = "application/x-tar";

const READ_BUF_SIZE: usize = 8192;

/// A request body with its content type.
#[derive(Debug, Clone)]
pub struct RequestBody {
    content_type: &'static str,
    data: Bytes,
}

impl RequestBody {
    /// Wraps already-serialized JSON bytes.
    #[must_use]
    pub fn json(data: impl Into<Bytes>) -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON,
            data: data.into(),
        }
    }

    /// Wraps a tar archive payload.
    #[must_use]
    pub fn tar(data: impl Into<Bytes>) -> Self {
        Self {
            content_type: CONTENT_TYPE_TAR,
            data: data.into(),
        }
    }
}

/// Response headers with case-insensitive lookup.
#[derive(Debug, Default, Clone)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns true if the response uses chunked transfer encoding.
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.get("transfer-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    }

    /// Returns the parsed `Content-Length`, if present and valid.
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length").and_then(|v| v.parse().ok())
    }

    fn insert(&mut self, name: &str, value: &str) {
        self.0
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
}

/// A buffered HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Full response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns the body decoded as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// An open connection after the response head has been read.
///
/// Dropping the connection closes the socket.
pub struct HttpConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl HttpConnection {
    /// Splits the connection into its read and write halves.
    #[must_use]
    pub fn into_parts(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}

/// HTTP/1.1 client bound to one Unix socket path.
///
/// Cheap to clone; every request opens a fresh connection.
#[derive(Debug, Clone)]
pub struct HttpClient {
    socket_path: PathBuf,
}

impl HttpClient {
    /// Creates a client for the given socket path.
    #[must_use]
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Returns the socket path this client connects to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| Error::SocketConnection {
                path: self.socket_path.clone(),
                detail: e.to_string(),
            })
    }

    /// Performs a request and buffers the full response.
    ///
    /// # Errors
    ///
    /// Returns `SocketConnection` if the socket cannot be connected to,
    /// `SocketCommunication` on any protocol-level failure. HTTP error
    /// statuses are *not* treated as errors here; callers map them.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<HttpResponse> {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_request(&mut write_half, method, path, body.as_ref()).await?;
        let status = read_status_line(&mut reader).await?;
        let headers = read_headers(&mut reader).await?;
        let body = read_body(&mut reader, &headers).await?;

        tracing::trace!(method, path, status, body_len = body.len(), "request");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Performs a request and returns the open connection after the
    /// response head, for streaming bodies and upgraded exec streams.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`HttpClient::request`]. The caller owns
    /// the returned connection and must read (or drop) it.
    pub async fn request_stream(
        &self,
        method: &str,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<(u16, Headers, HttpConnection)> {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_request(&mut write_half, method, path, body.as_ref()).await?;
        let status = read_status_line(&mut reader).await?;
        let headers = read_headers(&mut reader).await?;

        tracing::trace!(method, path, status, "request_stream");
        Ok((
            status,
            headers,
            HttpConnection {
                reader,
                writer: write_half,
            },
        ))
    }
}

async fn write_request(
    writer: &mut OwnedWriteHalf,
    method: &str,
    path: &str,
    body: Option<&RequestBody>,
) -> Result<()> {
    let mut head = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n");
    if let Some(body) = body {
        head.push_str(&format!(
            "Content-Type: {}\r\nContent-Length: {}\r\n",
            body.content_type,
            body.data.len()
        ));
    }
    head.push_str("Connection: close\r\n\r\n");

    writer
        .write_all(head.as_bytes())
        .await
        .map_err(|e| Error::communication(format!("failed to write request: {e}")))?;
    if let Some(body) = body {
        writer
            .write_all(&body.data)
            .await
            .map_err(|e| Error::communication(format!("failed to write request body: {e}")))?;
    }
    writer
        .flush()
        .await
        .map_err(|e| Error::communication(format!("failed to flush request: {e}")))?;
    Ok(())
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<String>> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(|e| Error::communication(format!("failed to read response line: {e}")))?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn read_status_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<u16> {
    let line = read_line(reader)
        .await?
        .ok_or_else(|| Error::communication("empty response"))?;
    let mut parts = line.split_whitespace();
    let _version = parts.next();
    parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::communication(format!("malformed status line: {line:?}")))
}

async fn read_headers(reader: &mut BufReader<OwnedReadHalf>) -> Result<Headers> {
    let mut headers = Headers::default();
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| Error::communication("connection closed while reading headers"))?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name, value);
        }
    }
    Ok(headers)
}

async fn read_exact(reader: &mut BufReader<OwnedReadHalf>, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| Error::communication(format!("unexpected EOF in response body: {e}")))?;
    Ok(buf)
}

/// Reads the next chunk-size line. Returns `None` for the terminal
/// zero-size chunk (after consuming the trailer line).
async fn read_chunk_size(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<usize>> {
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| Error::communication("connection closed mid-chunk"))?;
        if line.is_empty() {
            // CRLF between chunks.
            continue;
        }
        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| Error::communication(format!("malformed chunk size: {line:?}")))?;
        if size == 0 {
            // Consume the line terminating the trailer section.
            let _ = read_line(reader).await?;
            return Ok(None);
        }
        return Ok(Some(size));
    }
}

async fn read_body(reader: &mut BufReader<OwnedReadHalf>, headers: &Headers) -> Result<Bytes> {
    if headers.is_chunked() {
        let mut body = BytesMut::new();
        while let Some(size) = read_chunk_size(reader).await? {
            body.extend_from_slice(&read_exact(reader, size).await?);
        }
        return Ok(body.freeze());
    }

    if let Some(len) = headers.content_length() {
        return Ok(Bytes::from(read_exact(reader, len).await?));
    }

    // No framing at all: read until the engine closes the connection.
    let mut body = Vec::new();
    reader
        .read_to_end(&mut body)
        .await
        .map_err(|e| Error::communication(format!("failed to read response body: {e}")))?;
    Ok(Bytes::from(body))
}

/// Reader for an exec output stream.
///
/// Docker wraps the multiplexed stream in chunked transfer encoding;
/// Podman can send the multiplexed (or raw) stream directly. HTTP chunk
/// boundaries carry no relationship to demux frame boundaries, so bytes
/// are unchunked first and frames reassembled by the [`FrameDecoder`].
pub struct ExecStreamReader {
    reader: BufReader<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    decoder: FrameDecoder,
    chunked: bool,
    chunk_remaining: usize,
    source_eof: bool,
}

impl ExecStreamReader {
    /// Wraps an upgraded connection, choosing the transfer mode from the
    /// response headers.
    #[must_use]
    pub fn new(conn: HttpConnection, headers: &Headers) -> Self {
        let chunked = headers.is_chunked();
        Self {
            reader: conn.reader,
            writer: Some(conn.writer),
            decoder: FrameDecoder::new(),
            chunked,
            chunk_remaining: 0,
            source_eof: false,
        }
    }

    /// Takes the write half of the connection for stdin-attached execs.
    #[must_use]
    pub fn take_writer(&mut self) -> Option<OwnedWriteHalf> {
        self.writer.take()
    }

    /// Returns the next demultiplexed frame, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns `SocketCommunication` on mid-stream disconnects and
    /// malformed chunk or frame headers. After an error the stream is
    /// finished; further calls keep failing rather than hanging.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            if self.source_eof {
                return self.decoder.finish();
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        if self.chunked {
            if self.chunk_remaining == 0 {
                match read_chunk_size(&mut self.reader).await? {
                    Some(size) => self.chunk_remaining = size,
                    None => {
                        self.source_eof = true;
                        return Ok(());
                    }
                }
            }
            let want = self.chunk_remaining.min(READ_BUF_SIZE);
            let mut buf = vec![0u8; want];
            let n = self
                .reader
                .read(&mut buf)
                .await
                .map_err(|e| Error::communication(format!("stream read failed: {e}")))?;
            if n == 0 {
                return Err(Error::communication("connection closed mid-chunk"));
            }
            self.decoder.feed(&buf[..n]);
            self.chunk_remaining -= n;
        } else {
            let mut buf = [0u8; READ_BUF_SIZE];
            let n = self
                .reader
                .read(&mut buf)
                .await
                .map_err(|e| Error::communication(format!("stream read failed: {e}")))?;
            if n == 0 {
                self.source_eof = true;
            } else {
                self.decoder.feed(&buf[..n]);
            }
        }
        Ok(())
    }
}
