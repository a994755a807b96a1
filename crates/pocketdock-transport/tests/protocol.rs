//! Protocol tests against in-process Unix socket fixtures.
//!
//! Each fixture accepts one connection, consumes the request head, and
//! plays back a canned byte-for-byte response.

use pocketdock_transport::{ExecStreamReader, HttpClient, StreamKind};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

async fn serve_once(response: Vec<u8>) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.sock");
    let listener = UnixListener::bind(&path).unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Consume the request head before answering.
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read_exact(&mut byte).await.is_err() {
                return;
            }
            head.push(byte[0]);
        }
        stream.write_all(&response).await.unwrap();
        stream.shutdown().await.ok();
    });

    (dir, path)
}

fn frame_bytes(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![tag, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Wraps a body in chunked transfer encoding, splitting at the given
/// boundaries so chunk edges land in the middle of frames.
fn chunk_body(body: &[u8], split_points: &[usize]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut boundaries: Vec<usize> = split_points.to_vec();
    boundaries.push(body.len());
    for end in boundaries {
        if end <= start {
            continue;
        }
        let chunk = &body[start..end];
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
        start = end;
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

async fn read_all_frames(path: &std::path::Path) -> Vec<(StreamKind, Vec<u8>)> {
    let client = HttpClient::new(path);
    let (status, headers, conn) = client
        .request_stream("POST", "/exec/abc/start", None)
        .await
        .unwrap();
    assert_eq!(status, 200);
    let mut reader = ExecStreamReader::new(conn, &headers);
    let mut frames = Vec::new();
    while let Some(frame) = reader.next_frame().await.unwrap() {
        frames.push((frame.kind, frame.data.to_vec()));
    }
    frames
}

#[tokio::test]
async fn test_request_with_content_length_body() {
    let response = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"Id\":\"abc1\"}".to_vec();
    let (_dir, path) = serve_once(response).await;

    let client = HttpClient::new(&path);
    let resp = client.request("GET", "/containers/abc1/json", None).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.headers.get("content-type"), Some("application/json"));
    assert_eq!(resp.body_text(), "{\"Id\":\"abc1\"}");
}

#[tokio::test]
async fn test_request_with_chunked_body() {
    let mut response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    response.extend_from_slice(b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n");
    let (_dir, path) = serve_once(response).await;

    let client = HttpClient::new(&path);
    let resp = client.request("GET", "/_ping", None).await.unwrap();
    assert_eq!(resp.body_text(), "hello world");
}

#[tokio::test]
async fn test_request_reads_to_eof_without_framing() {
    let response = b"HTTP/1.1 200 OK\r\n\r\nOK".to_vec();
    let (_dir, path) = serve_once(response).await;

    let client = HttpClient::new(&path);
    let resp = client.request("GET", "/_ping", None).await.unwrap();
    assert_eq!(resp.body_text(), "OK");
}

#[tokio::test]
async fn test_error_status_body_is_returned() {
    let response =
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 25\r\n\r\n{\"message\":\"no such id\"}\n".to_vec();
    let (_dir, path) = serve_once(response).await;

    let client = HttpClient::new(&path);
    let resp = client.request("GET", "/containers/zzz/json", None).await.unwrap();
    assert_eq!(resp.status, 404);
    assert!(resp.body_text().contains("no such id"));
}

#[tokio::test]
async fn test_connect_failure_is_socket_connection_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.sock");
    let client = HttpClient::new(&path);
    let err = client.request("GET", "/_ping", None).await.unwrap_err();
    assert!(matches!(
        err,
        pocketdock_error::Error::SocketConnection { .. }
    ));
}

#[tokio::test]
async fn test_exec_stream_chunk_boundaries_inside_frames() {
    // Three frames; chunk splits land mid-header and mid-payload.
    let mut body = frame_bytes(1, b"first\n");
    body.extend_from_slice(&frame_bytes(2, b"second\n"));
    body.extend_from_slice(&frame_bytes(1, b"third\n"));

    let mut response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    response.extend_from_slice(&chunk_body(&body, &[3, 11, 20, 21]));
    let (_dir, path) = serve_once(response).await;

    let frames = read_all_frames(&path).await;
    assert_eq!(
        frames,
        vec![
            (StreamKind::Stdout, b"first\n".to_vec()),
            (StreamKind::Stderr, b"second\n".to_vec()),
            (StreamKind::Stdout, b"third\n".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_exec_stream_split_and_unsplit_agree() {
    let mut body = frame_bytes(1, b"alpha");
    body.extend_from_slice(&frame_bytes(2, b"beta"));

    let mut unsplit = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    unsplit.extend_from_slice(&chunk_body(&body, &[]));
    let (_dir_a, path_a) = serve_once(unsplit).await;

    let mut split = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    split.extend_from_slice(&chunk_body(&body, &[1, 2, 7, 9, 14]));
    let (_dir_b, path_b) = serve_once(split).await;

    assert_eq!(read_all_frames(&path_a).await, read_all_frames(&path_b).await);
}

#[tokio::test]
async fn test_exec_stream_podman_raw_fall_through() {
    // Unframed stream, no chunking: everything is stdout.
    let mut response = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
    response.extend_from_slice(b"raw output with no framing\n");
    let (_dir, path) = serve_once(response).await;

    let frames = read_all_frames(&path).await;
    let stdout: Vec<u8> = frames
        .iter()
        .filter(|(k, _)| *k == StreamKind::Stdout)
        .flat_map(|(_, d)| d.clone())
        .collect();
    assert_eq!(stdout, b"raw output with no framing\n");
    assert!(frames.iter().all(|(k, _)| *k == StreamKind::Stdout));
}

#[tokio::test]
async fn test_exec_stream_disconnect_mid_chunk_errors() {
    // Chunk header promises 0x20 bytes but the connection dies early.
    let mut response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    response.extend_from_slice(b"20\r\n");
    response.extend_from_slice(&frame_bytes(1, b"tr"));
    let (_dir, path) = serve_once(response).await;

    let client = HttpClient::new(&path);
    let (status, headers, conn) = client
        .request_stream("POST", "/exec/abc/start", None)
        .await
        .unwrap();
    assert_eq!(status, 200);
    let mut reader = ExecStreamReader::new(conn, &headers);
    let mut result = Ok(None);
    loop {
        match reader.next_frame().await {
            Ok(Some(_)) => continue,
            other => {
                result = other;
                break;
            }
        }
    }
    assert!(matches!(
        result,
        Err(pocketdock_error::Error::SocketCommunication(_))
    ));
}
