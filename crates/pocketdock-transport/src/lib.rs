//! HTTP/1.1 transport over Unix domain sockets.
//!
//! Implements the subset of HTTP the Docker-compatible engine API needs:
//! one request/response exchange per connection, chunked transfer
//! decoding, and upgraded exec streams with frame demultiplexing.
//!
//! Connection-per-operation is deliberate: Unix socket connects cost
//! microseconds, and giving every operation its own socket means a slow
//! streaming exec can never block an unrelated `inspect`.

pub mod demux;
pub mod detect;
pub mod http;

pub use demux::{Frame, FrameDecoder, StreamKind};
pub use detect::detect_socket;
pub use http::{
    ExecStreamReader, Headers, HttpClient, HttpConnection, HttpResponse, RequestBody,
};
