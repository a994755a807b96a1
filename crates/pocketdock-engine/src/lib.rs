//! Typed client for the Docker-compatible engine REST API.
//!
//! Thin, explicit wrappers: one method per endpoint, one connection per
//! call, engine statuses mapped onto the shared error taxonomy. The
//! exec-stream and archive payload formats live in
//! [`pocketdock_transport`] and [`archive`] respectively.

pub mod api;
pub mod archive;
pub mod types;

pub use api::EngineClient;
