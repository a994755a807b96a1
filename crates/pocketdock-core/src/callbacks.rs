//! Callback registry for detached process output events.

use crate::types::StreamChunk;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Callback invoked with an output chunk.
pub type OutputCallback = Box<dyn Fn(&StreamChunk) + Send + Sync>;

/// Callback invoked with a process exit code.
pub type ExitCallback = Box<dyn Fn(i64) + Send + Sync>;

/// Per-container collection of stdout/stderr/exit callbacks.
///
/// Callbacks run on the reading task of whichever detached process
/// produced the event. A panicking callback is caught and logged so it
/// can neither break the stream nor starve other callbacks; the ring
/// buffer receives its own copy of every chunk independently.
#[derive(Default)]
pub struct CallbackRegistry {
    stdout: Mutex<Vec<OutputCallback>>,
    stderr: Mutex<Vec<OutputCallback>>,
    exit: Mutex<Vec<ExitCallback>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for stdout chunks.
    pub fn on_stdout(&self, f: impl Fn(&StreamChunk) + Send + Sync + 'static) {
        self.stdout.lock().unwrap().push(Box::new(f));
    }

    /// Registers a callback for stderr chunks.
    pub fn on_stderr(&self, f: impl Fn(&StreamChunk) + Send + Sync + 'static) {
        self.stderr.lock().unwrap().push(Box::new(f));
    }

    /// Registers a callback for process exit.
    pub fn on_exit(&self, f: impl Fn(i64) + Send + Sync + 'static) {
        self.exit.lock().unwrap().push(Box::new(f));
    }

    /// Fires the callbacks matching the chunk's stream.
    pub fn dispatch_chunk(&self, chunk: &StreamChunk) {
        let callbacks = match chunk.kind {
            pocketdock_transport::StreamKind::Stdout => self.stdout.lock().unwrap(),
            pocketdock_transport::StreamKind::Stderr => self.stderr.lock().unwrap(),
        };
        for callback in callbacks.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(chunk))).is_err() {
                tracing::debug!(stream = %chunk.kind, "output callback panicked");
            }
        }
    }

    /// Fires all exit callbacks.
    pub fn dispatch_exit(&self, exit_code: i64) {
        for callback in self.exit.lock().unwrap().iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(exit_code))).is_err() {
                tracing::debug!(exit_code, "exit callback panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketdock_transport::StreamKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn chunk(kind: StreamKind, data: &str) -> StreamChunk {
        StreamChunk {
            kind,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_dispatch_routes_by_stream() {
        let registry = CallbackRegistry::new();
        let out_hits = Arc::new(AtomicUsize::new(0));
        let err_hits = Arc::new(AtomicUsize::new(0));

        let o = out_hits.clone();
        registry.on_stdout(move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        });
        let e = err_hits.clone();
        registry.on_stderr(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch_chunk(&chunk(StreamKind::Stdout, "a"));
        registry.dispatch_chunk(&chunk(StreamKind::Stdout, "b"));
        registry.dispatch_chunk(&chunk(StreamKind::Stderr, "c"));

        assert_eq!(out_hits.load(Ordering::SeqCst), 2);
        assert_eq!(err_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        let registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.on_stdout(|_| panic!("bad callback"));
        let h = hits.clone();
        registry.on_stdout(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch_chunk(&chunk(StreamKind::Stdout, "x"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exit_callbacks_receive_code() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let s = seen.clone();
        registry.on_exit(move |code| {
            s.store(code as usize, Ordering::SeqCst);
        });
        registry.dispatch_exit(137);
        assert_eq!(seen.load(Ordering::SeqCst), 137);
    }
}
