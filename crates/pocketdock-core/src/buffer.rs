//! Bounded output accumulator for detached processes.

use pocketdock_transport::StreamKind;
use std::sync::Mutex;

/// Default total capacity: 1 MiB.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Snapshot of buffered output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferSnapshot {
    /// Buffered stdout text.
    pub stdout: String,
    /// Buffered stderr text.
    pub stderr: String,
}

#[derive(Debug, Default)]
struct Inner {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    overflow: bool,
}

/// Bounded ring buffer for stdout/stderr accumulation.
///
/// Each stream gets half the total capacity. When a stream's half
/// overflows, the oldest bytes are evicted and the overflow flag latches
/// true. All operations are atomic under one mutex.
#[derive(Debug)]
pub struct RingBuffer {
    half: usize,
    inner: Mutex<Inner>,
}

impl RingBuffer {
    /// Creates a buffer with the given total capacity in bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            half: (capacity / 2).max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Appends data to the stream's buffer, evicting the oldest bytes
    /// when over capacity.
    pub fn write(&self, kind: StreamKind, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let half = self.half;
        let buf = match kind {
            StreamKind::Stdout => &mut inner.stdout,
            StreamKind::Stderr => &mut inner.stderr,
        };
        buf.extend_from_slice(data);
        if buf.len() > half {
            let excess = buf.len() - half;
            buf.drain(..excess);
            inner.overflow = true;
        }
    }

    /// Drains and returns all buffered output.
    #[must_use]
    pub fn read(&self) -> BufferSnapshot {
        let mut inner = self.inner.lock().unwrap();
        let snapshot = BufferSnapshot {
            stdout: String::from_utf8_lossy(&inner.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&inner.stderr).into_owned(),
        };
        inner.stdout.clear();
        inner.stderr.clear();
        snapshot
    }

    /// Returns buffered output without draining.
    #[must_use]
    pub fn peek(&self) -> BufferSnapshot {
        let inner = self.inner.lock().unwrap();
        BufferSnapshot {
            stdout: String::from_utf8_lossy(&inner.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&inner.stderr).into_owned(),
        }
    }

    /// Current buffered byte count across both streams.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.stdout.len() + inner.stderr.len()
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any bytes were ever evicted.
    #[must_use]
    pub fn overflow(&self) -> bool {
        self.inner.lock().unwrap().overflow
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_by_stream() {
        let buf = RingBuffer::default();
        buf.write(StreamKind::Stdout, b"out");
        buf.write(StreamKind::Stderr, b"err");
        let snap = buf.read();
        assert_eq!(snap.stdout, "out");
        assert_eq!(snap.stderr, "err");
    }

    #[test]
    fn test_read_drains() {
        let buf = RingBuffer::default();
        buf.write(StreamKind::Stdout, b"once");
        assert_eq!(buf.read().stdout, "once");
        assert_eq!(buf.read(), BufferSnapshot::default());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_peek_does_not_drain() {
        let buf = RingBuffer::default();
        buf.write(StreamKind::Stdout, b"keep");
        let first = buf.peek();
        let second = buf.read();
        assert_eq!(first, second);
        assert!(buf.peek().stdout.is_empty());
    }

    #[test]
    fn test_eviction_keeps_newest_bytes() {
        let buf = RingBuffer::new(8); // 4 bytes per stream
        buf.write(StreamKind::Stdout, b"abcdef");
        assert!(buf.overflow());
        assert_eq!(buf.read().stdout, "cdef");
    }

    #[test]
    fn test_overflow_latches() {
        let buf = RingBuffer::new(8);
        buf.write(StreamKind::Stdout, b"abcdefgh");
        assert!(buf.overflow());
        let _ = buf.read();
        buf.write(StreamKind::Stdout, b"x");
        assert!(buf.overflow());
    }

    #[test]
    fn test_streams_capped_independently() {
        let buf = RingBuffer::new(8);
        buf.write(StreamKind::Stdout, b"0123");
        buf.write(StreamKind::Stderr, b"abcd");
        assert!(!buf.overflow());
        assert_eq!(buf.len(), 8);
        let snap = buf.peek();
        assert_eq!(snap.stdout, "0123");
        assert_eq!(snap.stderr, "abcd");
    }
}
