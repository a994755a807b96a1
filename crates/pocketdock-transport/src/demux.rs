//! Exec stream demultiplexing.
//!
//! The engine's exec attach endpoint returns a multiplexed byte stream.
//! Each frame has an 8-byte header: byte 0 is the stream tag (0 stdin,
//! 1 stdout, 2 stderr), bytes 1-3 are reserved zero padding, bytes 4-7
//! a big-endian u32 payload length. The payload follows immediately.
//!
//! Podman returns the stream unframed when the exec was not multiplexed;
//! this is detected from the first bytes and the whole stream is then
//! treated as stdout.

use bytes::{Bytes, BytesMut};
use pocketdock_error::{Error, Result};

/// Size of a frame header.
pub const HEADER_SIZE: usize = 8;

/// Upper bound on a plausible frame payload. A decoded length beyond
/// this means the bytes are not frame headers.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const TAG_STDIN: u8 = 0;
const TAG_STDERR: u8 = 2;

/// Which output stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamKind {
    /// Returns the conventional lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame's worth of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stream the payload belongs to.
    pub kind: StreamKind,
    /// Payload bytes.
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Mode {
    /// Not enough bytes seen to choose yet.
    #[default]
    Undecided,
    /// Docker frame protocol.
    Framed,
    /// Unframed Podman stream; everything is stdout.
    Raw,
}

/// Incremental frame parser.
///
/// Feed raw (already unchunked) bytes in arbitrary slices; complete
/// frames come out. A single feed may contain many frames, and one frame
/// may span many feeds — the decoder owns the reassembly buffer. The
/// framed-vs-raw decision is made once, on the first bytes of the
/// stream, and latched.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    mode: Mode,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends stream bytes to the reassembly buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extracts the next complete frame, if any.
    ///
    /// Zero-length and stdin frames are consumed silently.
    ///
    /// # Errors
    ///
    /// Returns `SocketCommunication` if a frame header mid-stream is
    /// invalid (the framed/raw decision never changes after the first
    /// frame).
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.mode() {
                Mode::Undecided => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    if self.buf.len() < HEADER_SIZE {
                        // A prefix that already violates the header shape
                        // settles the question early; otherwise wait.
                        if plausible_header_prefix(&self.buf) {
                            return Ok(None);
                        }
                        self.set_mode(Mode::Raw);
                        continue;
                    }
                    if plausible_header(&self.buf[..HEADER_SIZE]) {
                        self.set_mode(Mode::Framed);
                    } else {
                        self.set_mode(Mode::Raw);
                    }
                }
                Mode::Raw => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let data = self.buf.split().freeze();
                    return Ok(Some(Frame {
                        kind: StreamKind::Stdout,
                        data,
                    }));
                }
                Mode::Framed => {
                    if self.buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }
                    let tag = self.buf[0];
                    let len = u32::from_be_bytes([
                        self.buf[4],
                        self.buf[5],
                        self.buf[6],
                        self.buf[7],
                    ]) as usize;
                    if tag > TAG_STDERR || len > MAX_FRAME_LEN {
                        return Err(Error::communication(format!(
                            "invalid stream frame header (tag {tag}, len {len})"
                        )));
                    }
                    if self.buf.len() < HEADER_SIZE + len {
                        return Ok(None);
                    }
                    let _ = self.buf.split_to(HEADER_SIZE);
                    let data = self.buf.split_to(len).freeze();
                    if len == 0 || tag == TAG_STDIN {
                        continue;
                    }
                    let kind = if tag == TAG_STDERR {
                        StreamKind::Stderr
                    } else {
                        StreamKind::Stdout
                    };
                    return Ok(Some(Frame { kind, data }));
                }
            }
        }
    }

    /// Flushes the decoder at end of stream.
    ///
    /// In raw (or still-undecided) mode any residue becomes one final
    /// stdout frame. In framed mode leftover bytes mean the stream was
    /// cut inside a frame.
    ///
    /// # Errors
    ///
    /// Returns `SocketCommunication` if a partial frame remains.
    pub fn finish(&mut self) -> Result<Option<Frame>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match self.mode() {
            Mode::Framed => Err(Error::communication(format!(
                "stream ended inside a frame ({} trailing bytes)",
                self.buf.len()
            ))),
            Mode::Undecided | Mode::Raw => {
                self.set_mode(Mode::Raw);
                let data = self.buf.split().freeze();
                Ok(Some(Frame {
                    kind: StreamKind::Stdout,
                    data,
                }))
            }
        }
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
}

/// Full 8-byte header check: valid tag, zero padding, sane length.
fn plausible_header(header: &[u8]) -> bool {
    let tag_ok = header[0] <= TAG_STDERR;
    let padding_ok = header[1] == 0 && header[2] == 0 && header[3] == 0;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    tag_ok && padding_ok && len <= MAX_FRAME_LEN
}

/// Checks whether a short prefix could still grow into a valid header.
fn plausible_header_prefix(prefix: &[u8]) -> bool {
    if prefix.first().is_some_and(|&tag| tag > TAG_STDERR) {
        return false;
    }
    prefix.iter().skip(1).take(3).all(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn collect(decoder: &mut FrameDecoder) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(f) = decoder.next_frame().unwrap() {
            frames.push(f);
        }
        frames
    }

    #[test]
    fn test_single_stdout_frame() {
        let mut d = FrameDecoder::new();
        d.feed(&frame_bytes(1, b"hello\n"));
        let frames = collect(&mut d);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, StreamKind::Stdout);
        assert_eq!(&frames[0].data[..], b"hello\n");
        assert!(d.finish().unwrap().is_none());
    }

    #[test]
    fn test_interleaved_stdout_stderr() {
        let mut d = FrameDecoder::new();
        d.feed(&frame_bytes(1, b"out"));
        d.feed(&frame_bytes(2, b"err"));
        d.feed(&frame_bytes(1, b"out2"));
        let frames = collect(&mut d);
        let kinds: Vec<_> = frames.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![StreamKind::Stdout, StreamKind::Stderr, StreamKind::Stdout]
        );
    }

    #[test]
    fn test_frame_split_across_feeds() {
        // One frame delivered a byte at a time must come out identical.
        let bytes = frame_bytes(1, b"split across many chunks");
        let mut d = FrameDecoder::new();
        let mut frames = Vec::new();
        for b in &bytes {
            d.feed(std::slice::from_ref(b));
            while let Some(f) = d.next_frame().unwrap() {
                frames.push(f);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].data[..], b"split across many chunks");
    }

    #[test]
    fn test_many_frames_in_one_feed() {
        let mut bytes = frame_bytes(1, b"a");
        bytes.extend_from_slice(&frame_bytes(2, b"b"));
        bytes.extend_from_slice(&frame_bytes(1, b"c"));
        let mut d = FrameDecoder::new();
        d.feed(&bytes);
        assert_eq!(collect(&mut d).len(), 3);
    }

    #[test]
    fn test_split_point_inside_header() {
        let bytes = frame_bytes(2, b"payload");
        let mut d = FrameDecoder::new();
        d.feed(&bytes[..5]);
        assert!(d.next_frame().unwrap().is_none());
        d.feed(&bytes[5..]);
        let f = d.next_frame().unwrap().unwrap();
        assert_eq!(f.kind, StreamKind::Stderr);
        assert_eq!(&f.data[..], b"payload");
    }

    #[test]
    fn test_raw_fallback() {
        // Text output: first byte is not a valid stream tag.
        let mut d = FrameDecoder::new();
        d.feed(b"plain text output\n");
        let frames = collect(&mut d);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, StreamKind::Stdout);
        assert_eq!(&frames[0].data[..], b"plain text output\n");
    }

    #[test]
    fn test_raw_fallback_short_residue_at_eof() {
        // Fewer than 8 bytes total that could have been a header prefix.
        let mut d = FrameDecoder::new();
        d.feed(&[1, 0, 0]);
        assert!(d.next_frame().unwrap().is_none());
        let f = d.finish().unwrap().unwrap();
        assert_eq!(&f.data[..], &[1, 0, 0]);
    }

    #[test]
    fn test_raw_mode_latched() {
        // Once raw, later bytes that happen to look like headers stay raw.
        let mut d = FrameDecoder::new();
        d.feed(b"x");
        let _ = collect(&mut d);
        d.feed(&frame_bytes(1, b"not a frame"));
        let frames = collect(&mut d);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, StreamKind::Stdout);
        assert_eq!(frames[0].data.len(), 8 + "not a frame".len());
    }

    #[test]
    fn test_stdin_and_empty_frames_skipped() {
        let mut bytes = frame_bytes(0, b"stdin echo");
        bytes.extend_from_slice(&frame_bytes(1, b""));
        bytes.extend_from_slice(&frame_bytes(1, b"real"));
        let mut d = FrameDecoder::new();
        d.feed(&bytes);
        let frames = collect(&mut d);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].data[..], b"real");
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let bytes = frame_bytes(1, b"cut off");
        let mut d = FrameDecoder::new();
        d.feed(&bytes[..bytes.len() - 3]);
        assert!(d.next_frame().unwrap().is_none());
        assert!(d.finish().is_err());
    }

    #[test]
    fn test_implausible_length_is_rejected_as_raw() {
        // Tag byte valid but enormous length: not a frame stream.
        let mut bytes = vec![1u8, 0, 0, 0];
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(b"rest");
        let mut d = FrameDecoder::new();
        d.feed(&bytes);
        let frames = collect(&mut d);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, StreamKind::Stdout);
    }
}
