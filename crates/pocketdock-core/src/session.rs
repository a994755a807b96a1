//! Persistent shell session over a long-lived exec connection.
//!
//! A session keeps one `/bin/sh` running inside the container with stdin
//! attached, so commands sent through it share working directory, shell
//! variables, and environment.
//!
//! Command completion is detected with a sentinel protocol: each
//! `send_and_wait` appends `printf "\n__PD_<uuid>_<seq>_$?__\n"` after
//! the command. The background reader scans stdout line by line for the
//! sentinel, extracts the exit code the shell substituted for `$?`, and
//! resolves the matching waiter with the output captured since the
//! previous sentinel.

use crate::callbacks::OutputCallback;
use crate::logger::SessionLogHandle;
use crate::ops::OpGuard;
use crate::types::{ExecResult, StreamChunk};
use pocketdock_engine::EngineClient;
use pocketdock_error::{Error, Result};
use pocketdock_transport::{ExecStreamReader, StreamKind};
use regex::Regex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Waiter {
    tx: oneshot::Sender<ExecResult>,
    started: Instant,
}

#[derive(Default)]
struct Capture {
    stdout: String,
    stderr: String,
}

struct SessionShared {
    accumulator: Mutex<String>,
    capture: Mutex<Capture>,
    waiters: Mutex<HashMap<u64, Waiter>>,
    callbacks: Mutex<Vec<OutputCallback>>,
    closed: AtomicBool,
    log: Option<SessionLogHandle>,
}

/// Handle to a persistent shell inside a container.
///
/// Created via [`Container::session`](crate::Container::session).
///
/// Caveat: a command that consumes stdin itself (`cat` with no
/// arguments, `less`, ...) swallows the bytes carrying the next sentinel
/// before the shell can read them, so `send_and_wait` on such a command
/// runs until its timeout. There is no reliable way to detect this from
/// outside the container.
pub struct Session {
    exec_id: String,
    sentinel_uuid: String,
    seq: AtomicU64,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    _guard: OpGuard,
}

impl Session {
    pub(crate) async fn open(
        engine: EngineClient,
        container_id: &str,
        logger: Option<&crate::logger::InstanceLogger>,
        guard: OpGuard,
    ) -> Result<Arc<Self>> {
        let exec_id = engine
            .exec_create(container_id, &["/bin/sh".to_string()], true)
            .await?;
        let log = logger.map(|l| l.start_session_log(&exec_id));
        let mut reader = engine.exec_start_stream(&exec_id).await?;
        let writer = reader
            .take_writer()
            .ok_or_else(|| Error::communication("exec stream has no write half"))?;

        let sentinel_uuid = uuid::Uuid::new_v4().simple().to_string()[..16].to_string();
        let sentinel_re = Regex::new(&format!(r"__PD_{sentinel_uuid}_(\d+)_(\d+)__"))
            .map_err(|e| Error::communication(format!("sentinel pattern: {e}")))?;

        let shared = Arc::new(SessionShared {
            accumulator: Mutex::new(String::new()),
            capture: Mutex::new(Capture::default()),
            waiters: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            log,
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(read_loop(
            shared.clone(),
            reader,
            cancel.clone(),
            sentinel_re,
        ));

        tracing::debug!(%exec_id, "session opened");
        Ok(Arc::new(Self {
            exec_id,
            sentinel_uuid,
            seq: AtomicU64::new(0),
            writer: tokio::sync::Mutex::new(Some(writer)),
            shared,
            cancel,
            reader_task: Mutex::new(Some(task)),
            _guard: guard,
        }))
    }

    /// The exec instance id backing this session.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.exec_id
    }

    /// True once the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Sends a command without waiting for completion.
    ///
    /// Output, if any, appears in [`read`](Self::read) and output
    /// callbacks; there is no way to learn when the command finishes.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` after close, `SocketCommunication` if the
    /// shell's stdin cannot be written.
    pub async fn send(&self, command: &str) -> Result<()> {
        self.ensure_open()?;
        if let Some(log) = &self.shared.log {
            log.write_send(command);
        }
        self.write_stdin(format!("{command}\n")).await
    }

    /// Sends a command and waits for its completion sentinel.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` after close. A timeout is reported
    /// through `ExecResult::timed_out` with the output captured so far,
    /// not as an error.
    pub async fn send_and_wait(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        self.ensure_open()?;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let (tx, rx) = oneshot::channel();
        self.shared
            .waiters
            .lock()
            .unwrap()
            .insert(seq, Waiter { tx, started });

        // The shell substitutes $? inside the double quotes with the
        // exit code of the command just run.
        let wire = format!(
            "{command}; printf \"\\n__PD_{uuid}_{seq}_$?__\\n\"\n",
            uuid = self.sentinel_uuid
        );
        if let Some(log) = &self.shared.log {
            log.write_send(command);
        }
        if let Err(e) = self.write_stdin(wire).await {
            self.shared.waiters.lock().unwrap().remove(&seq);
            return Err(e);
        }

        let resolved = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(inner) => inner,
                Err(_) => {
                    self.shared.waiters.lock().unwrap().remove(&seq);
                    let capture = self.shared.capture.lock().unwrap();
                    return Ok(ExecResult {
                        exit_code: -1,
                        stdout: capture.stdout.clone(),
                        stderr: capture.stderr.clone(),
                        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                        timed_out: true,
                        truncated: false,
                    });
                }
            },
            None => rx.await,
        };
        // The sender is dropped without resolving only when the reader
        // shuts down underneath us.
        resolved.map_err(|_| Error::SessionClosed)
    }

    /// Drains and returns all accumulated output.
    #[must_use]
    pub fn read(&self) -> String {
        std::mem::take(&mut *self.shared.accumulator.lock().unwrap())
    }

    /// Registers a callback invoked with every output chunk.
    pub fn on_output(&self, f: impl Fn(&StreamChunk) + Send + Sync + 'static) {
        self.shared.callbacks.lock().unwrap().push(Box::new(f));
    }

    /// Closes the session, terminating the shell exec.
    ///
    /// Does not stop or remove the container. Idempotent; all further
    /// operations fail with `SessionClosed`.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for teardown
    /// reporting.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(log) = &self.shared.log {
            log.close();
        }
        self.cancel.cancel();
        {
            let mut writer = self.writer.lock().await;
            if let Some(mut w) = writer.take() {
                let _ = w.shutdown().await;
            }
        }
        let task = self.reader_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        tracing::debug!(exec_id = %self.exec_id, "session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    async fn write_stdin(&self, data: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::SessionClosed)?;
        writer
            .write_all(data.as_bytes())
            .await
            .map_err(|e| Error::communication(format!("failed to write to session stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::communication(format!("failed to flush session stdin: {e}")))
    }
}

async fn read_loop(
    shared: Arc<SessionShared>,
    mut reader: ExecStreamReader,
    cancel: CancellationToken,
    sentinel_re: Regex,
) {
    let mut line_buf = String::new();
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = reader.next_frame() => frame,
        };
        match frame {
            Ok(Some(frame)) => {
                let text = String::from_utf8_lossy(&frame.data);
                match frame.kind {
                    StreamKind::Stdout => {
                        line_buf.push_str(&text);
                        while let Some(pos) = line_buf.find('\n') {
                            let line: String = line_buf.drain(..=pos).collect();
                            if !handle_sentinel(&shared, &sentinel_re, line.trim_end()) {
                                emit(&shared, StreamKind::Stdout, &line);
                            }
                        }
                    }
                    StreamKind::Stderr => emit(&shared, StreamKind::Stderr, &text),
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "session stream ended with error");
                break;
            }
        }
    }
    if !line_buf.is_empty() && !handle_sentinel(&shared, &sentinel_re, line_buf.trim_end()) {
        emit(&shared, StreamKind::Stdout, &line_buf);
    }

    // The shell is gone; fail the session closed and resolve anyone
    // still waiting. The earliest waiter gets the captured output.
    shared.closed.store(true, Ordering::SeqCst);
    let mut waiters: Vec<(u64, Waiter)> = shared.waiters.lock().unwrap().drain().collect();
    waiters.sort_by_key(|(seq, _)| *seq);
    let mut capture = {
        let mut cap = shared.capture.lock().unwrap();
        Capture {
            stdout: std::mem::take(&mut cap.stdout),
            stderr: std::mem::take(&mut cap.stderr),
        }
    };
    for (_, waiter) in waiters {
        let _ = waiter.tx.send(ExecResult {
            exit_code: -1,
            stdout: std::mem::take(&mut capture.stdout),
            stderr: std::mem::take(&mut capture.stderr),
            duration_ms: waiter.started.elapsed().as_secs_f64() * 1000.0,
            timed_out: false,
            truncated: false,
        });
    }
}

/// Consumes *line* if it carries this session's sentinel.
///
/// Any line with the session uuid is swallowed (late sentinels from
/// timed-out commands must not leak into output); the waiter matching
/// the sequence number, if still registered, resolves with the output
/// captured since the previous sentinel.
fn handle_sentinel(shared: &SessionShared, re: &Regex, line: &str) -> bool {
    let Some(caps) = re.captures(line) else {
        return false;
    };
    let seq: u64 = caps[1].parse().unwrap_or(0);
    let exit_code: i64 = caps[2].parse().unwrap_or(-1);

    let (stdout, stderr) = {
        let mut capture = shared.capture.lock().unwrap();
        (
            std::mem::take(&mut capture.stdout),
            std::mem::take(&mut capture.stderr),
        )
    };
    if let Some(waiter) = shared.waiters.lock().unwrap().remove(&seq) {
        let _ = waiter.tx.send(ExecResult {
            exit_code,
            stdout,
            stderr,
            duration_ms: waiter.started.elapsed().as_secs_f64() * 1000.0,
            timed_out: false,
            truncated: false,
        });
    }
    true
}

fn emit(shared: &SessionShared, kind: StreamKind, text: &str) {
    if let Some(log) = &shared.log {
        log.write_recv(text);
    }
    shared.accumulator.lock().unwrap().push_str(text);
    {
        let mut capture = shared.capture.lock().unwrap();
        match kind {
            StreamKind::Stdout => capture.stdout.push_str(text),
            StreamKind::Stderr => capture.stderr.push_str(text),
        }
    }
    let chunk = StreamChunk {
        kind,
        data: text.to_string(),
    };
    for callback in shared.callbacks.lock().unwrap().iter() {
        if catch_unwind(AssertUnwindSafe(|| callback(&chunk))).is_err() {
            tracing::debug!("session output callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Arc<SessionShared> {
        Arc::new(SessionShared {
            accumulator: Mutex::new(String::new()),
            capture: Mutex::new(Capture::default()),
            waiters: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            log: None,
        })
    }

    fn sentinel_re(uuid: &str) -> Regex {
        Regex::new(&format!(r"__PD_{uuid}_(\d+)_(\d+)__")).unwrap()
    }

    fn register_waiter(shared: &SessionShared, seq: u64) -> oneshot::Receiver<ExecResult> {
        let (tx, rx) = oneshot::channel();
        shared.waiters.lock().unwrap().insert(
            seq,
            Waiter {
                tx,
                started: Instant::now(),
            },
        );
        rx
    }

    #[test]
    fn test_sentinel_resolves_matching_waiter() {
        let shared = shared();
        let re = sentinel_re("aabbccddeeff0011");
        let mut rx = register_waiter(&shared, 1);

        emit(&shared, StreamKind::Stdout, "/tmp\n");
        assert!(handle_sentinel(&shared, &re, "__PD_aabbccddeeff0011_1_0__"));

        let result = rx.try_recv().unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "/tmp\n");
        assert!(result.ok());
    }

    #[test]
    fn test_sentinel_extracts_nonzero_exit_code() {
        let shared = shared();
        let re = sentinel_re("aabbccddeeff0011");
        let mut rx = register_waiter(&shared, 3);
        assert!(handle_sentinel(&shared, &re, "__PD_aabbccddeeff0011_3_127__"));
        assert_eq!(rx.try_recv().unwrap().exit_code, 127);
    }

    #[test]
    fn test_foreign_uuid_is_not_a_sentinel() {
        let shared = shared();
        let re = sentinel_re("aabbccddeeff0011");
        // Output that contains the literal sentinel prefix but a
        // different uuid must pass through as ordinary output.
        assert!(!handle_sentinel(
            &shared,
            &re,
            "__PD_0000000000000000_1_0__"
        ));
        assert!(!handle_sentinel(&shared, &re, "echo __PD_ is not magic"));
    }

    #[test]
    fn test_sentinel_embedded_in_line_still_matches() {
        let shared = shared();
        let re = sentinel_re("aabbccddeeff0011");
        let mut rx = register_waiter(&shared, 2);
        assert!(handle_sentinel(
            &shared,
            &re,
            "noise__PD_aabbccddeeff0011_2_1__noise"
        ));
        assert_eq!(rx.try_recv().unwrap().exit_code, 1);
    }

    #[test]
    fn test_late_sentinel_without_waiter_is_swallowed() {
        let shared = shared();
        let re = sentinel_re("aabbccddeeff0011");
        emit(&shared, StreamKind::Stdout, "stale\n");
        // Consumed, and the capture buffer is cleared so the stale
        // output cannot leak into the next command's result.
        assert!(handle_sentinel(&shared, &re, "__PD_aabbccddeeff0011_9_0__"));
        assert!(shared.capture.lock().unwrap().stdout.is_empty());
    }

    #[test]
    fn test_capture_separates_streams() {
        let shared = shared();
        let re = sentinel_re("aabbccddeeff0011");
        let mut rx = register_waiter(&shared, 1);
        emit(&shared, StreamKind::Stdout, "out\n");
        emit(&shared, StreamKind::Stderr, "err\n");
        handle_sentinel(&shared, &re, "__PD_aabbccddeeff0011_1_0__");
        let result = rx.try_recv().unwrap();
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[test]
    fn test_waiters_resolve_in_emission_order() {
        let shared = shared();
        let re = sentinel_re("aabbccddeeff0011");
        let mut rx1 = register_waiter(&shared, 1);
        let mut rx2 = register_waiter(&shared, 2);

        emit(&shared, StreamKind::Stdout, "first\n");
        handle_sentinel(&shared, &re, "__PD_aabbccddeeff0011_1_0__");
        emit(&shared, StreamKind::Stdout, "second\n");
        handle_sentinel(&shared, &re, "__PD_aabbccddeeff0011_2_0__");

        assert_eq!(rx1.try_recv().unwrap().stdout, "first\n");
        assert_eq!(rx2.try_recv().unwrap().stdout, "second\n");
    }

    #[test]
    fn test_accumulator_collects_all_output() {
        let shared = shared();
        emit(&shared, StreamKind::Stdout, "a");
        emit(&shared, StreamKind::Stderr, "b");
        assert_eq!(*shared.accumulator.lock().unwrap(), "ab");
    }
}
