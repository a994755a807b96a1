//! Detached process handle.

use crate::buffer::{BufferSnapshot, RingBuffer};
use crate::callbacks::CallbackRegistry;
use crate::logger::DetachLogHandle;
use crate::ops::OpGuard;
use crate::types::{ExecResult, StreamChunk};
use pocketdock_engine::EngineClient;
use pocketdock_error::{Error, Result};
use pocketdock_transport::ExecStreamReader;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct ProcState {
    running: bool,
    result: Option<ExecResult>,
}

/// Handle to a background exec.
///
/// A reader task accumulates output into a ring buffer and fans it out
/// to the container's callbacks; on EOF it latches the final
/// [`ExecResult`] and fires exit callbacks exactly once.
pub struct DetachedProcess {
    exec_id: String,
    container_id: String,
    engine: EngineClient,
    buffer: RingBuffer,
    state: Mutex<ProcState>,
    done: watch::Sender<bool>,
    cancel: CancellationToken,
    started: Instant,
}

impl DetachedProcess {
    pub(crate) fn spawn(
        engine: EngineClient,
        container_id: String,
        exec_id: String,
        reader: ExecStreamReader,
        callbacks: Arc<CallbackRegistry>,
        capacity: usize,
        log: Option<DetachLogHandle>,
        guard: OpGuard,
    ) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        let process = Arc::new(Self {
            exec_id,
            container_id,
            engine,
            buffer: RingBuffer::new(capacity),
            state: Mutex::new(ProcState {
                running: true,
                result: None,
            }),
            done,
            cancel: CancellationToken::new(),
            started: Instant::now(),
        });
        tokio::spawn(read_loop(process.clone(), reader, callbacks, log, guard));
        process
    }

    /// The exec instance id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.exec_id
    }

    /// True while the background process is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Drains and returns all buffered output.
    #[must_use]
    pub fn read(&self) -> BufferSnapshot {
        self.buffer.read()
    }

    /// Returns buffered output without draining.
    #[must_use]
    pub fn peek(&self) -> BufferSnapshot {
        self.buffer.peek()
    }

    /// Current bytes held in the ring buffer.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// True if buffered output was ever evicted for capacity.
    #[must_use]
    pub fn buffer_overflow(&self) -> bool {
        self.buffer.overflow()
    }

    /// The latched result, once the process has exited.
    #[must_use]
    pub fn result(&self) -> Option<ExecResult> {
        self.state.lock().unwrap().result.clone()
    }

    /// Sends a signal (default callers use SIGTERM) to the exec's root
    /// process via a side-channel exec.
    ///
    /// # Errors
    ///
    /// Engine errors from the signal exec propagate; a process that has
    /// already exited is not an error.
    pub async fn kill(&self, signal: i32) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        kill_exec_process(&self.engine, &self.container_id, &self.exec_id, signal).await;
        Ok(())
    }

    /// Blocks until the process exits, returning the final result.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the process is still running when the timer
    /// expires; the process itself is unaffected.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<ExecResult> {
        let mut rx = self.done.subscribe();
        let wait_done = async move {
            loop {
                if *rx.borrow() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait_done).await.map_err(|_| {
                Error::Timeout(format!(
                    "process {} still running after {limit:?}",
                    self.exec_id
                ))
            })?,
            None => wait_done.await,
        }

        let state = self.state.lock().unwrap();
        Ok(state.result.clone().unwrap_or_else(|| ExecResult {
            exit_code: -1,
            ..Default::default()
        }))
    }

    /// Aborts the reader task during handle shutdown.
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
    }
}

async fn read_loop(
    process: Arc<DetachedProcess>,
    mut reader: ExecStreamReader,
    callbacks: Arc<CallbackRegistry>,
    log: Option<DetachLogHandle>,
    guard: OpGuard,
) {
    loop {
        let frame = tokio::select! {
            () = process.cancel.cancelled() => break,
            frame = reader.next_frame() => frame,
        };
        match frame {
            Ok(Some(frame)) => {
                process.buffer.write(frame.kind, &frame.data);
                let chunk = StreamChunk::from_frame(&frame);
                if let Some(log) = &log {
                    log.write_output(frame.kind.as_str(), &chunk.data);
                }
                callbacks.dispatch_chunk(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(exec_id = %process.exec_id, error = %e, "detached stream ended with error");
                break;
            }
        }
    }
    drop(reader);

    let exit_code = match process.engine.exec_exit_code(&process.exec_id).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(exec_id = %process.exec_id, error = %e, "exec inspect after EOF failed");
            -1
        }
    };
    let snapshot = process.buffer.peek();
    let duration_ms = process.started.elapsed().as_secs_f64() * 1000.0;
    let result = ExecResult {
        exit_code,
        stdout: snapshot.stdout,
        stderr: snapshot.stderr,
        duration_ms,
        timed_out: false,
        truncated: process.buffer.overflow(),
    };
    {
        let mut state = process.state.lock().unwrap();
        state.running = false;
        state.result = Some(result);
    }
    // send_replace, not send: it must latch even when nobody has
    // subscribed yet, or a later wait() would block forever.
    process.done.send_replace(true);
    if let Some(log) = log {
        log.close(exit_code, duration_ms);
    }
    callbacks.dispatch_exit(exit_code);
    drop(guard);
}

/// Best-effort kill of an exec's root process through a side-channel
/// exec of `kill` inside the container.
///
/// Failures are logged and swallowed; the target may already have
/// exited on its own.
pub(crate) async fn kill_exec_process(
    engine: &EngineClient,
    container_id: &str,
    exec_id: &str,
    signal: i32,
) {
    let pid = match engine.exec_inspect(exec_id).await {
        Ok(inspect) if inspect.pid > 0 => inspect.pid,
        Ok(_) => return,
        Err(e) => {
            tracing::debug!(exec_id, error = %e, "exec inspect for kill failed");
            return;
        }
    };

    let cmd = vec![
        "kill".to_string(),
        format!("-{signal}"),
        pid.to_string(),
    ];
    let outcome = async {
        let kill_id = engine.exec_create(container_id, &cmd, false).await?;
        let mut reader = engine.exec_start_stream(&kill_id).await?;
        while reader.next_frame().await?.is_some() {}
        Ok::<_, Error>(())
    }
    .await;
    if let Err(e) = outcome {
        tracing::debug!(exec_id, pid, error = %e, "side-channel kill failed");
    }
}
