//! Streaming exec iterator.

use crate::ops::OpGuard;
use crate::process::kill_exec_process;
use crate::types::{ExecResult, StreamChunk};
use pocketdock_engine::EngineClient;
use pocketdock_error::Result;
use pocketdock_transport::{ExecStreamReader, StreamKind};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const SIGTERM: i32 = 15;

/// Single-pass iterator over the output of a streaming exec.
///
/// Each [`next_chunk`](Self::next_chunk) call blocks until a frame
/// arrives or the stream ends; consuming the iterator runs the command
/// to completion, after which [`result`](Self::result) holds the final
/// [`ExecResult`]. Dropping the stream closes its connection; use
/// [`cancel`](Self::cancel) to also kill the remote exec.
pub struct ExecStream {
    exec_id: String,
    container_id: String,
    engine: EngineClient,
    reader: Option<ExecStreamReader>,
    cancel: CancellationToken,
    started: Instant,
    stdout: String,
    stderr: String,
    result: Option<ExecResult>,
    finished: bool,
    _guard: OpGuard,
}

impl ExecStream {
    pub(crate) fn new(
        exec_id: String,
        container_id: String,
        engine: EngineClient,
        reader: ExecStreamReader,
        cancel: CancellationToken,
        guard: OpGuard,
    ) -> Self {
        Self {
            exec_id,
            container_id,
            engine,
            reader: Some(reader),
            cancel,
            started: Instant::now(),
            stdout: String::new(),
            stderr: String::new(),
            result: None,
            finished: false,
            _guard: guard,
        }
    }

    /// The exec instance id backing this stream.
    #[must_use]
    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    /// Returns the next output chunk, or `None` once the stream ends.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; the stream is closed and finished
    /// after the first error.
    pub async fn next_chunk(&mut self) -> Result<Option<StreamChunk>> {
        if self.finished {
            return Ok(None);
        }

        let outcome = {
            let cancel = self.cancel.clone();
            let Some(reader) = self.reader.as_mut() else {
                self.finished = true;
                return Ok(None);
            };
            tokio::select! {
                () = cancel.cancelled() => None,
                frame = reader.next_frame() => Some(frame),
            }
        };

        match outcome {
            None => {
                self.teardown_cancelled().await;
                Ok(None)
            }
            Some(Ok(Some(frame))) => {
                let chunk = StreamChunk::from_frame(&frame);
                match chunk.kind {
                    StreamKind::Stdout => self.stdout.push_str(&chunk.data),
                    StreamKind::Stderr => self.stderr.push_str(&chunk.data),
                }
                Ok(Some(chunk))
            }
            Some(Ok(None)) => {
                self.finalize().await?;
                Ok(None)
            }
            Some(Err(e)) => {
                self.reader = None;
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Cancels the stream: closes the connection and attempts to kill
    /// the remote exec.
    pub async fn cancel(&mut self) {
        self.cancel.cancel();
        if !self.finished {
            self.teardown_cancelled().await;
        }
    }

    /// The final result, available once the stream has been consumed.
    #[must_use]
    pub fn result(&self) -> Option<&ExecResult> {
        self.result.as_ref()
    }

    async fn finalize(&mut self) -> Result<()> {
        self.reader = None;
        self.finished = true;
        let exit_code = self.engine.exec_exit_code(&self.exec_id).await?;
        self.result = Some(ExecResult {
            exit_code,
            stdout: std::mem::take(&mut self.stdout),
            stderr: std::mem::take(&mut self.stderr),
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            timed_out: false,
            truncated: false,
        });
        Ok(())
    }

    async fn teardown_cancelled(&mut self) {
        self.reader = None;
        self.finished = true;
        kill_exec_process(&self.engine, &self.container_id, &self.exec_id, SIGTERM).await;
        tracing::debug!(exec_id = %self.exec_id, "exec stream cancelled");
    }
}
