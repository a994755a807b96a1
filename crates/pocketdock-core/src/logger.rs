//! Per-instance logging to the project's instance directory.
//!
//! Fire-and-forget: everything is synchronous filesystem writes, and a
//! failed write is logged at debug and otherwise ignored. Command
//! history accumulates as JSONL in `logs/history.jsonl`; individual runs
//! and long-lived sessions get their own log files.

use crate::types::ExecResult;
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Logger bound to one instance directory.
#[derive(Debug)]
pub struct InstanceLogger {
    logs_dir: PathBuf,
    history_path: PathBuf,
    enabled: bool,
}

impl InstanceLogger {
    /// Creates a logger writing under `<instance_dir>/logs/`.
    #[must_use]
    pub fn new(instance_dir: &Path, enabled: bool) -> Self {
        let logs_dir = instance_dir.join("logs");
        Self {
            history_path: logs_dir.join("history.jsonl"),
            logs_dir,
            enabled,
        }
    }

    /// Whether logging is active.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Records a completed blocking run: one log file plus a history entry.
    pub fn log_run(&self, command: &str, result: &ExecResult, started_at: DateTime<Utc>) {
        if !self.enabled {
            return;
        }
        let log_path = self
            .logs_dir
            .join(format!("run-{}.log", safe_timestamp(started_at)));

        let mut text = format!(
            "# command: {command}\n# exit_code: {}\n# duration_ms: {:.1}\n# timed_out: {}\n\n",
            result.exit_code, result.duration_ms, result.timed_out
        );
        if !result.stdout.is_empty() {
            text.push_str("--- stdout ---\n");
            text.push_str(&result.stdout);
        }
        if !result.stderr.is_empty() {
            text.push_str("--- stderr ---\n");
            text.push_str(&result.stderr);
        }
        if let Err(e) = std::fs::write(&log_path, text) {
            tracing::debug!(path = %log_path.display(), error = %e, "run log write failed");
        }

        self.append_history(&serde_json::json!({
            "type": "run",
            "command": command,
            "exit_code": result.exit_code,
            "duration_ms": (result.duration_ms * 10.0).round() / 10.0,
            "timed_out": result.timed_out,
            "timestamp": started_at.to_rfc3339(),
        }));
    }

    /// Opens a session log file for incremental writes.
    #[must_use]
    pub fn start_session_log(&self, session_id: &str) -> SessionLogHandle {
        if !self.enabled {
            return SessionLogHandle::disabled();
        }
        let path = self
            .logs_dir
            .join(format!("session-{}.log", safe_timestamp(Utc::now())));
        let handle = open_append(&path);
        if let Some(file) = &handle {
            let _ = writeln!(&mut file.lock().unwrap(), "# session_id: {session_id}\n");
        }
        self.append_history(&serde_json::json!({
            "type": "session",
            "session_id": session_id,
            "timestamp": Utc::now().to_rfc3339(),
        }));
        SessionLogHandle { file: handle }
    }

    /// Opens a detached-process log file for incremental writes.
    #[must_use]
    pub fn start_detach_log(&self, command: &str) -> DetachLogHandle {
        if !self.enabled {
            return DetachLogHandle::disabled();
        }
        let path = self
            .logs_dir
            .join(format!("detach-{}.log", safe_timestamp(Utc::now())));
        let handle = open_append(&path);
        if let Some(file) = &handle {
            let _ = writeln!(&mut file.lock().unwrap(), "# command: {command}\n");
        }
        self.append_history(&serde_json::json!({
            "type": "detach",
            "command": command,
            "timestamp": Utc::now().to_rfc3339(),
        }));
        DetachLogHandle { file: handle }
    }

    /// Appends one entry to `history.jsonl`.
    pub fn append_history(&self, entry: &serde_json::Value) {
        if !self.enabled {
            return;
        }
        let line = format!("{entry}\n");
        let write = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = write {
            tracing::debug!(path = %self.history_path.display(), error = %e, "history append failed");
        }
    }
}

fn open_append(path: &Path) -> Option<Mutex<File>> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "log open failed");
            None
        }
    }
}

/// Incremental writer for a session log file.
#[derive(Debug)]
pub struct SessionLogHandle {
    file: Option<Mutex<File>>,
}

impl SessionLogHandle {
    fn disabled() -> Self {
        Self { file: None }
    }

    /// Logs a command sent to the session.
    pub fn write_send(&self, command: &str) {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap();
            let _ = writeln!(&mut *file, "[{}] >>> {command}", Utc::now().to_rfc3339());
            let _ = file.flush();
        }
    }

    /// Logs output received from the session.
    pub fn write_recv(&self, data: &str) {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap();
            let _ = write!(&mut *file, "{data}");
            let _ = file.flush();
        }
    }

    /// Closes the log file.
    pub fn close(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().unwrap().flush();
        }
    }
}

/// Incremental writer for a detached-process log file.
#[derive(Debug)]
pub struct DetachLogHandle {
    file: Option<Mutex<File>>,
}

impl DetachLogHandle {
    fn disabled() -> Self {
        Self { file: None }
    }

    /// Logs one output chunk.
    pub fn write_output(&self, stream: &str, data: &str) {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap();
            let _ = write!(
                &mut *file,
                "[{}] [{stream}] {data}",
                Utc::now().to_rfc3339()
            );
            let _ = file.flush();
        }
    }

    /// Finalizes the log file with exit information.
    pub fn close(&self, exit_code: i64, duration_ms: f64) {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap();
            let _ = write!(
                &mut *file,
                "\n# exit_code: {exit_code}\n# duration_ms: {duration_ms:.1}\n"
            );
            let _ = file.flush();
        }
    }
}

/// Formats a timestamp so it is safe inside a filename.
fn safe_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339().replace(':', "-").replace('+', "p")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exec_result() -> ExecResult {
        ExecResult {
            exit_code: 0,
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            duration_ms: 12.34,
            timed_out: false,
            truncated: false,
        }
    }

    #[test]
    fn test_log_run_writes_file_and_history() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        let logger = InstanceLogger::new(dir.path(), true);

        logger.log_run("echo hello", &exec_result(), Utc::now());

        let history = std::fs::read_to_string(dir.path().join("logs/history.jsonl")).unwrap();
        let entry: serde_json::Value = serde_json::from_str(history.lines().next().unwrap()).unwrap();
        assert_eq!(entry["type"], "run");
        assert_eq!(entry["command"], "echo hello");
        assert_eq!(entry["exit_code"], 0);

        let run_log = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("run-"))
            .expect("run log file");
        let content = std::fs::read_to_string(run_log.path()).unwrap();
        assert!(content.contains("# command: echo hello"));
        assert!(content.contains("--- stdout ---"));
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        let logger = InstanceLogger::new(dir.path(), false);
        logger.log_run("echo hi", &exec_result(), Utc::now());
        assert!(!dir.path().join("logs/history.jsonl").exists());
    }

    #[test]
    fn test_session_log_handle_appends() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        let logger = InstanceLogger::new(dir.path(), true);

        let handle = logger.start_session_log("exec123");
        handle.write_send("pwd");
        handle.write_recv("/tmp\n");
        handle.close();

        let session_log = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("session-"))
            .expect("session log file");
        let content = std::fs::read_to_string(session_log.path()).unwrap();
        assert!(content.contains("# session_id: exec123"));
        assert!(content.contains(">>> pwd"));
        assert!(content.contains("/tmp"));
    }

    #[test]
    fn test_missing_logs_dir_is_tolerated() {
        let dir = TempDir::new().unwrap();
        // logs/ deliberately absent: writes fail silently.
        let logger = InstanceLogger::new(&dir.path().join("nope"), true);
        logger.log_run("echo hi", &exec_result(), Utc::now());
        let handle = logger.start_detach_log("sleep 1");
        handle.write_output("stdout", "x");
        handle.close(0, 1.0);
    }
}
