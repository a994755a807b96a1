//! Configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, install-level
//! `~/.pocketdock/pocketdock.yaml`, project-level
//! `.pocketdock/pocketdock.yaml`, then `POCKETDOCK_*` environment
//! variables. Unknown keys are ignored. The logging keys may appear at
//! the top level or nested under a `logging:` section (the form the
//! default template writes).

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "pocketdock.yaml";

/// Resolved pocketdock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketDockConfig {
    /// Project name (empty outside a project).
    pub project_name: String,
    /// Profile used when `create` is called without image or profile.
    pub default_profile: String,
    /// Whether new containers persist by default.
    pub default_persist: bool,
    /// Whether runs and sessions are logged to the instance directory.
    pub auto_log: bool,
    /// Per-log-file size cap (size string, e.g. `10MB`).
    pub max_log_size: String,
    /// Log files kept per instance.
    pub max_logs_per_instance: u32,
    /// Days before logs are eligible for cleanup.
    pub retention_days: u32,
    /// Engine socket override.
    pub socket: Option<String>,
    /// Log level directive (debug/info/warning/error).
    pub log_level: String,
    /// Nested `logging:` section; folded into the flat keys after load.
    #[serde(skip_serializing)]
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    auto_log: Option<bool>,
    max_log_size: Option<String>,
    max_logs_per_instance: Option<u32>,
    retention_days: Option<u32>,
}

impl Default for PocketDockConfig {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            default_profile: "minimal".to_string(),
            default_persist: false,
            auto_log: true,
            max_log_size: "10MB".to_string(),
            max_logs_per_instance: 100,
            retention_days: 30,
            socket: None,
            log_level: "info".to_string(),
            logging: None,
        }
    }
}

impl PocketDockConfig {
    fn fold_logging_section(mut self) -> Self {
        if let Some(section) = self.logging.take() {
            if let Some(auto_log) = section.auto_log {
                self.auto_log = auto_log;
            }
            if let Some(max_log_size) = section.max_log_size {
                self.max_log_size = max_log_size;
            }
            if let Some(max_logs) = section.max_logs_per_instance {
                self.max_logs_per_instance = max_logs;
            }
            if let Some(retention) = section.retention_days {
                self.retention_days = retention;
            }
        }
        self
    }
}

/// Loads configuration, overlaying the project config (when a root is
/// given) on the install-level config on the defaults.
///
/// Malformed files degrade to the layers below them rather than failing
/// the caller.
#[must_use]
pub fn load_config(project_root: Option<&Path>) -> PocketDockConfig {
    let mut figment = Figment::from(Serialized::defaults(PocketDockConfig::default()));

    if let Some(install) = install_config_path() {
        if install.is_file() {
            figment = figment.merge(Yaml::file(install));
        }
    }
    if let Some(root) = project_root {
        let project = root.join(".pocketdock").join(CONFIG_FILENAME);
        if project.is_file() {
            figment = figment.merge(Yaml::file(project));
        }
    }
    figment = figment.merge(Env::prefixed("POCKETDOCK_"));

    match figment.extract::<PocketDockConfig>() {
        Ok(config) => config.fold_logging_section(),
        Err(e) => {
            tracing::debug!(error = %e, "config load failed, using defaults");
            PocketDockConfig::default()
        }
    }
}

fn install_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".pocketdock").join(CONFIG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_project_config(dir: &TempDir, content: &str) {
        let pd = dir.path().join(".pocketdock");
        std::fs::create_dir_all(&pd).unwrap();
        std::fs::write(pd.join("pocketdock.yaml"), content).unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = PocketDockConfig::default();
        assert_eq!(config.default_profile, "minimal");
        assert!(!config.default_persist);
        assert!(config.auto_log);
        assert_eq!(config.max_log_size, "10MB");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_project_overlay_with_nested_logging() {
        let dir = TempDir::new().unwrap();
        write_project_config(
            &dir,
            "project_name: demo\ndefault_profile: dev\nlogging:\n  auto_log: false\n  retention_days: 7\n",
        );

        let config = load_config(Some(dir.path()));
        assert_eq!(config.project_name, "demo");
        assert_eq!(config.default_profile, "dev");
        assert!(!config.auto_log);
        assert_eq!(config.retention_days, 7);
        // Untouched keys keep their defaults.
        assert_eq!(config.max_logs_per_instance, 100);
    }

    #[test]
    fn test_flat_logging_keys_also_recognized() {
        let dir = TempDir::new().unwrap();
        write_project_config(&dir, "auto_log: false\nmax_log_size: \"2MB\"\n");
        let config = load_config(Some(dir.path()));
        assert!(!config.auto_log);
        assert_eq!(config.max_log_size, "2MB");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let dir = TempDir::new().unwrap();
        write_project_config(&dir, "project_name: demo\nfuture_knob: 42\n");
        let config = load_config(Some(dir.path()));
        assert_eq!(config.project_name, "demo");
    }

    #[test]
    fn test_malformed_file_degrades_to_defaults() {
        let dir = TempDir::new().unwrap();
        write_project_config(&dir, ": not yaml [");
        let config = load_config(Some(dir.path()));
        assert_eq!(config.default_profile, "minimal");
    }
}
