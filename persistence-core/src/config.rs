// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Environment-variable-driven runtime configuration, layered over compiled-in defaults.

use std::path::PathBuf;
use std::time::Duration;

const ENV_LOG_LEVEL: &str = "PERSISTENCE_LOG_LEVEL";
const ENV_LOG_METHOD: &str = "PERSISTENCE_LOG_METHOD";
const ENV_SUPERVISOR_SOCKET: &str = "PERSISTENCE_SUPERVISOR_SOCKET";
const ENV_HANDLE_TABLE_CAPACITY: &str = "PERSISTENCE_HANDLE_TABLE_CAPACITY";
const ENV_SHUTDOWN_WRITEBACK_BUDGET_MS: &str = "PERSISTENCE_SHUTDOWN_WRITEBACK_BUDGET_MS";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SUPERVISOR_SOCKET: &str = "/run/persistence/supervisor.sock";
const DEFAULT_HANDLE_TABLE_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_WRITEBACK_BUDGET: Duration = Duration::from_millis(3000);

/// Where log output goes. Mirrors the three destinations the original logging macro supported.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogMethod {
    #[default]
    Stderr,
    Stdout,
    File(PathBuf),
}

impl std::fmt::Display for LogMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogMethod::Stderr => write!(f, "stderr"),
            LogMethod::Stdout => write!(f, "stdout"),
            LogMethod::File(path) => write!(f, "file://{}", path.to_string_lossy()),
        }
    }
}

/// Process-wide configuration resolved once, at `init()`, from environment overrides.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
    pub log_method: LogMethod,
    pub supervisor_socket: PathBuf,
    pub handle_table_capacity: usize,
    pub shutdown_writeback_budget: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_method: LogMethod::default(),
            supervisor_socket: PathBuf::from(DEFAULT_SUPERVISOR_SOCKET),
            handle_table_capacity: DEFAULT_HANDLE_TABLE_CAPACITY,
            shutdown_writeback_budget: DEFAULT_SHUTDOWN_WRITEBACK_BUDGET,
        }
    }
}

impl RuntimeConfig {
    /// Resolves configuration from the environment, falling back to defaults field-by-field on
    /// any missing or unparsable value. Never fails: a malformed override just loses that one
    /// field to its default rather than aborting `init()`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_method: Self::log_method_from_env().unwrap_or(defaults.log_method),
            supervisor_socket: std::env::var_os(ENV_SUPERVISOR_SOCKET)
                .map(PathBuf::from)
                .unwrap_or(defaults.supervisor_socket),
            handle_table_capacity: std::env::var(ENV_HANDLE_TABLE_CAPACITY)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.handle_table_capacity),
            shutdown_writeback_budget: std::env::var(ENV_SHUTDOWN_WRITEBACK_BUDGET_MS)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_writeback_budget),
        }
    }

    fn log_method_from_env() -> Option<LogMethod> {
        let raw = std::env::var(ENV_LOG_METHOD).ok()?;
        match raw.as_str() {
            "stdout" => Some(LogMethod::Stdout),
            "stderr" => Some(LogMethod::Stderr),
            method if method.starts_with("file://") => Some(LogMethod::File(PathBuf::from(&method[7..]))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that touch them.
    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_environment_is_unset() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|p| p.into_inner());
        std::env::remove_var(ENV_LOG_LEVEL);
        std::env::remove_var(ENV_LOG_METHOD);
        std::env::remove_var(ENV_HANDLE_TABLE_CAPACITY);
        let config = RuntimeConfig::from_env();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.log_method, LogMethod::Stderr);
        assert_eq!(config.handle_table_capacity, DEFAULT_HANDLE_TABLE_CAPACITY);
    }

    #[test]
    fn file_log_method_parses_its_path() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|p| p.into_inner());
        std::env::set_var(ENV_LOG_METHOD, "file:///var/log/persistence.log");
        let config = RuntimeConfig::from_env();
        assert_eq!(config.log_method, LogMethod::File(PathBuf::from("/var/log/persistence.log")));
        std::env::remove_var(ENV_LOG_METHOD);
    }

    #[test]
    fn unparsable_capacity_falls_back_to_default() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|p| p.into_inner());
        std::env::set_var(ENV_HANDLE_TABLE_CAPACITY, "not-a-number");
        let config = RuntimeConfig::from_env();
        assert_eq!(config.handle_table_capacity, DEFAULT_HANDLE_TABLE_CAPACITY);
        std::env::remove_var(ENV_HANDLE_TABLE_CAPACITY);
    }
}
