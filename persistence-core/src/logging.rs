// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Global `tracing` subscriber installation, driven by [`crate::config::RuntimeConfig`].
//!
//! Installation happens at most once per process: `init()` is expected to be called multiple
//! times across a test suite, and `tracing::subscriber::set_global_default` only succeeds the
//! first time. Subsequent calls are treated as a no-op rather than an error.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::config::LogMethod;

static INSTALL: Once = Once::new();

/// Installs the global subscriber, if one has not already been installed by this process.
pub fn install(log_level: &str, log_method: &LogMethod) {
    INSTALL.call_once(|| {
        let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_ansi(false);

        let result = match log_method {
            LogMethod::Stdout => builder.with_writer(std::io::stdout).try_init(),
            LogMethod::Stderr => builder.with_writer(std::io::stderr).try_init(),
            LogMethod::File(path) => match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => builder.with_writer(std::sync::Mutex::new(file)).try_init(),
                Err(_) => builder.with_writer(std::io::stderr).try_init(),
            },
        };
        if result.is_err() {
            // A subscriber was already installed by something other than this function (e.g. the
            // host application's own `tracing` setup); defer to it.
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        install("info", &LogMethod::Stderr);
        install("debug", &LogMethod::Stdout);
        tracing::info!("logging harness smoke test");
    }
}
