//! Tracing subscriber setup.
//!
//! The filter comes from `HOTCONSOLE_LOG` when set, otherwise from the
//! configuration. Logs go to the configured file, or to stderr so the
//! transcript on stdout stays clean.

use std::fs::File;
use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::ConsoleConfig;
use crate::consts::LOG_ENV;

/// `HOTCONSOLE_LOG` if it parses, else `fallback`.
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Subscriber writing to `log_file`, or to stderr when there is none.
pub fn build_subscriber(
    log_file: Option<File>,
    filter: EnvFilter,
) -> impl tracing::Subscriber + Send + Sync {
    let (file_layer, stderr_layer) = match log_file {
        Some(file) => (
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file))),
            None,
        ),
        None => (None, Some(fmt::layer().with_writer(io::stderr))),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
}

/// Install the global subscriber described by `config`.
pub fn init(config: &ConsoleConfig) -> Result<()> {
    let log_file = config
        .log_file
        .as_deref()
        .map(|path| {
            File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))
        })
        .transpose()?;

    build_subscriber(log_file, env_filter(&config.log_filter))
        .try_init()
        .context("failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn file_subscriber_writes_events_at_or_above_filter() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(
            Some(log_file.reopen().unwrap()),
            EnvFilter::new("info"),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(terminal = 3, "terminal opened");
            tracing::debug!("too chatty");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("terminal opened"));
        assert!(contents.contains("terminal=3"));
        assert!(!contents.contains("too chatty"));
    }

    #[test]
    fn init_reports_unwritable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConsoleConfig {
            log_file: Some(dir.path().join("missing").join("hot.log")),
            ..ConsoleConfig::default()
        };
        let err = init(&config).unwrap_err();
        assert!(format!("{err:#}").contains("hot.log"));
    }
}
