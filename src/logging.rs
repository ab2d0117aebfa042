//! Logger subsystem boundary
//!
//! Thin wrapper around `tracing`: the node configures it from typed
//! accessors and opens it first during preopen, so every later subsystem
//! logs through an installed subscriber. The global subscriber can only
//! be installed once per process; repeated opens are no-ops.

use crate::config::Config;
use crate::error::Result;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceCell<()> = OnceCell::new();

pub struct Logger {
    pub level: String,
    pub console: bool,
    pub filename: Option<PathBuf>,
}

impl Logger {
    /// Build the logger from typed config accessors. The log file, when
    /// enabled, lives under the prefix directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let filename = if config.bool("log-file")?.unwrap_or(false) {
            Some(config.location("debug.log"))
        } else {
            None
        };

        Ok(Logger {
            level: config.str("log-level")?.unwrap_or_else(|| "info".to_string()),
            console: config.bool("log-console")?.unwrap_or(true),
            filename,
        })
    }

    /// Install the global subscriber. Idempotent.
    pub async fn open(&self) -> Result<()> {
        INSTALLED.get_or_init(|| {
            let filter = EnvFilter::try_new(&self.level)
                .unwrap_or_else(|_| EnvFilter::new("info"));

            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(self.console);

            // A failed install means a subscriber already exists, which
            // is fine for embedded use.
            let _ = builder.try_init();
        });

        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        // Subscribers cannot be uninstalled; nothing to tear down.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_resolves_under_prefix() {
        let mut config = Config::with_roots(
            "lumen",
            PathBuf::from("/home/tester"),
            PathBuf::from("/work"),
        );
        config.set("log-file", "true");
        config.set("log-level", "debug");

        let logger = Logger::from_config(&config).unwrap();

        assert_eq!(logger.level, "debug");
        assert_eq!(
            logger.filename,
            Some(PathBuf::from("/home/tester/.lumen/debug.log"))
        );
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let config = Config::with_roots(
            "lumen",
            PathBuf::from("/home/tester"),
            PathBuf::from("/work"),
        );
        let logger = Logger::from_config(&config).unwrap();

        logger.open().await.unwrap();
        logger.open().await.unwrap();
        logger.close().await.unwrap();
    }
}
