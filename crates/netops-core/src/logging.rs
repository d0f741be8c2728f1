use crate::error::NetopsError;
use std::fs::{create_dir_all, OpenOptions};
use std::io;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment key that overrides the level passed to `init_logging`.
const LOG_ENV_KEY: &str = "NETOPS_LOG";

/// Install the process-wide tracing subscriber for the engine.
///
/// `level` is a default directive ("info", "netops_core=debug", ...);
/// `NETOPS_LOG` in the environment wins over it. With `log_file` set, a
/// plain-text copy of everything goes to that file as well (the directory
/// is created if needed).
///
/// Safe to call more than once: only the first call installs the
/// subscriber, later calls return an error that harnesses can ignore.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<(), NetopsError> {
    let filter = EnvFilter::try_from_env(LOG_ENV_KEY).unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = fmt::layer().with_writer(io::stdout).with_target(true);

    let result = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    create_dir_all(dir)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;

            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init(),
    };

    result.map_err(|e| NetopsError::ConfigError(format!("failed to install subscriber: {}", e)))?;

    tracing::info!("Logging initialized ({} default)", level);
    Ok(())
}
