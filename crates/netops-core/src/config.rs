use crate::error::NetopsError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{debug, info, warn};

static LOAD_DOTENV: Once = Once::new();

/// Load `.env.local` style overrides exactly once per process, then defer to
/// the real environment.
fn load_env() {
    LOAD_DOTENV.call_once(|| {
        if let Ok(path) = dotenvy::from_filename(".env.local") {
            info!("Loaded environment overrides from {}", path.display());
        } else {
            dotenvy::dotenv().ok();
        }
    });
}

fn env_var(key: &str) -> Option<String> {
    load_env();
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Fallback router credentials from `ROUTER_USERNAME` / `ROUTER_PASSWORD`.
///
/// The literal `cisco`/`cisco` default matches the lab images these fleets
/// are built from.
pub fn router_credentials() -> (String, String) {
    let username = env_var("ROUTER_USERNAME").unwrap_or_else(|| "cisco".to_string());
    let password = env_var("ROUTER_PASSWORD").unwrap_or_else(|| "cisco".to_string());
    (username, password)
}

/// Configuration for the shared SSH bastion (jump host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumphostConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_ssh_port() -> u16 {
    22
}

impl Default for JumphostConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl JumphostConfig {
    /// Read jumphost settings from `JUMPHOST_*` environment keys.
    /// `JUMPHOST_IP` is accepted as an alias for `JUMPHOST_HOST`.
    pub fn from_env() -> Self {
        let host = env_var("JUMPHOST_HOST")
            .or_else(|| env_var("JUMPHOST_IP"))
            .unwrap_or_default();
        Self {
            enabled: env_var("JUMPHOST_ENABLED")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            host,
            port: env_var("JUMPHOST_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(22),
            username: env_var("JUMPHOST_USERNAME").unwrap_or_default(),
            password: env_var("JUMPHOST_PASSWORD").unwrap_or_default(),
        }
    }
}

/// Source of the current jumphost configuration.
///
/// The configuration is a mutable record persisted as JSON. Priority order
/// on read: persisted file, then environment, then the disabled default.
/// Consumers call `current()` for a snapshot on every connect; `save()` and
/// `invalidate()` drop the cache so changes take effect without a restart.
pub struct JumphostConfigSource {
    path: PathBuf,
    cached: Mutex<Option<JumphostConfig>>,
}

impl JumphostConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> JumphostConfig {
        let mut cached = self.cached.lock();
        if let Some(config) = cached.as_ref() {
            return config.clone();
        }

        let config = self.load();
        *cached = Some(config.clone());
        config
    }

    fn load(&self) -> JumphostConfig {
        if self.path.exists() {
            match fs::read_to_string(&self.path) {
                Ok(raw) => match serde_json::from_str::<JumphostConfig>(&raw) {
                    Ok(config) => {
                        debug!(
                            enabled = config.enabled,
                            host = %config.host,
                            "Using jumphost config from {}",
                            self.path.display()
                        );
                        return config;
                    }
                    Err(e) => {
                        warn!("Failed to parse jumphost config file: {}", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read jumphost config file: {}", e);
                }
            }
        }

        let env_config = JumphostConfig::from_env();
        if !env_config.host.is_empty() {
            debug!(host = %env_config.host, "Using jumphost config from environment");
            return env_config;
        }

        debug!("Using default jumphost config (disabled)");
        JumphostConfig::default()
    }

    /// Persist a new configuration and drop the cached snapshot.
    ///
    /// The caller owning the shared tunnel must close it afterwards so the
    /// next connect picks up the new settings.
    pub fn save(&self, config: &JumphostConfig) -> Result<(), NetopsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, raw)?;
        info!(
            enabled = config.enabled,
            host = %config.host,
            "Jumphost config saved"
        );
        self.invalidate();
        Ok(())
    }

    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_disabled() {
        let config = JumphostConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.port, 22);
    }

    #[test]
    fn save_then_current_round_trips() {
        let dir = TempDir::new().unwrap();
        let source = JumphostConfigSource::new(dir.path().join("jumphost_config.json"));

        let config = JumphostConfig {
            enabled: true,
            host: "10.0.0.1".to_string(),
            port: 2222,
            username: "ops".to_string(),
            password: "secret".to_string(),
        };
        source.save(&config).unwrap();

        assert_eq!(source.current(), config);
    }

    #[test]
    fn invalidate_rereads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jumphost_config.json");
        let source = JumphostConfigSource::new(&path);

        let mut config = JumphostConfig {
            enabled: true,
            host: "10.0.0.1".to_string(),
            ..JumphostConfig::default()
        };
        source.save(&config).unwrap();
        assert!(source.current().enabled);

        // Write behind the source's back, then invalidate.
        config.enabled = false;
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        assert!(source.current().enabled, "cache still holds old snapshot");
        source.invalidate();
        assert!(!source.current().enabled);
    }
}
