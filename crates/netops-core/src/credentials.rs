use crate::config::{router_credentials, JumphostConfigSource};
use crate::error::NetopsError;
use std::sync::Arc;
use tracing::{debug, info};

/// Credentials resolved for one device connection.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub username: String,
    pub password: String,
    /// Whether the connection must be tunneled through the bastion.
    pub via_bastion: bool,
}

/// Resolves the `(username, password)` pair used to authenticate against a
/// device.
///
/// Invariant of these fleets: when a bastion is configured, every router
/// shares the bastion's credentials. The inventory's per-device credential
/// fields are deliberately ignored. When the bastion is disabled (or carries
/// no password) the process-wide `ROUTER_USERNAME`/`ROUTER_PASSWORD`
/// fallback applies.
pub struct CredentialResolver {
    jumphost: Arc<JumphostConfigSource>,
}

impl CredentialResolver {
    pub fn new(jumphost: Arc<JumphostConfigSource>) -> Self {
        Self { jumphost }
    }

    pub fn resolve(&self, device_name: &str) -> Result<ResolvedCredentials, NetopsError> {
        let config = self.jumphost.current();

        if config.enabled {
            if config.host.trim().is_empty() {
                return Err(NetopsError::ConfigError(
                    "jumphost is enabled but no jumphost host is configured".to_string(),
                ));
            }

            if !config.password.trim().is_empty() {
                debug!(
                    device = device_name,
                    "Using jumphost credentials (shared fleet credentials)"
                );
                return Ok(ResolvedCredentials {
                    username: config.username.clone(),
                    password: config.password.clone(),
                    via_bastion: true,
                });
            }

            // Bastion enabled but passwordless: fall back to the env
            // credentials while still routing through the tunnel.
            let (username, password) = router_credentials();
            info!(
                device = device_name,
                "Jumphost password not set, using fallback router credentials"
            );
            return Ok(ResolvedCredentials {
                username,
                password,
                via_bastion: true,
            });
        }

        let (username, password) = router_credentials();
        debug!(device = device_name, "Using fallback router credentials");
        Ok(ResolvedCredentials {
            username,
            password,
            via_bastion: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JumphostConfig;
    use tempfile::TempDir;

    fn source_with(config: &JumphostConfig) -> (TempDir, Arc<JumphostConfigSource>) {
        let dir = TempDir::new().unwrap();
        let source = JumphostConfigSource::new(dir.path().join("jumphost_config.json"));
        source.save(config).unwrap();
        (dir, Arc::new(source))
    }

    #[test]
    fn bastion_credentials_win_when_enabled() {
        let (_dir, source) = source_with(&JumphostConfig {
            enabled: true,
            host: "bastion.example".to_string(),
            port: 22,
            username: "jump".to_string(),
            password: "jumppass".to_string(),
        });
        let resolver = CredentialResolver::new(source);

        let creds = resolver.resolve("deu-r1").unwrap();
        assert_eq!(creds.username, "jump");
        assert_eq!(creds.password, "jumppass");
        assert!(creds.via_bastion);
    }

    #[test]
    fn enabled_without_host_is_a_config_error() {
        let (_dir, source) = source_with(&JumphostConfig {
            enabled: true,
            host: "".to_string(),
            port: 22,
            username: "jump".to_string(),
            password: "jumppass".to_string(),
        });
        let resolver = CredentialResolver::new(source);

        match resolver.resolve("deu-r1") {
            Err(NetopsError::ConfigError(msg)) => assert!(msg.contains("jumphost")),
            other => panic!("expected ConfigError, got {:?}", other.map(|c| c.username)),
        }
    }

    #[test]
    fn disabled_bastion_falls_back_to_router_credentials() {
        let (_dir, source) = source_with(&JumphostConfig::default());
        let resolver = CredentialResolver::new(source);

        let creds = resolver.resolve("deu-r1").unwrap();
        assert!(!creds.via_bastion);
        // Without ROUTER_* overrides the lab default applies.
        assert!(!creds.username.is_empty());
        assert!(!creds.password.is_empty());
    }
}
