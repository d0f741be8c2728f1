use crate::config::JumphostConfigSource;
use crate::credentials::CredentialResolver;
use crate::device::Device;
use crate::error::NetopsError;
use crate::session::{DeviceSession, SessionParams};
use crate::tunnel::BastionTunnel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type SharedSession = Arc<Mutex<DeviceSession>>;

/// Per-device SSH session lifecycle.
///
/// When the jumphost is enabled every connection MUST route through the
/// shared tunnel; there is no direct-connect fallback.
pub struct ConnectionPool {
    active: Mutex<HashMap<String, SharedSession>>,
    tunnel: Arc<BastionTunnel>,
    config_source: Arc<JumphostConfigSource>,
    resolver: CredentialResolver,
}

impl ConnectionPool {
    pub fn new(config_source: Arc<JumphostConfigSource>, tunnel: Arc<BastionTunnel>) -> Self {
        let resolver = CredentialResolver::new(Arc::clone(&config_source));
        Self {
            active: Mutex::new(HashMap::new()),
            tunnel,
            config_source,
            resolver,
        }
    }

    pub fn tunnel(&self) -> &Arc<BastionTunnel> {
        &self.tunnel
    }

    /// Establish an SSH session to `device` and store it in the pool.
    pub fn connect(
        &self,
        device: &Device,
        timeout: Duration,
    ) -> Result<SharedSession, NetopsError> {
        if let Some(session) = self.get(&device.id) {
            debug!(device = %device.name, "Reusing existing session");
            return Ok(session);
        }

        info!(
            device = %device.name,
            address = %device.address,
            "Attempting SSH connection"
        );

        let jumphost = self.config_source.current();
        let credentials = self.resolver.resolve(&device.name)?;

        let sock = if jumphost.enabled {
            info!(
                jumphost = %jumphost.host,
                device = %device.name,
                "Jumphost required, routing connection via tunnel"
            );
            // ensure_connected failing must fail the connect outright.
            self.tunnel.ensure_connected().map_err(|e| {
                NetopsError::ConnectionError(format!(
                    "jumphost tunnel unavailable for {}: {}",
                    device.name, e
                ))
            })?;
            let channel = self.tunnel.open_channel(&device.address, device.port)?;
            Some(channel)
        } else {
            None
        };

        let dialect = device.dialect();
        debug!(device = %device.name, dialect = %dialect, "Selected CLI dialect");

        let params = SessionParams {
            host: device.address.clone(),
            port: device.port,
            username: credentials.username,
            password: credentials.password,
            connect_timeout: timeout,
            dialect,
            sock,
        };

        let session = DeviceSession::connect(params)?;
        info!(
            device = %device.name,
            prompt = %session.base_prompt(),
            "Successfully connected"
        );

        let shared = Arc::new(Mutex::new(session));
        self.active
            .lock()
            .insert(device.id.clone(), Arc::clone(&shared));
        Ok(shared)
    }

    pub fn get(&self, device_id: &str) -> Option<SharedSession> {
        self.active.lock().get(device_id).cloned()
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        self.active.lock().contains_key(device_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Disconnect one device. Dropping the session also releases its tunnel
    /// socket, which ends the relay for that device.
    pub fn disconnect(&self, device_id: &str) -> Result<(), NetopsError> {
        let session = self.active.lock().remove(device_id);
        match session {
            Some(session) => {
                let result = session.lock().disconnect();
                if let Err(e) = &result {
                    warn!(device = device_id, "Disconnect error: {}", e);
                }
                info!(device = device_id, "Disconnected");
                result
            }
            None => {
                debug!(device = device_id, "Device not connected");
                Ok(())
            }
        }
    }

    /// Disconnect every device; close the shared tunnel once the pool is
    /// empty.
    pub fn disconnect_all(&self) -> usize {
        let sessions: Vec<(String, SharedSession)> = self.active.lock().drain().collect();
        let mut disconnected = 0;

        for (device_id, session) in sessions {
            if let Err(e) = session.lock().disconnect() {
                warn!(device = %device_id, "Disconnect error: {}", e);
            } else {
                disconnected += 1;
            }
        }

        if self.active.lock().is_empty() {
            self.tunnel.close();
        }

        info!("Disconnected from {} devices", disconnected);
        disconnected
    }
}
