use crate::config::{JumphostConfig, JumphostConfigSource};
use crate::error::NetopsError;
use parking_lot::Mutex;
use ssh2::{Channel as Ssh2Channel, Session};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

// Bastion transport timeout; device sessions use their own shorter timeout.
const BASTION_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// Blocking libssh2 calls on the relay return after this long so the worker
// can service every channel and the command queue.
const SESSION_POLL_TIMEOUT_MS: u32 = 100;

const RELAY_IDLE_SLEEP_MS: u64 = 5;
const RELAY_BUFFER_SIZE: usize = 16384;

enum TunnelCmd {
    OpenChannel {
        host: String,
        port: u16,
        reply: mpsc::SyncSender<Result<TcpStream, NetopsError>>,
    },
    Shutdown,
}

struct TunnelHandle {
    cmd_tx: mpsc::Sender<TunnelCmd>,
    alive: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TunnelHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn shutdown(mut self) {
        let _ = self.cmd_tx.send(TunnelCmd::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Shared SSH session to the jump host.
///
/// libssh2 sessions are not thread-safe, so a single relay worker thread
/// owns the session and every `direct-tcpip` channel opened through it.
/// Each channel is spliced onto a loopback socket pair; the caller-side
/// socket becomes the transport for one device session. Public operations
/// are serialized by a mutex, which makes channel creation sequential.
pub struct BastionTunnel {
    config_source: Arc<JumphostConfigSource>,
    state: Mutex<Option<TunnelHandle>>,
}

impl BastionTunnel {
    pub fn new(config_source: Arc<JumphostConfigSource>) -> Self {
        Self {
            config_source,
            state: Mutex::new(None),
        }
    }

    /// Idempotently make sure the shared session is up, reconnecting when
    /// the previous transport died.
    pub fn ensure_connected(&self) -> Result<(), NetopsError> {
        let mut state = self.state.lock();

        let alive = state.as_ref().map(|h| h.is_alive()).unwrap_or(false);
        if alive {
            return Ok(());
        }
        if let Some(handle) = state.take() {
            warn!("Jumphost tunnel expired, reconnecting");
            handle.shutdown();
        }

        let config = self.config_source.current();
        *state = Some(Self::spawn_worker(&config)?);
        Ok(())
    }

    /// Open a `direct-tcpip` channel to `(target_host, target_port)` and
    /// return the caller side of its loopback splice.
    pub fn open_channel(&self, target_host: &str, target_port: u16) -> Result<TcpStream, NetopsError> {
        self.ensure_connected()?;

        let state = self.state.lock();
        let handle = state.as_ref().ok_or_else(|| {
            NetopsError::TunnelChannelError("jumphost tunnel is not connected".to_string())
        })?;

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        handle
            .cmd_tx
            .send(TunnelCmd::OpenChannel {
                host: target_host.to_string(),
                port: target_port,
                reply: reply_tx,
            })
            .map_err(|_| {
                NetopsError::TunnelChannelError("jumphost relay worker is gone".to_string())
            })?;

        reply_rx
            .recv_timeout(BASTION_CONNECT_TIMEOUT)
            .map_err(|_| {
                NetopsError::TunnelChannelError(format!(
                    "timed out opening tunnel channel to {}:{}",
                    target_host, target_port
                ))
            })?
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .map(|h| h.is_alive())
            .unwrap_or(false)
    }

    /// Close the shared session. All outstanding channels become invalid.
    pub fn close(&self) {
        let handle = self.state.lock().take();
        if let Some(handle) = handle {
            info!("Closing jumphost tunnel");
            handle.shutdown();
        }
    }

    /// Persist a new jumphost configuration and drop the live session so
    /// the next connect picks up the fresh settings.
    pub fn update_config(&self, config: &JumphostConfig) -> Result<(), NetopsError> {
        self.config_source.save(config)?;
        self.close();
        Ok(())
    }

    fn spawn_worker(config: &JumphostConfig) -> Result<TunnelHandle, NetopsError> {
        if config.host.trim().is_empty() {
            return Err(NetopsError::ConfigError(
                "jumphost is enabled but no jumphost host is configured".to_string(),
            ));
        }

        let addr = format!("{}:{}", config.host, config.port);
        info!("Connecting to jumphost {}", addr);

        let sock_addr = addr
            .to_socket_addrs()
            .map_err(|e| NetopsError::TunnelConnectError(format!("{}: {}", addr, e)))?
            .next()
            .ok_or_else(|| {
                NetopsError::TunnelConnectError(format!("could not resolve {}", addr))
            })?;

        let tcp = TcpStream::connect_timeout(&sock_addr, BASTION_CONNECT_TIMEOUT)
            .map_err(|e| NetopsError::TunnelConnectError(format!("{}: {}", addr, e)))?;

        let mut session = Session::new()
            .map_err(|e| NetopsError::TunnelConnectError(format!("session init: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| NetopsError::TunnelConnectError(format!("handshake: {}", e)))?;
        session
            .userauth_password(&config.username, &config.password)
            .map_err(|e| {
                NetopsError::TunnelConnectError(format!(
                    "authentication failed for {}: {}",
                    config.username, e
                ))
            })?;

        session.set_keepalive(true, 60);
        // Bounded blocking so the relay loop keeps cycling
        session.set_timeout(SESSION_POLL_TIMEOUT_MS);

        info!("Connected to jumphost {}", addr);

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let alive_worker = Arc::clone(&alive);

        let worker = std::thread::Builder::new()
            .name("bastion-relay".to_string())
            .spawn(move || {
                relay_loop(session, cmd_rx);
                alive_worker.store(false, Ordering::SeqCst);
            })
            .map_err(|e| NetopsError::TunnelConnectError(format!("relay thread: {}", e)))?;

        Ok(TunnelHandle {
            cmd_tx,
            alive,
            worker: Some(worker),
        })
    }
}

struct Relay {
    channel: Ssh2Channel,
    sock: TcpStream,
    done: bool,
}

/// Relay event loop. Owns the bastion session and pumps bytes between every
/// device-facing loopback socket and its `direct-tcpip` channel.
fn relay_loop(session: Session, cmd_rx: mpsc::Receiver<TunnelCmd>) {
    let mut relays: Vec<Relay> = Vec::new();
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        // Service channel-creation requests first; creation is sequential.
        loop {
            match cmd_rx.try_recv() {
                Ok(TunnelCmd::OpenChannel { host, port, reply }) => {
                    match open_relay(&session, &host, port) {
                        Ok((relay, caller_sock)) => {
                            relays.push(relay);
                            let _ = reply.send(Ok(caller_sock));
                        }
                        Err(e) => {
                            // A failed channel open usually means the bastion
                            // transport is gone; exit so the next connect
                            // re-establishes the session.
                            warn!("Tunnel channel creation failed, tearing tunnel down: {}", e);
                            let _ = reply.send(Err(e));
                            teardown(session, relays);
                            return;
                        }
                    }
                }
                Ok(TunnelCmd::Shutdown) => {
                    debug!(target: "BastionTunnel::relay", "Shutdown requested");
                    teardown(session, relays);
                    return;
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    teardown(session, relays);
                    return;
                }
            }
        }

        let mut moved_data = false;

        for relay in relays.iter_mut() {
            match pump_relay(relay, &mut buf) {
                Ok(active) => moved_data |= active,
                Err(e) => {
                    debug!(target: "BastionTunnel::relay", "Relay finished: {}", e);
                    relay.done = true;
                }
            }
        }
        relays.retain(|r| !r.done);

        if !moved_data {
            std::thread::sleep(Duration::from_millis(RELAY_IDLE_SLEEP_MS));
        }
    }
}

/// Open the `direct-tcpip` channel plus its loopback splice.
/// Returns the worker-side relay and the caller-side socket.
fn open_relay(
    session: &Session,
    host: &str,
    port: u16,
) -> Result<(Relay, TcpStream), NetopsError> {
    debug!(target: "BastionTunnel::open_relay", "Creating tunnel to {}:{}", host, port);

    let channel = session
        .channel_direct_tcpip(host, port, Some(("127.0.0.1", 0)))
        .map_err(|e| {
            NetopsError::TunnelChannelError(format!("direct-tcpip to {}:{}: {}", host, port, e))
        })?;

    // Loopback pair: caller gets one end, the relay pumps the other.
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| NetopsError::TunnelChannelError(format!("loopback bind: {}", e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| NetopsError::TunnelChannelError(format!("loopback addr: {}", e)))?;
    let caller_sock = TcpStream::connect(local_addr)
        .map_err(|e| NetopsError::TunnelChannelError(format!("loopback connect: {}", e)))?;
    let (relay_sock, _) = listener
        .accept()
        .map_err(|e| NetopsError::TunnelChannelError(format!("loopback accept: {}", e)))?;

    relay_sock
        .set_nonblocking(true)
        .map_err(|e| NetopsError::TunnelChannelError(format!("loopback nonblocking: {}", e)))?;

    info!("Tunnel established to {}:{}", host, port);

    Ok((
        Relay {
            channel,
            sock: relay_sock,
            done: false,
        },
        caller_sock,
    ))
}

/// Move pending bytes in both directions. Returns whether anything moved.
fn pump_relay(relay: &mut Relay, buf: &mut [u8]) -> Result<bool, NetopsError> {
    let mut moved = false;

    // Device session -> channel
    match relay.sock.read(buf) {
        Ok(0) => {
            return Err(NetopsError::ChannelError(
                "local endpoint closed".to_string(),
            ));
        }
        Ok(n) => {
            write_fully(&mut relay.channel, &buf[..n])?;
            moved = true;
        }
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut => {}
        Err(e) => return Err(NetopsError::IoError(e)),
    }

    // Channel -> device session
    match relay.channel.read(buf) {
        Ok(0) => {
            if relay.channel.eof() {
                return Err(NetopsError::ChannelError("remote sent EOF".to_string()));
            }
        }
        Ok(n) => {
            write_fully(&mut relay.sock, &buf[..n])?;
            moved = true;
        }
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut => {}
        Err(e) => return Err(NetopsError::IoError(e)),
    }

    Ok(moved)
}

/// `write_all` that retries short and would-block writes; both relay
/// endpoints run with bounded blocking.
fn write_fully<W: Write>(dst: &mut W, mut data: &[u8]) -> Result<(), NetopsError> {
    while !data.is_empty() {
        match dst.write(data) {
            Ok(0) => {
                return Err(NetopsError::WriteError("relay endpoint closed".to_string()));
            }
            Ok(n) => data = &data[n..],
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(NetopsError::IoError(e)),
        }
    }
    Ok(())
}

fn teardown(session: Session, relays: Vec<Relay>) {
    for mut relay in relays {
        let _ = relay.channel.close();
    }
    let _ = session.disconnect(None, "tunnel closed", None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn update_config_persists_and_drops_the_session() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(JumphostConfigSource::new(
            dir.path().join("jumphost_config.json"),
        ));
        let tunnel = BastionTunnel::new(Arc::clone(&source));

        let config = JumphostConfig {
            enabled: true,
            host: "10.0.0.1".to_string(),
            port: 22,
            username: "jump".to_string(),
            password: "pw".to_string(),
        };
        tunnel.update_config(&config).unwrap();

        assert_eq!(source.current(), config);
        assert!(!tunnel.is_connected());
    }

    #[test]
    fn ensure_connected_requires_a_host() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(JumphostConfigSource::new(
            dir.path().join("jumphost_config.json"),
        ));
        let tunnel = BastionTunnel::new(source);

        assert!(matches!(
            tunnel.ensure_connected(),
            Err(NetopsError::ConfigError(_))
        ));
    }
}
