use crate::channel::ShellChannel;
use crate::device::Dialect;
use crate::error::NetopsError;
use regex::Regex;
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

// Settle delay after the shell comes up; slow devices echo their banner late.
const SHELL_SETTLE_MS: u64 = 500;

// Blocking libssh2 calls return after this long so channel reads poll
// instead of blocking forever.
const STREAM_READ_TIMEOUT_MS: u32 = 200;

const PROMPT_DISCOVERY_TIMEOUT_SECS: u64 = 10;

lazy_static! {
    // Any line ending in the user/priv exec terminator
    static ref ANY_PROMPT: Regex = Regex::new(r"[>#]\s*$").unwrap();
    static ref CRLF: Regex = Regex::new(r"\r\n|\r").unwrap();
}

/// Parameters for one device session.
#[derive(Debug)]
pub struct SessionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub dialect: Dialect,
    /// Pre-opened transport socket (bastion tunnel). When set, `host`/`port`
    /// are informational only.
    pub sock: Option<TcpStream>,
}

/// An authenticated interactive shell on one device.
///
/// Holds the ssh2 session, the shell channel and the discovered prompt.
/// All operations are synchronous; callers serialize access per device.
pub struct DeviceSession {
    _session: Session,
    channel: ShellChannel,
    base_prompt: String,
    prompt_regex: Regex,
    dialect: Dialect,
}

impl DeviceSession {
    /// Connect, authenticate, open a shell and prepare the terminal.
    pub fn connect(params: SessionParams) -> Result<Self, NetopsError> {
        let addr = format!("{}:{}", params.host, params.port);

        let tcp = match params.sock {
            Some(sock) => {
                debug!(target: "DeviceSession::connect", "Using pre-opened tunnel socket for {}", addr);
                sock
            }
            None => {
                debug!(target: "DeviceSession::connect", "Establishing TCP connection to {}", addr);
                let sock_addr = addr
                    .to_socket_addrs()
                    .map_err(|e| NetopsError::connection_failed(addr.clone(), e))?
                    .next()
                    .ok_or_else(|| {
                        NetopsError::ConnectionError(format!("could not resolve {}", addr))
                    })?;
                TcpStream::connect_timeout(&sock_addr, params.connect_timeout)
                    .map_err(|e| NetopsError::connection_failed(addr.clone(), e))?
            }
        };

        // Generous socket timeouts for handshake and auth; channel reads are
        // bounded separately below.
        tcp.set_read_timeout(Some(params.connect_timeout))?;
        tcp.set_write_timeout(Some(params.connect_timeout))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);

        debug!(target: "DeviceSession::connect", "Starting SSH handshake with {}", addr);
        session.handshake()?;

        debug!(target: "DeviceSession::connect", "Authenticating as {}", params.username);
        session
            .userauth_password(&params.username, &params.password)
            .map_err(|e| NetopsError::authentication_failed(&params.username, e))?;

        let mut channel = session.channel_session()?;
        channel.request_pty("xterm", None, None)?;
        channel.shell()?;

        session.set_keepalive(true, 60);
        session.set_blocking(true);
        // Bound every blocking read so the prompt loop can poll
        session.set_timeout(STREAM_READ_TIMEOUT_MS);

        std::thread::sleep(Duration::from_millis(SHELL_SETTLE_MS));

        let mut shell = ShellChannel::new(channel);
        let (base_prompt, prompt_regex) = Self::discover_prompt(&mut shell)?;
        info!(host = %params.host, prompt = %base_prompt, "Device session established");

        let mut device = Self {
            _session: session,
            channel: shell,
            base_prompt,
            prompt_regex,
            dialect: params.dialect,
        };
        device.session_preparation()?;

        Ok(device)
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Hit Enter, wait for the prompt to echo back and derive the base
    /// prompt (hostname without the `>`/`#` terminator).
    fn discover_prompt(shell: &mut ShellChannel) -> Result<(String, Regex), NetopsError> {
        shell.write_channel("\n")?;
        let output = shell.read_until_pattern(
            &ANY_PROMPT,
            Duration::from_secs(PROMPT_DISCOVERY_TIMEOUT_SECS),
        )?;

        let prompt_line = output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| line.ends_with('>') || line.ends_with('#'))
            .ok_or_else(|| {
                NetopsError::PromptError("no prompt found in initial output".to_string())
            })?;

        let base_prompt = prompt_line.trim_end_matches(['>', '#']).to_string();
        if base_prompt.is_empty() {
            return Err(NetopsError::PromptError(
                "device prompt is empty".to_string(),
            ));
        }

        let pattern = format!(r"{}[>#]\s*$", regex::escape(&base_prompt));
        let prompt_regex = Regex::new(&pattern)?;
        debug!(target: "DeviceSession::discover_prompt", "Base prompt: {:?}", base_prompt);

        Ok((base_prompt, prompt_regex))
    }

    /// Terminal setup for the dialect (pagination off, wide terminal).
    fn session_preparation(&mut self) -> Result<(), NetopsError> {
        debug!(target: "DeviceSession::session_preparation", "Preparing {} session", self.dialect);
        for command in self.dialect.session_preparation_commands() {
            self.send_command(command, Duration::from_secs(10))?;
        }
        Ok(())
    }

    /// Send one command and read until the prompt returns.
    ///
    /// The returned output has the command echo and the trailing prompt
    /// stripped and line endings normalized to `\n`.
    pub fn send_command(
        &mut self,
        command: &str,
        read_timeout: Duration,
    ) -> Result<String, NetopsError> {
        debug!(target: "DeviceSession::send_command", "Executing: {}", command);

        // Drain anything pending (banner noise, previous prompt echo).
        self.channel.read_available()?;

        self.channel.write_channel(command)?;
        self.channel.write_channel("\n")?;

        let raw = self
            .channel
            .read_until_pattern(&self.prompt_regex, read_timeout)?;

        Ok(self.sanitize_output(&raw, command))
    }

    fn sanitize_output(&self, raw: &str, command: &str) -> String {
        let normalized = CRLF.replace_all(raw, "\n").to_string();

        let mut lines: Vec<&str> = normalized.lines().collect();

        // Drop the trailing prompt line
        while let Some(last) = lines.last() {
            let trimmed = last.trim();
            if trimmed.is_empty() || self.prompt_regex.is_match(trimmed) {
                lines.pop();
            } else {
                break;
            }
        }

        // Drop the leading command echo
        if let Some(first) = lines.first() {
            if first.trim_end().ends_with(command.trim()) {
                lines.remove(0);
            }
        }

        lines.join("\n")
    }

    pub fn disconnect(&mut self) -> Result<(), NetopsError> {
        debug!(target: "DeviceSession::disconnect", "Closing session for {}", self.base_prompt);
        self.channel.close()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.channel.is_open() {
            let _ = self.channel.close();
        }
    }
}
