use crate::error::NetopsError;
use regex::Regex;
use ssh2::Channel as Ssh2Channel;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

// Optimal buffer size based on typical network device response sizes
const DEFAULT_BUFFER_SIZE: usize = 16384; // 16KB

// Poll interval while waiting for more output
const READ_POLL_MS: u64 = 50;

/// Shell channel to a device with prompt-aware reads.
pub struct ShellChannel {
    remote_conn: Option<Ssh2Channel>,
    read_buffer: Vec<u8>,
}

impl ShellChannel {
    pub fn new(conn: Ssh2Channel) -> Self {
        Self {
            remote_conn: Some(conn),
            read_buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
        }
    }

    pub fn is_open(&self) -> bool {
        self.remote_conn.is_some()
    }

    pub fn write_channel(&mut self, out_data: &str) -> Result<(), NetopsError> {
        debug!(target: "ShellChannel::write_channel", "Writing to channel: {:?}", out_data);

        let channel = self.remote_conn.as_mut().ok_or_else(|| {
            NetopsError::WriteError(
                "Attempt to write data, but there is no active channel.".to_string(),
            )
        })?;

        channel
            .write_all(out_data.as_bytes())
            .map_err(|e| NetopsError::WriteError(format!("Failed to write to channel: {}", e)))?;
        channel
            .flush()
            .map_err(|e| NetopsError::WriteError(format!("Failed to flush channel: {}", e)))?;

        Ok(())
    }

    /// Read whatever is currently available without waiting for a prompt.
    pub fn read_available(&mut self) -> Result<String, NetopsError> {
        let channel = self.remote_conn.as_mut().ok_or_else(|| {
            NetopsError::ReadError("Attempt to read, but there is no active channel.".to_string())
        })?;

        let mut output = String::new();
        loop {
            match channel.read(&mut self.read_buffer) {
                Ok(0) => break,
                Ok(n) => {
                    // Validate only the bytes we actually read
                    match std::str::from_utf8(&self.read_buffer[..n]) {
                        Ok(s) => output.push_str(s),
                        Err(_) => {
                            output.push_str(&String::from_utf8_lossy(&self.read_buffer[..n]))
                        }
                    }
                    if n < self.read_buffer.len() {
                        break;
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(e) => return Err(NetopsError::IoError(e)),
            }
        }

        debug!(target: "ShellChannel::read_available", "Read {} bytes", output.len());
        Ok(output)
    }

    /// Read until `pattern` matches the accumulated output or `timeout`
    /// elapses.
    pub fn read_until_pattern(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<String, NetopsError> {
        debug!(target: "ShellChannel::read_until_pattern", "Waiting for {:?} (timeout {:?})", pattern.as_str(), timeout);

        let start = Instant::now();
        let mut output = String::new();

        loop {
            let chunk = self.read_available()?;
            if !chunk.is_empty() {
                output.push_str(&chunk);
                if pattern.is_match(&output) {
                    debug!(target: "ShellChannel::read_until_pattern", "Pattern matched after {} bytes", output.len());
                    return Ok(output);
                }
            }

            if start.elapsed() >= timeout {
                debug!(target: "ShellChannel::read_until_pattern", "Timeout with {} bytes buffered", output.len());
                return Err(NetopsError::timeout(format!(
                    "waiting for pattern {:?}",
                    pattern.as_str()
                )));
            }

            std::thread::sleep(Duration::from_millis(READ_POLL_MS));
        }
    }

    /// Close the channel, tolerating errors from an already-dead transport.
    pub fn close(&mut self) -> Result<(), NetopsError> {
        debug!(target: "ShellChannel::close", "Closing channel");

        if let Some(mut channel) = self.remote_conn.take() {
            if let Err(e) = channel.send_eof() {
                debug!(target: "ShellChannel::close", "Error sending EOF: {}", e);
            }
            if let Err(e) = channel.close() {
                debug!(target: "ShellChannel::close", "Error closing channel: {}", e);
                return Err(NetopsError::ChannelError(format!(
                    "Failed to close channel: {}",
                    e
                )));
            }
            if let Err(e) = channel.wait_close() {
                debug!(target: "ShellChannel::close", "Error waiting for channel to close: {}", e);
            }
        }

        Ok(())
    }
}
