use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetopsError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("SSH error: {0}")]
    SshError(#[from] ssh2::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Jumphost connection failed: {0}")]
    TunnelConnectError(String),

    #[error("Tunnel channel creation failed: {0}")]
    TunnelChannelError(String),

    #[error("Authentication failed for user {username}: {source}")]
    AuthenticationFailed {
        username: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("Connection error: failed to connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Disconnect error: {0}")]
    DisconnectError(String),

    #[error("Timeout occurred while {action}")]
    Timeout { action: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

// Helper methods for error context
impl NetopsError {
    pub fn connection_failed(addr: impl Into<String>, err: io::Error) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            source: err,
        }
    }

    pub fn authentication_failed(username: impl Into<String>, err: ssh2::Error) -> Self {
        Self::AuthenticationFailed {
            username: username.into(),
            source: err,
        }
    }

    pub fn timeout(action: impl Into<String>) -> Self {
        Self::Timeout {
            action: action.into(),
        }
    }

    /// Whether the error is fatal for the bastion tunnel rather than a
    /// single device connect.
    pub fn is_tunnel_error(&self) -> bool {
        matches!(
            self,
            Self::TunnelConnectError(_) | Self::TunnelChannelError(_)
        )
    }
}
