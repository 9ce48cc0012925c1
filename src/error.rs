use crate::messages::wire::WireProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Could not connect to {host}:{port} after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {host}:{port} was lost: {reason}")]
    ConnectionLost {
        host: String,
        port: u16,
        reason: String,
    },

    #[error(transparent)]
    Wire(#[from] WireProtocolError),

    #[error("Server rejected the request: {0}")]
    ProtocolRejection(String),

    #[error("Configuration error in '{setting}': {issue}")]
    Configuration { setting: String, issue: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    pub fn configuration(setting: impl Into<String>, issue: impl Into<String>) -> Self {
        ChatError::Configuration {
            setting: setting.into(),
            issue: issue.into(),
        }
    }

    /// True for failures of the transport itself, as opposed to protocol or local errors.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ChatError::ConnectionFailed { .. } | ChatError::ConnectionLost { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
