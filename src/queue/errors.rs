use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Manager shut down")]
    ManagerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Error alias
pub type Result<T, E = QueueError> = std::result::Result<T, E>;
