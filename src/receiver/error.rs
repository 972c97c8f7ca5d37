use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReceiverError {
    #[error("Receiver is stopped")]
    Stopped,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
