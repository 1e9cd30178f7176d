//! Error taxonomy for bus transport, partitioning, and retry exhaustion.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BusError>;

#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no subscriber for topic '{0}'")]
    NoSubscriber(String),

    #[error("publish to '{topic}' failed after {attempts} attempts: {reason}")]
    PublishExhausted {
        topic: String,
        attempts: u32,
        reason: String,
    },

    #[error("channel closed")]
    Closed,
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Serialization(e.to_string())
    }
}
