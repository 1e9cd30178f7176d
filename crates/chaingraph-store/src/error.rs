//! Error taxonomy for the execution store adapter contract (spec §4.G).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no execution record '{0}'")]
    NotFound(String),

    #[error("no flow snapshot for flow '{0}'")]
    NoSuchFlow(String),

    #[error("illegal status transition for execution '{execution_id}': {from:?} -> {to:?}")]
    StaleTransition {
        execution_id: String,
        from: crate::model::ExecutionStatus,
        to: crate::model::ExecutionStatus,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(e: chrono::ParseError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
