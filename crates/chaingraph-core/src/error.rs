//! Error taxonomy for the flow model, port runtime, and execution engine.
//!
//! Mirrors the kinds enumerated in the design's error-handling table: each
//! variant here is raised at a specific layer and the engine maps it onto
//! the right terminal event when it escapes a node.

use thiserror::Error;

/// Convenience result type using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("type mismatch on port '{port}': expected {expected}, got {actual}")]
    TypeMismatch {
        port: String,
        expected: String,
        actual: String,
    },

    #[error("connecting would introduce a cycle through node '{through}'")]
    CycleDetected { through: String },

    #[error("cardinality violation: port '{port}' already has an incoming edge")]
    CardinalityViolation { port: String },

    #[error("node '{node}' execution failed: {reason}")]
    NodeExecution { node: String, reason: String },

    #[error("node '{node}' timed out after {timeout_ms}ms")]
    NodeTimeout { node: String, timeout_ms: u64 },

    #[error("flow execution exceeded {timeout_ms}ms")]
    FlowTimeout { timeout_ms: u64 },

    #[error("execution aborted: {reason}")]
    Aborted { reason: String },

    #[error("stream closed")]
    StreamClosed,

    #[error("consumer lagged and was evicted: missed {missed} items")]
    StreamLagged { missed: u64 },

    #[error("no such node '{0}'")]
    UnknownNode(String),

    #[error("no such port '{0}' on node '{1}'")]
    UnknownPort(String, String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
