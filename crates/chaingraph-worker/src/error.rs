//! Worker-runtime error taxonomy (spec §4.E, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] chaingraph_store::StoreError),

    #[error("bus error: {0}")]
    Bus(#[from] chaingraph_bus::BusError),

    #[error("core error: {0}")]
    Core(#[from] chaingraph_core::CoreError),

    #[error("flow '{0}' references unknown node type '{1}'")]
    UnknownNodeType(String, String),

    #[error("flow '{0}' edge references out-of-range node index {1}")]
    BadEdgeIndex(String, usize),

    #[error("config error: {0}")]
    Config(String),
}
