//! Event stream service error taxonomy (spec §4.F).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("bus error: {0}")]
    Bus(#[from] chaingraph_bus::BusError),

    #[error("malformed client frame: {0}")]
    MalformedFrame(String),

    #[error("connection pool at capacity ({0} connections)")]
    PoolFull(usize),
}
