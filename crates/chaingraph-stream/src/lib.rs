//! Event Stream Service for ChainGraph (spec §4.F): a duplex WebSocket
//! server that consumes the event topic and fans events out to every
//! client subscribed to a given `executionId`.
//!
//! Layout mirrors the worker crate: a typed env config, an error
//! taxonomy, the wire protocol, the connection/subscriber registry, the
//! dispatcher that bridges the bus to connections, and the axum handler
//! that ties a socket to the registry.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod protocol;
pub mod registry;
pub mod ws;

pub use config::{StreamConfig, StreamConfigError};
pub use dispatch::Dispatcher;
pub use error::{Result, StreamError};
pub use registry::Registry;
