//! Worker Runtime for ChainGraph (spec §4.E): claims tasks from the task
//! topic, hydrates a flow via the [`chaingraph_store::ExecutionStore`],
//! drives a [`chaingraph_core::Engine`] to a terminal status, and bridges
//! its events onto the bus event topic. Also hosts the control-plane
//! `CREATE` handler and the orphan/stale-lease sweeper, since in this
//! workspace all three share one process (spec §2 data flow).

pub mod bridge;
pub mod config;
pub mod control_plane;
pub mod demo_nodes;
pub mod error;
pub mod health;
pub mod hydrate;
pub mod runtime;
pub mod sweeper;

pub use config::{WorkerConfig, WorkerConfigError};
pub use control_plane::ControlPlane;
pub use error::{Result, WorkerError};
pub use runtime::WorkerRuntime;
pub use sweeper::Sweeper;
