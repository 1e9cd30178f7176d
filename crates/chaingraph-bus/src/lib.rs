//! Message bus bindings for ChainGraph (spec §4.D): the three logical
//! topics, partition-key derivation, command idempotency, and producer
//! retry policy.

pub mod broker;
pub mod error;
pub mod idempotency;
pub mod partition;
pub mod payload;
pub mod retry;

pub use broker::{Broker, InMemoryBroker};
pub use error::{BusError, Result};
pub use idempotency::DedupeWindow;
pub use partition::partition_for;
pub use payload::{
    CommandKind, CommandMessage, CommandPayloadBody, EventEnvelope, EventMessage, ExecutionOptions, ExternalEvent,
    TaskContext, TaskMessage, SCHEMA_VERSION,
};
pub use retry::{retry_with_backoff, RetryPolicy};
