//! Flow model, port runtime, and execution engine for ChainGraph.
//!
//! A [`flow::FlowArena`] owns a flow's nodes, ports, and edges behind small
//! integer ids. A [`registry::NodeRegistry`] describes node types up front
//! so the arena can materialize ports without reflection. An
//! [`engine::Engine`] drives one [`context::ExecutionContext`] to a
//! terminal status, gated by an [`engine::Debugger`], emitting a densely
//! ordered [`event::Event`] log as it goes.

pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod flow;
pub mod ids;
pub mod introspection;
pub mod port;
pub mod registry;
pub mod stream;

pub use context::{CancellationToken, ExecutionContext, InMemoryEventSink};
pub use engine::{Debugger, DebuggerState, Engine, ScheduleOptions};
pub use error::{CoreError, Result};
pub use event::{Event, EventType};
pub use flow::{Edge, FlowArena};
pub use ids::{EdgeId, NodeId, PortId};
pub use introspection::{FlowDescription, NodeSummary, PortSummary};
pub use port::{Port, PortDirection, PortKind, PortSchema};
pub use registry::{NodeBehavior, NodeDescriptor, NodeOutcome, NodeRegistry, PortAccess, PortDescriptor};
pub use stream::MultiChannel;
