//! Explicit node-type registration, replacing decorator-driven schema
//! reflection: each node type is described once, up front, by a
//! constructor-injected [`NodeRegistry`] rather than discovered from
//! annotations at load time.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::port::{PortDirection, PortSchema};
use crate::stream::MultiChannel;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A node-local view onto its own ports, handed to [`NodeBehavior::execute`].
/// Concrete access is bridged through the flow arena; node implementations
/// never see arena internals or other nodes' ports.
pub trait PortAccess: Send + Sync {
    fn get_input(&self, key: &str) -> Result<serde_json::Value>;
    fn set_output(&self, key: &str, value: serde_json::Value) -> Result<()>;
    fn stream_sender(&self, key: &str) -> Result<MultiChannel<serde_json::Value>>;
}

/// A long-running suspended action a node hands off to the engine, e.g. a
/// stream producer loop. Supervised until it completes or the execution is
/// cancelled (spec §4.C.1.f).
pub type BackgroundAction = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

#[derive(Default)]
pub struct NodeOutcome {
    pub background_actions: Vec<BackgroundAction>,
}

impl NodeOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_background(actions: Vec<BackgroundAction>) -> Self {
        Self {
            background_actions: actions,
        }
    }
}

#[async_trait]
pub trait NodeBehavior: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext, io: &dyn PortAccess) -> Result<NodeOutcome>;
}

#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub key: String,
    pub direction: PortDirection,
    pub schema: PortSchema,
}

impl PortDescriptor {
    pub fn new(key: impl Into<String>, direction: PortDirection, schema: PortSchema) -> Self {
        Self {
            key: key.into(),
            direction,
            schema,
        }
    }
}

/// A registered node type: its port shape and a factory producing fresh
/// behavior instances. Descriptors are materialized into arena ports when a
/// flow is hydrated, not discovered by reflecting on a concrete struct.
#[derive(Clone)]
pub struct NodeDescriptor {
    pub node_type: String,
    pub ports: Vec<PortDescriptor>,
    /// A failing node tagged recoverable is skipped rather than aborting
    /// the whole execution (spec §4.C.1.e).
    pub recoverable: bool,
    /// Runs even if every input was itself skipped.
    pub runs_on_any_input: bool,
    pub factory: Arc<dyn Fn() -> Arc<dyn NodeBehavior> + Send + Sync>,
}

/// Constructor-injected collaborator replacing the global node-type
/// singleton; callers build one and hand it to the engine/worker.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    descriptors: HashMap<String, NodeDescriptor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: NodeDescriptor) {
        self.descriptors.insert(descriptor.node_type.clone(), descriptor);
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeDescriptor> {
        self.descriptors.get(node_type)
    }
}
