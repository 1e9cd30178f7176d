//! A tiny built-in node registry for running the worker binary standalone.
//!
//! Concrete node implementations (HTTP, LLM calls, crypto, ...) are out of
//! scope for the execution core (spec §1); a production deployment injects
//! its own [`NodeRegistry`] built from the node catalog. This module exists
//! only so `chaingraph-worker` has something to execute without that
//! catalog wired in, mirroring the `add` fixture node chaingraph-core's own
//! scheduler tests use.

use async_trait::async_trait;
use chaingraph_core::{
    ExecutionContext, NodeBehavior, NodeDescriptor, NodeOutcome, NodeRegistry, PortAccess, PortDescriptor,
    PortDirection, PortKind, PortSchema, Result,
};
use serde_json::json;
use std::sync::Arc;

struct AddNode;

#[async_trait]
impl NodeBehavior for AddNode {
    async fn execute(&self, _ctx: &ExecutionContext, io: &dyn PortAccess) -> Result<NodeOutcome> {
        let a = io.get_input("a")?.as_f64().unwrap_or(0.0);
        let b = io.get_input("b")?.as_f64().unwrap_or(0.0);
        io.set_output("output", json!(a + b))?;
        Ok(NodeOutcome::empty())
    }
}

struct PassthroughNode;

#[async_trait]
impl NodeBehavior for PassthroughNode {
    async fn execute(&self, _ctx: &ExecutionContext, io: &dyn PortAccess) -> Result<NodeOutcome> {
        let value = io.get_input("input")?;
        io.set_output("output", value)?;
        Ok(NodeOutcome::empty())
    }
}

/// Registers the `add` and `passthrough` demo node types.
pub fn demo_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(NodeDescriptor {
        node_type: "add".into(),
        ports: vec![
            PortDescriptor::new("a", PortDirection::Input, PortSchema::scalar(PortKind::Number)),
            PortDescriptor::new("b", PortDirection::Input, PortSchema::scalar(PortKind::Number)),
            PortDescriptor::new("output", PortDirection::Output, PortSchema::scalar(PortKind::Number)),
        ],
        recoverable: false,
        runs_on_any_input: false,
        factory: Arc::new(|| Arc::new(AddNode)),
    });
    registry.register(NodeDescriptor {
        node_type: "passthrough".into(),
        ports: vec![
            PortDescriptor::new("input", PortDirection::Input, PortSchema::scalar(PortKind::Any)),
            PortDescriptor::new("output", PortDirection::Output, PortSchema::scalar(PortKind::Any)),
        ],
        recoverable: true,
        runs_on_any_input: false,
        factory: Arc::new(|| Arc::new(PassthroughNode)),
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_both_demo_node_types() {
        let registry = demo_registry();
        assert!(registry.get("add").is_some());
        assert!(registry.get("passthrough").is_some());
        assert!(registry.get("nonexistent").is_none());
    }
}
