//! The flow arena: an index-addressed owner of nodes, ports, and edges.
//!
//! Replaces cyclic `Rc`/`RefCell` cross-references between flow, node, edge,
//! and port with an arena + small integer ids, per the redesign note. The
//! Engine exclusively borrows the arena for one execution's lifetime;
//! structural changes (adding a node, materializing a child port) take the
//! arena-wide lock, while port value reads/writes only ever lock the one
//! port involved, so concurrent nodes writing distinct ports never
//! contend with each other.

use crate::error::{CoreError, Result};
use crate::ids::{EdgeId, NodeId, PortId};
use crate::port::{Port, PortDirection, PortKind, PortSchema};
use crate::registry::{NodeBehavior, NodeDescriptor, NodeRegistry};
use crate::stream::MultiChannel;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Stream-port buffer defaults (spec §4.A.1): bounded capacity with a
/// slow-consumer lag threshold, independent of the capacity block.
const STREAM_BUFFER_CAPACITY: usize = 256;
const STREAM_MAX_LAG: u64 = 1024;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub source_port_id: PortId,
    pub target_node_id: NodeId,
    pub target_port_id: PortId,
    pub metadata: serde_json::Value,
}

pub struct NodeRecord {
    pub id: NodeId,
    pub node_type: String,
    pub metadata: serde_json::Value,
    pub port_ids: Vec<PortId>,
    pub recoverable: bool,
    pub runs_on_any_input: bool,
    pub behavior: Arc<dyn NodeBehavior>,
}

struct ArenaInner {
    flow_id: String,
    nodes: Vec<NodeRecord>,
    ports: Vec<Mutex<Port>>,
    edges: Vec<Edge>,
    port_index: HashMap<(NodeId, String), PortId>,
    stream_channels: HashMap<PortId, MultiChannel<serde_json::Value>>,
}

/// Immutable-per-execution snapshot of nodes/edges. Loaded once when a
/// worker hydrates a flow; further mutations (during authoring) produce a
/// new snapshot elsewhere and are out of scope here (spec §3 Flow).
pub struct FlowArena {
    inner: RwLock<ArenaInner>,
}

impl FlowArena {
    pub fn new(flow_id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(ArenaInner {
                flow_id: flow_id.into(),
                nodes: Vec::new(),
                ports: Vec::new(),
                edges: Vec::new(),
                port_index: HashMap::new(),
                stream_channels: HashMap::new(),
            }),
        }
    }

    /// The live stream channel backing a `Stream`-kind port, created lazily
    /// on first access and shared by every producer/consumer of the port
    /// thereafter (spec §4.A.1).
    pub fn stream_channel(&self, port_id: PortId) -> MultiChannel<serde_json::Value> {
        {
            let inner = self.inner.read();
            if let Some(ch) = inner.stream_channels.get(&port_id) {
                return ch.clone();
            }
        }
        let mut inner = self.inner.write();
        inner
            .stream_channels
            .entry(port_id)
            .or_insert_with(|| MultiChannel::new(STREAM_BUFFER_CAPACITY, STREAM_MAX_LAG))
            .clone()
    }

    pub fn flow_id(&self) -> String {
        self.inner.read().flow_id.clone()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Materialize a node from a registered descriptor: allocates its
    /// ports up front from the descriptor's static schema (no reflection).
    pub fn add_node(&self, registry: &NodeRegistry, node_type: &str, metadata: serde_json::Value) -> Result<NodeId> {
        let descriptor = registry
            .get(node_type)
            .ok_or_else(|| CoreError::UnknownNode(node_type.to_string()))?
            .clone();
        let behavior = (descriptor.factory)();
        let mut inner = self.inner.write();
        let node_id = NodeId::from(inner.nodes.len());
        let mut port_ids = Vec::with_capacity(descriptor.ports.len());
        for pd in &descriptor.ports {
            let port_id = PortId::from(inner.ports.len());
            let port = Port::new(port_id, pd.key.clone(), node_id, pd.direction, pd.schema.clone());
            inner.ports.push(Mutex::new(port));
            inner.port_index.insert((node_id, pd.key.clone()), port_id);
            port_ids.push(port_id);
        }
        inner.nodes.push(NodeRecord {
            id: node_id,
            node_type: node_type.to_string(),
            metadata,
            port_ids,
            recoverable: descriptor.recoverable,
            runs_on_any_input: descriptor.runs_on_any_input,
            behavior,
        });
        Ok(node_id)
    }

    pub fn find_port(&self, node_id: NodeId, key: &str) -> Option<PortId> {
        self.inner.read().port_index.get(&(node_id, key.to_string())).copied()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.read().nodes.iter().map(|n| n.id).collect()
    }

    pub fn node_type(&self, node_id: NodeId) -> Option<String> {
        self.inner.read().nodes.get(node_id.index()).map(|n| n.node_type.clone())
    }

    pub fn node_recoverable(&self, node_id: NodeId) -> bool {
        self.inner
            .read()
            .nodes
            .get(node_id.index())
            .map(|n| n.recoverable)
            .unwrap_or(false)
    }

    pub fn node_runs_on_any_input(&self, node_id: NodeId) -> bool {
        self.inner
            .read()
            .nodes
            .get(node_id.index())
            .map(|n| n.runs_on_any_input)
            .unwrap_or(false)
    }

    pub fn node_behavior(&self, node_id: NodeId) -> Option<Arc<dyn NodeBehavior>> {
        self.inner.read().nodes.get(node_id.index()).map(|n| n.behavior.clone())
    }

    pub fn node_port_ids(&self, node_id: NodeId) -> Vec<PortId> {
        self.inner
            .read()
            .nodes
            .get(node_id.index())
            .map(|n| n.port_ids.clone())
            .unwrap_or_default()
    }

    pub fn port_snapshot(&self, port_id: PortId) -> Option<Port> {
        self.inner.read().ports.get(port_id.index()).map(|p| p.lock().clone())
    }

    pub fn port_key(&self, port_id: PortId) -> Option<String> {
        self.inner.read().ports.get(port_id.index()).map(|p| p.lock().key.clone())
    }

    pub fn get_value(&self, port_id: PortId) -> Result<serde_json::Value> {
        let inner = self.inner.read();
        let port = inner
            .ports
            .get(port_id.index())
            .ok_or_else(|| CoreError::UnknownPort(port_id.to_string(), String::new()))?;
        Ok(port.lock().value.clone())
    }

    pub fn set_value(&self, port_id: PortId, value: serde_json::Value) -> Result<()> {
        let inner = self.inner.read();
        let port = inner
            .ports
            .get(port_id.index())
            .ok_or_else(|| CoreError::UnknownPort(port_id.to_string(), String::new()))?;
        port.lock().set_value(value)
    }

    pub fn set_config(&self, port_id: PortId, schema: PortSchema) -> Result<()> {
        let inner = self.inner.read();
        let port = inner
            .ports
            .get(port_id.index())
            .ok_or_else(|| CoreError::UnknownPort(port_id.to_string(), String::new()))?;
        port.lock().set_config(schema);
        Ok(())
    }

    /// Materialize a child port under `parent_id` (object property / array
    /// item / `any`-port binding). Reuses the existing child if one with
    /// the same key already exists and its schema shape is unchanged.
    pub fn ensure_child_port(&self, parent_id: PortId, key: &str, schema: PortSchema) -> Result<PortId> {
        let mut inner = self.inner.write();
        let (node_id, direction) = {
            let parent = inner
                .ports
                .get(parent_id.index())
                .ok_or_else(|| CoreError::UnknownPort(parent_id.to_string(), String::new()))?
                .lock();
            (parent.node_id, parent.direction)
        };
        let composite_key = format!("{}.{}", inner.ports[parent_id.index()].lock().key, key);
        if let Some(existing) = inner.port_index.get(&(node_id, composite_key.clone())).copied() {
            let mut p = inner.ports[existing.index()].lock();
            if p.schema.kind == schema.kind {
                return Ok(existing);
            }
            p.set_config(schema);
            return Ok(existing);
        }
        let port_id = PortId::from(inner.ports.len());
        let mut port = Port::new(port_id, composite_key.clone(), node_id, direction, schema);
        port.parent_id = Some(parent_id);
        inner.ports.push(Mutex::new(port));
        inner.port_index.insert((node_id, composite_key), port_id);
        inner.nodes[node_id.index()].port_ids.push(port_id);
        Ok(port_id)
    }

    /// Remove a synthesized child port (e.g. clearing an `any` port's
    /// materialized children on disconnection). The slot is tombstoned
    /// rather than physically removed so existing `PortId`s stay valid.
    pub fn remove_child_port(&self, port_id: PortId) {
        let mut inner = self.inner.write();
        if let Some(p) = inner.ports.get(port_id.index()) {
            let (node_id, key) = {
                let guard = p.lock();
                (guard.node_id, guard.key.clone())
            };
            inner.port_index.remove(&(node_id, key));
            if let Some(rec) = inner.nodes.get_mut(node_id.index()) {
                rec.port_ids.retain(|p| *p != port_id);
            }
        }
    }

    /// Bind an `any` port to a peer's resolved schema, propagating to
    /// downstream `any` ports transitively (spec §4.A.2). Returns the set
    /// of ports whose schema changed, so callers can emit port-update
    /// events for each.
    pub fn bind_any_port(&self, any_port_id: PortId, underlying: PortSchema) -> Vec<PortId> {
        let mut changed = Vec::new();
        let mut frontier = vec![(any_port_id, underlying)];
        while let Some((port_id, schema)) = frontier.pop() {
            let connections = {
                let inner = self.inner.read();
                let mut port = match inner.ports.get(port_id.index()) {
                    Some(p) => p.lock(),
                    None => continue,
                };
                if port.schema.kind != PortKind::Any {
                    continue;
                }
                port.bind_any(schema.clone());
                port.connections.clone()
            };
            changed.push(port_id);
            for edge_id in connections {
                if let Some(edge) = self.inner.read().edges.get(edge_id.index()).cloned() {
                    let downstream = if edge.source_port_id == port_id {
                        edge.target_port_id
                    } else if edge.target_port_id == port_id {
                        edge.source_port_id
                    } else {
                        continue;
                    };
                    let is_any = self
                        .inner
                        .read()
                        .ports
                        .get(downstream.index())
                        .map(|p| p.lock().schema.kind == PortKind::Any)
                        .unwrap_or(false);
                    if is_any {
                        frontier.push((downstream, schema.clone()));
                    }
                }
            }
        }
        changed
    }

    pub fn unbind_any_port(&self, any_port_id: PortId) -> Vec<PortId> {
        let inner = self.inner.read();
        let children: Vec<PortId> = inner
            .ports
            .iter()
            .enumerate()
            .filter(|(_, p)| p.lock().parent_id == Some(any_port_id))
            .map(|(i, _)| PortId::from(i))
            .collect();
        if let Some(p) = inner.ports.get(any_port_id.index()) {
            p.lock().unbind_any();
        }
        drop(inner);
        for child in &children {
            self.remove_child_port(*child);
        }
        children
    }

    /// Connect a source output to a target input, validating type
    /// compatibility, cardinality, and acyclicity over non-stream edges
    /// (spec §3 Edge invariants).
    pub fn connect(
        &self,
        source_node: NodeId,
        source_key: &str,
        target_node: NodeId,
        target_key: &str,
        metadata: serde_json::Value,
    ) -> Result<EdgeId> {
        let mut inner = self.inner.write();
        let source_port_id = *inner
            .port_index
            .get(&(source_node, source_key.to_string()))
            .ok_or_else(|| CoreError::UnknownPort(source_key.to_string(), source_node.to_string()))?;
        let target_port_id = *inner
            .port_index
            .get(&(target_node, target_key.to_string()))
            .ok_or_else(|| CoreError::UnknownPort(target_key.to_string(), target_node.to_string()))?;

        let (source_schema, target_schema, target_kind) = {
            let sp = inner.ports[source_port_id.index()].lock();
            let tp = inner.ports[target_port_id.index()].lock();
            (sp.schema.clone(), tp.schema.clone(), tp.schema.kind)
        };
        if !source_schema.compatible_with(&target_schema) {
            return Err(CoreError::TypeMismatch {
                port: target_key.to_string(),
                expected: format!("{:?}", target_schema.kind),
                actual: format!("{:?}", source_schema.kind),
            });
        }

        let allows_multiple = matches!(target_kind, PortKind::Stream | PortKind::Object | PortKind::Array);
        if !allows_multiple {
            let tp = inner.ports[target_port_id.index()].lock();
            if !tp.connections.is_empty() {
                return Err(CoreError::CardinalityViolation {
                    port: target_key.to_string(),
                });
            }
        }

        if target_kind != PortKind::Stream {
            self.would_cycle(&inner, source_port_id, target_port_id)?;
        }

        let edge_id = EdgeId::from(inner.edges.len());
        inner.edges.push(Edge {
            id: edge_id,
            source_node_id: source_node,
            source_port_id,
            target_node_id: target_node,
            target_port_id,
            metadata,
        });
        inner.ports[source_port_id.index()].lock().connections.push(edge_id);
        inner.ports[target_port_id.index()].lock().connections.push(edge_id);
        Ok(edge_id)
    }

    /// Kahn's algorithm over the non-stream-edge subgraph, assuming the
    /// candidate edge is already present: if the resulting in-degree map
    /// does not drain to zero, the edge would introduce a cycle.
    fn would_cycle(&self, inner: &ArenaInner, candidate_source: PortId, candidate_target: PortId) -> Result<()> {
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut indegree: HashMap<NodeId, usize> = inner.nodes.iter().map(|n| (n.id, 0)).collect();

        let mut add_edge = |from: NodeId, to: NodeId, indegree: &mut HashMap<NodeId, usize>| {
            adjacency.entry(from).or_default().push(to);
            *indegree.entry(to).or_insert(0) += 1;
        };

        for edge in &inner.edges {
            let target_kind = inner.ports[edge.target_port_id.index()].lock().schema.kind;
            if target_kind == PortKind::Stream {
                continue;
            }
            add_edge(edge.source_node_id, edge.target_node_id, &mut indegree);
        }
        let source_node = inner.ports[candidate_source.index()].lock().node_id;
        let target_node = inner.ports[candidate_target.index()].lock().node_id;
        add_edge(source_node, target_node, &mut indegree);

        let mut queue: VecDeque<NodeId> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut visited = 0usize;
        let mut seen: HashSet<NodeId> = HashSet::new();
        while let Some(n) = queue.pop_front() {
            if !seen.insert(n) {
                continue;
            }
            visited += 1;
            if let Some(succs) = adjacency.get(&n) {
                for succ in succs {
                    let deg = indegree.get_mut(succ).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*succ);
                    }
                }
            }
        }
        if visited < indegree.len() {
            let through = inner
                .nodes
                .iter()
                .find(|n| n.id == target_node)
                .map(|n| n.node_type.clone())
                .unwrap_or_else(|| target_node.to_string());
            return Err(CoreError::CycleDetected { through });
        }
        Ok(())
    }

    pub fn edges_from(&self, node_id: NodeId) -> Vec<Edge> {
        self.inner
            .read()
            .edges
            .iter()
            .filter(|e| e.source_node_id == node_id)
            .cloned()
            .collect()
    }

    pub fn edges_into(&self, node_id: NodeId) -> Vec<Edge> {
        self.inner
            .read()
            .edges
            .iter()
            .filter(|e| e.target_node_id == node_id)
            .cloned()
            .collect()
    }

    pub fn all_edges(&self) -> Vec<Edge> {
        self.inner.read().edges.clone()
    }

    pub fn port_kind(&self, port_id: PortId) -> Option<PortKind> {
        self.inner.read().ports.get(port_id.index()).map(|p| p.lock().schema.kind)
    }

    /// Copy a value across a non-stream edge: deep-clone assignment via
    /// [`Self::set_value`] (spec §4.A `propagate`).
    pub fn propagate(&self, edge: &Edge) -> Result<()> {
        let value = self.get_value(edge.source_port_id)?;
        self.set_value(edge.target_port_id, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::registry::{NodeOutcome, PortAccess};
    use async_trait::async_trait;

    struct NoopNode;
    #[async_trait]
    impl NodeBehavior for NoopNode {
        async fn execute(&self, _ctx: &ExecutionContext, _io: &dyn PortAccess) -> Result<NodeOutcome> {
            Ok(NodeOutcome::empty())
        }
    }

    fn registry_with_add_like_node() -> NodeRegistry {
        let mut reg = NodeRegistry::new();
        reg.register(NodeDescriptor {
            node_type: "noop".into(),
            ports: vec![
                crate::registry::PortDescriptor::new("input", PortDirection::Input, PortSchema::scalar(PortKind::Number)),
                crate::registry::PortDescriptor::new("output", PortDirection::Output, PortSchema::scalar(PortKind::Number)),
            ],
            recoverable: false,
            runs_on_any_input: false,
            factory: Arc::new(|| Arc::new(NoopNode)),
        });
        reg
    }

    #[test]
    fn connect_rejects_self_cycle() {
        let registry = registry_with_add_like_node();
        let arena = FlowArena::new("f1");
        let a = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        arena.connect(a, "output", a, "input", serde_json::json!({})).unwrap();
        let err = arena.connect(a, "output", a, "input", serde_json::json!({}));
        // second identical edge hits cardinality first since input already has a connection
        assert!(err.is_err());
    }

    #[test]
    fn connect_rejects_cycle_across_two_nodes() {
        let registry = registry_with_add_like_node();
        let arena = FlowArena::new("f1");
        let a = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        let b = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        arena.connect(a, "output", b, "input", serde_json::json!({})).unwrap();
        let err = arena.connect(b, "output", a, "input", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, CoreError::CycleDetected { .. }));
    }

    #[test]
    fn cardinality_rejects_second_edge_into_scalar_input() {
        let registry = registry_with_add_like_node();
        let arena = FlowArena::new("f1");
        let a = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        let b = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        let c = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        arena.connect(a, "output", c, "input", serde_json::json!({})).unwrap();
        let err = arena.connect(b, "output", c, "input", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, CoreError::CardinalityViolation { .. }));
    }

    #[test]
    fn propagate_copies_value_across_edge() {
        let registry = registry_with_add_like_node();
        let arena = FlowArena::new("f1");
        let a = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        let b = arena.add_node(&registry, "noop", serde_json::json!({})).unwrap();
        let edge_id = arena.connect(a, "output", b, "input", serde_json::json!({})).unwrap();
        let out_port = arena.find_port(a, "output").unwrap();
        arena.set_value(out_port, serde_json::json!(42)).unwrap();
        let edge = arena.all_edges().into_iter().find(|e| e.id == edge_id).unwrap();
        arena.propagate(&edge).unwrap();
        let in_port = arena.find_port(b, "input").unwrap();
        assert_eq!(arena.get_value(in_port).unwrap(), serde_json::json!(42));
    }
}
