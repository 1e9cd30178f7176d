//! Read-only flow introspection: node/edge listing and topological layers.
//!
//! Diagnostic only — nothing here feeds back into scheduling. Grounded on
//! the same shape as a compiled-graph metadata dump, adapted to arena ids
//! instead of name-keyed nodes.

use crate::flow::{Edge, FlowArena};
use crate::ids::NodeId;
use crate::port::PortDirection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSummary {
    pub key: String,
    pub direction: PortDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: NodeId,
    pub node_type: String,
    pub recoverable: bool,
    pub runs_on_any_input: bool,
    pub ports: Vec<PortSummary>,
}

/// A flow's structure as seen from the outside: every node and edge, plus
/// the non-stream topological layers the scheduler would run them in at
/// unbounded concurrency. Stream edges never gate a layer, same as they
/// never gate scheduling (spec §4.C.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDescription {
    pub flow_id: String,
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<Edge>,
    pub layers: Vec<Vec<NodeId>>,
}

impl FlowArena {
    pub fn describe(&self) -> FlowDescription {
        let node_ids = self.node_ids();
        let nodes = node_ids
            .iter()
            .map(|&node_id| NodeSummary {
                node_id,
                node_type: self.node_type(node_id).unwrap_or_default(),
                recoverable: self.node_recoverable(node_id),
                runs_on_any_input: self.node_runs_on_any_input(node_id),
                ports: self
                    .node_port_ids(node_id)
                    .into_iter()
                    .filter_map(|port_id| {
                        let key = self.port_key(port_id)?;
                        let direction = self.port_snapshot(port_id)?.direction;
                        Some(PortSummary { key, direction })
                    })
                    .collect(),
            })
            .collect();
        let edges = self.all_edges();
        let layers = self.topological_layers(&node_ids, &edges);
        FlowDescription { flow_id: self.flow_id(), nodes, edges, layers }
    }

    fn topological_layers(&self, node_ids: &[NodeId], edges: &[Edge]) -> Vec<Vec<NodeId>> {
        let mut indegree: HashMap<NodeId, u32> = node_ids.iter().map(|&n| (n, 0)).collect();
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in edges {
            if self.port_kind(edge.target_port_id) == Some(crate::port::PortKind::Stream) {
                continue;
            }
            *indegree.entry(edge.target_node_id).or_insert(0) += 1;
            dependents.entry(edge.source_node_id).or_default().push(edge.target_node_id);
        }

        let mut frontier: VecDeque<NodeId> =
            node_ids.iter().copied().filter(|n| indegree[n] == 0).collect();
        let mut layers = Vec::new();
        while !frontier.is_empty() {
            let layer: Vec<NodeId> = frontier.drain(..).collect();
            for &node_id in &layer {
                for &next in dependents.get(&node_id).into_iter().flatten() {
                    let entry = indegree.get_mut(&next).expect("edge target always in indegree map");
                    *entry -= 1;
                    if *entry == 0 {
                        frontier.push_back(next);
                    }
                }
            }
            layers.push(layer);
        }
        layers
    }
}
