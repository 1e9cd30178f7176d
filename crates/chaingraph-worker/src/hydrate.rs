//! Hydrates a stored [`FlowSnapshot`] into a live [`FlowArena`] (spec §4.E
//! step 2): materializes each node from its registered descriptor, then
//! wires edges by the node-index positions the snapshot recorded them at.

use crate::error::{Result, WorkerError};
use chaingraph_core::{FlowArena, NodeId, NodeRegistry};
use chaingraph_store::FlowSnapshot;

pub fn hydrate(snapshot: &FlowSnapshot, registry: &NodeRegistry) -> Result<FlowArena> {
    let arena = FlowArena::new(snapshot.flow_id.clone());
    let mut node_ids: Vec<NodeId> = Vec::with_capacity(snapshot.nodes.len());

    for spec in &snapshot.nodes {
        if registry.get(&spec.node_type).is_none() {
            return Err(WorkerError::UnknownNodeType(snapshot.flow_id.clone(), spec.node_type.clone()));
        }
        let node_id = arena.add_node(registry, &spec.node_type, spec.metadata.clone())?;
        node_ids.push(node_id);
    }

    for edge in &snapshot.edges {
        let source = *node_ids
            .get(edge.source_node)
            .ok_or_else(|| WorkerError::BadEdgeIndex(snapshot.flow_id.clone(), edge.source_node))?;
        let target = *node_ids
            .get(edge.target_node)
            .ok_or_else(|| WorkerError::BadEdgeIndex(snapshot.flow_id.clone(), edge.target_node))?;
        arena.connect(source, &edge.source_key, target, &edge.target_key, edge.metadata.clone())?;
    }

    Ok(arena)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_nodes::demo_registry;
    use chaingraph_store::{FlowEdgeSpec, FlowNodeSpec};
    use serde_json::json;

    #[test]
    fn hydrates_nodes_and_edges_in_snapshot_order() {
        let registry = demo_registry();
        let snapshot = FlowSnapshot {
            flow_id: "f1".into(),
            nodes: vec![
                FlowNodeSpec { node_type: "add".into(), metadata: json!({}) },
                FlowNodeSpec { node_type: "add".into(), metadata: json!({}) },
            ],
            edges: vec![FlowEdgeSpec {
                source_node: 0,
                source_key: "output".into(),
                target_node: 1,
                target_key: "a".into(),
                metadata: json!({}),
            }],
        };

        let arena = hydrate(&snapshot, &registry).unwrap();
        assert_eq!(arena.node_count(), 2);
        assert_eq!(arena.all_edges().len(), 1);
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let registry = demo_registry();
        let snapshot = FlowSnapshot {
            flow_id: "f1".into(),
            nodes: vec![FlowNodeSpec { node_type: "nonexistent".into(), metadata: json!({}) }],
            edges: vec![],
        };
        let err = hydrate(&snapshot, &registry).unwrap_err();
        assert!(matches!(err, WorkerError::UnknownNodeType(_, _)));
    }

    #[test]
    fn out_of_range_edge_index_is_rejected() {
        let registry = demo_registry();
        let snapshot = FlowSnapshot {
            flow_id: "f1".into(),
            nodes: vec![FlowNodeSpec { node_type: "add".into(), metadata: json!({}) }],
            edges: vec![FlowEdgeSpec {
                source_node: 0,
                source_key: "output".into(),
                target_node: 7,
                target_key: "a".into(),
                metadata: json!({}),
            }],
        };
        let err = hydrate(&snapshot, &registry).unwrap_err();
        assert!(matches!(err, WorkerError::BadEdgeIndex(_, 7)));
    }
}
