//! The node scheduler (spec §4.C.1): a Kahn's-algorithm-style ready queue
//! over the non-stream subgraph, bounded by `max_concurrency`, with
//! recoverable-node skip propagation, per-node/per-flow timeouts, and
//! supervised background actions.
//!
//! Stream edges never enter the indegree graph — a stream consumer is
//! driven by its own background action subscribing to the port's
//! [`crate::stream::MultiChannel`], so "reopening readiness" from a live
//! background action (spec §4.C.1.a) never applies to this scheduler's
//! ready queue; it only matters for when the execution as a whole may
//! terminate.

use super::debugger::{Debugger, DebuggerState};
use crate::context::ExecutionContext;
use crate::error::{CoreError, Result};
use crate::event::EventType;
use crate::flow::FlowArena;
use crate::ids::NodeId;
use crate::port::PortKind;
use crate::registry::{BackgroundAction, NodeOutcome, PortAccess};
use crate::stream::MultiChannel;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub max_concurrency: usize,
    pub node_timeout_ms: Option<u64>,
    pub flow_timeout_ms: Option<u64>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            node_timeout_ms: None,
            flow_timeout_ms: None,
        }
    }
}

/// Bridges a node's `execute` call to its own ports only, resolved through
/// the arena by (node, key) rather than handing the node arena internals.
struct NodeIo<'a> {
    arena: &'a FlowArena,
    node_id: NodeId,
}

impl PortAccess for NodeIo<'_> {
    fn get_input(&self, key: &str) -> Result<serde_json::Value> {
        let port_id = self
            .arena
            .find_port(self.node_id, key)
            .ok_or_else(|| CoreError::UnknownPort(key.to_string(), self.node_id.to_string()))?;
        self.arena.get_value(port_id)
    }

    fn set_output(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let port_id = self
            .arena
            .find_port(self.node_id, key)
            .ok_or_else(|| CoreError::UnknownPort(key.to_string(), self.node_id.to_string()))?;
        self.arena.set_value(port_id, value)
    }

    fn stream_sender(&self, key: &str) -> Result<MultiChannel<serde_json::Value>> {
        let port_id = self
            .arena
            .find_port(self.node_id, key)
            .ok_or_else(|| CoreError::UnknownPort(key.to_string(), self.node_id.to_string()))?;
        Ok(self.arena.stream_channel(port_id))
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// Runs one execution of a [`FlowArena`] to a terminal status. Not
/// re-entrant: one `Engine` drives exactly one `execute()` call (spec
/// §4.C).
pub struct Engine {
    arena: Arc<FlowArena>,
    debugger: Arc<Debugger>,
    options: ScheduleOptions,
}

impl Engine {
    pub fn new(arena: Arc<FlowArena>, options: ScheduleOptions) -> Self {
        Self {
            arena,
            debugger: Arc::new(Debugger::new()),
            options,
        }
    }

    pub fn debugger(&self) -> Arc<Debugger> {
        self.debugger.clone()
    }

    pub async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        ctx.send_event(EventType::FlowStarted);

        if self.debugger.state() == DebuggerState::Stopped {
            ctx.send_event(EventType::FlowCancelled {
                reason: "stopped by debugger before execution began".to_string(),
            });
            return Err(CoreError::Aborted {
                reason: "stopped by debugger".to_string(),
            });
        }

        let node_ids = self.arena.node_ids();
        let mut indegree: HashMap<NodeId, usize> = node_ids.iter().map(|n| (*n, 0usize)).collect();
        for node_id in &node_ids {
            for edge in self.arena.edges_into(*node_id) {
                if self.arena.port_kind(edge.target_port_id) != Some(PortKind::Stream) {
                    *indegree.get_mut(node_id).unwrap() += 1;
                }
            }
        }
        let total_inputs = indegree.clone();
        let mut skipped_inputs: HashMap<NodeId, usize> = node_ids.iter().map(|n| (*n, 0usize)).collect();
        let mut skipped: HashSet<NodeId> = HashSet::new();

        let mut ready: BTreeSet<NodeId> = indegree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| *n).collect();
        // Nodes with zero inputs and the "runs on any input" flag but no
        // inputs at all are just ordinary sources; the skip check below
        // only fires once a node has at least one (now-skipped) input.
        ready.retain(|n| !skipped.contains(n));

        let mut running: FuturesUnordered<
            std::pin::Pin<Box<dyn std::future::Future<Output = (NodeId, Instant, Result<NodeOutcome>)> + '_>>,
        > = FuturesUnordered::new();
        let mut background: FuturesUnordered<BackgroundAction> = FuturesUnordered::new();

        let flow_deadline = self
            .options
            .flow_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        let mut terminal_error: Option<CoreError> = None;
        let mut cancelling = false;

        'outer: loop {
            if !cancelling {
                while running.len() < self.options.max_concurrency.max(1) {
                    let node_id = match ready.iter().next().copied() {
                        Some(n) => n,
                        None => break,
                    };
                    ready.remove(&node_id);

                    if let Err(e) = self
                        .debugger
                        .gate(node_id, |n| {
                            ctx.send_event(EventType::DebugBreakpointHit { node_id: n.to_string() });
                        })
                        .await
                    {
                        terminal_error = Some(e);
                        cancelling = true;
                        break;
                    }
                    if ctx.is_cancelled() {
                        cancelling = true;
                        break;
                    }

                    ctx.send_event(EventType::NodeStarted {
                        node_id: node_id.to_string(),
                    });
                    let behavior = self
                        .arena
                        .node_behavior(node_id)
                        .expect("materialized node has a behavior");
                    let node_timeout_ms = self.options.node_timeout_ms;
                    let arena = self.arena.as_ref();
                    let start = Instant::now();
                    running.push(Box::pin(async move {
                        let io = NodeIo { arena, node_id };
                        let outcome = match node_timeout_ms {
                            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), behavior.execute(ctx, &io)).await {
                                Ok(r) => r,
                                Err(_) => Err(CoreError::NodeTimeout {
                                    node: node_id.to_string(),
                                    timeout_ms: ms,
                                }),
                            },
                            None => behavior.execute(ctx, &io).await,
                        };
                        (node_id, start, outcome)
                    }));
                }
            }

            if running.is_empty() && background.is_empty() {
                break;
            }

            tokio::select! {
                _ = ctx.cancelled(), if !cancelling => {
                    cancelling = true;
                }
                _ = wait_deadline(flow_deadline), if flow_deadline.is_some() && !cancelling => {
                    terminal_error = Some(CoreError::FlowTimeout { timeout_ms: self.options.flow_timeout_ms.unwrap() });
                    ctx.cancel();
                    cancelling = true;
                }
                Some((node_id, start, outcome)) = running.next(), if !running.is_empty() => {
                    match outcome {
                        Ok(node_outcome) => {
                            for action in node_outcome.background_actions {
                                background.push(action);
                            }
                            self.on_node_completed(ctx, node_id, &mut indegree, &total_inputs, &mut skipped_inputs, &mut skipped, &mut ready);
                            ctx.send_event(EventType::NodeCompleted {
                                node_id: node_id.to_string(),
                                execution_time_ms: start.elapsed().as_millis() as u64,
                            });
                        }
                        Err(e) => {
                            ctx.send_event(EventType::NodeFailed {
                                node_id: node_id.to_string(),
                                reason: e.to_string(),
                            });
                            if self.arena.node_recoverable(node_id) {
                                ctx.send_event(EventType::NodeSkipped { node_id: node_id.to_string() });
                                self.on_node_skipped(node_id, &mut indegree, &total_inputs, &mut skipped_inputs, &mut skipped, &mut ready, ctx);
                            } else {
                                terminal_error = Some(e);
                                ctx.cancel();
                                cancelling = true;
                            }
                        }
                    }
                }
                Some(res) = background.next(), if !background.is_empty() => {
                    if let Err(e) = res {
                        terminal_error = Some(e);
                        ctx.cancel();
                        cancelling = true;
                    }
                }
            }
        }

        if let Some(e) = terminal_error {
            match &e {
                CoreError::Aborted { .. } => {
                    ctx.send_event(EventType::FlowCancelled { reason: e.to_string() });
                }
                _ => {
                    ctx.send_event(EventType::FlowFailed {
                        reason: e.to_string(),
                        code: None,
                    });
                }
            }
            return Err(e);
        }
        if cancelling {
            let reason = "execution cancelled".to_string();
            ctx.send_event(EventType::FlowCancelled { reason: reason.clone() });
            return Err(CoreError::Aborted { reason });
        }
        ctx.send_event(EventType::FlowCompleted { reason: None });
        Ok(())
    }

    /// A node completed normally: propagate its outputs and free its
    /// successors' dependency count (spec §4.C.1.d).
    fn on_node_completed(
        &self,
        ctx: &ExecutionContext,
        node_id: NodeId,
        indegree: &mut HashMap<NodeId, usize>,
        total_inputs: &HashMap<NodeId, usize>,
        skipped_inputs: &mut HashMap<NodeId, usize>,
        skipped: &mut HashSet<NodeId>,
        ready: &mut BTreeSet<NodeId>,
    ) {
        for edge in self.arena.edges_from(node_id) {
            ctx.send_event(EventType::EdgeTransferStarted {
                edge_id: edge.id.to_string(),
            });
            match self.arena.propagate(&edge) {
                Ok(()) => {
                    ctx.send_event(EventType::EdgeTransferCompleted {
                        edge_id: edge.id.to_string(),
                    });
                }
                Err(e) => {
                    ctx.send_event(EventType::EdgeTransferFailed {
                        edge_id: edge.id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            self.release_dependency(edge.target_node_id, indegree, total_inputs, skipped_inputs, skipped, ready, ctx);
        }
    }

    /// A recoverable node failed: mark it skipped and cascade skip status
    /// to any successor whose every input is now itself skipped, unless
    /// that successor declared "runs on any input" (spec §4.C.1.e).
    fn on_node_skipped(
        &self,
        node_id: NodeId,
        indegree: &mut HashMap<NodeId, usize>,
        total_inputs: &HashMap<NodeId, usize>,
        skipped_inputs: &mut HashMap<NodeId, usize>,
        skipped: &mut HashSet<NodeId>,
        ready: &mut BTreeSet<NodeId>,
        ctx: &ExecutionContext,
    ) {
        skipped.insert(node_id);
        for edge in self.arena.edges_from(node_id) {
            *skipped_inputs.entry(edge.target_node_id).or_insert(0) += 1;
            self.release_dependency(edge.target_node_id, indegree, total_inputs, skipped_inputs, skipped, ready, ctx);
        }
    }

    /// Decrement `target`'s indegree and, once it reaches zero, decide
    /// whether it becomes ready or is itself skipped; cascades through a
    /// work queue so a long skip chain never recurses.
    fn release_dependency(
        &self,
        target: NodeId,
        indegree: &mut HashMap<NodeId, usize>,
        total_inputs: &HashMap<NodeId, usize>,
        skipped_inputs: &mut HashMap<NodeId, usize>,
        skipped: &mut HashSet<NodeId>,
        ready: &mut BTreeSet<NodeId>,
        ctx: &ExecutionContext,
    ) {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(target);
        while let Some(node_id) = queue.pop_front() {
            if skipped.contains(&node_id) || ready.contains(&node_id) {
                continue;
            }
            let deg = indegree.get_mut(&node_id).map(|d| {
                *d = d.saturating_sub(1);
                *d
            });
            let Some(0) = deg else { continue };

            let total = *total_inputs.get(&node_id).unwrap_or(&0);
            let skipped_count = *skipped_inputs.get(&node_id).unwrap_or(&0);
            let all_inputs_skipped = total > 0 && skipped_count >= total;
            if all_inputs_skipped && !self.arena.node_runs_on_any_input(node_id) {
                skipped.insert(node_id);
                ctx.send_event(EventType::NodeSkipped {
                    node_id: node_id.to_string(),
                });
                for edge in self.arena.edges_from(node_id) {
                    *skipped_inputs.entry(edge.target_node_id).or_insert(0) += 1;
                    queue.push_back(edge.target_node_id);
                }
            } else {
                ready.insert(node_id);
            }
        }
    }
}
