//! The debugger gate: a synchronization barrier the scheduler passes
//! before invoking a node (spec §4.C.2).
//!
//! `Stepping` is modeled as a pause with a small credit of pending
//! releases: `step()` grants one credit, the next node to reach the gate
//! consumes it and proceeds, and the gate re-engages (credit back to zero)
//! immediately afterwards — matching "release on continue/step" in the
//! state table without waking every blocked node for a single step.

use crate::error::{CoreError, Result};
use crate::ids::NodeId;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    Running,
    /// Blocked at the gate; `pending` is the number of nodes still allowed
    /// to pass before re-blocking (0 while plain-paused).
    Paused { pending: u32 },
    Stopped,
}

struct Inner {
    state: DebuggerState,
    breakpoints: HashSet<NodeId>,
}

/// Shared controller the scheduler consults at every `gate(node)` call and
/// the client drives via `addBreakpoint`/`pause`/`continue`/`step`/`stop`.
pub struct Debugger {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: DebuggerState::Running,
                breakpoints: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn add_breakpoint(&self, node_id: NodeId) {
        self.inner.lock().breakpoints.insert(node_id);
    }

    pub fn remove_breakpoint(&self, node_id: NodeId) {
        self.inner.lock().breakpoints.remove(&node_id);
    }

    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state == DebuggerState::Running {
            inner.state = DebuggerState::Paused { pending: 0 };
        }
    }

    pub fn continue_(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, DebuggerState::Paused { .. }) {
            inner.state = DebuggerState::Running;
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn step(&self) {
        let mut inner = self.inner.lock();
        if let DebuggerState::Paused { pending } = &mut inner.state {
            *pending += 1;
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.state = DebuggerState::Stopped;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn state(&self) -> DebuggerState {
        self.inner.lock().state
    }

    /// Block until the scheduler may invoke `node_id`. `on_hit` fires
    /// (outside any lock) exactly once if this call transitions the
    /// controller into a breakpoint pause, so the caller can emit
    /// `DEBUG_BREAKPOINT_HIT`.
    pub async fn gate(&self, node_id: NodeId, on_hit: impl Fn(NodeId)) -> Result<()> {
        loop {
            enum Step {
                Proceed,
                Abort,
                HitAndWait,
                Wait,
            }
            let step = {
                let mut inner = self.inner.lock();
                match inner.state {
                    DebuggerState::Stopped => Step::Abort,
                    DebuggerState::Running => {
                        if inner.breakpoints.contains(&node_id) {
                            inner.state = DebuggerState::Paused { pending: 0 };
                            Step::HitAndWait
                        } else {
                            Step::Proceed
                        }
                    }
                    DebuggerState::Paused { ref mut pending } => {
                        if *pending > 0 {
                            *pending -= 1;
                            Step::Proceed
                        } else {
                            Step::Wait
                        }
                    }
                }
            };
            match step {
                Step::Proceed => return Ok(()),
                Step::Abort => {
                    return Err(CoreError::Aborted {
                        reason: "stopped by debugger".to_string(),
                    })
                }
                Step::HitAndWait => {
                    on_hit(node_id);
                    self.notify.notified().await;
                }
                Step::Wait => {
                    self.notify.notified().await;
                }
            }
        }
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}
