//! The `Execution` record and its status lifecycle (spec §3 Execution):
//!
//! ```text
//! IDLE -> CREATING -> CREATED -> RUNNING <-> PAUSED -> COMPLETED | FAILED | STOPPED
//! ```
//!
//! `RESTARTED` is a distinct terminal recorded on a previous attempt when a
//! worker re-claims a stale-leased `RUNNING` execution (spec §4.E).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Idle,
    Creating,
    Created,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
    Restarted,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped | ExecutionStatus::Restarted
        )
    }

    /// Whether `self -> next` is a legal edge in the lifecycle graph above.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Idle, Creating)
                | (Creating, Created)
                | (Created, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Stopped)
                | (Paused, Stopped)
                | (Created, Stopped)
                | (Creating, Stopped)
                | (Running, Restarted)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub flow_id: String,
    pub status: ExecutionStatus,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<String>,
    pub context: serde_json::Value,
    pub breakpoints: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ExecutionRecord {
    pub fn new(id: impl Into<String>, flow_id: impl Into<String>, parent_execution_id: Option<String>, depth: u32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            flow_id: flow_id.into(),
            status: ExecutionStatus::Idle,
            depth,
            parent_execution_id,
            context: serde_json::json!({}),
            breakpoints: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A flow definition as loaded by `loadFlow` (spec §4.G): the node/edge
/// description a worker hydrates into a [`chaingraph_core::FlowArena`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub flow_id: String,
    pub nodes: Vec<FlowNodeSpec>,
    pub edges: Vec<FlowEdgeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNodeSpec {
    pub node_type: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdgeSpec {
    pub source_node: usize,
    pub source_key: String,
    pub target_node: usize,
    pub target_key: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_reject_further_transitions() {
        assert!(!ExecutionStatus::Completed.can_transition_to(ExecutionStatus::Running));
        assert!(!ExecutionStatus::Stopped.can_transition_to(ExecutionStatus::Running));
    }

    #[test]
    fn running_can_pause_and_resume() {
        assert!(ExecutionStatus::Running.can_transition_to(ExecutionStatus::Paused));
        assert!(ExecutionStatus::Paused.can_transition_to(ExecutionStatus::Running));
    }

    #[test]
    fn idle_cannot_jump_to_running() {
        assert!(!ExecutionStatus::Idle.can_transition_to(ExecutionStatus::Running));
    }
}
