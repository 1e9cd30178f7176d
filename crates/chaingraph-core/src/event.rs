//! The execution event log (spec §3 Event, §4.C.4 event ordering).
//!
//! Every event carries a dense, per-execution monotone `index`; consumers
//! may rely on strict total order within one execution and no order
//! guarantee across executions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventType {
    #[serde(rename = "FLOW_SUBSCRIBED")]
    FlowSubscribed,
    #[serde(rename = "FLOW_STARTED")]
    FlowStarted,
    #[serde(rename = "FLOW_PAUSED")]
    FlowPaused,
    #[serde(rename = "FLOW_RESUMED")]
    FlowResumed,
    #[serde(rename = "FLOW_COMPLETED")]
    FlowCompleted { reason: Option<String> },
    #[serde(rename = "FLOW_FAILED")]
    FlowFailed { reason: String, code: Option<String> },
    #[serde(rename = "FLOW_CANCELLED")]
    FlowCancelled { reason: String },
    #[serde(rename = "NODE_STARTED")]
    NodeStarted { node_id: String },
    #[serde(rename = "NODE_COMPLETED")]
    NodeCompleted { node_id: String, execution_time_ms: u64 },
    #[serde(rename = "NODE_FAILED")]
    NodeFailed { node_id: String, reason: String },
    #[serde(rename = "NODE_SKIPPED")]
    NodeSkipped { node_id: String },
    #[serde(rename = "NODE_STATUS_CHANGED")]
    NodeStatusChanged { node_id: String, status: String },
    #[serde(rename = "NODE_DEBUG_LOG_STRING")]
    NodeDebugLogString { node_id: String, message: String },
    #[serde(rename = "EDGE_TRANSFER_STARTED")]
    EdgeTransferStarted { edge_id: String },
    #[serde(rename = "EDGE_TRANSFER_COMPLETED")]
    EdgeTransferCompleted { edge_id: String },
    #[serde(rename = "EDGE_TRANSFER_FAILED")]
    EdgeTransferFailed { edge_id: String, reason: String },
    #[serde(rename = "DEBUG_BREAKPOINT_HIT")]
    DebugBreakpointHit { node_id: String },
}

impl EventType {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventType::FlowCompleted { .. } | EventType::FlowFailed { .. } | EventType::FlowCancelled { .. }
        )
    }
}

/// A single event in an execution's totally-ordered log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub execution_id: String,
    pub index: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub data: EventType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trips_through_json() {
        let ev = Event {
            execution_id: "exec-1".into(),
            index: 3,
            timestamp: chrono::Utc::now(),
            data: EventType::NodeCompleted {
                node_id: "a".into(),
                execution_time_ms: 12,
            },
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.execution_id, ev.execution_id);
        assert_eq!(back.index, ev.index);
        assert_eq!(back.data, ev.data);
    }

    #[test]
    fn terminal_events_are_identified() {
        assert!(EventType::FlowCompleted { reason: None }.is_terminal());
        assert!(EventType::FlowFailed { reason: "x".into(), code: None }.is_terminal());
        assert!(EventType::FlowCancelled { reason: "x".into() }.is_terminal());
        assert!(!EventType::NodeStarted { node_id: "a".into() }.is_terminal());
    }
}
