//! Wire shapes for the three logical topics (spec §4.D, §6). All payloads
//! carry a schema version so a future incompatible change can be detected
//! by consumers before they try to decode the rest of the frame.

use chaingraph_core::EventType;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    Create,
    Start,
    Stop,
    Pause,
    Resume,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPayloadBody {
    pub flow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ExecutionOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_events: Option<Vec<ExternalEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_depth: Option<u32>,
}

/// Client → control plane. Partitioned by `execution_id` once one exists,
/// otherwise by `payload.flow_id` (a fresh `CREATE`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMessage {
    pub schema_version: u32,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub command: CommandKind,
    pub payload: CommandPayloadBody,
    pub timestamp: i64,
    pub request_id: String,
}

impl CommandMessage {
    pub fn partition_key(&self) -> &str {
        self.execution_id.as_deref().unwrap_or(&self.payload.flow_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_depth: Option<u32>,
}

/// Control plane → workers. Always partitioned by `execution_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub schema_version: u32,
    pub execution_id: String,
    pub flow_id: String,
    pub context: TaskContext,
    pub options: ExecutionOptions,
    pub priority: i32,
    pub timestamp: i64,
}

impl TaskMessage {
    pub fn partition_key(&self) -> &str {
        &self.execution_id
    }
}

/// Workers → event stream. Always partitioned by `execution_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub schema_version: u32,
    pub execution_id: String,
    pub worker_id: String,
    pub timestamp: i64,
    pub event: EventEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub index: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub data: EventType,
}

impl EventMessage {
    pub fn partition_key(&self) -> &str {
        &self.execution_id
    }

    /// Dedupe key event consumers use to discard at-least-once redelivery
    /// (spec §4.D).
    pub fn dedupe_key(&self) -> (String, u64) {
        (self.execution_id.clone(), self.event.index)
    }
}
