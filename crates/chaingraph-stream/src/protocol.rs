//! The duplex WebSocket wire protocol (spec §4.F): one JSON frame per
//! message, framed as text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { execution_id: String },
    Unsubscribe { execution_id: String },
    Ping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    // Clone needed for per-subscriber fan-out from one inbound event.
    Connected { client_id: String },
    Subscribed { execution_id: String },
    Unsubscribed { execution_id: String },
    Event { execution_id: String, event: chaingraph_bus::EventEnvelope },
    Pong,
    Error { error: String },
}
