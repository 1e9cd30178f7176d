//! The `Broker` abstraction over the three logical topics (spec §4.D).
//!
//! The in-memory implementation reuses the port runtime's
//! [`chaingraph_core::MultiChannel`] as each topic's backing queue — the
//! same bounded, multi-subscriber, closable FIFO a stream port uses,
//! repurposed here as a topic. A real broker binding (Kafka, NATS, ...)
//! would implement [`Broker`] against its own client instead; nothing in
//! the worker or control-plane layers depends on the in-memory shape.
//!
//! Partitioning and per-consumer-group claim semantics are a real broker's
//! job; this in-memory stand-in hands every subscriber the full topic
//! stream and lets it filter by `executionId` client-side, since there is
//! only ever one process to distribute partitions across in tests.

use crate::error::{BusError, Result};
use crate::idempotency::DedupeWindow;
use crate::payload::{CommandMessage, EventMessage, TaskMessage};
use async_trait::async_trait;
use chaingraph_core::MultiChannel;

const TOPIC_BUFFER_CAPACITY: usize = 1024;
const TOPIC_MAX_LAG: u64 = 4096;

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish_command(&self, msg: CommandMessage) -> Result<()>;
    async fn publish_task(&self, msg: TaskMessage) -> Result<()>;
    async fn publish_event(&self, msg: EventMessage) -> Result<()>;

    fn commands(&self) -> MultiChannel<CommandMessage>;
    fn tasks(&self) -> MultiChannel<TaskMessage>;
    fn events(&self) -> MultiChannel<EventMessage>;
}

pub struct InMemoryBroker {
    commands: MultiChannel<CommandMessage>,
    tasks: MultiChannel<TaskMessage>,
    events: MultiChannel<EventMessage>,
    command_dedupe: DedupeWindow<String>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            commands: MultiChannel::new(TOPIC_BUFFER_CAPACITY, TOPIC_MAX_LAG),
            tasks: MultiChannel::new(TOPIC_BUFFER_CAPACITY, TOPIC_MAX_LAG),
            events: MultiChannel::new(TOPIC_BUFFER_CAPACITY, TOPIC_MAX_LAG),
            command_dedupe: DedupeWindow::new(10_000),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish_command(&self, msg: CommandMessage) -> Result<()> {
        if !self.command_dedupe.observe(msg.id.clone()) {
            tracing::debug!(command_id = %msg.id, "dropping duplicate command");
            return Ok(());
        }
        self.commands.send(msg).await.map_err(|e| BusError::PublishExhausted {
            topic: "commands".to_string(),
            attempts: 1,
            reason: e.to_string(),
        })
    }

    async fn publish_task(&self, msg: TaskMessage) -> Result<()> {
        self.tasks.send(msg).await.map_err(|e| BusError::PublishExhausted {
            topic: "tasks".to_string(),
            attempts: 1,
            reason: e.to_string(),
        })
    }

    async fn publish_event(&self, msg: EventMessage) -> Result<()> {
        self.events.send(msg).await.map_err(|e| BusError::PublishExhausted {
            topic: "events".to_string(),
            attempts: 1,
            reason: e.to_string(),
        })
    }

    fn commands(&self) -> MultiChannel<CommandMessage> {
        self.commands.clone()
    }

    fn tasks(&self) -> MultiChannel<TaskMessage> {
        self.tasks.clone()
    }

    fn events(&self) -> MultiChannel<EventMessage> {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{CommandKind, CommandPayloadBody};

    fn sample_command(id: &str) -> CommandMessage {
        CommandMessage {
            schema_version: crate::payload::SCHEMA_VERSION,
            id: id.to_string(),
            execution_id: None,
            command: CommandKind::Create,
            payload: CommandPayloadBody {
                flow_id: "flow-1".into(),
                options: None,
                integrations: None,
                parent_execution_id: None,
                event_data: None,
                external_events: None,
                execution_depth: None,
            },
            timestamp: 0,
            request_id: "req-1".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_command_id_is_dropped_silently() {
        let broker = InMemoryBroker::new();
        let mut cursor = broker.commands().subscribe();
        broker.publish_command(sample_command("cmd-1")).await.unwrap();
        broker.publish_command(sample_command("cmd-1")).await.unwrap();
        broker.commands().close();

        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn distinct_commands_both_delivered() {
        let broker = InMemoryBroker::new();
        let mut cursor = broker.commands().subscribe();
        broker.publish_command(sample_command("cmd-1")).await.unwrap();
        broker.publish_command(sample_command("cmd-2")).await.unwrap();
        broker.commands().close();

        let first = cursor.next().await.unwrap().unwrap();
        let second = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.id, "cmd-1");
        assert_eq!(second.id, "cmd-2");
    }
}
