//! Control-plane command handling (spec §2 data flow, §4.D idempotency):
//! turns a validated `CREATE` command into an execution record and a task
//! on the task topic.
//!
//! Lifecycle commands for a *live* execution (`START`/`PAUSE`/`RESUME`/
//! `STOP`, breakpoints) are not handled here — spec §4.E step 4 has the
//! owning worker subscribe to the command topic filtered by its own
//! `executionId` and bridge those directly into the debugger handle, since
//! by the time such a command is meaningful the execution already has a
//! single owning worker. `CREATE` has no execution id yet, so it is the one
//! command kind that needs a process watching the unfiltered topic.
//!
//! `CREATE` idempotency is enforced one layer down, by the broker's
//! per-partition dedupe window on `command.id` (spec §4.D) — replaying the
//! same `CREATE` never reaches this handler twice.

use crate::error::Result;
use chaingraph_bus::{Broker, CommandKind, CommandMessage, ExecutionOptions, TaskContext, TaskMessage, SCHEMA_VERSION};
use chaingraph_store::{ExecutionRecord, ExecutionStore};
use std::sync::Arc;

pub struct ControlPlane {
    store: Arc<dyn ExecutionStore>,
    broker: Arc<dyn Broker>,
}

impl ControlPlane {
    pub fn new(store: Arc<dyn ExecutionStore>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }

    /// Runs the command-consumption loop until the topic closes. Intended
    /// to be spawned as one background task per process.
    pub async fn run(self: Arc<Self>) {
        let mut cursor = self.broker.commands().subscribe();
        loop {
            match cursor.next().await {
                Ok(Some(command)) => {
                    if let Err(e) = self.handle(command).await {
                        tracing::warn!(error = %e, "control plane failed to process command");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "control plane command subscription lagged");
                }
            }
        }
    }

    async fn handle(&self, command: CommandMessage) -> Result<()> {
        if command.command != CommandKind::Create {
            // Already-running executions are owned by the worker that
            // claimed them; nothing for the control plane to do.
            return Ok(());
        }

        let execution_id = command.execution_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let depth = command.payload.execution_depth.unwrap_or(0);
        let record = ExecutionRecord::new(
            execution_id.clone(),
            command.payload.flow_id.clone(),
            command.payload.parent_execution_id.clone(),
            depth,
        );
        self.store.create_execution(record).await?;
        tracing::info!(execution_id = %execution_id, flow_id = %command.payload.flow_id, "created execution");

        let options = command.payload.options.clone().unwrap_or_default();
        let task = TaskMessage {
            schema_version: SCHEMA_VERSION,
            execution_id,
            flow_id: command.payload.flow_id,
            context: TaskContext {
                integrations: command.payload.integrations,
                parent_execution_id: command.payload.parent_execution_id,
                event_data: command.payload.event_data,
                execution_depth: Some(depth),
            },
            options: normalize_options(options),
            priority: 0,
            timestamp: command.timestamp,
        };
        self.broker.publish_task(task).await?;
        Ok(())
    }
}

fn normalize_options(options: ExecutionOptions) -> ExecutionOptions {
    ExecutionOptions {
        max_concurrency: Some(options.max_concurrency.unwrap_or(4)),
        node_timeout_ms: options.node_timeout_ms,
        flow_timeout_ms: options.flow_timeout_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaingraph_bus::{CommandPayloadBody, InMemoryBroker};
    use chaingraph_store::InMemoryStore;

    fn create_command(id: &str, flow_id: &str) -> CommandMessage {
        CommandMessage {
            schema_version: SCHEMA_VERSION,
            id: id.to_string(),
            execution_id: None,
            command: CommandKind::Create,
            payload: CommandPayloadBody {
                flow_id: flow_id.to_string(),
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
    async fn create_command_produces_execution_and_task() {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let mut tasks = broker.tasks().subscribe();
        let plane = Arc::new(ControlPlane::new(store.clone(), broker.clone()));

        broker.publish_command(create_command("cmd-1", "flow-1")).await.unwrap();
        broker.commands().close();
        plane.run().await;
        broker.tasks().close();

        let task = tasks.next().await.unwrap().unwrap();
        assert_eq!(task.flow_id, "flow-1");
        let record = store.get_execution(&task.execution_id).await.unwrap();
        assert_eq!(record.flow_id, "flow-1");
    }

    #[tokio::test]
    async fn non_create_commands_are_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let plane = Arc::new(ControlPlane::new(store, broker.clone()));

        let mut stop = create_command("cmd-2", "flow-1");
        stop.command = CommandKind::Stop;
        stop.execution_id = Some("exec-live".into());
        broker.publish_command(stop).await.unwrap();
        broker.commands().close();
        plane.run().await;
        // No panic, no task emitted for a non-CREATE command.
    }
}
