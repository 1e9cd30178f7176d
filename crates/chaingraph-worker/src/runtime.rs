//! The worker runtime (spec §4.E): claims tasks from the task topic,
//! hydrates a flow, drives one [`Engine`] per claimed execution, and
//! bridges per-execution lifecycle commands into its debugger.

use crate::bridge::BusEventSink;
use crate::error::Result;
use crate::hydrate::hydrate;
use chaingraph_bus::{Broker, CommandKind, CommandMessage, TaskMessage};
use chaingraph_core::context::EventSink;
use chaingraph_core::{Engine, EventType, ExecutionContext, NodeRegistry, ScheduleOptions};
use chaingraph_store::{ExecutionStatus, ExecutionStore};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct WorkerRuntime {
    worker_id: String,
    store: Arc<dyn ExecutionStore>,
    broker: Arc<dyn Broker>,
    registry: NodeRegistry,
    sink: Arc<BusEventSink>,
    concurrency: Arc<Semaphore>,
}

impl WorkerRuntime {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn ExecutionStore>,
        broker: Arc<dyn Broker>,
        registry: NodeRegistry,
        concurrency: usize,
    ) -> Arc<Self> {
        let worker_id = worker_id.into();
        // Dropping the returned handle does not abort the dispatcher task —
        // it runs detached for the worker process's lifetime, outliving
        // every individual execution that shares this sink.
        let (sink, _dispatcher) = BusEventSink::spawn(worker_id.clone(), broker.clone());
        Arc::new(Self {
            worker_id,
            store,
            broker,
            registry,
            sink,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn concurrency_permits(&self) -> Arc<Semaphore> {
        self.concurrency.clone()
    }

    /// Runs the task-consumption loop until the task topic closes. Each
    /// claimed task is handled on its own spawned task, bounded by
    /// `workerConcurrency` concurrent executions (spec §4.E "Concurrency
    /// budget").
    pub async fn run(self: Arc<Self>) {
        let mut cursor = self.broker.tasks().subscribe();
        loop {
            match cursor.next().await {
                Ok(Some(task)) => {
                    let this = self.clone();
                    let permit = this.concurrency.clone().acquire_owned().await.expect("semaphore not closed");
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = this.handle_task(task).await {
                            tracing::warn!(error = %e, "task handling failed");
                        }
                    });
                }
                Ok(None) => break,
                Err(e) => tracing::warn!(error = %e, "task subscription lagged"),
            }
        }
    }

    async fn handle_task(&self, task: TaskMessage) -> Result<()> {
        let execution_id = task.execution_id.clone();
        let record = self.store.get_execution(&execution_id).await?;
        if record.status.is_terminal() {
            tracing::debug!(execution_id = %execution_id, status = ?record.status, "task for terminal execution, skipping");
            return Ok(());
        }

        self.store.set_status(&execution_id, ExecutionStatus::Creating).await?;
        let snapshot = self.store.load_flow(&task.flow_id).await?;
        let arena = Arc::new(hydrate(&snapshot, &self.registry)?);

        let ctx = Arc::new(ExecutionContext::new(execution_id.clone(), self.sink.clone() as Arc<dyn EventSink>));
        let options = ScheduleOptions {
            max_concurrency: task.options.max_concurrency.unwrap_or(4),
            node_timeout_ms: task.options.node_timeout_ms,
            flow_timeout_ms: task.options.flow_timeout_ms,
        };
        let engine = Arc::new(Engine::new(arena, options));
        self.store.set_status(&execution_id, ExecutionStatus::Created).await?;

        let bridge = spawn_command_bridge(
            self.broker.clone(),
            self.store.clone(),
            execution_id.clone(),
            engine.clone(),
            ctx.clone(),
            ctx.cancellation().clone(),
        );

        self.store.set_status(&execution_id, ExecutionStatus::Running).await?;
        tracing::info!(execution_id = %execution_id, worker_id = %self.worker_id, "execution running");

        let run_engine = engine.clone();
        let ctx_for_engine = ctx.clone();
        let result = tokio::spawn(async move { run_engine.execute(&ctx_for_engine).await })
            .await
            .expect("engine task panicked");

        bridge.abort();

        let final_status = match &result {
            Ok(()) => ExecutionStatus::Completed,
            Err(chaingraph_core::CoreError::Aborted { .. }) => ExecutionStatus::Stopped,
            Err(_) => ExecutionStatus::Failed,
        };
        if let Err(e) = self.store.set_status(&execution_id, final_status).await {
            tracing::warn!(execution_id = %execution_id, error = %e, "failed to record final status");
        }
        tracing::info!(execution_id = %execution_id, status = ?final_status, "execution finished");
        Ok(())
    }
}

/// Subscribes to the command topic and bridges `PAUSE`/`RESUME`/`STOP`
/// commands matching this execution into the engine's debugger (spec
/// §4.E step 4). `START` on an already-running execution is a no-op; by
/// the time a worker owns the execution it is already progressing.
fn spawn_command_bridge(
    broker: Arc<dyn Broker>,
    store: Arc<dyn ExecutionStore>,
    execution_id: String,
    engine: Arc<Engine>,
    ctx: Arc<ExecutionContext>,
    cancel: chaingraph_core::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor = broker.commands().subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = cursor.next() => {
                    match next {
                        Ok(Some(command)) => {
                            handle_lifecycle_command(&execution_id, &engine, &ctx, &store, &cancel, command).await
                        }
                        Ok(None) => break,
                        Err(e) => tracing::warn!(error = %e, "command bridge lagged"),
                    }
                }
            }
        }
    })
}

/// Applies one lifecycle command to the live engine, then mirrors the
/// transition onto the store's `RUNNING ↔ PAUSED` status (spec.md §3) and
/// onto the event stream (`FLOW_PAUSED`/`FLOW_RESUMED`, spec.md §6) so a
/// client polling `getExecution` or subscribed over the Event Stream
/// Service observes the pause, not just the in-process debugger.
async fn handle_lifecycle_command(
    execution_id: &str,
    engine: &Engine,
    ctx: &ExecutionContext,
    store: &Arc<dyn ExecutionStore>,
    cancel: &chaingraph_core::CancellationToken,
    command: CommandMessage,
) {
    if command.execution_id.as_deref() != Some(execution_id) {
        return;
    }
    match command.command {
        CommandKind::Pause => {
            engine.debugger().pause();
            ctx.send_event(EventType::FlowPaused);
            if let Err(e) = store.set_status(execution_id, ExecutionStatus::Paused).await {
                tracing::warn!(execution_id = %execution_id, error = %e, "failed to record paused status");
            }
        }
        CommandKind::Resume => {
            engine.debugger().continue_();
            ctx.send_event(EventType::FlowResumed);
            if let Err(e) = store.set_status(execution_id, ExecutionStatus::Running).await {
                tracing::warn!(execution_id = %execution_id, error = %e, "failed to record running status");
            }
        }
        CommandKind::Stop => {
            engine.debugger().stop();
            cancel.cancel();
        }
        CommandKind::Start | CommandKind::Create => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_nodes::demo_registry;
    use async_trait::async_trait;
    use chaingraph_bus::{CommandPayloadBody, EventMessage, ExecutionOptions, InMemoryBroker, TaskContext, SCHEMA_VERSION};
    use chaingraph_core::{NodeBehavior, NodeDescriptor, NodeOutcome, PortAccess};
    use chaingraph_store::{ExecutionRecord, FlowEdgeSpec, FlowNodeSpec, FlowSnapshot, InMemoryStore};
    use serde_json::json;

    struct SleepyNode;

    #[async_trait]
    impl NodeBehavior for SleepyNode {
        async fn execute(&self, _ctx: &ExecutionContext, _io: &dyn PortAccess) -> chaingraph_core::Result<NodeOutcome> {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            Ok(NodeOutcome::empty())
        }
    }

    fn sleepy_snapshot_and_registry() -> (FlowSnapshot, NodeRegistry) {
        let mut registry = NodeRegistry::new();
        registry.register(NodeDescriptor {
            node_type: "sleep".into(),
            ports: vec![],
            recoverable: false,
            runs_on_any_input: false,
            factory: Arc::new(|| Arc::new(SleepyNode)),
        });
        let snapshot = FlowSnapshot {
            flow_id: "f-sleep".into(),
            nodes: vec![FlowNodeSpec { node_type: "sleep".into(), metadata: json!({}) }],
            edges: vec![],
        };
        (snapshot, registry)
    }

    fn lifecycle_command(execution_id: &str, id: &str, command: CommandKind) -> CommandMessage {
        CommandMessage {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            execution_id: Some(execution_id.into()),
            command,
            payload: CommandPayloadBody {
                flow_id: "f-sleep".into(),
                options: None,
                integrations: None,
                parent_execution_id: None,
                event_data: None,
                external_events: None,
                execution_depth: None,
            },
            timestamp: 0,
            request_id: format!("req-{id}"),
        }
    }

    fn sample_snapshot() -> FlowSnapshot {
        FlowSnapshot {
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
        }
    }

    #[tokio::test]
    async fn claimed_task_runs_to_completion_and_publishes_events() {
        let store = Arc::new(InMemoryStore::new());
        store.put_flow(sample_snapshot());
        store.create_execution(ExecutionRecord::new("exec-1", "f1", None, 0)).await.unwrap();

        let broker = Arc::new(InMemoryBroker::new());
        let mut events = broker.events().subscribe();

        let runtime = WorkerRuntime::new("worker-1", store.clone(), broker.clone(), demo_registry(), 2);

        broker
            .publish_task(TaskMessage {
                schema_version: SCHEMA_VERSION,
                execution_id: "exec-1".into(),
                flow_id: "f1".into(),
                context: TaskContext::default(),
                options: ExecutionOptions::default(),
                priority: 0,
                timestamp: 0,
            })
            .await
            .unwrap();

        let runtime_clone = runtime.clone();
        let run_handle = tokio::spawn(async move { runtime_clone.run().await });

        let mut saw_completed = false;
        for _ in 0..64 {
            let msg: EventMessage = tokio::time::timeout(std::time::Duration::from_millis(500), async {
                loop {
                    if let Some(m) = events.next().await.unwrap() {
                        return m;
                    }
                }
            })
            .await
            .expect("timed out waiting for event");
            if matches!(msg.event.data, chaingraph_core::EventType::FlowCompleted { .. }) {
                saw_completed = true;
                break;
            }
        }
        assert!(saw_completed);

        let record = store.get_execution("exec-1").await.unwrap();
        assert_eq!(record.status, chaingraph_store::ExecutionStatus::Completed);

        broker.tasks().close();
        let _ = run_handle.await;
    }

    #[tokio::test]
    async fn pause_command_updates_store_status_and_emits_flow_events() {
        let (snapshot, registry) = sleepy_snapshot_and_registry();
        let store = Arc::new(InMemoryStore::new());
        store.put_flow(snapshot);
        store.create_execution(ExecutionRecord::new("exec-pause", "f-sleep", None, 0)).await.unwrap();

        let broker = Arc::new(InMemoryBroker::new());
        let mut events = broker.events().subscribe();

        let runtime = WorkerRuntime::new("worker-1", store.clone(), broker.clone(), registry, 2);

        broker
            .publish_task(TaskMessage {
                schema_version: SCHEMA_VERSION,
                execution_id: "exec-pause".into(),
                flow_id: "f-sleep".into(),
                context: TaskContext::default(),
                options: ExecutionOptions::default(),
                priority: 0,
                timestamp: 0,
            })
            .await
            .unwrap();

        let runtime_clone = runtime.clone();
        let run_handle = tokio::spawn(async move { runtime_clone.run().await });

        // Let the task reach RUNNING before the bridge has anything to pause.
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        broker
            .publish_command(lifecycle_command("exec-pause", "cmd-pause", CommandKind::Pause))
            .await
            .unwrap();

        let mut saw_paused_event = false;
        while let Ok(Some(msg)) =
            tokio::time::timeout(std::time::Duration::from_millis(500), events.next()).await.unwrap()
        {
            if matches!(msg.event.data, chaingraph_core::EventType::FlowPaused) {
                saw_paused_event = true;
                break;
            }
        }
        assert!(saw_paused_event);

        let mut saw_paused_status = false;
        for _ in 0..50 {
            if store.get_execution("exec-pause").await.unwrap().status == chaingraph_store::ExecutionStatus::Paused {
                saw_paused_status = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(saw_paused_status);

        broker
            .publish_command(lifecycle_command("exec-pause", "cmd-resume", CommandKind::Resume))
            .await
            .unwrap();

        let mut saw_resumed_event = false;
        while let Ok(Some(msg)) =
            tokio::time::timeout(std::time::Duration::from_millis(500), events.next()).await.unwrap()
        {
            if matches!(msg.event.data, chaingraph_core::EventType::FlowResumed) {
                saw_resumed_event = true;
                break;
            }
        }
        assert!(saw_resumed_event);

        let mut saw_running_status = false;
        for _ in 0..50 {
            if store.get_execution("exec-pause").await.unwrap().status == chaingraph_store::ExecutionStatus::Running {
                saw_running_status = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(saw_running_status);

        broker.tasks().close();
        broker.commands().close();
        let _ = run_handle.await;
    }

    #[tokio::test]
    async fn terminal_execution_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        store.put_flow(sample_snapshot());
        let record = ExecutionRecord::new("exec-done", "f1", None, 0);
        store.create_execution(record).await.unwrap();
        for status in [
            chaingraph_store::ExecutionStatus::Creating,
            chaingraph_store::ExecutionStatus::Created,
            chaingraph_store::ExecutionStatus::Running,
            chaingraph_store::ExecutionStatus::Completed,
        ] {
            store.set_status("exec-done", status).await.unwrap();
        }

        let broker = Arc::new(InMemoryBroker::new());
        let runtime = WorkerRuntime::new("worker-1", store.clone(), broker.clone(), demo_registry(), 2);
        runtime
            .handle_task(TaskMessage {
                schema_version: SCHEMA_VERSION,
                execution_id: "exec-done".into(),
                flow_id: "f1".into(),
                context: TaskContext::default(),
                options: ExecutionOptions::default(),
                priority: 0,
                timestamp: 0,
            })
            .await
            .unwrap();

        // Status stays COMPLETED; no illegal transition was attempted.
        assert_eq!(store.get_execution("exec-done").await.unwrap().status, chaingraph_store::ExecutionStatus::Completed);
    }
}
