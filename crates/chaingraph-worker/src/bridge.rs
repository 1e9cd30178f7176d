//! Bridges the engine's synchronous [`EventSink::accept`] onto the async
//! event topic producer.
//!
//! Per the design notes' "Observer pattern for events" redesign: rather
//! than a recursive in-process emitter calling every subscriber inline,
//! the engine writes to one sink, which forwards onto an unbounded channel
//! a single dispatcher task drains — that task is the only place publish
//! order touches I/O, keeping `sendEvent`'s index assignment linearizable
//! and never blocking it on the bus.

use chaingraph_bus::{Broker, EventEnvelope, EventMessage, SCHEMA_VERSION};
use chaingraph_core::context::EventSink;
use chaingraph_core::EventType;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

struct QueuedEvent {
    execution_id: String,
    index: u64,
    data: EventType,
}

/// An [`EventSink`] that queues events for async publication to the bus
/// and, optionally, to local in-process observers (e.g. a CLI watching its
/// own submitted execution).
pub struct BusEventSink {
    worker_id: String,
    queue: mpsc::UnboundedSender<QueuedEvent>,
    local: broadcast::Sender<chaingraph_core::Event>,
}

impl BusEventSink {
    /// Spawns the dispatcher task and returns the sink plus a handle to
    /// stop it once the execution is done with it.
    pub fn spawn(worker_id: impl Into<String>, broker: Arc<dyn Broker>) -> (Arc<Self>, DispatcherHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedEvent>();
        let (local_tx, _local_rx) = broadcast::channel(1024);
        let worker_id = worker_id.into();
        let dispatcher_worker_id = worker_id.clone();
        let local_tx_for_task = local_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let envelope = EventEnvelope {
                    index: event.index,
                    timestamp: chrono::Utc::now(),
                    data: event.data,
                };
                let message = EventMessage {
                    schema_version: SCHEMA_VERSION,
                    execution_id: event.execution_id,
                    worker_id: dispatcher_worker_id.clone(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    event: envelope.clone(),
                };
                let _ = local_tx_for_task.send(chaingraph_core::Event {
                    execution_id: message.execution_id.clone(),
                    index: envelope.index,
                    timestamp: envelope.timestamp,
                    data: envelope.data,
                });
                if let Err(e) = broker.publish_event(message).await {
                    tracing::warn!(error = %e, "failed to publish event to bus");
                }
            }
        });

        (
            Arc::new(Self {
                worker_id,
                queue: tx,
                local: local_tx,
            }),
            DispatcherHandle { join: handle },
        )
    }

    pub fn subscribe_local(&self) -> broadcast::Receiver<chaingraph_core::Event> {
        self.local.subscribe()
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }
}

impl EventSink for BusEventSink {
    fn accept(&self, execution_id: &str, index: u64, data: EventType) {
        let _ = self.queue.send(QueuedEvent {
            execution_id: execution_id.to_string(),
            index,
            data,
        });
    }
}

/// Owns the dispatcher task; dropping it does not stop the task (the sink
/// may outlive one execution), call [`DispatcherHandle::shutdown`] once the
/// worker is tearing down entirely.
pub struct DispatcherHandle {
    join: tokio::task::JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn abort(self) {
        self.join.abort();
    }
}
