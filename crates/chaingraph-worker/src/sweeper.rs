//! Crash recovery and orphan garbage collection (spec §4.E):
//!
//! - **Stale-lease reclaim**: an execution stuck `RUNNING` past
//!   `worker_timeout_ms` with no further status update is assumed to
//!   belong to a crashed worker. It is marked `RESTARTED` (a distinct
//!   terminal on that attempt) and a fresh execution + task is enqueued for
//!   the same flow — "the engine restarts the flow from scratch, no
//!   partial-state replay in v1".
//! - **Orphan sweep**: child executions whose parent became terminal (or
//!   vanished, e.g. via the reclaim above) are garbage-collected by
//!   transitioning them to `STOPPED` if they are not already terminal.
//!
//! Both run as a single periodic background task per worker process.

use chaingraph_bus::{Broker, ExecutionOptions, TaskContext, TaskMessage, SCHEMA_VERSION};
use chaingraph_store::{ExecutionRecord, ExecutionStatus, ExecutionStore};
use std::sync::Arc;
use std::time::Duration;

pub struct Sweeper {
    store: Arc<dyn ExecutionStore>,
    broker: Arc<dyn Broker>,
    stale_after: Duration,
    interval: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn ExecutionStore>, broker: Arc<dyn Broker>, stale_after: Duration, interval: Duration) -> Self {
        Self {
            store,
            broker,
            stale_after,
            interval,
        }
    }

    /// Runs forever on `self.interval`, reclaiming stale-leased executions
    /// and sweeping orphans on every tick.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.reclaim_stale().await;
            self.sweep_orphans().await;
        }
    }

    async fn reclaim_stale(&self) {
        match self.store.list_running().await {
            Ok(running) => {
                for record in running {
                    if let Err(e) = self.reclaim(&record).await {
                        tracing::warn!(execution_id = %record.id, error = %e, "stale-lease reclaim failed");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "stale-lease scan failed"),
        }
    }

    async fn sweep_orphans(&self) {
        match self.store.list_orphans().await {
            Ok(orphans) => {
                for execution_id in orphans {
                    if let Err(e) = self.store.set_status(&execution_id, ExecutionStatus::Stopped).await {
                        tracing::debug!(execution_id = %execution_id, error = %e, "orphan sweep no-op");
                    } else {
                        tracing::info!(execution_id = %execution_id, "garbage-collected orphaned execution");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "orphan listing failed"),
        }
    }

    /// Reclaims one stale-leased `RUNNING` execution: marks the old attempt
    /// `RESTARTED` and enqueues a fresh execution + task for the same flow.
    /// `is_stale` is injected so tests can simulate lease age without
    /// sleeping; production callers pass `record.updated_at` age against
    /// `self.stale_after`.
    pub async fn reclaim(&self, record: &ExecutionRecord) -> chaingraph_store::Result<()> {
        if record.status != ExecutionStatus::Running {
            return Ok(());
        }
        let age = chrono::Utc::now().signed_duration_since(record.updated_at);
        if age.to_std().unwrap_or(Duration::ZERO) < self.stale_after {
            return Ok(());
        }

        self.store.set_status(&record.id, ExecutionStatus::Restarted).await?;
        tracing::warn!(execution_id = %record.id, "reclaiming stale-leased execution, restarting from scratch");

        let fresh_id = uuid::Uuid::new_v4().to_string();
        let fresh = ExecutionRecord::new(fresh_id.clone(), record.flow_id.clone(), None, record.depth);
        self.store.create_execution(fresh).await?;

        let task = TaskMessage {
            schema_version: SCHEMA_VERSION,
            execution_id: fresh_id,
            flow_id: record.flow_id.clone(),
            context: TaskContext::default(),
            options: ExecutionOptions::default(),
            priority: 0,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.broker.publish_task(task).await {
            tracing::warn!(error = %e, "failed to enqueue restarted task");
        }
        Ok(())
    }
}
