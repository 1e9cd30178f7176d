//! Connection pool and subscriber registry (spec §4.F): tracks every open
//! connection plus the bidirectional `subscriptionsByExecution` /
//! `subscriptionByConn` maps used to fan events out by execution id.
//!
//! Grounded on the teacher's `ConnectionPool` (atomics for activity/message
//! counters, a single `DashMap` keyed by connection id), extended with the
//! two subscription indexes this service's fan-out needs.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use crate::protocol::ServerFrame;

/// One entry per open connection. `outbox` is the per-connection writer
/// task's inbox; sending to it never blocks event-topic consumption.
/// `evict` is a separate signal reserved for the backpressure policy: it is
/// never subject to the same bounded queue an overloaded consumer just
/// filled, so the terminal "slow consumer" notice always gets delivered.
#[derive(Clone)]
pub struct ConnectionEntry {
    pub client_id: String,
    pub connected_at: i64,
    pub last_activity: Arc<AtomicU64>,
    pub frames_sent: Arc<AtomicU64>,
    outbox: mpsc::Sender<ServerFrame>,
    evict: Arc<Notify>,
}

pub struct Registry {
    connections: DashMap<String, ConnectionEntry>,
    by_execution: DashMap<String, HashSet<String>>,
    by_conn: DashMap<String, HashSet<String>>,
    max_connections: usize,
    total_created: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    pub active_connections: usize,
    pub max_connections: usize,
    pub total_created: u64,
    pub active_subscriptions: usize,
}

/// Handed to a freshly registered connection's own task: the outbox
/// receiver it drains to write frames, and the eviction signal it must
/// also select on so a slow-consumer close can preempt a full outbox.
pub struct NewConnection {
    pub client_id: String,
    pub outbox_rx: mpsc::Receiver<ServerFrame>,
    pub evict: Arc<Notify>,
}

impl Registry {
    pub fn new(max_connections: usize) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            by_execution: DashMap::new(),
            by_conn: DashMap::new(),
            max_connections,
            total_created: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Registers a new connection. Fails once the pool is at capacity
    /// (spec §4.F does not name a limit; this mirrors the teacher's
    /// `ConnectionPool::connect` guard).
    pub fn connect(&self, buffer_size: usize) -> Result<NewConnection, usize> {
        if self.connections.len() >= self.max_connections {
            return Err(self.max_connections);
        }
        let client_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(buffer_size);
        let evict = Arc::new(Notify::new());
        let entry = ConnectionEntry {
            client_id: client_id.clone(),
            connected_at: chrono::Utc::now().timestamp(),
            last_activity: Arc::new(AtomicU64::new(chrono::Utc::now().timestamp() as u64)),
            frames_sent: Arc::new(AtomicU64::new(0)),
            outbox: tx,
            evict: evict.clone(),
        };
        self.connections.insert(client_id.clone(), entry);
        self.by_conn.insert(client_id.clone(), HashSet::new());
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(NewConnection { client_id, outbox_rx: rx, evict })
    }

    pub fn record_activity(&self, client_id: &str) {
        if let Some(entry) = self.connections.get(client_id) {
            entry.last_activity.store(chrono::Utc::now().timestamp() as u64, Ordering::Relaxed);
        }
    }

    pub fn subscribe(&self, client_id: &str, execution_id: &str) {
        self.by_execution.entry(execution_id.to_string()).or_default().insert(client_id.to_string());
        self.by_conn.entry(client_id.to_string()).or_default().insert(execution_id.to_string());
    }

    pub fn unsubscribe(&self, client_id: &str, execution_id: &str) {
        if let Some(mut conns) = self.by_execution.get_mut(execution_id) {
            conns.remove(client_id);
        }
        if let Some(mut execs) = self.by_conn.get_mut(client_id) {
            execs.remove(execution_id);
        }
    }

    /// Removes every trace of a connection: its pool entry and both
    /// subscription index sides (spec §4.F "connection lifecycle cleans up
    /// maps on close/error").
    pub fn disconnect(&self, client_id: &str) {
        self.connections.remove(client_id);
        if let Some((_, execs)) = self.by_conn.remove(client_id) {
            for execution_id in execs {
                if let Some(mut conns) = self.by_execution.get_mut(&execution_id) {
                    conns.remove(client_id);
                }
            }
        }
    }

    /// Best-effort send to a connection's writer task. Full returns `false`
    /// so the caller can apply the slow-consumer eviction policy.
    pub fn try_send(&self, client_id: &str, frame: ServerFrame) -> bool {
        let Some(entry) = self.connections.get(client_id) else { return true };
        match entry.outbox.try_send(frame) {
            Ok(()) => {
                entry.frames_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => true,
        }
    }

    /// Slow-consumer backpressure policy (spec §4.F): wakes the
    /// connection's own task through the dedicated eviction signal so it
    /// can write `{type:"error", error:"slow consumer"}` straight to the
    /// socket and close, bypassing the outbox that is already full.
    pub fn evict(&self, client_id: &str) {
        if let Some(entry) = self.connections.get(client_id) {
            entry.evict.notify_one();
        }
        self.disconnect(client_id);
    }

    /// Connection ids currently subscribed to `execution_id`.
    pub fn subscribers_of(&self, execution_id: &str) -> Vec<String> {
        self.by_execution.get(execution_id).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    /// Connections idle for longer than `timeout_secs` (spec §6 "server
    /// closes after 60s idle").
    pub fn stale_connections(&self, timeout_secs: i64) -> Vec<String> {
        let now = chrono::Utc::now().timestamp();
        self.connections
            .iter()
            .filter(|e| now - e.last_activity.load(Ordering::Relaxed) as i64 > timeout_secs)
            .map(|e| e.client_id.clone())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_connections: self.connections.len(),
            max_connections: self.max_connections,
            total_created: self.total_created.load(Ordering::Relaxed),
            active_subscriptions: self.by_execution.iter().map(|e| e.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_then_subscribe_tracks_both_indexes() {
        let registry = Registry::new(10);
        let conn = registry.connect(16).unwrap();
        registry.subscribe(&conn.client_id, "exec-1");

        assert_eq!(registry.subscribers_of("exec-1"), vec![conn.client_id.clone()]);
        assert_eq!(registry.stats().active_subscriptions, 1);

        registry.unsubscribe(&conn.client_id, "exec-1");
        assert!(registry.subscribers_of("exec-1").is_empty());
    }

    #[test]
    fn disconnect_clears_subscriptions() {
        let registry = Registry::new(10);
        let conn = registry.connect(16).unwrap();
        registry.subscribe(&conn.client_id, "exec-1");
        registry.subscribe(&conn.client_id, "exec-2");

        registry.disconnect(&conn.client_id);

        assert!(registry.subscribers_of("exec-1").is_empty());
        assert!(registry.subscribers_of("exec-2").is_empty());
        assert_eq!(registry.stats().active_connections, 0);
    }

    #[test]
    fn pool_at_capacity_rejects_new_connections() {
        let registry = Registry::new(1);
        let _first = registry.connect(16).unwrap();
        let err = registry.connect(16).unwrap_err();
        assert_eq!(err, 1);
    }

    #[test]
    fn full_outbox_reports_failure_for_eviction() {
        let registry = Registry::new(10);
        let conn = registry.connect(1).unwrap();
        assert!(registry.try_send(&conn.client_id, ServerFrame::Pong));
        // Second frame fills the bounded channel since nothing has drained it.
        assert!(!registry.try_send(&conn.client_id, ServerFrame::Pong));
    }

    #[tokio::test]
    async fn evict_wakes_the_owning_connection_and_removes_bookkeeping() {
        let registry = Registry::new(10);
        let conn = registry.connect(1).unwrap();
        registry.subscribe(&conn.client_id, "exec-1");
        let evict = conn.evict.clone();

        let notified = tokio::spawn(async move {
            evict.notified().await;
        });
        registry.evict(&conn.client_id);
        notified.await.unwrap();

        assert!(registry.subscribers_of("exec-1").is_empty());
        assert_eq!(registry.stats().active_connections, 0);
    }

    #[test]
    fn stale_connections_are_reported_after_timeout() {
        let registry = Registry::new(10);
        let conn = registry.connect(16).unwrap();
        registry.connections.get_mut(&conn.client_id).unwrap().last_activity.store(0, Ordering::Relaxed);
        assert_eq!(registry.stale_connections(60), vec![conn.client_id]);
    }
}
