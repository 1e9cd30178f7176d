//! Per-execution scoped state (spec §4.B): start time, cooperative
//! cancellation, integrations, secret decryption, and the serialized event
//! sink the engine stamps indexes through.

use crate::event::{Event, EventType};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Cooperative cancellation handle. A node observes cancellation at its own
/// suspension points; it is considered cancelled only once it returns, not
/// when the signal is sent (spec §5).
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<std::sync::atomic::AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self, ) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Resolves once cancelled; a suspension point a node or background
    /// action can select against.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A pluggable external collaborator (archai, wallet, ...). Out of scope
/// here beyond the interface; concrete implementations live outside the
/// execution core.
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;
}

/// Secret-decryption collaborator for nodes consuming `secret` ports. The
/// concrete crypto backend (ECDH key agreement etc.) is a pluggable
/// collaborator, not implemented by the execution core itself.
#[async_trait]
pub trait SecretCipher: Send + Sync {
    fn public_key(&self) -> Vec<u8>;
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, String>;
}

/// Options for spawning a child execution (spec §4.B `startChildExecution`).
#[derive(Debug, Clone)]
pub struct ChildExecutionOptions {
    pub parent_execution_id: String,
    pub execution_depth: u32,
    pub event_data: Option<serde_json::Value>,
}

/// Enqueues a `CREATE` command for a child execution on the control plane.
/// Implemented by the bus-facing layer; the core only depends on the trait
/// so it stays testable without a real bus.
pub trait ChildSpawner: Send + Sync {
    fn start_child_execution(&self, flow_id: &str, options: ChildExecutionOptions) -> Result<String, String>;
}

/// Receives events as the engine emits them and assigns the dense index.
pub trait EventSink: Send + Sync {
    fn accept(&self, execution_id: &str, index: u64, data: EventType);
}

/// Per-execution scoped state. Dropped once the execution reaches a
/// terminal status.
pub struct ExecutionContext {
    pub execution_id: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    cancel: CancellationToken,
    integrations: HashMap<String, Arc<dyn Integration>>,
    index_counter: Arc<Mutex<u64>>,
    sink: Arc<dyn EventSink>,
    spawner: Option<Arc<dyn ChildSpawner>>,
    secret_cipher: Option<Arc<dyn SecretCipher>>,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            execution_id: execution_id.into(),
            start_time: chrono::Utc::now(),
            cancel: CancellationToken::new(),
            integrations: HashMap::new(),
            index_counter: Arc::new(Mutex::new(0)),
            sink,
            spawner: None,
            secret_cipher: None,
        }
    }

    pub fn with_integration(mut self, key: impl Into<String>, integration: Arc<dyn Integration>) -> Self {
        self.integrations.insert(key.into(), integration);
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ChildSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn with_secret_cipher(mut self, cipher: Arc<dyn SecretCipher>) -> Self {
        self.secret_cipher = Some(cipher);
        self
    }

    pub fn integration(&self, key: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(key).cloned()
    }

    pub fn secret_cipher(&self) -> Option<Arc<dyn SecretCipher>> {
        self.secret_cipher.clone()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stamp and emit an event, returning the assigned dense index. The
    /// counter is taken under a mutex so this is linearizable even when
    /// multiple nodes complete concurrently (spec §4.C.4).
    pub fn send_event(&self, data: EventType) -> u64 {
        let index = {
            let mut counter = self.index_counter.lock();
            let assigned = *counter;
            *counter += 1;
            assigned
        };
        self.sink.accept(&self.execution_id, index, data);
        index
    }

    pub fn start_child_execution(&self, flow_id: &str, options: ChildExecutionOptions) -> Result<String, String> {
        match &self.spawner {
            Some(s) => s.start_child_execution(flow_id, options),
            None => Err("no child spawner configured for this execution context".to_string()),
        }
    }
}

/// An [`EventSink`] that appends to an in-process log, used by tests and by
/// `Engine::execute` callers who only want the local event stream (no bus).
#[derive(Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for InMemoryEventSink {
    fn accept(&self, execution_id: &str, index: u64, data: EventType) {
        self.events.lock().push(Event {
            execution_id: execution_id.to_string(),
            index,
            timestamp: chrono::Utc::now(),
            data,
        });
    }
}
