//! Consumes the event topic and fans each [`EventMessage`] out to every
//! connection subscribed to its `execution_id` (spec §4.F). Runs as a
//! single background task; per-connection writes are non-blocking sends
//! into that connection's own outbox, so a slow consumer never stalls
//! event-topic consumption for everyone else.

use crate::protocol::ServerFrame;
use crate::registry::Registry;
use chaingraph_bus::Broker;
use std::sync::Arc;

pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn Broker>, registry: Arc<Registry>) -> Self {
        Self { broker, registry }
    }

    /// Runs until the event topic closes.
    pub async fn run(self) {
        let mut cursor = self.broker.events().subscribe();
        loop {
            match cursor.next().await {
                Ok(Some(message)) => self.dispatch(message),
                Ok(None) => break,
                Err(e) => tracing::warn!(error = %e, "event dispatcher lagged"),
            }
        }
    }

    fn dispatch(&self, message: chaingraph_bus::EventMessage) {
        let frame = ServerFrame::Event {
            execution_id: message.execution_id.clone(),
            event: message.event,
        };
        for client_id in self.registry.subscribers_of(&message.execution_id) {
            if !self.registry.try_send(&client_id, frame.clone()) {
                tracing::warn!(client_id = %client_id, "outbox full, evicting slow consumer");
                self.registry.evict(&client_id);
            }
        }
    }
}
