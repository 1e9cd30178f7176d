//! `MultiChannel<T>`: the ordered, multi-subscriber, closable FIFO backing
//! every stream port (spec §4.A.1).
//!
//! Replaces the source's generator/async-iterator streams with a bounded
//! FIFO plus a close flag and a set of per-consumer cursors, per the
//! redesign note. Producer backpressure blocks on a full buffer; a
//! consumer that falls more than `max_lag` items behind the head is
//! evicted with [`CoreError::StreamLagged`], surfaced only to that
//! consumer, so one straggler cannot wedge the others open forever.

use crate::error::{CoreError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

struct SubscriberState {
    /// Sequence number of the next item this subscriber has not yet read.
    pos: u64,
    lagged: bool,
}

struct State<T> {
    buffer: VecDeque<T>,
    /// Sequence number of `buffer[0]`, or `next_seq` when the buffer is empty.
    base_seq: u64,
    next_seq: u64,
    capacity: usize,
    max_lag: u64,
    closed: bool,
    subscribers: HashMap<u64, SubscriberState>,
    next_subscriber_id: u64,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// An ordered, multi-subscriber, closable channel for stream port items.
pub struct MultiChannel<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Clone for MultiChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> MultiChannel<T> {
    pub fn new(capacity: usize, max_lag: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    buffer: VecDeque::new(),
                    base_seq: 0,
                    next_seq: 0,
                    capacity,
                    max_lag,
                    closed: false,
                    subscribers: HashMap::new(),
                    next_subscriber_id: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Send an item. Blocks cooperatively while the buffer is full and no
    /// laggard can be evicted to make room.
    pub async fn send(&self, item: T) -> Result<()> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(CoreError::StreamClosed);
                }
                evict_laggards(&mut state);
                trim(&mut state);
                if state.capacity == 0 || state.buffer.len() < state.capacity {
                    state.buffer.push_back(item);
                    state.next_seq += 1;
                    self.shared.notify.notify_waiters();
                    return Ok(());
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Idempotent close: further sends fail with [`CoreError::StreamClosed`].
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if !state.closed {
            state.closed = true;
        }
        drop(state);
        self.shared.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Subscribe from the current head: a fresh cursor sees every item
    /// still buffered plus everything sent afterwards.
    pub fn subscribe(&self) -> StreamCursor<T> {
        let mut state = self.shared.state.lock();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        let pos = state.base_seq;
        state.subscribers.insert(id, SubscriberState { pos, lagged: false });
        StreamCursor {
            shared: self.shared.clone(),
            id,
        }
    }
}

fn evict_laggards<T>(state: &mut State<T>) {
    if state.max_lag == 0 {
        return;
    }
    let floor = state.next_seq.saturating_sub(state.max_lag);
    for sub in state.subscribers.values_mut() {
        if !sub.lagged && sub.pos < floor {
            sub.lagged = true;
        }
    }
}

fn trim<T>(state: &mut State<T>) {
    let min_pos = state
        .subscribers
        .values()
        .filter(|s| !s.lagged)
        .map(|s| s.pos)
        .min()
        .unwrap_or(state.next_seq);
    while state.base_seq < min_pos && !state.buffer.is_empty() {
        state.buffer.pop_front();
        state.base_seq += 1;
    }
}

/// A per-subscriber read cursor over a [`MultiChannel`].
pub struct StreamCursor<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
    id: u64,
}

impl<T: Clone + Send + 'static> StreamCursor<T> {
    /// Await the next item in arrival order. Returns `Ok(None)` once the
    /// channel is closed and fully drained for this cursor, and
    /// `Err(StreamLagged)` exactly once if this cursor was evicted for
    /// falling too far behind.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            {
                let mut state = self.shared.state.lock();
                let lagged_missed = match state.subscribers.get(&self.id) {
                    None => Some(0),
                    Some(sub) if sub.lagged => Some(state.base_seq.saturating_sub(sub.pos)),
                    _ => None,
                };
                if let Some(missed) = lagged_missed {
                    state.subscribers.remove(&self.id);
                    return Err(CoreError::StreamLagged { missed });
                }

                let pos = state.subscribers[&self.id].pos;
                if pos >= state.base_seq {
                    let idx = (pos - state.base_seq) as usize;
                    if idx < state.buffer.len() {
                        let item = state.buffer[idx].clone();
                        state.subscribers.get_mut(&self.id).unwrap().pos += 1;
                        trim(&mut state);
                        drop(state);
                        self.shared.notify.notify_waiters();
                        return Ok(Some(item));
                    }
                }
                if state.closed {
                    return Ok(None);
                }
            }
            self.shared.notify.notified().await;
        }
    }
}

impl<T: Clone + Send + 'static> Drop for StreamCursor<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.subscribers.remove(&self.id);
        drop(state);
        self.shared.notify.notify_waiters();
    }
}
