//! Shared inbound message buffer between the transport task and the
//! dispatch loop.
//!
//! Single producer (MQTT event loop) appends, single consumer (dispatch
//! loop) drains whole batches. Mutex-guarded Vec - critical sections are
//! append and swap only, no I/O under the lock.

use std::sync::Mutex;

use bytes::Bytes;

use crate::message::RawMessage;

pub struct MessageBuffer {
    messages: Mutex<Vec<RawMessage>>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Append a message to the tail. Callable from the transport's
    /// delivery context; never drops, never fails.
    pub fn enqueue(&self, topic: impl Into<String>, payload: impl Into<Bytes>) {
        let msg = RawMessage::new(topic, payload);
        self.messages
            .lock()
            .expect("message buffer lock poisoned")
            .push(msg);
    }

    /// Atomically snapshot and clear the buffer, returning the previous
    /// contents in enqueue order. An enqueue racing this call lands
    /// wholly in the returned batch or wholly in the next one.
    pub fn drain_all(&self) -> Vec<RawMessage> {
        std::mem::take(
            &mut *self
                .messages
                .lock()
                .expect("message buffer lock poisoned"),
        )
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .expect("message buffer lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
