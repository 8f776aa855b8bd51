//! Handler contract and registry.

use crate::handlers::{TasmotaHandler, ZigbeeHandler};
use crate::op::Operation;

/// A classification/extraction function mapping one message to zero or
/// more operations.
///
/// Handlers decide applicability purely from the topic string and parse
/// the payload only after claiming it. A malformed payload for a claimed
/// topic is handler-local: log and emit nothing, never panic. Handler
/// invocation is synchronous and non-suspending.
pub trait Handler: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Offer one message. `emit` may be invoked zero or more times, once
    /// per convertible fact extracted from the message.
    fn handle(&self, topic: &str, payload: &[u8], emit: &mut dyn FnMut(Operation));
}

/// Ordered handler set. Every handler is offered every message; handlers
/// with overlapping topic claims both react, and that openness is kept
/// deliberately - the registry does not enforce exclusivity.
pub type Registry = Vec<Box<dyn Handler>>;

/// The production handler set, in registration order.
pub fn default_registry() -> Registry {
    vec![Box::new(ZigbeeHandler), Box::new(TasmotaHandler)]
}
