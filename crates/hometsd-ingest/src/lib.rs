//! hometsd-ingest: home sensor telemetry ingestion runtime
//!
//! Drains MQTT messages from a shared buffer in batches, routes each
//! message through an ordered set of device-family handlers, and
//! executes the emitted operations against a time-series store in
//! collection order.

pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod message;
pub mod op;
pub mod sink;
pub mod transport;

pub use buffer::MessageBuffer;
pub use config::Config;
pub use dispatch::{collect_operations, Dispatcher};
pub use error::IngestError;
pub use handler::{default_registry, Handler, Registry};
pub use message::RawMessage;
pub use op::Operation;
pub use sink::{MemorySink, PostgresSink, SinkError, StoreSink};
