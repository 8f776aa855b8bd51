//! The batching dispatch loop.
//!
//! Idle/Draining cycle: poll the buffer; if empty sleep one poll
//! interval, otherwise drain everything accumulated since the last
//! drain as one batch. Batching bounds write frequency to roughly one
//! round per interval regardless of message volume - latency traded for
//! write amortization.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::buffer::MessageBuffer;
use crate::handler::Registry;
use crate::message::RawMessage;
use crate::op::Operation;
use crate::sink::StoreSink;

/// Offer every message in the batch to every registered handler and
/// collect the emitted operations into one ordered list: message order,
/// then handler-registration order, then emission order within a
/// handler. Pure with respect to the sink - no I/O.
pub fn collect_operations(batch: &[RawMessage], registry: &Registry) -> Vec<Operation> {
    let mut ops = Vec::new();
    for msg in batch {
        for handler in registry {
            handler.handle(&msg.topic, &msg.payload, &mut |op| ops.push(op));
        }
    }
    ops
}

pub struct Dispatcher<S> {
    buffer: Arc<MessageBuffer>,
    registry: Registry,
    sink: S,
    poll_interval: Duration,
}

impl<S: StoreSink> Dispatcher<S> {
    pub fn new(
        buffer: Arc<MessageBuffer>,
        registry: Registry,
        sink: S,
        poll_interval: Duration,
    ) -> Self {
        Self {
            buffer,
            registry,
            sink,
            poll_interval,
        }
    }

    /// Access the sink, mainly for post-run assertions in tests.
    pub fn sink_ref(&self) -> &S {
        &self.sink
    }

    /// Run until cancelled. Operations execute strictly in collected
    /// order, one at a time; a write failure is logged and execution
    /// continues with the remaining operations - operations are
    /// independent facts, one bad row must not abandon the batch.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            handlers = self.registry.len(),
            poll_interval = ?self.poll_interval,
            "dispatch loop running"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if self.buffer.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => continue,
                }
            }

            let batch = self.buffer.drain_all();
            let ops = collect_operations(&batch, &self.registry);
            debug!(messages = batch.len(), operations = ops.len(), "processing batch");

            let mut failures = 0usize;
            for op in &ops {
                if let Err(e) = self.sink.execute(op).await {
                    failures += 1;
                    error!(table = op.table(), error = %e, "store write failed, continuing batch");
                }
            }
            if failures > 0 {
                error!(failures = failures, operations = ops.len(), "batch completed with failures");
            }
        }

        info!("dispatch loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::handlers::{TasmotaHandler, ZigbeeHandler};
    use crate::sink::MemorySink;

    fn ambient(sensor: &str) -> Operation {
        Operation::AmbientTemp {
            sensor: sensor.to_string(),
            temperature: 20.0,
            humidity: 50.0,
        }
    }

    /// Emits one op per payload byte, tagged with the handler's label.
    struct FanOutHandler {
        label: &'static str,
    }

    impl Handler for FanOutHandler {
        fn name(&self) -> &'static str {
            self.label
        }

        fn handle(&self, topic: &str, payload: &[u8], emit: &mut dyn FnMut(Operation)) {
            if !topic.starts_with(self.label) {
                return;
            }
            for (i, _) in payload.iter().enumerate() {
                emit(ambient(&format!("{}-{}", self.label, i)));
            }
        }
    }

    #[test]
    fn test_collect_preserves_message_then_handler_then_emission_order() {
        // m1 claimed by h1 (two facts), m2 claimed by h2 (one fact)
        let registry: Registry = vec![
            Box::new(FanOutHandler { label: "h1" }),
            Box::new(FanOutHandler { label: "h2" }),
        ];
        let batch = vec![
            RawMessage::new("h1/dev", &b"ab"[..]),
            RawMessage::new("h2/dev", &b"x"[..]),
        ];

        let ops = collect_operations(&batch, &registry);
        assert_eq!(
            ops,
            vec![ambient("h1-0"), ambient("h1-1"), ambient("h2-0")]
        );
    }

    #[test]
    fn test_collect_with_production_registry() {
        let registry: Registry = vec![Box::new(ZigbeeHandler), Box::new(TasmotaHandler)];
        let batch = vec![
            RawMessage::new(
                "zigbee2mqtt/therm-kitchen",
                &br#"{"temperature":21.5,"humidity":40}"#[..],
            ),
            RawMessage::new("tele/tasmota_12AB/STATE", &b"Offline"[..]),
            RawMessage::new("zigbee2mqtt/therm-kitchen", &b"garbage"[..]),
            RawMessage::new(
                "tele/tasmota_12AB/SENSOR",
                &br#"{"Time":"2024-01-01T00:00:00Z","ENERGY":{"Total":1.2,"Power":100,"ApparentPower":101,"ReactivePower":5,"Voltage":230}}"#[..],
            ),
        ];

        // One therm reading and one power reading survive; the offline
        // marker and the malformed payload are skipped without aborting
        // the rest of the batch.
        let ops = collect_operations(&batch, &registry);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].table(), "ambient_temp");
        assert_eq!(ops[1].table(), "power");
    }

    #[tokio::test]
    async fn test_dispatcher_drains_and_executes() {
        let buffer = Arc::new(MessageBuffer::new());
        buffer.enqueue(
            "zigbee2mqtt/therm-kitchen",
            &br#"{"temperature":21.5,"humidity":40}"#[..],
        );

        let registry: Registry = vec![Box::new(ZigbeeHandler)];
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&buffer),
            registry,
            MemorySink::new(),
            Duration::from_millis(5),
        );

        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        dispatcher.run(shutdown).await;

        assert!(buffer.is_empty());
        assert_eq!(
            dispatcher.sink_ref().executed(),
            &[Operation::AmbientTemp {
                sensor: "kitchen".to_string(),
                temperature: 21.5,
                humidity: 40.0,
            }]
        );
    }

    #[tokio::test]
    async fn test_write_failure_does_not_abandon_batch() {
        let buffer = Arc::new(MessageBuffer::new());
        for sensor in ["a", "b", "c"] {
            buffer.enqueue(
                format!("zigbee2mqtt/therm-{sensor}"),
                &br#"{"temperature":20,"humidity":50}"#[..],
            );
        }

        let registry: Registry = vec![Box::new(ZigbeeHandler)];
        // Second write fails; first and third must still land
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&buffer),
            registry,
            MemorySink::new().fail_on(1),
            Duration::from_millis(5),
        );

        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        dispatcher.run(shutdown).await;

        let sensors: Vec<_> = dispatcher
            .sink_ref()
            .executed()
            .iter()
            .map(|op| match op {
                Operation::AmbientTemp { sensor, .. } => sensor.clone(),
                other => panic!("unexpected op: {:?}", other),
            })
            .collect();
        assert_eq!(sensors, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_cancelled_loop_exits_promptly_when_idle() {
        let buffer = Arc::new(MessageBuffer::new());
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&buffer),
            Vec::new(),
            MemorySink::new(),
            Duration::from_secs(3600),
        );

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        // Must not sleep out the full interval once cancelled
        tokio::time::timeout(Duration::from_secs(1), dispatcher.run(shutdown))
            .await
            .expect("dispatch loop did not stop on cancellation");
    }
}
