use bytes::Bytes;

/// A raw transport message as delivered by the broker.
/// Payload bytes are kept unparsed; classification happens at dispatch.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Full MQTT topic, e.g. `zigbee2mqtt/therm-kitchen`
    pub topic: String,
    /// Raw payload bytes (no parsing at enqueue time)
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
