//! Environmental sensor handler for the zigbee2mqtt bridge.
//!
//! Topic shape: `zigbee2mqtt/<device-name>`. Thermometer device names
//! carry a `therm-` prefix; the remainder is the sensor id.

use serde::Deserialize;
use tracing::warn;

use crate::handler::Handler;
use crate::op::Operation;

const NAMESPACE: &str = "zigbee2mqtt/";
const THERM_PREFIX: &str = "therm-";

#[derive(Debug, Deserialize)]
struct ThermReading {
    temperature: f64,
    humidity: f64,
}

pub struct ZigbeeHandler;

impl Handler for ZigbeeHandler {
    fn name(&self) -> &'static str {
        "zigbee"
    }

    fn handle(&self, topic: &str, payload: &[u8], emit: &mut dyn FnMut(Operation)) {
        let Some(device) = topic.strip_prefix(NAMESPACE) else {
            return;
        };
        // Bridge meta topics (zigbee2mqtt/bridge/...) have deeper paths
        if device.is_empty() || device.contains('/') {
            return;
        }

        let Some(sensor) = device.strip_prefix(THERM_PREFIX) else {
            warn!(device = %device, "unknown zigbee device, dropping message");
            return;
        };

        match serde_json::from_slice::<ThermReading>(payload) {
            Ok(reading) => emit(Operation::AmbientTemp {
                sensor: sensor.to_string(),
                temperature: reading.temperature,
                humidity: reading.humidity,
            }),
            Err(e) => {
                warn!(device = %device, error = %e, "malformed thermometer payload, skipping");
            }
        }
    }
}
