//! Power/wifi telemetry handler for tasmota devices.
//!
//! Topic shape: `tele/<device-name>/<kind>` with device names prefixed
//! `tasmota_`; the remainder is the device id. Tasmota also publishes
//! plain-text payloads on the same topics (LWT `Online`/`Offline`,
//! status strings) - anything not starting with `{` is not telemetry
//! and is ignored without logging.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::handler::Handler;
use crate::op::Operation;

const NAMESPACE: &str = "tele";
const DEVICE_PREFIX: &str = "tasmota_";

#[derive(Debug, Deserialize)]
struct SensorTelemetry {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "ENERGY")]
    energy: EnergyBlock,
}

#[derive(Debug, Deserialize)]
struct EnergyBlock {
    #[serde(rename = "Total")]
    total: f64,
    #[serde(rename = "Power")]
    power: f64,
    #[serde(rename = "ApparentPower")]
    apparent_power: f64,
    #[serde(rename = "ReactivePower")]
    reactive_power: f64,
    #[serde(rename = "Voltage")]
    voltage: f64,
}

#[derive(Debug, Deserialize)]
struct StateTelemetry {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Wifi")]
    wifi: WifiBlock,
}

#[derive(Debug, Deserialize)]
struct WifiBlock {
    #[serde(rename = "RSSI")]
    rssi: f64,
    #[serde(rename = "Signal")]
    signal: f64,
    #[serde(rename = "BSSId")]
    bssid: String,
}

/// Tasmota reports local time without an offset; newer firmware can be
/// configured for RFC 3339. Accept both, treating naive times as UTC.
fn parse_device_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    s.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub struct TasmotaHandler;

impl Handler for TasmotaHandler {
    fn name(&self) -> &'static str {
        "tasmota"
    }

    fn handle(&self, topic: &str, payload: &[u8], emit: &mut dyn FnMut(Operation)) {
        let mut segments = topic.split('/');
        if segments.next() != Some(NAMESPACE) {
            return;
        }
        let (Some(device), Some(kind), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            return;
        };
        let Some(device_id) = device.strip_prefix(DEVICE_PREFIX) else {
            return;
        };

        // Plain-text payloads (LWT, status strings) are not telemetry
        if payload.first() != Some(&b'{') {
            return;
        }

        match kind {
            "SENSOR" => match serde_json::from_slice::<SensorTelemetry>(payload) {
                Ok(telemetry) => {
                    let Some(time) = parse_device_time(&telemetry.time) else {
                        warn!(device_id = %device_id, time = %telemetry.time, "unparseable SENSOR timestamp, skipping");
                        return;
                    };
                    emit(Operation::Power {
                        time,
                        device_id: device_id.to_string(),
                        total: telemetry.energy.total,
                        power: telemetry.energy.power,
                        apparent_power: telemetry.energy.apparent_power,
                        reactive_power: telemetry.energy.reactive_power,
                        voltage: telemetry.energy.voltage,
                    });
                }
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "malformed SENSOR payload, skipping");
                }
            },
            "STATE" => match serde_json::from_slice::<StateTelemetry>(payload) {
                Ok(telemetry) => {
                    let Some(time) = parse_device_time(&telemetry.time) else {
                        warn!(device_id = %device_id, time = %telemetry.time, "unparseable STATE timestamp, skipping");
                        return;
                    };
                    emit(Operation::Wifi {
                        time,
                        device_id: device_id.to_string(),
                        rssi: telemetry.wifi.rssi,
                        signal: telemetry.wifi.signal,
                        bssid: telemetry.wifi.bssid,
                    });
                }
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "malformed STATE payload, skipping");
                }
            },
            other => {
                warn!(device_id = %device_id, kind = %other, "unknown tasmota message kind, dropping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(topic: &str, payload: &[u8]) -> Vec<Operation> {
        let mut ops = Vec::new();
        TasmotaHandler.handle(topic, payload, &mut |op| ops.push(op));
        ops
    }

    #[test]
    fn test_sensor_telemetry_emits_power_op() {
        let ops = collect(
            "tele/tasmota_12AB/SENSOR",
            br#"{"Time":"2024-01-01T00:00:00Z","ENERGY":{"Total":1.2,"Power":100,"ApparentPower":101,"ReactivePower":5,"Voltage":230}}"#,
        );
        assert_eq!(
            ops,
            vec![Operation::Power {
                time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                device_id: "12AB".to_string(),
                total: 1.2,
                power: 100.0,
                apparent_power: 101.0,
                reactive_power: 5.0,
                voltage: 230.0,
            }]
        );
    }

    #[test]
    fn test_sensor_naive_timestamp_treated_as_utc() {
        // Stock firmware omits the offset
        let ops = collect(
            "tele/tasmota_12AB/SENSOR",
            br#"{"Time":"2024-01-01T06:30:00","ENERGY":{"Total":0.1,"Power":5,"ApparentPower":6,"ReactivePower":1,"Voltage":229}}"#,
        );
        assert_eq!(ops.len(), 1);
        let Operation::Power { time, .. } = &ops[0] else {
            panic!("expected Power op");
        };
        assert_eq!(*time, Utc.with_ymd_and_hms(2024, 1, 1, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_state_telemetry_emits_wifi_op() {
        let ops = collect(
            "tele/tasmota_12AB/STATE",
            br#"{"Time":"2024-01-01T00:00:00Z","Uptime":"0T10:20:30","Wifi":{"AP":1,"SSId":"home","BSSId":"AA:BB:CC:DD:EE:FF","RSSI":100,"Signal":-41}}"#,
        );
        assert_eq!(
            ops,
            vec![Operation::Wifi {
                time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                device_id: "12AB".to_string(),
                rssi: 100.0,
                signal: -41.0,
                bssid: "AA:BB:CC:DD:EE:FF".to_string(),
            }]
        );
    }

    #[test]
    fn test_plain_text_payload_silently_ignored() {
        let ops = collect("tele/tasmota_12AB/STATE", b"Offline");
        assert!(ops.is_empty());

        let ops = collect("tele/tasmota_12AB/LWT", b"Online");
        assert!(ops.is_empty());
    }

    #[test]
    fn test_unknown_kind_dropped() {
        let ops = collect("tele/tasmota_12AB/INFO1", br#"{"Module":"Sonoff Basic"}"#);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_non_tasmota_device_ignored() {
        let ops = collect(
            "tele/shelly-plug/SENSOR",
            br#"{"Time":"2024-01-01T00:00:00Z"}"#,
        );
        assert!(ops.is_empty());
    }

    #[test]
    fn test_foreign_namespace_ignored() {
        let ops = collect("zigbee2mqtt/therm-kitchen", br#"{"temperature":1}"#);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_malformed_sensor_payload_skipped() {
        // Claimed shape, missing ENERGY block
        let ops = collect(
            "tele/tasmota_12AB/SENSOR",
            br#"{"Time":"2024-01-01T00:00:00Z"}"#,
        );
        assert!(ops.is_empty());

        // Unparseable timestamp
        let ops = collect(
            "tele/tasmota_12AB/SENSOR",
            br#"{"Time":"yesterday","ENERGY":{"Total":1,"Power":1,"ApparentPower":1,"ReactivePower":1,"Voltage":1}}"#,
        );
        assert!(ops.is_empty());
    }

    #[test]
    fn test_parse_device_time_formats() {
        assert_eq!(
            parse_device_time("2024-01-01T00:00:00Z"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_device_time("2024-01-01T00:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2023, 12, 31, 22, 0, 0).unwrap())
        );
        assert_eq!(
            parse_device_time("2024-01-01T00:00:00"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_device_time("yesterday"), None);
    }
}
