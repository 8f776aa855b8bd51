//! Deferred store writes emitted by handlers.

use chrono::{DateTime, Utc};

/// A data-only write instruction targeting one table/row.
///
/// Every field is an owned copy of data extracted from the source
/// message, so a pending operation stays valid after the message buffer
/// is cleared. Column order per variant is part of the store contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `ambient_temp(time, sensor, temperature, humidity)` - time is
    /// assigned server-side at write time.
    AmbientTemp {
        sensor: String,
        temperature: f64,
        humidity: f64,
    },
    /// `power(time, device_id, total, power, apparent_power,
    /// reactive_power, voltage)` - time comes from the device payload.
    Power {
        time: DateTime<Utc>,
        device_id: String,
        total: f64,
        power: f64,
        apparent_power: f64,
        reactive_power: f64,
        voltage: f64,
    },
    /// `wifi(time, device_id, rssi, signal, bssid)` - time comes from
    /// the device payload.
    Wifi {
        time: DateTime<Utc>,
        device_id: String,
        rssi: f64,
        signal: f64,
        bssid: String,
    },
}

impl Operation {
    /// Target table name, for logging.
    pub fn table(&self) -> &'static str {
        match self {
            Operation::AmbientTemp { .. } => "ambient_temp",
            Operation::Power { .. } => "power",
            Operation::Wifi { .. } => "wifi",
        }
    }
}
