//! Device-family handlers. Each family owns a disjoint topic namespace.

pub mod tasmota;
pub mod zigbee;

pub use tasmota::TasmotaHandler;
pub use zigbee::ZigbeeHandler;
