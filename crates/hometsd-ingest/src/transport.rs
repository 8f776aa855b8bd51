//! MQTT transport task: subscribes to the configured topic filters and
//! feeds every incoming publish into the shared message buffer.
//!
//! Reconnection is out of scope - an event-loop error is fatal to the
//! task and the caller decides what to do with the process.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::buffer::MessageBuffer;
use crate::config::MqttConfig;
use crate::error::IngestError;

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Parse a broker URL of the form mqtt://host:port, tcp://host:port or
/// host:port, defaulting the port when absent.
pub fn parse_broker_url(url: &str) -> Result<(&str, u16), IngestError> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    match url.split_once(':') {
        None => Ok((url, DEFAULT_MQTT_PORT)),
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                IngestError::Config(format!("invalid port in broker URL: {}", port))
            })?;
            Ok((host, port))
        }
    }
}

/// Connect, subscribe, and pump publishes into the buffer until
/// cancelled. Enqueueing never blocks the delivery context beyond the
/// buffer's own lock.
pub async fn run_mqtt_source(
    config: &MqttConfig,
    buffer: Arc<MessageBuffer>,
    shutdown: CancellationToken,
) -> Result<(), IngestError> {
    let (host, port) = parse_broker_url(&config.url)?;

    let mut options = MqttOptions::new(&config.client_id, host, port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(options, 100);

    for topic in &config.topics {
        client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| IngestError::Transport(format!("subscribe failed: {}", e)))?;
        info!(topic = %topic, "subscribed");
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        trace!(topic = %publish.topic, bytes = publish.payload.len(), "message received");
                        buffer.enqueue(publish.topic, publish.payload);
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(host = %host, port = port, "connected to MQTT broker");
                    }
                    Ok(_) => {
                        // Pings, suback, outgoing packets
                    }
                    Err(e) => {
                        return Err(IngestError::Transport(format!("event loop error: {}", e)));
                    }
                }
            }
        }
    }
}
