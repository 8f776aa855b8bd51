use serde::Deserialize;
use std::time::Duration;

use crate::error::IngestError;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub postgres: PostgresConfig,
    pub poll: PollConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    /// Broker URL, e.g. mqtt://localhost:1883
    pub url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Topic filters to subscribe to
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub dbname: String,
    pub user: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    /// Dispatch poll interval, e.g. "1s", "5s", "1m"
    pub interval: String,
}

fn default_client_id() -> String {
    "hometsd-ingest".to_string()
}

fn default_topics() -> Vec<String> {
    vec!["zigbee2mqtt/+".to_string(), "tele/+/+".to_string()]
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| IngestError::Config(e.to_string()))
    }
}

impl PollConfig {
    /// Parse interval string like "500ms", "1s", "1m" to Duration
    pub fn parse_interval(&self) -> Result<Duration, IngestError> {
        let s = self.interval.trim();
        if s.is_empty() {
            return Err(IngestError::Config("empty poll interval".to_string()));
        }

        let (num_str, unit) = match s.strip_suffix("ms") {
            Some(num) => (num, "ms"),
            None => s.split_at(s.len() - 1),
        };
        let num: u64 = num_str
            .parse()
            .map_err(|_| IngestError::Config(format!("invalid poll interval: {}", s)))?;

        if num == 0 {
            return Err(IngestError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        match unit {
            "ms" => Ok(Duration::from_millis(num)),
            "s" => Ok(Duration::from_secs(num)),
            "m" => Ok(Duration::from_secs(num * 60)),
            "h" => Ok(Duration::from_secs(num * 60 * 60)),
            _ => Err(IngestError::Config(format!("unknown unit: {}", unit))),
        }
    }
}
