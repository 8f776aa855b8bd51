//! Store sink: where collected operations are executed.
//!
//! One trait, two implementations - a tokio-postgres session for
//! production and an in-memory recorder for tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

use crate::config::PostgresConfig;
use crate::op::Operation;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(String),
}

/// A single logical store session executing one parameterized write per
/// operation. The dispatch loop awaits each call before issuing the
/// next, so implementations never see concurrent writes.
#[async_trait]
pub trait StoreSink: Send {
    async fn execute(&mut self, op: &Operation) -> Result<(), SinkError>;
}

pub struct PostgresSink {
    client: tokio_postgres::Client,
}

impl PostgresSink {
    /// Connect and spawn the connection driver task. The session lives
    /// for the process lifetime; a lost connection surfaces as write
    /// failures on subsequent operations.
    pub async fn connect(
        config: &PostgresConfig,
        password: Option<&str>,
    ) -> Result<Self, SinkError> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .dbname(&config.dbname)
            .user(&config.user);
        if let Some(password) = password {
            pg_config.password(password);
        }

        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| SinkError::Database(format!("connection failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection error");
            }
        });

        info!(host = %config.host, dbname = %config.dbname, user = %config.user, "connected to postgres");

        Ok(Self { client })
    }
}

#[async_trait]
impl StoreSink for PostgresSink {
    async fn execute(&mut self, op: &Operation) -> Result<(), SinkError> {
        let rows = match op {
            Operation::AmbientTemp {
                sensor,
                temperature,
                humidity,
            } => {
                self.client
                    .execute(
                        "INSERT INTO ambient_temp (time, sensor, temperature, humidity) \
                         VALUES (now(), $1, $2, $3)",
                        &[sensor, temperature, humidity],
                    )
                    .await
            }
            Operation::Power {
                time,
                device_id,
                total,
                power,
                apparent_power,
                reactive_power,
                voltage,
            } => {
                self.client
                    .execute(
                        "INSERT INTO power (time, device_id, total, power, apparent_power, reactive_power, voltage) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7)",
                        &[time, device_id, total, power, apparent_power, reactive_power, voltage],
                    )
                    .await
            }
            Operation::Wifi {
                time,
                device_id,
                rssi,
                signal,
                bssid,
            } => {
                self.client
                    .execute(
                        "INSERT INTO wifi (time, device_id, rssi, signal, bssid) \
                         VALUES ($1, $2, $3, $4, $5)",
                        &[time, device_id, rssi, signal, bssid],
                    )
                    .await
            }
        }
        .map_err(|e| SinkError::Database(e.to_string()))?;

        debug!(table = op.table(), rows = rows, "executed operation");
        Ok(())
    }
}

/// In-memory sink recording executed operations in order, with optional
/// failure injection for write-failure policy tests.
pub struct MemorySink {
    executed: Vec<Operation>,
    fail_on: Option<usize>,
    calls: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            executed: Vec::new(),
            fail_on: None,
            calls: 0,
        }
    }

    /// Fail the nth execute call (0-based); later calls succeed again.
    pub fn fail_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    pub fn executed(&self) -> &[Operation] {
        &self.executed
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreSink for MemorySink {
    async fn execute(&mut self, op: &Operation) -> Result<(), SinkError> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on == Some(call) {
            return Err(SinkError::Database("injected failure".to_string()));
        }
        self.executed.push(op.clone());
        Ok(())
    }
}
