// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

//! Connection leasing.
//!
//! The batch executor only relies on the [`ConnectionProvider`] contract:
//! `get` hands out a connection that is connected or will connect on first
//! use, and every leased connection is eventually given back through
//! `release`. Pool implementations can be swapped without affecting the
//! executor.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_retry2::strategy::{FixedInterval, jitter};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionConfig};
use crate::errors::Result;

#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Leases a connection. The hints describe the intended use (e.g. the
    /// command about to be sent and a shard selector) and may be ignored.
    async fn get(&self, command_hint: &str, shard_hint: Option<&str>) -> Result<Connection>;

    /// Returns a leased connection.
    async fn release(&self, connection: Connection);
}

const CONNECT_RETRY_INTERVAL_MS: u64 = 50;
const CONNECT_RETRIES: usize = 3;

/// Sleep intervals between connection attempts: a short fixed interval,
/// jittered so concurrent leases do not reconnect in lockstep.
fn connect_backoff() -> impl Iterator<Item = Duration> {
    FixedInterval::from_millis(CONNECT_RETRY_INTERVAL_MS)
        .map(jitter)
        .take(CONNECT_RETRIES)
}

/// The default pool: an idle stack of connections for one server address.
/// Leases pop an idle connection or establish a new one; disconnected
/// returns are discarded so the next lease starts from a fresh socket.
pub struct ConnectionPool {
    config: ConnectionConfig,
    idle: Mutex<Vec<Connection>>,
}

impl ConnectionPool {
    pub fn new(config: ConnectionConfig) -> ConnectionPool {
        ConnectionPool {
            config,
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn create_connection(&self) -> Result<Connection> {
        let mut connection = Connection::new(self.config.clone());
        let mut backoff = connect_backoff();
        loop {
            match connection.connect().await {
                Ok(()) => return Ok(connection),
                Err(err) if err.is_connection_dropped() || err.is_timeout() => {
                    match backoff.next() {
                        Some(sleep_duration) => {
                            warn!(%err, "connection attempt failed, will retry");
                            tokio::time::sleep(sleep_duration).await;
                        }
                        None => return Err(err),
                    }
                }
                // AUTH or SELECT refusals are not transient
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionPool {
    async fn get(&self, _command_hint: &str, _shard_hint: Option<&str>) -> Result<Connection> {
        let idle = self.idle.lock().unwrap().pop();
        match idle {
            Some(connection) => Ok(connection),
            None => self.create_connection().await,
        }
    }

    async fn release(&self, connection: Connection) {
        if connection.is_connected() {
            self.idle.lock().unwrap().push(connection);
        } else {
            debug!("discarding disconnected connection instead of pooling it");
        }
    }
}
