// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

//! A single TCP connection to the server with framed read/write.
//!
//! A connection serves one caller at a time; within a lease, writes and
//! reads are strictly sequential and pairwise correspond.

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::command::cmd;
use crate::errors::{Error, Result};
use crate::parser::{ParserKind, ReplyDecoder, new_decoder};
use crate::resp::Value;

/// Upper bound on the bytes requested from the socket per read. Large bulk
/// bodies arrive over several reads instead of one unbounded one.
const READ_CHUNK: usize = 64 * 1024;

/// Connection target and session settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// Per-I/O deadline. `None` waits indefinitely.
    pub socket_timeout: Option<Duration>,
    pub parser: ParserKind,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            socket_timeout: None,
            parser: ParserKind::default(),
        }
    }
}

impl ConnectionConfig {
    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct Connection {
    config: ConnectionConfig,
    stream: Option<TcpStream>,
    decoder: Box<dyn ReplyDecoder>,
    scratch: BytesMut,
}

async fn io_timeout<T>(
    deadline: Option<Duration>,
    future: impl Future<Output = std::io::Result<T>>,
) -> Result<T, IoFailure> {
    match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, future).await {
            Ok(result) => result.map_err(IoFailure::from),
            Err(_elapsed) => Err(IoFailure::Timeout),
        },
        None => future.await.map_err(IoFailure::from),
    }
}

/// Outcome of a timed I/O operation, before it is given connection-error
/// context by the caller.
enum IoFailure {
    Timeout,
    Io(std::io::Error),
}

impl From<std::io::Error> for IoFailure {
    fn from(err: std::io::Error) -> Self {
        IoFailure::Io(err)
    }
}

impl IoFailure {
    fn into_error(self, context: &str) -> Error {
        match self {
            IoFailure::Timeout => Error::Timeout,
            IoFailure::Io(err) => Error::from_io(context, err),
        }
    }
}

impl Connection {
    /// Creates a disconnected connection. The socket is established by
    /// `connect`, or lazily by the first `send_packed`.
    pub fn new(config: ConnectionConfig) -> Connection {
        let decoder = new_decoder(config.parser);
        Connection {
            config,
            stream: None,
            decoder,
            scratch: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Establishes TCP and runs the AUTH/SELECT handshake. Idempotent: a
    /// connected connection returns immediately. Any failure leaves the
    /// connection disconnected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let address = self.config.address();
        let stream = io_timeout(
            self.config.socket_timeout,
            TcpStream::connect(address.clone()),
        )
        .await
        .map_err(|err| err.into_error(&format!("failed to connect to {address}")))?;
        stream
            .set_nodelay(true)
            .map_err(|err| Error::from_io("failed to configure socket", err))?;
        debug!(%address, "connection established");

        self.stream = Some(stream);
        self.decoder.reset();
        if let Err(err) = self.handshake().await {
            self.disconnect();
            return Err(err);
        }
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        if let Some(password) = self.config.password.clone() {
            let mut auth = cmd("AUTH");
            auth.arg(password.as_str());
            self.send_bytes(&auth.get_packed_command()).await?;
            match self.read_response().await {
                Ok(Value::Okay) => {}
                Ok(_) => {
                    return Err(Error::Authentication(
                        "server returned an unexpected AUTH reply".to_string(),
                    ));
                }
                Err(Error::Server(err)) => {
                    return Err(Error::Authentication(err.message().to_string()));
                }
                Err(err) => return Err(err),
            }
        }

        if self.config.db != 0 {
            let mut select = cmd("SELECT");
            select.arg(self.config.db);
            self.send_bytes(&select.get_packed_command()).await?;
            match self.read_response().await? {
                Value::Okay => {}
                _ => {
                    return Err(Error::Response(
                        "server refused to switch database".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Writes and flushes an already packed buffer, connecting first when
    /// necessary. Disconnects on failure.
    pub async fn send_packed(&mut self, bytes: &[u8]) -> Result<()> {
        self.connect().await?;
        self.send_bytes(bytes).await
    }

    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let deadline = self.config.socket_timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Connection("connection is not established".to_string()));
        };
        let result = io_timeout(deadline, async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.disconnect();
                Err(err.into_error("failed to write to socket"))
            }
        }
    }

    /// Reads one reply. Server error replies are returned as
    /// [`Value::ServerError`] so a pipeline consumer can keep them at their
    /// position; connection-level failures disconnect and raise.
    pub async fn read_reply(&mut self) -> Result<Value> {
        loop {
            match self.decoder.try_next() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => {
                    self.disconnect();
                    return Err(err);
                }
            }

            let deadline = self.config.socket_timeout;
            let Some(stream) = self.stream.as_mut() else {
                return Err(Error::Connection("connection is not established".to_string()));
            };
            self.scratch.clear();
            self.scratch.reserve(READ_CHUNK);
            match io_timeout(deadline, stream.read_buf(&mut self.scratch)).await {
                Ok(0) => {
                    self.disconnect();
                    return Err(Error::Connection(
                        "server closed the connection".to_string(),
                    ));
                }
                Ok(_read) => {
                    self.decoder.feed(&self.scratch);
                }
                Err(err) => {
                    self.disconnect();
                    return Err(err.into_error("failed to read from socket"));
                }
            }
        }
    }

    /// Reads one reply and re-raises a server error reply as a typed error.
    pub async fn read_response(&mut self) -> Result<Value> {
        self.read_reply().await?.extract_error()
    }

    /// Closes the socket and releases the parser state. Idempotent.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!(address = %self.config.address(), "connection closed");
        }
        self.decoder.reset();
        self.scratch.clear();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.config.address())
            .field("connected", &self.is_connected())
            .finish()
    }
}
