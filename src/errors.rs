// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

use std::fmt;

/// Classification of a server error reply, derived from the leading
/// all-caps code of the error line (`-WRONGTYPE ...`, `-EXECABORT ...`).
/// Codes without a dedicated variant fall back to [`ServerErrorKind::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    Generic,
    ExecAbort,
    BusyLoading,
    NoScript,
    Moved,
    Ask,
    WrongType,
    ReadOnly,
}

impl ServerErrorKind {
    fn from_code(code: &str) -> Option<ServerErrorKind> {
        match code {
            "ERR" => Some(ServerErrorKind::Generic),
            "EXECABORT" => Some(ServerErrorKind::ExecAbort),
            "LOADING" => Some(ServerErrorKind::BusyLoading),
            "NOSCRIPT" => Some(ServerErrorKind::NoScript),
            "MOVED" => Some(ServerErrorKind::Moved),
            "ASK" => Some(ServerErrorKind::Ask),
            "WRONGTYPE" => Some(ServerErrorKind::WrongType),
            "READONLY" => Some(ServerErrorKind::ReadOnly),
            _ => None,
        }
    }
}

/// An error reply received from the server.
///
/// Server errors are carried as values through the reply decoding layer so
/// that they can be placed at their correct position inside a pipeline
/// response array, and only converted into a raised [`Error`] at the point
/// where a single caller is responsible for them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ServerError {
    kind: ServerErrorKind,
    message: String,
}

impl ServerError {
    /// Parses an error line as received on the wire, without the leading `-`.
    pub fn parse(line: &str) -> ServerError {
        let code = line.split(' ').next().unwrap_or("");
        let kind = if !code.is_empty() && code.chars().all(|c| c.is_ascii_uppercase()) {
            ServerErrorKind::from_code(code).unwrap_or(ServerErrorKind::Generic)
        } else {
            ServerErrorKind::Generic
        };
        ServerError {
            kind,
            message: line.to_string(),
        }
    }

    pub fn kind(&self) -> ServerErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefixes the error with the 1-based position and name of the
    /// pipeline command that caused it.
    pub(crate) fn annotate(self, position: usize, command_name: &str) -> ServerError {
        ServerError {
            kind: self.kind,
            message: format!(
                "Command # {position} ({command_name}) of pipeline caused error: {}",
                self.message
            ),
        }
    }
}

/// The error type of this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// I/O or handshake failure. The connection is left disconnected.
    #[error("connection error: {0}")]
    Connection(String),
    /// The byte stream does not conform to the RESP grammar. Fatal for the
    /// connection.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server refused AUTH.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// An I/O operation exceeded the configured socket timeout.
    #[error("operation timed out")]
    Timeout,
    /// EXEC returned null: a watched key changed between MULTI and EXEC.
    #[error("watched key changed between MULTI and EXEC")]
    Watch,
    /// A typed error reply from the server, owned by a single command.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The response stream did not line up with the commands sent.
    #[error("response error: {0}")]
    Response(String),
    /// Client-side failure outside the protocol, e.g. invalid configuration
    /// or a response callback error.
    #[error("{0}")]
    Client(String),
}

impl Error {
    /// Whether the error indicates that the connection is no longer usable.
    /// These are the errors worth one batch retry on a fresh connection.
    pub fn is_connection_dropped(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    pub(crate) fn from_io(context: &str, err: std::io::Error) -> Error {
        Error::Connection(format!("{context}: {err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
