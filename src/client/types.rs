// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use crate::connection::ConnectionConfig;
use crate::errors::{Error, Result};
use crate::parser::ParserKind;

/// How invalid text in a decoded bulk reply is handled when
/// `decode_responses` is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingErrors {
    /// Invalid UTF-8 fails the command with a response error.
    #[default]
    Strict,
    /// Invalid sequences are replaced with U+FFFD.
    Replace,
}

/// Client configuration. `Default` mirrors a plain local server setup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// Per-I/O deadline at the connection layer. `None` waits indefinitely.
    pub socket_timeout: Option<Duration>,
    /// Wire encoding for string arguments and decoded replies. Only UTF-8
    /// is supported; any other name is rejected at construction.
    pub encoding: String,
    pub encoding_errors: EncodingErrors,
    /// Decode bulk replies to text.
    pub decode_responses: bool,
    /// Size drain threshold of the command queue.
    pub cmd_maxsize: usize,
    /// Time drain deadline of the command queue.
    pub cmd_timeout: Duration,
    pub parser: ParserKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            socket_timeout: None,
            encoding: "utf-8".to_string(),
            encoding_errors: EncodingErrors::Strict,
            decode_responses: false,
            cmd_maxsize: 500,
            cmd_timeout: Duration::from_millis(10),
            parser: ParserKind::Streaming,
        }
    }
}

impl ClientConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !matches!(
            self.encoding.to_ascii_lowercase().as_str(),
            "utf-8" | "utf8"
        ) {
            return Err(Error::Client(format!(
                "unsupported encoding `{}`, only utf-8 is available",
                self.encoding
            )));
        }
        if self.cmd_maxsize == 0 {
            return Err(Error::Client("cmd_maxsize must be at least 1".to_string()));
        }
        Ok(())
    }

    pub(crate) fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            db: self.db,
            password: self.password.clone(),
            socket_timeout: self.socket_timeout,
            parser: self.parser,
        }
    }
}

/// Caller-supplied options for one command, passed through opaquely to its
/// response callback.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    options: HashMap<String, String>,
}

impl CommandOptions {
    pub fn new() -> CommandOptions {
        CommandOptions::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> CommandOptions {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}
