// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

//! Per-command response transforms.
//!
//! The raw reply of each batched command can be post-processed by a
//! callback looked up by command name. The table is populated at startup
//! and read-only afterwards; commands without an entry pass their reply
//! through unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::errors::{Error, Result};
use crate::resp::Value;

use super::types::{CommandOptions, EncodingErrors};

pub type ResponseCallback = Arc<dyn Fn(Value, &CommandOptions) -> Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ResponseCallbacks {
    callbacks: HashMap<String, ResponseCallback>,
}

impl ResponseCallbacks {
    pub fn new() -> ResponseCallbacks {
        ResponseCallbacks::default()
    }

    /// The built-in catalogue. Hosts extend it with `set` or replace it
    /// wholesale on the client builder.
    pub fn standard() -> ResponseCallbacks {
        static STANDARD: Lazy<ResponseCallbacks> = Lazy::new(|| {
            let mut callbacks = ResponseCallbacks::new();
            callbacks.set("PING", Arc::new(pong));
            callbacks
        });
        STANDARD.clone()
    }

    pub fn set(&mut self, command_name: &str, callback: ResponseCallback) {
        self.callbacks
            .insert(command_name.to_ascii_uppercase(), callback);
    }

    pub(crate) fn apply(
        &self,
        command_name: &str,
        value: Value,
        options: &CommandOptions,
    ) -> Result<Value> {
        match self.callbacks.get(command_name) {
            Some(callback) => callback(value, options),
            None => Ok(value),
        }
    }
}

impl std::fmt::Debug for ResponseCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.callbacks.keys().collect();
        names.sort();
        f.debug_tuple("ResponseCallbacks").field(&names).finish()
    }
}

/// PING answers `+PONG`, but arrives as a bulk string when the server
/// echoes a message argument. Normalise both to text.
fn pong(value: Value, _options: &CommandOptions) -> Result<Value> {
    match value {
        Value::BulkString(bytes) => Ok(Value::SimpleString(
            String::from_utf8_lossy(&bytes).into_owned(),
        )),
        value => Ok(value),
    }
}

/// Recursively decodes bulk replies to text, used when `decode_responses`
/// is enabled.
pub(crate) fn decode_reply(value: Value, errors: EncodingErrors) -> Result<Value> {
    match value {
        Value::BulkString(bytes) => match errors {
            EncodingErrors::Strict => String::from_utf8(bytes)
                .map(Value::SimpleString)
                .map_err(|err| Error::Response(format!("invalid utf-8 in reply: {err}"))),
            EncodingErrors::Replace => Ok(Value::SimpleString(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
        },
        Value::Array(items) => items
            .into_iter()
            .map(|item| decode_reply(item, errors))
            .collect::<Result<Vec<Value>>>()
            .map(Value::Array),
        value => Ok(value),
    }
}
