// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

//! Executes one drained batch as a MULTI/EXEC transaction.
//!
//! The whole transaction is serialized into a single buffer and written in
//! one call; `N + 2` replies are then read back (the MULTI ack, one QUEUED
//! ack per command, and the EXEC response array) and fanned out to the
//! per-command completion handles.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::warn;

use crate::command::{Cmd, pack_transaction};
use crate::connection::Connection;
use crate::errors::{Error, Result, ServerError, ServerErrorKind};
use crate::pool::ConnectionProvider;
use crate::resp::Value;

use super::response_callbacks::{ResponseCallbacks, decode_reply};
use super::types::{CommandOptions, EncodingErrors};

/// A submitted but unexecuted command: its arguments, caller options, and
/// the one-shot completion handle that delivers the result or error.
pub struct CommandEntry {
    pub(crate) command: Cmd,
    pub(crate) options: CommandOptions,
    pub(crate) completion: oneshot::Sender<Result<Value>>,
}

impl CommandEntry {
    pub(crate) fn complete(self, result: Result<Value>) {
        // a dropped receiver means the caller cancelled; the result is
        // discarded
        let _ = self.completion.send(result);
    }

    fn is_cancelled(&self) -> bool {
        self.completion.is_closed()
    }
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("command", &self.command.name())
            .finish()
    }
}

pub(crate) struct BatchExecutor {
    pool: Arc<dyn ConnectionProvider>,
    callbacks: ResponseCallbacks,
    decode_responses: bool,
    encoding_errors: EncodingErrors,
}

impl BatchExecutor {
    pub(crate) fn new(
        pool: Arc<dyn ConnectionProvider>,
        callbacks: ResponseCallbacks,
        decode_responses: bool,
        encoding_errors: EncodingErrors,
    ) -> BatchExecutor {
        BatchExecutor {
            pool,
            callbacks,
            decode_responses,
            encoding_errors,
        }
    }

    /// Runs `batch` through a leased connection. Every entry's completion
    /// handle is resolved exactly once, with its result or with an error; a
    /// connection failure is retried once on a freshly leased connection.
    pub(crate) async fn execute_batch(&self, batch: Vec<CommandEntry>) {
        if batch.is_empty() {
            return;
        }
        let batch = match self.attempt(batch).await {
            Ok(()) => return,
            Err((err, batch)) if err.is_connection_dropped() || err.is_timeout() => {
                warn!(%err, "batch failed with a connection error, retrying once");
                batch
            }
            Err((err, batch)) => {
                fail_all(batch, err);
                return;
            }
        };
        if let Err((err, batch)) = self.attempt(batch).await {
            fail_all(batch, err);
        }
    }

    /// One execution attempt. On failure the untouched batch is handed back
    /// so the caller can retry or fail it; the leased connection is released
    /// on every path.
    async fn attempt(&self, batch: Vec<CommandEntry>) -> Result<(), (Error, Vec<CommandEntry>)> {
        let mut connection = match self.pool.get("MULTI", None).await {
            Ok(connection) => connection,
            Err(err) => return Err((err, batch)),
        };
        let result = self.run_transaction(&mut connection, batch).await;
        self.pool.release(connection).await;
        result
    }

    async fn run_transaction(
        &self,
        connection: &mut Connection,
        batch: Vec<CommandEntry>,
    ) -> Result<(), (Error, Vec<CommandEntry>)> {
        let packed = pack_transaction(batch.iter().map(|entry| &entry.command));
        if let Err(err) = connection.send_packed(&packed).await {
            return Err((err, batch));
        }

        // A server error on the MULTI ack gets its own slot; QUEUED-phase
        // errors are recorded with their command index and spliced back
        // into the EXEC array later, so the reply count keeps matching the
        // batch. All remaining replies are read either way.
        let mut multi_error: Option<ServerError> = None;
        let mut queued_errors: Vec<(usize, ServerError)> = Vec::new();
        match connection.read_reply().await {
            Ok(Value::ServerError(err)) => multi_error = Some(err),
            Ok(_) => {}
            Err(err) => return Err((err, batch)),
        }
        for (index, entry) in batch.iter().enumerate() {
            match connection.read_reply().await {
                Ok(Value::ServerError(err)) => {
                    let err = err.annotate(index + 1, &entry.command.name());
                    queued_errors.push((index, err));
                }
                Ok(_) => {}
                Err(err) => return Err((err, batch)),
            }
        }
        let exec = match connection.read_reply().await {
            Ok(value) => value,
            Err(err) => return Err((err, batch)),
        };

        match exec {
            Value::ServerError(err) if err.kind() == ServerErrorKind::ExecAbort => {
                // resolve everything with the error that aborted the
                // transaction, preferring the earliest recorded failure
                let first = multi_error
                    .or_else(|| {
                        queued_errors
                            .into_iter()
                            .next()
                            .map(|(_index, queued)| queued)
                    })
                    .unwrap_or(err);
                fail_all(batch, Error::Server(first));
                Ok(())
            }
            Value::ServerError(err) => {
                fail_all(batch, Error::Server(err));
                Ok(())
            }
            // a null EXEC means a watched key changed; this pipeline never
            // issues WATCH, so surface it instead of retrying
            Value::Nil => {
                fail_all(batch, Error::Watch);
                Ok(())
            }
            Value::Array(mut responses) => {
                // a failed MULTI means nothing after it was queued; no
                // positional mapping of the array is trustworthy
                if let Some(err) = multi_error {
                    connection.disconnect();
                    fail_all(batch, Error::Server(err));
                    return Ok(());
                }
                for (index, err) in queued_errors {
                    if index <= responses.len() {
                        responses.insert(index, Value::ServerError(err));
                    } else {
                        responses.push(Value::ServerError(err));
                    }
                }
                if responses.len() != batch.len() {
                    connection.disconnect();
                    fail_all(
                        batch,
                        Error::Response(
                            "wrong number of response items from pipeline execution".to_string(),
                        ),
                    );
                    return Ok(());
                }
                self.dispatch(batch, responses);
                Ok(())
            }
            other => {
                connection.disconnect();
                fail_all(
                    batch,
                    Error::Response(format!("unexpected EXEC reply: {other:?}")),
                );
                Ok(())
            }
        }
    }

    /// Completes each entry with its positional reply, in submission order.
    fn dispatch(&self, batch: Vec<CommandEntry>, responses: Vec<Value>) {
        for (entry, reply) in batch.into_iter().zip(responses) {
            if entry.is_cancelled() {
                continue;
            }
            let result = match reply {
                Value::ServerError(err) => Err(Error::Server(err)),
                value => self.process_reply(&entry, value),
            };
            entry.complete(result);
        }
    }

    fn process_reply(&self, entry: &CommandEntry, value: Value) -> Result<Value> {
        let value = if self.decode_responses {
            decode_reply(value, self.encoding_errors)?
        } else {
            value
        };
        self.callbacks
            .apply(&entry.command.name(), value, &entry.options)
    }
}

fn fail_all(batch: Vec<CommandEntry>, err: Error) {
    for entry in batch {
        entry.complete(Err(err.clone()));
    }
}
