// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

//! The client facade.
//!
//! Each submitted command is turned into a queue entry with a one-shot
//! completion handle; the drain queue coalesces entries into batches and
//! the batch executor runs each batch as one MULTI/EXEC transaction.

mod batch_executor;
mod response_callbacks;
mod types;

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::command::Cmd;
use crate::errors::{Error, Result};
use crate::pool::{ConnectionPool, ConnectionProvider};
use crate::queue::{DrainPolicy, DrainQueue, DrainSink};
use crate::resp::Value;

use batch_executor::BatchExecutor;
pub use batch_executor::CommandEntry;
pub use response_callbacks::{ResponseCallback, ResponseCallbacks};
pub use types::{ClientConfig, CommandOptions, EncodingErrors};

/// A client that transparently batches individually submitted commands
/// into MULTI/EXEC transactions. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct BatchClient {
    /// Submissions are forwarded into the drain queue by one background
    /// task, which keeps entries in submission order and moves queue
    /// back-pressure off the submitting caller.
    submissions: mpsc::UnboundedSender<CommandEntry>,
}

/// Builder for [`BatchClient`], for swapping in an external pool or a
/// custom response callback table.
pub struct BatchClientBuilder {
    config: ClientConfig,
    pool: Option<Arc<dyn ConnectionProvider>>,
    callbacks: Option<ResponseCallbacks>,
}

impl BatchClientBuilder {
    pub fn new(config: ClientConfig) -> BatchClientBuilder {
        BatchClientBuilder {
            config,
            pool: None,
            callbacks: None,
        }
    }

    pub fn connection_pool(mut self, pool: Arc<dyn ConnectionProvider>) -> BatchClientBuilder {
        self.pool = Some(pool);
        self
    }

    pub fn response_callbacks(mut self, callbacks: ResponseCallbacks) -> BatchClientBuilder {
        self.callbacks = Some(callbacks);
        self
    }

    /// Wires pool → executor → drain queue. Performs no I/O; the first
    /// leased connection connects on first use. Must be called from within
    /// a tokio runtime.
    pub fn build(self) -> Result<BatchClient> {
        self.config.validate()?;
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(ConnectionPool::new(self.config.connection_config())));
        let callbacks = self.callbacks.unwrap_or_else(ResponseCallbacks::standard);
        let executor = Arc::new(BatchExecutor::new(
            pool,
            callbacks,
            self.config.decode_responses,
            self.config.encoding_errors,
        ));
        let sink: DrainSink<CommandEntry> = Box::new(move |batch| {
            let executor = executor.clone();
            async move { executor.execute_batch(batch).await }.boxed()
        });
        let queue = DrainQueue::new(
            DrainPolicy::time_and_size(self.config.cmd_maxsize, self.config.cmd_timeout),
            sink,
        );
        let (submissions, mut submission_rx) = mpsc::unbounded_channel::<CommandEntry>();
        tokio::spawn(async move {
            while let Some(entry) = submission_rx.recv().await {
                queue.put(entry).await;
            }
        });
        debug!(
            host = %self.config.host,
            port = self.config.port,
            maxsize = self.config.cmd_maxsize,
            timeout_ms = self.config.cmd_timeout.as_millis() as u64,
            "batch client created"
        );
        Ok(BatchClient { submissions })
    }
}

impl BatchClient {
    /// Creates a client with a default pool over the configured address.
    pub fn new(config: ClientConfig) -> Result<BatchClient> {
        BatchClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> BatchClientBuilder {
        BatchClientBuilder::new(config)
    }

    /// Submits one command. The returned future resolves once the batch
    /// containing the command has executed; the submission itself never
    /// blocks the caller, even when the queue is exerting back-pressure.
    pub fn execute_command(&self, command: Cmd) -> BoxFuture<'static, Result<Value>> {
        self.execute_command_with_options(command, CommandOptions::default())
    }

    pub fn execute_command_with_options(
        &self,
        command: Cmd,
        options: CommandOptions,
    ) -> BoxFuture<'static, Result<Value>> {
        if command.is_empty() {
            return async { Err(Error::Client("cannot submit an empty command".to_string())) }
                .boxed();
        }
        let (completion, receiver) = oneshot::channel();
        let entry = CommandEntry {
            command,
            options,
            completion,
        };
        if let Err(rejected) = self.submissions.send(entry) {
            rejected.0.complete(Err(Error::Client(
                "client is shutting down".to_string(),
            )));
        }
        async move {
            match receiver.await {
                Ok(result) => result,
                Err(_dropped) => Err(Error::Client(
                    "client was dropped before the command completed".to_string(),
                )),
            }
        }
        .boxed()
    }
}
