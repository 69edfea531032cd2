// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

pub mod client;
pub mod command;
pub mod connection;
pub mod errors;
pub mod parser;
pub mod pool;
pub mod queue;
pub mod resp;

pub use client::{BatchClient, BatchClientBuilder, ClientConfig, CommandOptions};
pub use command::{Cmd, cmd};
pub use errors::{Error, Result, ServerError, ServerErrorKind};
pub use resp::Value;
