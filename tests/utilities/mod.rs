// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

pub mod mocks;

use std::collections::HashMap;
use std::future::Future;
use std::net::TcpListener;
use std::time::Duration;

use batch_core::client::ClientConfig;
use batch_core::command::{Cmd, cmd};

use mocks::ServerMock;

pub const SHORT_BATCH_TEST_TIMEOUT: Duration = Duration::from_secs(15);

pub fn block_on_all<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

pub fn get_listener_on_available_port() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").unwrap()
}

/// The exact bytes the executor writes for one batch: the commands wrapped
/// in MULTI/EXEC, as a single buffer.
pub fn transaction_blob(commands: &[Cmd]) -> String {
    let mut out = cmd("MULTI").get_packed_command();
    for command in commands {
        out.extend(command.get_packed_command());
    }
    out.extend(cmd("EXEC").get_packed_command());
    String::from_utf8(out).unwrap()
}

/// The server side of a fully successful batch: `+OK`, one `+QUEUED` per
/// command, then the given EXEC payload.
pub fn transaction_response(command_count: usize, exec_payload: &str) -> String {
    let mut response = String::from("+OK\r\n");
    for _ in 0..command_count {
        response.push_str("+QUEUED\r\n");
    }
    response.push_str(exec_payload);
    response
}

pub fn ping() -> Cmd {
    cmd("PING")
}

pub fn mock_client_config(mock: &ServerMock) -> ClientConfig {
    ClientConfig {
        host: mock.host().to_string(),
        port: mock.port(),
        ..Default::default()
    }
}

pub fn server_mock() -> ServerMock {
    ServerMock::new(HashMap::new())
}
