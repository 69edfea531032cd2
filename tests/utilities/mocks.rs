// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

use futures_intrusive::sync::ManualResetEvent;
use std::collections::HashMap;
use std::io;
use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::net::TcpStream as StdTcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicU16, Ordering},
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// What the mock does once a scripted request has fully arrived.
pub enum MockReply {
    Respond(String),
    /// Read the request, then drop the connection without answering.
    CloseConnection,
}

pub struct MockedRequest {
    pub expected_message: String,
    pub reply: MockReply,
}

/// A scripted RESP server on a real listener. Handshake commands are
/// answered from a constant table; everything else must arrive in the
/// scripted order and is answered (or hung up on) per script. Reconnects
/// are served by accepting the next connection.
pub struct ServerMock {
    request_sender: UnboundedSender<MockedRequest>,
    host: String,
    port: u16,
    received_requests: Arc<AtomicU16>,
    closing_signal: Arc<ManualResetEvent>,
    closing_completed_signal: Arc<ManualResetEvent>,
}

fn read_from_socket(
    buffer: &mut [u8],
    socket: &mut StdTcpStream,
    closing_signal: &Arc<ManualResetEvent>,
) -> Option<usize> {
    while !closing_signal.is_set() {
        match socket.read(buffer) {
            Ok(0) => {
                return None;
            }
            Ok(size) => {
                return Some(size);
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(_) => {
                return None;
            }
        }
    }
    None
}

enum Action {
    Respond(String),
    Hangup,
    NeedMoreInput,
}

fn next_action(
    message: &str,
    pending: &mut Option<MockedRequest>,
    receiver: &mut UnboundedReceiver<MockedRequest>,
    received_requests: &Arc<AtomicU16>,
    constant_responses: &HashMap<String, String>,
) -> Action {
    if let Some(response) = constant_responses.get(message) {
        return Action::Respond(response.clone());
    }
    if pending.is_none() {
        *pending = receiver.try_recv().ok();
    }
    if let Some(request) = pending.as_ref() {
        if message == request.expected_message {
            received_requests.fetch_add(1, Ordering::AcqRel);
            let request = pending.take().unwrap();
            return match request.reply {
                MockReply::Respond(response) => Action::Respond(response),
                MockReply::CloseConnection => Action::Hangup,
            };
        }
        if request.expected_message.starts_with(message) {
            return Action::NeedMoreInput;
        }
    }
    if constant_responses.keys().any(|key| key.starts_with(message)) {
        return Action::NeedMoreInput;
    }
    panic!("Received unexpected message: {message:?}");
}

/// Serves one accepted connection until the peer disconnects or the script
/// asks for a hangup. Returns `false` once the mock is closing.
fn serve_connection(
    mut socket: StdTcpStream,
    pending: &mut Option<MockedRequest>,
    receiver: &mut UnboundedReceiver<MockedRequest>,
    received_requests: &Arc<AtomicU16>,
    constant_responses: &HashMap<String, String>,
    closing_signal: &Arc<ManualResetEvent>,
) -> bool {
    let _ = socket.set_read_timeout(Some(std::time::Duration::from_millis(10)));
    let mut accumulated = Vec::new();
    let mut buffer = vec![0; 16 * 1024];
    loop {
        if closing_signal.is_set() {
            return false;
        }
        let size = match read_from_socket(&mut buffer, &mut socket, closing_signal) {
            Some(size) => size,
            None => return !closing_signal.is_set(),
        };
        accumulated.extend_from_slice(&buffer[..size]);
        loop {
            let message = String::from_utf8(accumulated.clone()).unwrap();
            if message.is_empty() {
                break;
            }
            match next_action(
                &message,
                pending,
                receiver,
                received_requests,
                constant_responses,
            ) {
                Action::Respond(response) => {
                    accumulated.clear();
                    socket.write_all(response.as_bytes()).unwrap();
                }
                Action::Hangup => {
                    let _ = socket.shutdown(std::net::Shutdown::Both);
                    return true;
                }
                Action::NeedMoreInput => break,
            }
        }
    }
}

impl ServerMock {
    pub fn new(constant_responses: HashMap<String, String>) -> Self {
        let listener = super::get_listener_on_available_port();
        Self::new_with_listener(constant_responses, listener)
    }

    pub fn new_with_listener(
        constant_responses: HashMap<String, String>,
        listener: TcpListener,
    ) -> Self {
        let (request_sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let received_requests = Arc::new(AtomicU16::new(0));
        let received_requests_clone = received_requests.clone();
        let host = "localhost".to_string();
        let port = listener.local_addr().unwrap().port();
        let closing_signal = Arc::new(ManualResetEvent::new(false));
        let closing_signal_clone = closing_signal.clone();
        let closing_completed_signal = Arc::new(ManualResetEvent::new(false));
        let closing_completed_signal_clone = closing_completed_signal.clone();
        std::thread::spawn(move || {
            listener.set_nonblocking(true).unwrap();
            let mut pending: Option<MockedRequest> = None;
            while !closing_signal_clone.is_set() {
                let socket = match listener.accept() {
                    Ok((socket, _addr)) => socket,
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(std::time::Duration::from_millis(2));
                        continue;
                    }
                    Err(_) => break,
                };
                if !serve_connection(
                    socket,
                    &mut pending,
                    &mut receiver,
                    &received_requests_clone,
                    &constant_responses,
                    &closing_signal_clone,
                ) {
                    break;
                }
            }
            closing_completed_signal_clone.set();
        });

        Self {
            request_sender,
            host,
            port,
            received_requests,
            closing_signal,
            closing_completed_signal,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Scripts the next request/response exchange.
    pub fn add_exchange(&self, expected_message: impl Into<String>, response: impl Into<String>) {
        let _ = self.request_sender.send(MockedRequest {
            expected_message: expected_message.into(),
            reply: MockReply::Respond(response.into()),
        });
    }

    /// Scripts a request after which the mock drops the connection.
    pub fn add_hangup(&self, expected_message: impl Into<String>) {
        let _ = self.request_sender.send(MockedRequest {
            expected_message: expected_message.into(),
            reply: MockReply::CloseConnection,
        });
    }

    pub fn get_number_of_received_requests(&self) -> u16 {
        self.received_requests.load(Ordering::Acquire)
    }

    pub async fn close(self) {
        self.closing_signal.set();
        self.closing_completed_signal.wait().await;
    }
}

impl Drop for ServerMock {
    fn drop(&mut self) {
        self.closing_signal.set();
    }
}
