// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

//! Streaming reply decoders.
//!
//! A decoder is fed raw bytes from the socket and hands back complete
//! [`Value`]s as soon as enough input has accumulated. Two backends exist:
//! the crate's own byte-oriented decoder and one built on the
//! `redis-protocol` frame codec. Both are reply-equivalent; the byte
//! decoder is the default.

use bytes::{Buf, BytesMut};
use redis_protocol::resp2::decode::decode_bytes_mut;
use redis_protocol::resp2::types::BytesFrame;

use crate::errors::{Error, Result, ServerError};
use crate::resp::Value;

/// Selects the reply decoder bound to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserKind {
    #[default]
    Streaming,
    Native,
}

/// Incremental reply decoder. `feed` appends raw socket bytes; `try_next`
/// returns the next complete reply, or `None` when more input is needed.
pub trait ReplyDecoder: Send {
    fn feed(&mut self, bytes: &[u8]);
    fn try_next(&mut self) -> Result<Option<Value>>;
    /// Discards any partially buffered input. Called on disconnect.
    fn reset(&mut self);
}

pub fn new_decoder(kind: ParserKind) -> Box<dyn ReplyDecoder> {
    match kind {
        ParserKind::Streaming => Box::new(StreamingDecoder::default()),
        ParserKind::Native => Box::new(NativeDecoder::default()),
    }
}

/// The byte-oriented decoder: a restartable recursive-descent scan over the
/// buffered input. A scan that runs out of bytes leaves the buffer intact
/// and is simply repeated once more input arrives.
#[derive(Default)]
pub struct StreamingDecoder {
    buf: BytesMut,
}

impl ReplyDecoder for StreamingDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn try_next(&mut self) -> Result<Option<Value>> {
        match parse_value(&self.buf)? {
            Some((value, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
    }
}

fn find_crlf(input: &[u8]) -> Option<usize> {
    input.windows(2).position(|pair| pair == b"\r\n")
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            Error::Protocol(format!(
                "invalid integer in reply: {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}

/// Parses one reply from the start of `input`. Returns the value and the
/// number of bytes it occupied, or `None` when the input is incomplete.
fn parse_value(input: &[u8]) -> Result<Option<(Value, usize)>> {
    let Some(line_end) = find_crlf(input) else {
        return Ok(None);
    };
    let tag = input[0];
    let line = &input[1..line_end];
    let header_len = line_end + 2;

    match tag {
        b'+' => {
            let value = if line == b"OK" {
                Value::Okay
            } else {
                Value::SimpleString(String::from_utf8_lossy(line).into_owned())
            };
            Ok(Some((value, header_len)))
        }
        b'-' => {
            let message = String::from_utf8_lossy(line);
            Ok(Some((
                Value::ServerError(ServerError::parse(&message)),
                header_len,
            )))
        }
        b':' => Ok(Some((Value::Int(parse_int(line)?), header_len))),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some((Value::Nil, header_len)));
            }
            let len = len as usize;
            if input.len() < header_len + len + 2 {
                return Ok(None);
            }
            let body = input[header_len..header_len + len].to_vec();
            if &input[header_len + len..header_len + len + 2] != b"\r\n" {
                return Err(Error::Protocol(
                    "bulk string is not terminated by CRLF".to_string(),
                ));
            }
            Ok(Some((Value::BulkString(body), header_len + len + 2)))
        }
        b'*' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some((Value::Nil, header_len)));
            }
            let mut items = Vec::with_capacity(len as usize);
            let mut consumed = header_len;
            for _ in 0..len {
                match parse_value(&input[consumed..])? {
                    Some((item, item_len)) => {
                        items.push(item);
                        consumed += item_len;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Value::Array(items), consumed)))
        }
        other => Err(Error::Protocol(format!(
            "invalid response type tag {:?}",
            other as char
        ))),
    }
}

/// Decoder backed by the `redis-protocol` frame codec, the ecosystem
/// analogue of the hiredis reader: feed bytes, ask for the next frame.
#[derive(Default)]
pub struct NativeDecoder {
    buf: BytesMut,
}

impl ReplyDecoder for NativeDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn try_next(&mut self) -> Result<Option<Value>> {
        match decode_bytes_mut(&mut self.buf) {
            Ok(Some((frame, _amount, _raw))) => Ok(Some(frame_to_value(frame))),
            Ok(None) => Ok(None),
            Err(err) => Err(Error::Protocol(err.to_string())),
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
    }
}

fn frame_to_value(frame: BytesFrame) -> Value {
    match frame {
        BytesFrame::SimpleString(s) => {
            if s.as_ref() == b"OK" {
                Value::Okay
            } else {
                Value::SimpleString(String::from_utf8_lossy(&s).into_owned())
            }
        }
        BytesFrame::Error(message) => Value::ServerError(ServerError::parse(&message)),
        BytesFrame::Integer(i) => Value::Int(i),
        BytesFrame::BulkString(b) => Value::BulkString(b.to_vec()),
        BytesFrame::Array(items) => {
            Value::Array(items.into_iter().map(frame_to_value).collect())
        }
        BytesFrame::Null => Value::Nil,
    }
}
