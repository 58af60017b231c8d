//! socketmap lookup protocol.
//!
//! Requests and replies are netstrings. Request payload: `<name> <key>`.
//! Reply payloads: `OK <data>`, `NOTFOUND `, `PERM <msg>`, `TEMP <msg>`,
//! `TIMEOUT <msg>`.

use bytes::Bytes;

use super::netstring::{self, LENGTH_SEPARATOR, TERMINATOR};
use super::{decode_lookup_data, Frame, FrameReader, ResponseTooLong};

/// Largest reply payload (before netstring framing).
pub const MAXIMUM_RESPONSE_LENGTH: usize = 10_000;

/// Largest accepted request payload.
pub const MAXIMUM_REQUEST_LENGTH: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Length,
    Value,
    End,
}

/// Incremental netstring framing.
#[derive(Debug)]
pub struct NetstringReader {
    state: ReadState,
    length: usize,
    digits: usize,
    pending: Vec<u8>,
}

impl Default for NetstringReader {
    fn default() -> Self {
        Self {
            state: ReadState::Length,
            length: 0,
            digits: 0,
            pending: Vec::new(),
        }
    }
}

impl NetstringReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.state = ReadState::Length;
        self.length = 0;
        self.digits = 0;
        self.pending.clear();
    }
}

impl FrameReader for NetstringReader {
    type Request = String;

    fn next_frame(&mut self, input: &mut &[u8]) -> Frame<String> {
        while !input.is_empty() {
            match self.state {
                ReadState::Length => {
                    let byte = input[0];
                    *input = &input[1..];
                    if byte == LENGTH_SEPARATOR {
                        if self.digits == 0 {
                            return Frame::Broken("empty length prefix".to_string());
                        }
                        self.state = if self.length == 0 {
                            ReadState::End
                        } else {
                            ReadState::Value
                        };
                        continue;
                    }
                    if !byte.is_ascii_digit() {
                        return Frame::Broken(format!(
                            "Expected a digit, but got: {:?} (code: {})",
                            byte as char, byte
                        ));
                    }
                    self.length = self.length * 10 + usize::from(byte - b'0');
                    self.digits += 1;
                    if self.length > MAXIMUM_REQUEST_LENGTH {
                        return Frame::Broken(format!(
                            "request length exceeds {} bytes",
                            MAXIMUM_REQUEST_LENGTH
                        ));
                    }
                }
                ReadState::Value => {
                    let wanted = self.length - self.pending.len();
                    let take = wanted.min(input.len());
                    self.pending.extend_from_slice(&input[..take]);
                    *input = &input[take..];
                    if self.pending.len() == self.length {
                        self.state = ReadState::End;
                    }
                }
                ReadState::End => {
                    let byte = input[0];
                    *input = &input[1..];
                    if byte != TERMINATOR {
                        return Frame::Broken(format!(
                            "Expected comma, but got: {:?} (code: {})",
                            byte as char, byte
                        ));
                    }
                    let payload = String::from_utf8_lossy(&self.pending).into_owned();
                    self.reset();
                    return Frame::Complete(payload);
                }
            }
        }
        Frame::Pending
    }
}

/// Split a request payload at the first space into decoded `(name, key)`.
pub fn parse_request(payload: &str) -> Option<(String, String)> {
    let (name, key) = payload.split_once(' ')?;
    Some((decode_lookup_data(name), decode_lookup_data(key)))
}

/// Reply payloads understood by the MTA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketmapReply {
    Ok(String),
    NotFound,
    Perm(String),
    Temp(String),
    Timeout(String),
}

impl SocketmapReply {
    /// The unframed payload text.
    pub fn payload(&self) -> String {
        match self {
            SocketmapReply::Ok(data) => format!("OK {}", data),
            SocketmapReply::NotFound => "NOTFOUND ".to_string(),
            SocketmapReply::Perm(message) => format!("PERM {}", message),
            SocketmapReply::Temp(message) => format!("TEMP {}", message),
            SocketmapReply::Timeout(message) => format!("TIMEOUT {}", message),
        }
    }

    /// Netstring-encode the reply, refusing payloads above the limit.
    pub fn encode(&self) -> Result<Bytes, ResponseTooLong> {
        let payload = self.payload();
        if payload.len() > MAXIMUM_RESPONSE_LENGTH {
            return Err(ResponseTooLong {
                length: payload.len(),
                limit: MAXIMUM_RESPONSE_LENGTH,
            });
        }
        Ok(Bytes::from(netstring::encode(&payload)))
    }
}
