//! tcp-lookup table protocol.
//!
//! Request: `get <urlencoded-key>\n`. Reply: `<code> <urlencoded-data>\n`.

use bytes::Bytes;

use super::{decode_lookup_data, encode_lookup_data, Frame, FrameReader, ResponseTooLong};

/// Mandatory request prefix.
pub const LOOKUP_PREFIX: &str = "get ";

/// Largest reply, including code and newline.
pub const MAXIMUM_RESPONSE_LENGTH: usize = 4096;

/// Largest accepted request line, excluding the newline.
pub const MAXIMUM_REQUEST_LENGTH: usize = 4096;

const END: u8 = b'\n';

/// Reply status codes understood by the MTA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Success,
    NotFound,
    Error,
}

impl ReplyCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ReplyCode::Success => 200,
            ReplyCode::NotFound => 500,
            ReplyCode::Error => 400,
        }
    }
}

/// Line framing: one request per `\n`, nothing carried across lines.
#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameReader for LineReader {
    type Request = String;

    fn next_frame(&mut self, input: &mut &[u8]) -> Frame<String> {
        while let Some((&byte, rest)) = input.split_first() {
            *input = rest;
            if byte == END {
                let line = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return Frame::Complete(line);
            }
            if self.pending.len() >= MAXIMUM_REQUEST_LENGTH {
                return Frame::Broken(format!(
                    "request line exceeds {} bytes",
                    MAXIMUM_REQUEST_LENGTH
                ));
            }
            self.pending.push(byte);
        }
        Frame::Pending
    }
}

/// Extract and decode the lookup key from a raw request line.
///
/// Returns `None` unless the line starts with `get ` and carries a key.
pub fn parse_request(line: &str) -> Option<String> {
    if line.len() <= LOOKUP_PREFIX.len() {
        return None;
    }
    let raw_key = line.strip_prefix(LOOKUP_PREFIX)?;
    let raw_key = raw_key.trim_matches(|c: char| c <= ' ');
    if raw_key.is_empty() {
        return None;
    }
    Some(decode_lookup_data(raw_key))
}

/// Encode each value and join them with the separator.
pub fn encode_values<S: AsRef<str>>(values: &[S], separator: &str) -> String {
    values
        .iter()
        .map(|value| encode_lookup_data(value.as_ref()))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Format a reply whose data is already encoded.
pub fn format_encoded(code: ReplyCode, encoded: &str) -> Result<Bytes, ResponseTooLong> {
    let text = format!("{} {}\n", code.as_u16(), encoded);
    if text.len() > MAXIMUM_RESPONSE_LENGTH {
        return Err(ResponseTooLong {
            length: text.len(),
            limit: MAXIMUM_RESPONSE_LENGTH,
        });
    }
    Ok(Bytes::from(text))
}

/// Format a reply, percent-encoding `data`.
pub fn format_response(code: ReplyCode, data: &str) -> Result<Bytes, ResponseTooLong> {
    format_encoded(code, &encode_lookup_data(data))
}
