//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! bytes from the socket
//!     → FrameReader (per-protocol state machine)
//!     → Frame::Complete(request) → handler
//!     → Frame::Broken(reason)    → handler emits fatal reply, connection closes
//!
//! reply from the handler
//!     → tcp_lookup / socketmap / policy formatters
//!     → bytes for the socket writer
//! ```
//!
//! # Design Decisions
//! - Readers are plain state machines without I/O; the connection feeds them
//! - Framing is independent of chunk boundaries
//! - Formatters refuse oversized replies instead of truncating them

pub mod netstring;
pub mod policy;
pub mod socketmap;
pub mod tcp_lookup;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

pub use netstring::NetstringError;
pub use policy::{PolicyReader, PolicyRequest};
pub use socketmap::NetstringReader;
pub use tcp_lookup::LineReader;

/// Result of feeding bytes into a [`FrameReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<R> {
    /// More bytes are needed.
    Pending,
    /// A full request was recognized.
    Complete(R),
    /// The byte stream violates the protocol; the connection cannot continue.
    Broken(String),
}

/// Protocol-specific framing state machine.
pub trait FrameReader {
    /// Request type produced for each complete frame.
    type Request;

    /// Consume bytes from `input` until one frame completes or `input` is empty.
    ///
    /// Consumed bytes are removed from the front of `input`. Returns
    /// [`Frame::Pending`] once the input is exhausted without completing a frame.
    /// After [`Frame::Broken`] the reader must not be fed again.
    fn next_frame(&mut self, input: &mut &[u8]) -> Frame<Self::Request>;
}

/// Drain `input` through `reader`, collecting every frame up to and including
/// the first broken one.
pub fn read_frames<R: FrameReader>(reader: &mut R, mut input: &[u8]) -> Vec<Frame<R::Request>> {
    let mut frames = Vec::new();
    loop {
        match reader.next_frame(&mut input) {
            Frame::Pending => return frames,
            Frame::Broken(reason) => {
                frames.push(Frame::Broken(reason));
                return frames;
            }
            complete => frames.push(complete),
        }
    }
}

/// A formatted reply exceeded the protocol's size limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("response of {length} bytes exceeds the limit of {limit} bytes")]
pub struct ResponseTooLong {
    pub length: usize,
    pub limit: usize,
}

/// Bytes that must never appear raw in a lookup reply: everything up to and
/// including space, DEL and the escape character itself. Non-ASCII is always
/// escaped by `percent-encoding`.
const LOOKUP_ESCAPE: &AsciiSet = &CONTROLS.add(b' ').add(b'%');

/// Percent-encode lookup data, escaping bytes `<= 0x20` as `%XX`.
pub fn encode_lookup_data(data: &str) -> String {
    utf8_percent_encode(data, LOOKUP_ESCAPE).to_string()
}

/// Percent-decode lookup data. `+` is kept literally; invalid UTF-8 is replaced.
pub fn decode_lookup_data(data: &str) -> String {
    percent_decode_str(data).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_space_percent_and_non_ascii() {
        assert_eq!(encode_lookup_data("+ %&§ß"), "+%20%25&%C2%A7%C3%9F");
    }

    #[test]
    fn decodes_without_treating_plus_as_space() {
        assert_eq!(decode_lookup_data("+%20%25&%C2%A7%C3%9F"), "+ %&§ß");
    }

    #[test]
    fn control_bytes_become_two_digit_hex() {
        assert_eq!(encode_lookup_data("a\tb\nc\u{1}"), "a%09b%0Ac%01");
    }

    #[test]
    fn decode_reverses_encode() {
        let input = "user@example.org with spaces, 100% & more";
        assert_eq!(decode_lookup_data(&encode_lookup_data(input)), input);
    }

    #[test]
    fn invalid_escape_is_kept_verbatim() {
        assert_eq!(decode_lookup_data("50%zz"), "50%zz");
    }
}
