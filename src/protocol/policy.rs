//! Policy delegation protocol.
//!
//! A request is a paragraph of `name=value\n` lines terminated by an empty
//! line. The reply is `action=<action>\n\n`. Connections carry any number of
//! paragraphs.

use bytes::Bytes;

use super::{Frame, FrameReader};

/// Largest accepted attribute line, excluding the newline.
pub const MAXIMUM_LINE_LENGTH: usize = 8192;

/// Largest number of attributes in one paragraph.
pub const MAXIMUM_ATTRIBUTES: usize = 256;

const LINE_END: u8 = b'\n';
const VALUE_SEPARATOR: u8 = b'=';

/// Ordered attribute pairs of one policy paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRequest {
    attributes: Vec<(String, String)>,
}

impl PolicyRequest {
    pub fn new(attributes: Vec<(String, String)>) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn into_attributes(self) -> Vec<(String, String)> {
        self.attributes
    }
}

/// Paragraph framing for policy requests.
#[derive(Debug, Default)]
pub struct PolicyReader {
    line: Vec<u8>,
    attributes: Vec<(String, String)>,
}

impl PolicyReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_line(&mut self) -> Result<bool, String> {
        if self.line.is_empty() {
            return Ok(true);
        }
        let separator = self
            .line
            .iter()
            .position(|&b| b == VALUE_SEPARATOR)
            .ok_or_else(|| "attribute line without '='".to_string())?;
        let name = String::from_utf8_lossy(&self.line[..separator]).into_owned();
        let value = String::from_utf8_lossy(&self.line[separator + 1..]).into_owned();
        self.line.clear();
        if self.attributes.len() >= MAXIMUM_ATTRIBUTES {
            return Err(format!(
                "paragraph exceeds {} attributes",
                MAXIMUM_ATTRIBUTES
            ));
        }
        self.attributes.push((name, value));
        Ok(false)
    }
}

impl FrameReader for PolicyReader {
    type Request = PolicyRequest;

    fn next_frame(&mut self, input: &mut &[u8]) -> Frame<PolicyRequest> {
        while let Some((&byte, rest)) = input.split_first() {
            *input = rest;
            if byte != LINE_END {
                if self.line.len() >= MAXIMUM_LINE_LENGTH {
                    return Frame::Broken(format!(
                        "attribute line exceeds {} bytes",
                        MAXIMUM_LINE_LENGTH
                    ));
                }
                self.line.push(byte);
                continue;
            }
            match self.finish_line() {
                Ok(true) => {
                    let attributes = std::mem::take(&mut self.attributes);
                    return Frame::Complete(PolicyRequest::new(attributes));
                }
                Ok(false) => {}
                Err(reason) => return Frame::Broken(reason),
            }
        }
        Frame::Pending
    }
}

/// Format an `action=` reply.
pub fn format_action(action: &str) -> Bytes {
    Bytes::from(format!("action={}\n\n", action))
}
