//! Netstring codec: `<decimal length>:<payload>,`.
//!
//! Lengths count bytes, not characters.

use thiserror::Error;

/// Encoding of the empty string.
pub const EMPTY: &str = "0:,";

/// Separates the length prefix from the payload.
pub const LENGTH_SEPARATOR: u8 = b':';

/// Terminates every netstring.
pub const TERMINATOR: u8 = b',';

/// Errors produced while parsing netstrings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetstringError {
    #[error("expected ':' after offset {offset}")]
    MissingSeparator { offset: usize },

    #[error("invalid length prefix at offset {offset}")]
    InvalidLength { offset: usize },

    #[error("payload at offset {offset} is truncated")]
    Truncated { offset: usize },

    #[error("expected ',' at offset {offset}")]
    MissingTerminator { offset: usize },

    #[error("payload at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("expected exactly one netstring, found {found}")]
    NotSingle { found: usize },
}

/// Encode a single string.
pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    encode_into(s, &mut out);
    out
}

/// Encode a sequence of strings back to back. An empty sequence yields `""`.
pub fn encode_all<S: AsRef<str>>(strings: &[S]) -> String {
    let mut out = String::new();
    for s in strings {
        encode_into(s.as_ref(), &mut out);
    }
    out
}

fn encode_into(s: &str, out: &mut String) {
    out.push_str(&s.len().to_string());
    out.push(LENGTH_SEPARATOR as char);
    out.push_str(s);
    out.push(TERMINATOR as char);
}

/// Parse a concatenation of netstrings.
pub fn parse(s: &str) -> Result<Vec<String>, NetstringError> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let colon = bytes[offset..]
            .iter()
            .position(|&b| b == LENGTH_SEPARATOR)
            .map(|pos| offset + pos)
            .ok_or(NetstringError::MissingSeparator { offset })?;

        let digits = &s[offset..colon];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NetstringError::InvalidLength { offset });
        }
        let length: usize = digits
            .parse()
            .map_err(|_| NetstringError::InvalidLength { offset })?;

        let start = colon + 1;
        let end = start
            .checked_add(length)
            .filter(|&end| end < bytes.len())
            .ok_or(NetstringError::Truncated { offset })?;

        if bytes[end] != TERMINATOR {
            return Err(NetstringError::MissingTerminator { offset: end });
        }
        let payload = s
            .get(start..end)
            .ok_or(NetstringError::InvalidUtf8 { offset: start })?;
        out.push(payload.to_string());
        offset = end + 1;
    }

    Ok(out)
}

/// Parse exactly one netstring.
pub fn parse_one(s: &str) -> Result<String, NetstringError> {
    let mut strings = parse(s)?;
    if strings.len() != 1 {
        return Err(NetstringError::NotSingle {
            found: strings.len(),
        });
    }
    Ok(strings.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_encoding() {
        assert_eq!(encode(""), EMPTY);
        assert_eq!(parse_one(EMPTY).unwrap(), "");
    }

    #[test]
    fn parse_multiple() {
        assert_eq!(parse("1:a,2:bc,").unwrap(), vec!["a", "bc"]);
    }

    #[test]
    fn parse_one_rejects_multiple() {
        assert_eq!(
            parse_one("1:a,2:bc,"),
            Err(NetstringError::NotSingle { found: 2 })
        );
    }

    #[test]
    fn parse_one_rejects_nothing() {
        assert_eq!(parse_one(""), Err(NetstringError::NotSingle { found: 0 }));
    }

    #[test]
    fn encode_all_concatenates() {
        assert_eq!(encode_all(&["a", "", "bc"]), "1:a,0:,2:bc,");
        assert_eq!(encode_all::<&str>(&[]), "");
    }

    #[test]
    fn length_counts_bytes() {
        assert_eq!(encode("ß"), "2:ß,");
        assert_eq!(parse_one("2:ß,").unwrap(), "ß");
    }

    #[test]
    fn malformed_inputs() {
        assert_eq!(
            parse("3abc,"),
            Err(NetstringError::MissingSeparator { offset: 0 })
        );
        assert_eq!(parse("x:a,"), Err(NetstringError::InvalidLength { offset: 0 }));
        assert_eq!(parse(":a,"), Err(NetstringError::InvalidLength { offset: 0 }));
        assert_eq!(parse("5:ab,"), Err(NetstringError::Truncated { offset: 0 }));
        assert_eq!(
            parse("1:ab,"),
            Err(NetstringError::MissingTerminator { offset: 3 })
        );
    }

    #[test]
    fn length_splitting_a_character_is_rejected() {
        assert_eq!(
            parse("1:ß,"),
            Err(NetstringError::MissingTerminator { offset: 3 })
        );
    }
}
