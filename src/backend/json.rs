//! JSON string-list codec for lookup bodies.

use thiserror::Error;

/// A lookup body that is not a JSON array of strings.
#[derive(Debug, Error)]
#[error("expected a JSON array of strings: {0}")]
pub struct InvalidStringList(#[from] serde_json::Error);

pub fn decode_string_list(body: &str) -> Result<Vec<String>, InvalidStringList> {
    Ok(serde_json::from_str(body)?)
}
