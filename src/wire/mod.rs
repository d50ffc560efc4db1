//! Response envelope codec.
//!
//! Every JSON body the result server emits is prefixed with a guard
//! (`for(;;);`) so that the payload cannot be included cross-origin as a
//! script. Decoding strips the guard when it sits at position 0 and parses
//! the remainder as JSON.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Literal prefix defeating cross-origin script inclusion.
pub const GUARD: &str = "for(;;);";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Body of a successful primary submission: server-rendered fragments in
/// document order.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PrimaryEnvelope {
    pub htmls: Vec<String>,
}

impl PrimaryEnvelope {
    /// The fragments joined in order, ready to become the area's content.
    pub fn markup(&self) -> String {
        self.htmls.concat()
    }
}

/// Body of a successful confirmation submission.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConfirmationEnvelope {
    pub message: String,
}

/// Removes the guard if, and only if, the text starts with it.
pub fn strip_guard(raw: &str) -> &str {
    raw.strip_prefix(GUARD).unwrap_or(raw)
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(strip_guard(raw))?)
}

pub fn decode_primary(raw: &str) -> Result<PrimaryEnvelope, ProtocolError> {
    decode(raw)
}

pub fn decode_confirmation(raw: &str) -> Result<ConfirmationEnvelope, ProtocolError> {
    decode(raw)
}
