//! Serde view of the transport-level response body.
//!
//! The server wraps GraphQL results in an envelope carrying a status triple
//! (`msg`, `operationType`, `success`) next to the standard `data`/`errors`
//! pair. Structured signal detection parses this envelope instead of
//! substring-matching the raw body.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Key under which conflict payloads appear in `extensions`.
const CONFLICT_EXTENSION: &str = "conflict";

/// A parsed response body.
///
/// Every field is optional or defaulted: servers that emit only plain
/// GraphQL `data`/`errors` parse fine, they just never classify as an
/// explicit success.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    pub errors: Vec<GraphqlError>,

    /// Status message; the reference server sends the empty string on success.
    #[serde(default)]
    pub msg: Option<String>,

    /// "query" or "mutation".
    #[serde(rename = "operationType", default)]
    pub operation_type: Option<String>,

    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub extensions: Map<String, Value>,
}

/// One entry of the standard GraphQL `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub extensions: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Parse a raw body.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Whether the server reported a write conflict.
    ///
    /// Either an error carries the conflict marker in its message, or a
    /// conflict payload appears under `extensions` (on the envelope or on an
    /// individual error).
    pub fn has_conflict(&self, marker: &str) -> bool {
        if self.extensions.contains_key(CONFLICT_EXTENSION) {
            return true;
        }
        self.errors.iter().any(|error| {
            error.message.contains(marker) || error.extensions.contains_key(CONFLICT_EXTENSION)
        })
    }

    /// Whether the status triple reports a clean success.
    pub fn reports_success(&self) -> bool {
        self.success == Some(true) && self.msg.as_deref() == Some("")
    }
}
