//! Error envelope decoding for non-success responses
//!
//! The service answers failed calls with a JSON envelope holding a top-level
//! code and message and, for validation failures, a nested tree of per-field
//! errors. The tree is flattened into an indented trace so the whole failure
//! can be shown or logged as a single multi-line message.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Key under which a node lists its own errors
pub const LEAF_ERRORS_KEY: &str = "_errors";

const INDENT: &str = "  ";

/// Structured error body returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Numeric or symbolic error code
    pub code: Value,
    /// Human-readable summary
    pub message: String,
    /// Nested per-field errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl ErrorEnvelope {
    /// Decode an envelope; `None` when the body is not one
    pub fn decode(body: &[u8]) -> Option<Self> {
        let envelope: Self = serde_json::from_slice(body).ok()?;
        if envelope.code.is_null() {
            return None;
        }
        Some(envelope)
    }
}

/// A rejected call with a decoded error envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status of the response
    pub status: u16,
    /// Top-level code rendered as text
    pub code: String,
    /// Top-level message
    pub message: String,
    /// Flattened per-field errors, already indented
    pub trace: Vec<String>,
}

impl ApiError {
    pub fn from_envelope(status: u16, envelope: &ErrorEnvelope) -> Self {
        let trace = envelope
            .errors
            .as_ref()
            .map(flatten_error_tree)
            .unwrap_or_default();

        Self {
            status,
            code: value_text(&envelope.code),
            message: envelope.message.clone(),
            trace,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for line in &self.trace {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Classify a non-success response body into a crate error
pub fn decode_failure(status: u16, reason: &str, body: &[u8]) -> Error {
    match ErrorEnvelope::decode(body) {
        Some(envelope) => Error::Api(ApiError::from_envelope(status, &envelope)),
        None => Error::Protocol {
            status,
            reason: reason.to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// Flatten a nested error tree into indented lines.
///
/// Every field name is emitted on its own line and its children are indented
/// one level deeper. Leaf lists of `{code, message}` render as
/// `"<code>: <message>"`, one line per entry.
pub fn flatten_error_tree(tree: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    match tree {
        Value::Object(fields) => walk_object(fields, 0, &mut lines),
        Value::Array(entries) => walk_leaves(entries, 0, &mut lines),
        other => lines.push(value_text(other)),
    }
    lines
}

fn walk_object(fields: &Map<String, Value>, depth: usize, lines: &mut Vec<String>) {
    for (name, value) in fields {
        match value {
            Value::Array(entries) if name == LEAF_ERRORS_KEY => {
                walk_leaves(entries, depth, lines);
            }
            Value::Object(children) => {
                lines.push(format!("{}{}", INDENT.repeat(depth), name));
                walk_object(children, depth + 1, lines);
            }
            Value::Array(entries) => {
                lines.push(format!("{}{}", INDENT.repeat(depth), name));
                walk_leaves(entries, depth + 1, lines);
            }
            scalar => {
                lines.push(format!(
                    "{}{}: {}",
                    INDENT.repeat(depth),
                    name,
                    value_text(scalar)
                ));
            }
        }
    }
}

fn walk_leaves(entries: &[Value], depth: usize, lines: &mut Vec<String>) {
    for entry in entries {
        match entry {
            Value::Object(fields)
                if fields.contains_key("code") || fields.contains_key("message") =>
            {
                let code = fields.get("code").map(value_text).unwrap_or_default();
                let message = fields.get("message").map(value_text).unwrap_or_default();
                lines.push(format!("{}{}: {}", INDENT.repeat(depth), code, message));
            }
            Value::Object(children) => walk_object(children, depth, lines),
            other => lines.push(format!("{}{}", INDENT.repeat(depth), value_text(other))),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
