//! Lenient parsing of inbound chat payloads.
//!
//! Clients send a JSON object with optional string fields `user` and
//! `message`. Anything else (invalid JSON, arrays, scalars, non-string
//! fields) is still relayed, with defaults substituted for whatever could
//! not be read.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Sender label used when the payload does not name one.
pub const DEFAULT_USER: &str = "Anonymous";

/// Why an inbound payload could not be read as a chat record.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame is valid JSON but not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// The client-supplied part of a chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPayload {
    /// Sender label.
    pub user: String,
    /// Message body.
    pub message: String,
}

impl Default for ChatPayload {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_owned(),
            message: String::new(),
        }
    }
}

impl ChatPayload {
    /// Parse a frame, reporting structural problems.
    ///
    /// Missing or non-string fields are defaulted; only a frame that is not a
    /// JSON object is an error.
    pub fn try_parse(raw: &str) -> Result<Self, PayloadError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => {
                let field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_owned);
                Ok(Self {
                    user: field("user").unwrap_or_else(|| DEFAULT_USER.to_owned()),
                    message: field("message").unwrap_or_default(),
                })
            }
            other => Err(PayloadError::NotAnObject(json_kind(&other))),
        }
    }

    /// Parse a frame, falling back to an all-default payload when it is
    /// malformed.
    pub fn from_text(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_else(|error| {
            debug!(%error, len = raw.len(), "malformed chat payload, relaying with defaults");
            Self::default()
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_payload() {
        let p = ChatPayload::try_parse(r#"{"user":"Bob","message":"hi"}"#).unwrap();
        assert_eq!(p.user, "Bob");
        assert_eq!(p.message, "hi");
    }

    #[test]
    fn empty_object_gets_defaults() {
        let p = ChatPayload::try_parse("{}").unwrap();
        assert_eq!(p.user, "Anonymous");
        assert_eq!(p.message, "");
    }

    #[test]
    fn missing_user_only() {
        let p = ChatPayload::try_parse(r#"{"message":"hello"}"#).unwrap();
        assert_eq!(p.user, "Anonymous");
        assert_eq!(p.message, "hello");
    }

    #[test]
    fn extra_fields_ignored() {
        let p = ChatPayload::try_parse(r#"{"user":"A","message":"m","color":"red"}"#).unwrap();
        assert_eq!(
            p,
            ChatPayload {
                user: "A".into(),
                message: "m".into(),
            }
        );
    }

    #[test]
    fn non_string_fields_are_defaulted() {
        let p = ChatPayload::try_parse(r#"{"user":7,"message":null}"#).unwrap();
        assert_eq!(p, ChatPayload::default());
    }

    #[test]
    fn invalid_json_is_error() {
        let err = ChatPayload::try_parse("not json").unwrap_err();
        assert!(matches!(err, PayloadError::InvalidJson(_)));
    }

    #[test]
    fn array_is_not_an_object() {
        let err = ChatPayload::try_parse("[1,2]").unwrap_err();
        assert!(matches!(err, PayloadError::NotAnObject("array")));
        assert_eq!(err.to_string(), "expected a JSON object, got array");
    }

    #[test]
    fn from_text_falls_back_on_garbage() {
        assert_eq!(ChatPayload::from_text("}{"), ChatPayload::default());
        assert_eq!(ChatPayload::from_text("\"just a string\""), ChatPayload::default());
        assert_eq!(ChatPayload::from_text(""), ChatPayload::default());
    }

    #[test]
    fn from_text_keeps_valid_fields() {
        let p = ChatPayload::from_text(r#"{"user":"Eve"}"#);
        assert_eq!(p.user, "Eve");
        assert_eq!(p.message, "");
    }
}
