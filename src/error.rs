//! Error types for the records data layer.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the HTTP gateway, the cache and everything built on
/// top of them.
///
/// `Clone` because a single fetch outcome is shared with every reader that
/// attached to the in-flight request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
  /// No response was received at all (connect failure, timeout, TLS, ...).
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-2xx status.
  #[error("http {status}")]
  Http {
    status: u16,
    /// Parsed error body, when the server sent JSON.
    payload: Option<Value>,
  },

  /// The response arrived but did not have the expected shape.
  #[error("unexpected response: {0}")]
  Application(String),
}

impl ApiError {
  /// Human-readable message extracted from the error payload, falling back
  /// to the error's own display form.
  pub fn message(&self) -> String {
    if let ApiError::Http {
      payload: Some(payload),
      ..
    } = self
    {
      if let Some(msg) = payload.get("message").and_then(Value::as_str) {
        return msg.to_string();
      }
    }
    self.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn message_prefers_payload() {
    let err = ApiError::Http {
      status: 409,
      payload: Some(json!({"message": "email already registered"})),
    };
    assert_eq!(err.message(), "email already registered");
  }

  #[test]
  fn message_falls_back_to_display() {
    let err = ApiError::Http {
      status: 500,
      payload: None,
    };
    assert_eq!(err.message(), "http 500");

    let err = ApiError::Network("connection refused".into());
    assert_eq!(err.message(), "network error: connection refused");
  }
}
