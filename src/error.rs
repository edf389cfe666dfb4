//! Error taxonomy for calls against the booking API.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status
    #[error("{message} (HTTP {code})")]
    Status { code: u16, message: String },

    /// A 401 that could not be recovered by refreshing the session
    #[error("session expired, please log in again")]
    SessionExpired,

    /// Rejected locally before any request was made
    #[error("{0}")]
    Validation(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("not logged in")]
    NotAuthenticated,

    /// Logged in, but the account has not been verified by the school yet
    #[error("account not verified yet")]
    NotVerified,
}

impl ApiError {
    /// Message suitable for a user-facing banner
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Validation(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"message": ..}`, `{"detail": ..}`, DRF field errors such as
/// `{"errors": {"dates": ["..."]}}` or `{"password": ["..."]}`, and bare
/// `["..."]` lists. Returns `None` when nothing usable is found.
pub fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    message_from_value(&value)
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(message_from_value),
        Value::Object(map) => {
            for key in ["message", "detail", "error", "non_field_errors"] {
                if let Some(found) = map.get(key).and_then(message_from_value) {
                    return Some(found);
                }
            }
            if let Some(found) = map.get("errors").and_then(message_from_value) {
                return Some(found);
            }
            map.values().find_map(message_from_value)
        }
        _ => None,
    }
}
