//! Error taxonomy shared by every provider client.

use thiserror::Error;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Errors raised while talking to a remote API or reshaping its payload.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx HTTP status. `message` is the parsed error text, or the raw
    /// body when the body is not JSON.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// A 2xx response whose content type is neither JSON, CSV nor plain text,
    /// or a JSON content type whose body does not parse.
    #[error("invalid response ({content_type}): {body}")]
    Content { content_type: String, body: String },

    /// An expected top-level key is absent from the JSON payload.
    #[error("missing key '{0}' in response")]
    MissingKey(String),

    /// The payload has the key but not the expected structure.
    #[error("unexpected response shape: {0}")]
    Shape(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided message for `Api` errors.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_accessors() {
        let err = ApiError::Api {
            status: 401,
            message: "invalid token".to_string(),
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.message(), Some("invalid token"));
        assert_eq!(err.to_string(), "API error 401: invalid token");

        let missing = ApiError::MissingKey("tvl".to_string());
        assert_eq!(missing.status(), None);
        assert_eq!(missing.to_string(), "missing key 'tvl' in response");
    }
}
