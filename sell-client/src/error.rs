//! Error types for the marketplace client library.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the response body could not be read.
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The marketplace rejected the supplied credentials.
    #[error("Authentication rejected (HTTP {status})")]
    AuthRejected { status: u16 },

    /// An authenticated endpoint was called before `login`.
    #[error("Not logged in to the marketplace")]
    NotAuthenticated,

    /// The resource already exists (for example an app that is already published).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-success HTTP status.
    #[error("HTTP {status} from {url}: {body}")]
    Http { status: u16, url: String, body: String },

    /// The response body was not the JSON the endpoint promises.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Client construction failed.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Whether this error is a credentials rejection that a fresh password could fix.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::AuthRejected { status: 401 };
        assert_eq!(err.to_string(), "Authentication rejected (HTTP 401)");

        let err = ClientError::Http {
            status: 503,
            url: "https://market.example/apps".to_string(),
            body: "maintenance".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 503 from https://market.example/apps: maintenance"
        );
    }

    #[test]
    fn test_auth_rejection_classification() {
        assert!(ClientError::AuthRejected { status: 403 }.is_auth_rejection());
        assert!(!ClientError::NotAuthenticated.is_auth_rejection());
        assert!(!ClientError::Conflict("ping".to_string()).is_auth_rejection());
    }

    #[test]
    fn test_error_from_json() {
        if let Err(json_err) = serde_json::from_str::<serde_json::Value>("invalid json {{{") {
            let err: ClientError = json_err.into();
            assert!(matches!(err, ClientError::SerializationError(_)));
        } else {
            panic!("Should fail to parse invalid JSON");
        }
    }
}
