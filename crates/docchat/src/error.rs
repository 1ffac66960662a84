//! Error types for docchat

use axum::{
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use thiserror::Error;

/// Main error type for docchat operations
#[derive(Error, Debug)]
pub enum DocchatError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for docchat operations
pub type Result<T> = std::result::Result<T, DocchatError>;

/// Failure to turn an uploaded document into text
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// The document could not be parsed
    #[error("Failed to read or parse {kind} file: {reason}")]
    Unreadable { kind: &'static str, reason: String },

    /// The document parsed but contained no text
    #[error("Document contains no extractable text")]
    Empty,

    /// The document type is not supported
    #[error("Unsupported document type: {0}")]
    Unsupported(String),
}

/// Failure of the upstream generation backend
///
/// Fragments already forwarded before one of these is raised stay delivered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// Could not reach the backend or send the request
    #[error("Upstream unreachable: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body broke off mid-stream
    #[error("Upstream stream interrupted: {0}")]
    Interrupted(String),

    /// A line of the response could not be decoded
    #[error("Undecodable upstream chunk: {0}")]
    Decode(String),

    /// The backend reported an error inside the stream
    #[error("Upstream backend error: {0}")]
    Backend(String),
}

impl UpstreamError {
    /// Short category for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            UpstreamError::Network(_) => "network",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Interrupted(_) => "interrupted",
            UpstreamError::Decode(_) => "decode",
            UpstreamError::Backend(_) => "backend",
        }
    }
}

/// The client side of a persistent connection went away
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Client disconnected: {0}")]
pub struct ClientDisconnect(pub String);

/// Errors surfaced to HTTP callers as JSON bodies
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller sent something we cannot use
    #[error("{message}")]
    BadRequest {
        error_type: &'static str,
        message: String,
    },

    /// Caller is not allowed to do this
    #[error("{message}")]
    Forbidden {
        error_type: &'static str,
        message: String,
    },

    /// Upload exceeded the configured size limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Document extraction failed
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest { error_type, .. } => (StatusCode::BAD_REQUEST, error_type),
            ApiError::Forbidden { error_type, .. } => (StatusCode::FORBIDDEN, error_type),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            ApiError::Extraction(_) => (StatusCode::INTERNAL_SERVER_ERROR, "extraction_failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response<Body> {
        let (status, error_type) = self.parts();
        create_error_response(status, error_type, &self.to_string())
    }
}

/// Create a JSON error response
pub fn create_error_response(status: StatusCode, error_type: &str, message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Body::empty());
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extraction_error_maps_to_500() {
        let response = ApiError::from(ExtractionError::Empty).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "extraction_failed");
        assert_eq!(
            json["error"]["message"],
            "Document contains no extractable text"
        );
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        let response = ApiError::Forbidden {
            error_type: "origin_not_allowed",
            message: "nope".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_api_error_statuses() {
        let cases = [
            (
                ApiError::BadRequest {
                    error_type: "missing_file",
                    message: "x".to_string(),
                },
                StatusCode::BAD_REQUEST,
                "missing_file",
            ),
            (
                ApiError::PayloadTooLarge("x".to_string()),
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
            ),
            (
                ApiError::from(ExtractionError::Unsupported("docx".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "extraction_failed",
            ),
        ];
        for (error, status, error_type) in cases {
            assert_eq!(error.parts(), (status, error_type));
        }
    }

    #[test]
    fn test_docchat_error_display() {
        assert_eq!(
            DocchatError::Config("bad url".to_string()).to_string(),
            "Configuration error: bad url"
        );
        assert_eq!(
            DocchatError::Server("bind failed".to_string()).to_string(),
            "Server error: bind failed"
        );
    }

    #[test]
    fn test_upstream_error_categories() {
        assert_eq!(UpstreamError::Network("x".into()).category(), "network");
        assert_eq!(
            UpstreamError::Status {
                status: 500,
                body: String::new()
            }
            .category(),
            "status"
        );
        assert_eq!(UpstreamError::Interrupted("x".into()).category(), "interrupted");
        assert_eq!(UpstreamError::Decode("x".into()).category(), "decode");
        assert_eq!(UpstreamError::Backend("x".into()).category(), "backend");
    }

    #[test]
    fn test_status_error_display() {
        let err = UpstreamError::Status {
            status: 404,
            body: "model not found".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream returned 404: model not found");
    }
}
