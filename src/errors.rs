use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use std::time::Duration;

/// Failures surfaced by services, the relay and the gateway.
///
/// Adapters under `db` return raw `sqlx::Error`; it is wrapped here only
/// when it crosses into a service.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Malformed inbound payload.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    /// Acting user does not own the resource.
    #[error("Forbidden: {0}")]
    Authorization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// LLM API unreachable or rejected the request.
    #[error("Upstream error: {0}")]
    Upstream(String),
    /// LLM stream dropped after it started.
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("Deadline of {0:?} exceeded")]
    Timeout(Duration),
}

impl ChatError {
    /// Stable identifier sent to clients in `error` envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Authorization(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream",
            Self::Stream(_) => "stream",
            Self::Persistence(_) => "persistence",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Message safe to show to a client; storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) => "Storage failure".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Upstream(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            Self::Upstream(format!("Connection failed: {}", err))
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl ResponseError for ChatError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "status": "Error",
            "code": self.status_code().as_u16(),
            "kind": self.kind(),
            "message": self.public_message(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Stream(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}
