use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("No enabled profile matches model '{0}' and no default profile is set")]
    NoProfileMatch(String),

    #[error("{0}")]
    ConfigInvalid(String),

    // Non-2xx upstream responses are relayed to the client verbatim.
    #[error("Upstream returned status {status}")]
    UpstreamError {
        status: StatusCode,
        body: serde_json::Value,
    },

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Upstream connection failed: {0}")]
    UpstreamConnection(String),

    #[error("Client closed the connection")]
    StreamInterrupted,

    #[error("Internal proxy error")]
    Internal(String),
}

impl ProxyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::Unauthorized => "unauthorized",
            ProxyError::NoProfileMatch(_) => "no_profile_match",
            ProxyError::ConfigInvalid(_) => "config_invalid",
            ProxyError::UpstreamError { .. } => "upstream_error",
            ProxyError::UpstreamTimeout => "upstream_timeout",
            ProxyError::UpstreamConnection(_) => "upstream_connection",
            ProxyError::StreamInterrupted => "stream_interrupted",
            ProxyError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::UpstreamTimeout
        } else {
            ProxyError::UpstreamConnection(e.to_string())
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::UpstreamError { status, body } => {
                // Relay upstream status and body unchanged, never retry.
                (status, Json(body)).into_response()
            }
            ProxyError::Internal(detail) => {
                tracing::error!("[E-INTERNAL] unhandled_proxy_error: {}", detail);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal proxy error")
            }
            ProxyError::StreamInterrupted => {
                // The client is gone; nobody will read this response.
                StatusCode::OK.into_response()
            }
            other => {
                let status = match &other {
                    ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
                    ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
                    ProxyError::NoProfileMatch(_) => StatusCode::NOT_FOUND,
                    ProxyError::ConfigInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    ProxyError::UpstreamTimeout | ProxyError::UpstreamConnection(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let kind = other.kind();
                let message = other.to_string();
                error_body(status, kind, &message)
            }
        }
    }
}

fn error_body(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "type": kind,
                "message": message
            }
        })),
    )
        .into_response()
}

pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ProxyError::Unauthorized.kind(), "unauthorized");
        assert_eq!(
            ProxyError::NoProfileMatch("x".into()).kind(),
            "no_profile_match"
        );
        assert_eq!(ProxyError::UpstreamTimeout.kind(), "upstream_timeout");
    }

    #[test]
    fn no_profile_match_names_the_model() {
        let e = ProxyError::NoProfileMatch("gpt-4".into());
        assert!(e.to_string().contains("gpt-4"));
    }
}
