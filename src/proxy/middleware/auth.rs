use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ProxyError;
use crate::proxy::state::AppState;

fn constant_time_str_eq(left: &str, right: &str) -> bool {
    let left_bytes = left.as_bytes();
    let right_bytes = right.as_bytes();
    let max_len = left_bytes.len().max(right_bytes.len());
    let mut diff = left_bytes.len() ^ right_bytes.len();

    for i in 0..max_len {
        let l = left_bytes.get(i).copied().unwrap_or(0);
        let r = right_bytes.get(i).copied().unwrap_or(0);
        diff |= (l ^ r) as usize;
    }

    diff == 0
}

fn is_authorized(expected: &str, provided: Option<&str>) -> bool {
    provided
        .map(|candidate| constant_time_str_eq(candidate, expected))
        .unwrap_or(false)
}

// Bearer auth for the completion and model endpoints. An empty configured
// key disables authentication; the config surface stays open either way
// because the expected deployment is plain HTTP on loopback.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    let settings = state.config.proxy_settings().await;
    if settings.api_key.is_empty() {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s));

    if is_authorized(&settings.api_key, provided) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("[AUTH] Rejected request with invalid or missing API key");
        Err(ProxyError::Unauthorized)
    }
}
