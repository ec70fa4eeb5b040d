use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::proxy::state::AppState;

pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    let upstream = state
        .config
        .default_profile()
        .await
        .map(|p| p.upstream.base_url)
        .unwrap_or_else(|| crate::constants::DEFAULT_UPSTREAM_BASE_URL.to_string());

    Json(json!({ "status": "ok", "upstream": upstream }))
}

// Pass-through model listing from the default profile's upstream, reshaped
// into the OpenAI list body.
pub async fn handle_list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let profile = state.config.default_profile().await;
    let profile_key = profile
        .as_ref()
        .map(|p| p.upstream.api_key.clone())
        .unwrap_or_default();
    let profile_base = profile
        .map(|p| p.upstream.base_url)
        .unwrap_or_else(|| crate::constants::DEFAULT_UPSTREAM_BASE_URL.to_string());

    let base_url = headers
        .get("x-upstream-base-url")
        .and_then(|h| h.to_str().ok())
        .map(ToString::to_string)
        .unwrap_or(profile_base);
    crate::config::validation::validate_base_url(&base_url)
        .map_err(|e| ProxyError::BadRequest(e.to_string()))?;

    // With proxy auth enabled the Authorization header is the proxy key,
    // so upstream credentials come from the profile.
    let settings = state.config.proxy_settings().await;
    let api_key = if settings.api_key.is_empty() {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(profile_key)
    } else {
        profile_key
    };

    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let auth = [("Authorization", format!("Bearer {}", api_key))];
    let response = state.upstream.get(&url, &auth).await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text)
            .unwrap_or_else(|_| json!({ "error": text.chars().take(500).collect::<String>() }));
        return Err(ProxyError::UpstreamError { status, body });
    }

    let payload: Value = response.json().await.map_err(|e| {
        ProxyError::UpstreamConnection(format!("Upstream returned non-JSON response: {}", e))
    })?;

    Ok(Json(reshape_model_list(&payload)).into_response())
}

pub(crate) fn reshape_model_list(payload: &Value) -> Value {
    let ids: Vec<String> = payload
        .get("data")
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    json!({
        "object": "list",
        "data": ids
            .into_iter()
            .map(|id| json!({ "id": id, "object": "model" }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_list_is_reshaped_to_id_and_object() {
        let upstream = json!({
            "object": "list",
            "data": [
                { "id": "deepseek-chat", "created": 123, "owned_by": "deepseek" },
                { "id": "deepseek-reasoner", "permissions": [] },
            ],
        });

        let out = reshape_model_list(&upstream);
        assert_eq!(
            out,
            json!({
                "object": "list",
                "data": [
                    { "id": "deepseek-chat", "object": "model" },
                    { "id": "deepseek-reasoner", "object": "model" },
                ],
            })
        );
    }

    #[test]
    fn missing_data_yields_an_empty_list() {
        let out = reshape_model_list(&json!({ "models": [] }));
        assert_eq!(out["data"], json!([]));
    }
}
