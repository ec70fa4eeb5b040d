//! Per-request orchestration for `POST /v1/chat/completions`: resolve a
//! profile, shape the body for the upstream dialect, inject the reasoning
//! fragment, forward, and normalize/filter whatever comes back.

use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::models::{ApiFormat, Profile};
use crate::proxy::adapters::{self, streaming::StreamContext};
use crate::proxy::filter::strip_thinking;
use crate::proxy::reasoning;
use crate::proxy::state::AppState;

struct ParamSpec {
    name: &'static str,
    min: f64,
    max: f64,
    integer: bool,
}

const LLM_PARAM_SPECS: &[ParamSpec] = &[
    ParamSpec { name: "temperature", min: 0.0, max: 2.0, integer: false },
    ParamSpec { name: "top_p", min: 0.0, max: 1.0, integer: false },
    ParamSpec { name: "top_k", min: 1.0, max: 100.0, integer: true },
    ParamSpec { name: "max_tokens", min: 1.0, max: 1_000_000.0, integer: true },
    ParamSpec { name: "presence_penalty", min: -2.0, max: 2.0, integer: false },
    ParamSpec { name: "frequency_penalty", min: -2.0, max: 2.0, integer: false },
    ParamSpec { name: "seed", min: 0.0, max: (i32::MAX as f64), integer: true },
];

fn is_undefined(value: &Value) -> bool {
    match value {
        Value::Null => true,
        // Some OpenAI-compatible clients send literal placeholder strings.
        Value::String(s) => s == "[undefined]" || s == "undefined",
        _ => false,
    }
}

pub(crate) fn prune_undefined(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !is_undefined(v));
            for v in map.values_mut() {
                prune_undefined(v);
            }
        }
        Value::Array(items) => {
            items.retain(|v| !is_undefined(v));
            for v in items.iter_mut() {
                prune_undefined(v);
            }
        }
        _ => {}
    }
}

// Precedence: request > profile.llm_params > DEFAULT_* environment values.
pub(crate) fn merge_sampling(body: &mut Value, profile: &Profile) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };

    for (key, value) in profile.llm_params.to_map() {
        obj.entry(key).or_insert(value);
    }

    for spec in LLM_PARAM_SPECS {
        if obj.contains_key(spec.name) {
            continue;
        }
        let env_key = format!("DEFAULT_{}", spec.name.to_uppercase());
        if let Ok(raw) = std::env::var(&env_key) {
            let parsed = if spec.integer {
                raw.trim().parse::<i64>().ok().map(Value::from)
            } else {
                raw.trim().parse::<f64>().ok().map(Value::from)
            };
            match parsed {
                Some(value) => {
                    obj.insert(spec.name.to_string(), value);
                }
                None => warn!("[W-PARAM-ENV] ignoring_invalid_value_for {}: {}", env_key, raw),
            }
        }
    }
}

// Out-of-range or mistyped sampling values are dropped with a warning
// rather than failing the request.
pub(crate) fn sanitize_params(body: &mut Value) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };

    for spec in LLM_PARAM_SPECS {
        let Some(value) = obj.get(spec.name) else {
            continue;
        };
        let numeric = value.as_f64();
        let valid = match numeric {
            Some(n) => {
                let in_range = n >= spec.min && n <= spec.max;
                let integral = !spec.integer || n.fract() == 0.0;
                in_range && integral
            }
            None => false,
        };
        if !valid {
            warn!(
                "[W-PARAM-RANGE] dropping_parameter {}={} (allowed [{}, {}])",
                spec.name, value, spec.min, spec.max
            );
            obj.remove(spec.name);
        }
    }
}

fn apply_header_overrides(profile: &mut Profile, headers: &HeaderMap) -> ProxyResult<()> {
    if let Some(value) = headers.get("x-api-format") {
        let raw = value
            .to_str()
            .map_err(|_| ProxyError::BadRequest("Invalid X-API-Format header".into()))?;
        let format = ApiFormat::parse(raw).ok_or_else(|| {
            ProxyError::BadRequest(format!("Unknown API format '{}' in X-API-Format", raw))
        })?;
        profile.upstream.api_format = format;
    }

    if let Some(value) = headers.get("x-upstream-base-url") {
        let raw = value
            .to_str()
            .map_err(|_| ProxyError::BadRequest("Invalid X-Upstream-Base-URL header".into()))?;
        crate::config::validation::validate_base_url(raw)
            .map_err(|e| ProxyError::BadRequest(e.to_string()))?;
        profile.upstream.base_url = raw.to_string();
    }

    Ok(())
}

fn client_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).to_string())
        .filter(|s| !s.is_empty())
}

pub async fn handle_chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ProxyError> {
    let Json(mut body) = payload
        .map_err(|e| ProxyError::BadRequest(format!("Invalid or missing JSON body: {}", e)))?;
    prune_undefined(&mut body);

    if !body.is_object() {
        return Err(ProxyError::BadRequest(
            "Request body must be a JSON object".into(),
        ));
    }
    if let Some(messages) = body.get("messages") {
        if !messages.is_array() {
            return Err(ProxyError::BadRequest("messages must be a list".into()));
        }
    }

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let stream = body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);
    let message_count = body
        .get("messages")
        .and_then(|m| m.as_array())
        .map(|m| m.len())
        .unwrap_or(0);

    info!(
        "[REQUEST] Model: {} | {} messages | stream: {}",
        model, message_count, stream
    );

    // Snapshot: the resolved profile stays fixed for the request lifetime.
    let mut profile = state.config.resolve(&model).await?;
    info!("[PROFILE] Matched profile: {}", profile.name);
    apply_header_overrides(&mut profile, &headers)?;

    merge_sampling(&mut body, &profile);
    sanitize_params(&mut body);

    // When proxy auth is on, the Authorization header carries the proxy
    // key, so upstream credentials must come from the profile.
    let settings = state.config.proxy_settings().await;
    let api_key = if settings.api_key.is_empty() {
        client_bearer(&headers).unwrap_or_else(|| profile.upstream.api_key.clone())
    } else {
        profile.upstream.api_key.clone()
    };

    let format = profile.upstream.api_format;
    let mut upstream_body = adapters::transform_request(format, body, &model);
    let fragment = reasoning::build_fragment(&profile.reasoning);
    if profile.reasoning.enabled {
        info!(
            "[REASONING] [{}] Injected: {}",
            profile.name,
            serde_json::to_string(&fragment).unwrap_or_default()
        );
    }
    reasoning::deep_merge(&mut upstream_body, fragment);
    prune_undefined(&mut upstream_body);

    let url = adapters::endpoint(format, &profile.upstream.base_url, &model, stream);
    info!(
        "[PROXY] Forwarding to {} (format: {}, stream: {})",
        url.split('?').next().unwrap_or(&url),
        format.as_str(),
        stream
    );
    let url = adapters::apply_query_credentials(format, url, &api_key);
    let header_list = adapters::headers(format, &api_key);

    let response = state
        .upstream
        .post_json(&url, &header_list, &upstream_body)
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let upstream_payload: Value = serde_json::from_str(&text)
            .unwrap_or_else(|_| json!({ "error": text.chars().take(2000).collect::<String>() }));
        warn!("[UPSTREAM ERROR] Status: {} Body: {:.500}", status, text);
        return Err(ProxyError::UpstreamError {
            status,
            body: upstream_payload,
        });
    }

    if stream {
        let ctx = StreamContext {
            format,
            model: model.clone(),
            filter_thinking: profile.reasoning.filter_thinking_tags,
            bus: state.thinking_bus.clone(),
        };
        let sse = adapters::streaming::canonical_sse_stream(response.bytes_stream(), ctx);
        let response = Response::builder()
            .header("Content-Type", "text/event-stream; charset=utf-8")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .header("X-Accel-Buffering", "no")
            .body(Body::from_stream(sse))
            .map_err(|e| ProxyError::Internal(format!("response_build_failed: {}", e)))?;
        Ok(response)
    } else {
        let payload: Value = response.json().await.map_err(|e| {
            ProxyError::UpstreamConnection(format!("Upstream returned non-JSON response: {}", e))
        })?;
        let transformed = adapters::transform_response(format, payload);
        let filtered = filter_non_stream_response(
            transformed,
            profile.reasoning.filter_thinking_tags,
            &model,
            &state,
        );
        Ok(Json(filtered).into_response())
    }
}

// The buffered-path twin of the stream pipeline: strip think tags from
// message content, pull native reasoning fields, publish both to the bus.
fn filter_non_stream_response(
    mut response: Value,
    filter_thinking: bool,
    model: &str,
    state: &AppState,
) -> Value {
    if !filter_thinking {
        return response;
    }

    if let Some(choices) = response.get_mut("choices").and_then(|c| c.as_array_mut()) {
        for choice in choices {
            let Some(message) = choice.get_mut("message").and_then(|m| m.as_object_mut()) else {
                continue;
            };

            for key in ["reasoning_content", "reasoning"] {
                if let Some(value) = message.remove(key) {
                    if let Some(text) = value.as_str() {
                        state.thinking_bus.publish_thinking(text, Some(model));
                    }
                }
            }

            if let Some(content) = message.get("content").and_then(|c| c.as_str()) {
                let (clean, thinking) = strip_thinking(content);
                if !thinking.is_empty() {
                    state.thinking_bus.publish_thinking(&thinking, Some(model));
                }
                message.insert("content".to_string(), Value::String(clean));
            }
        }
    }

    state.thinking_bus.publish_done(Some(model));
    response
}
