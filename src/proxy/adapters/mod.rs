//! Translation between the canonical OpenAI chat-completion shape and the
//! upstream wire dialects. Typed structs stop at the handler boundary;
//! inside the adapters everything is `serde_json::Value` because each
//! dialect disagrees about field names, casing and nesting.

pub mod anthropic;
pub mod azure;
pub mod gemini;
pub mod openai;
pub mod openai_response;
pub mod streaming;

use crate::models::ApiFormat;
use serde_json::Value;

/// One normalized streaming event, independent of the upstream dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta {
        content: Option<String>,
        reasoning_content: Option<String>,
        finish_reason: Option<String>,
    },
    Done,
    Error(Value),
}

/// Rewrite the canonical request body for the upstream dialect. The
/// reasoning fragment is merged by the handler after this call, so dialect
/// keys like `thinkingConfig` land on the transformed body.
pub fn transform_request(format: ApiFormat, body: Value, model: &str) -> Value {
    match format {
        ApiFormat::Openai => openai::transform_request(body),
        ApiFormat::AzureOpenai => azure::transform_request(body),
        ApiFormat::OpenaiResponse => openai_response::transform_request(body),
        ApiFormat::Anthropic => anthropic::transform_request(body),
        ApiFormat::Gemini => gemini::transform_request(body, model),
    }
}

/// Reshape a buffered upstream response into the OpenAI chat-completion
/// body.
pub fn transform_response(format: ApiFormat, response: Value) -> Value {
    match format {
        ApiFormat::Openai => openai::transform_response(response),
        ApiFormat::AzureOpenai => azure::transform_response(response),
        ApiFormat::OpenaiResponse => openai_response::transform_response(response),
        ApiFormat::Anthropic => anthropic::transform_response(response),
        ApiFormat::Gemini => gemini::transform_response(response),
    }
}

pub fn endpoint(format: ApiFormat, base_url: &str, model: &str, stream: bool) -> String {
    let base = base_url.trim_end_matches('/');
    match format {
        ApiFormat::Openai => format!("{}/v1/chat/completions", base),
        ApiFormat::OpenaiResponse => format!("{}/v1/responses", base),
        ApiFormat::Anthropic => format!("{}/v1/messages", base),
        ApiFormat::Gemini => gemini::endpoint(base, model, stream),
        ApiFormat::AzureOpenai => format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            base,
            model,
            crate::constants::AZURE_API_VERSION
        ),
    }
}

/// Credential placement differs per dialect; Gemini wants the key in the
/// URL query, everyone else in a header.
pub fn headers(format: ApiFormat, api_key: &str) -> Vec<(&'static str, String)> {
    match format {
        ApiFormat::Openai | ApiFormat::OpenaiResponse => {
            vec![("Authorization", format!("Bearer {}", api_key))]
        }
        ApiFormat::Anthropic => vec![
            ("x-api-key", api_key.to_string()),
            (
                "anthropic-version",
                crate::constants::ANTHROPIC_VERSION.to_string(),
            ),
        ],
        ApiFormat::Gemini => Vec::new(),
        ApiFormat::AzureOpenai => vec![("api-key", api_key.to_string())],
    }
}

pub fn apply_query_credentials(format: ApiFormat, url: String, api_key: &str) -> String {
    match format {
        ApiFormat::Gemini if !api_key.is_empty() => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}key={}", url, sep, api_key)
        }
        _ => url,
    }
}
