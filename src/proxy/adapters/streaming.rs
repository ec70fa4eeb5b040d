//! Normalizes upstream streaming bodies into canonical OpenAI SSE chunks,
//! running each delta's content through the per-request StreamFilter and
//! re-publishing stripped thinking onto the ThinkingBus.
//!
//! Framing per dialect: OpenAI/Azure arrive as `data:` frames and pass
//! through (byte-faithful when no filtering is active); Anthropic is an
//! event stream; Gemini is newline-delimited JSON, optionally `data:`
//! prefixed under `alt=sse`; the Response API tags every event with a
//! `type` field. Mid-stream failures become a final `data: {"error":…}`
//! frame followed by `data: [DONE]` — never an HTTP status change.

use super::StreamEvent;
use crate::models::ApiFormat;
use crate::proxy::filter::StreamFilter;
use crate::proxy::thinking_bus::ThinkingBus;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::pin::Pin;
use std::sync::Arc;

pub struct StreamContext {
    pub format: ApiFormat,
    pub model: String,
    pub filter_thinking: bool,
    pub bus: Arc<ThinkingBus>,
}

pub type CanonicalSseStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

pub fn canonical_sse_stream<S, E>(upstream: S, ctx: StreamContext) -> CanonicalSseStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut upstream = Box::pin(upstream);
        let mut buffer = BytesMut::new();
        let mut filter = ctx.filter_thinking.then(StreamFilter::new);
        let mut done_sent = false;

        'read: loop {
            match upstream.next().await {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line_raw = buffer.split_to(pos + 1);
                        let Ok(line_str) = std::str::from_utf8(&line_raw) else {
                            continue;
                        };
                        let line = line_str.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let (frames, reached_done) = process_line(line, &ctx, &mut filter);
                        for frame in frames {
                            yield Ok(frame);
                        }
                        if reached_done {
                            done_sent = true;
                            break 'read;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("[Stream] Upstream error mid-stream: {}", e);
                    for frame in drain_filter(&ctx, &mut filter) {
                        yield Ok(frame);
                    }
                    let error = json!({
                        "error": { "type": "upstream_error", "message": e.to_string() }
                    });
                    yield Ok(sse_frame(&error));
                    yield Ok(Bytes::from("data: [DONE]\n\n"));
                    done_sent = true;
                    break 'read;
                }
                None => break 'read,
            }
        }

        if !done_sent {
            // A final line without a trailing newline still counts.
            if !buffer.is_empty() {
                if let Ok(line_str) = std::str::from_utf8(&buffer) {
                    let line = line_str.trim();
                    if !line.is_empty() {
                        let (frames, reached_done) = process_line(line, &ctx, &mut filter);
                        for frame in frames {
                            yield Ok(frame);
                        }
                        done_sent = reached_done;
                    }
                }
            }
        }

        if !done_sent {
            for frame in drain_filter(&ctx, &mut filter) {
                yield Ok(frame);
            }
            yield Ok(Bytes::from("data: [DONE]\n\n"));
        }
        ctx.bus.publish_done(Some(&ctx.model));
    };

    Box::pin(stream)
}

fn process_line(
    line: &str,
    ctx: &StreamContext,
    filter: &mut Option<StreamFilter>,
) -> (Vec<Bytes>, bool) {
    match ctx.format {
        ApiFormat::Openai | ApiFormat::AzureOpenai => process_openai_line(line, ctx, filter),
        ApiFormat::Anthropic => process_anthropic_line(line, ctx, filter),
        ApiFormat::Gemini => process_gemini_line(line, ctx, filter),
        ApiFormat::OpenaiResponse => process_response_api_line(line, ctx, filter),
    }
}

fn process_openai_line(
    line: &str,
    ctx: &StreamContext,
    filter: &mut Option<StreamFilter>,
) -> (Vec<Bytes>, bool) {
    let Some(payload) = line.strip_prefix("data: ").map(str::trim) else {
        // SSE comments and unknown fields are dropped from the canonical stream.
        return (Vec::new(), false);
    };

    if payload == "[DONE]" {
        let mut frames = drain_filter(ctx, filter);
        frames.push(Bytes::from("data: [DONE]\n\n"));
        return (frames, true);
    }

    if filter.is_none() {
        // No filtering requested: forward the upstream frame byte-for-byte.
        return (vec![Bytes::from(format!("{}\n\n", line))], false);
    }

    let Ok(mut data) = serde_json::from_str::<Value>(payload) else {
        return (vec![Bytes::from(format!("{}\n\n", line))], false);
    };

    let has_delta = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("delta"))
        .map(|d| d.is_object())
        .unwrap_or(false);
    if !has_delta {
        // Chunks without choices (Azure prompt_filter_results etc.) pass through.
        return (vec![sse_frame(&data)], false);
    }
    let Some(delta) = data
        .get_mut("choices")
        .and_then(|c| c.get_mut(0))
        .and_then(|choice| choice.get_mut("delta"))
        .and_then(|d| d.as_object_mut())
    else {
        return (Vec::new(), false);
    };

    let mut native_reasoning = String::new();
    for key in ["reasoning_content", "reasoning"] {
        if let Some(value) = delta.remove(key) {
            if let Some(text) = value.as_str() {
                native_reasoning.push_str(text);
            }
        }
    }
    if let Some(thinking) = delta.remove("thinking") {
        match thinking {
            Value::String(text) => native_reasoning.push_str(&text),
            Value::Object(obj) => {
                if let Some(text) = obj
                    .get("content")
                    .or_else(|| obj.get("text"))
                    .and_then(|v| v.as_str())
                {
                    native_reasoning.push_str(text);
                }
            }
            _ => {}
        }
    }
    if !native_reasoning.is_empty() {
        ctx.bus.publish_thinking(&native_reasoning, Some(&ctx.model));
    }

    let content = delta
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    if content.is_empty() {
        if native_reasoning.is_empty() {
            return (vec![Bytes::from(format!("{}\n\n", line))], false);
        }
        return (vec![sse_frame(&data)], false);
    }

    let (clean, thinking) = filter
        .as_mut()
        .map(|f| f.push(&content))
        .unwrap_or((content, String::new()));
    if !thinking.is_empty() {
        ctx.bus.publish_thinking(&thinking, Some(&ctx.model));
    }

    if clean.is_empty() {
        // The whole chunk was thinking; nothing to forward.
        return (Vec::new(), false);
    }
    delta.insert("content".to_string(), Value::String(clean));
    (vec![sse_frame(&data)], false)
}

fn process_anthropic_line(
    line: &str,
    ctx: &StreamContext,
    filter: &mut Option<StreamFilter>,
) -> (Vec<Bytes>, bool) {
    render_events(decode_anthropic_line(line), ctx, filter)
}

fn process_gemini_line(
    line: &str,
    ctx: &StreamContext,
    filter: &mut Option<StreamFilter>,
) -> (Vec<Bytes>, bool) {
    render_events(decode_gemini_line(line), ctx, filter)
}

fn process_response_api_line(
    line: &str,
    ctx: &StreamContext,
    filter: &mut Option<StreamFilter>,
) -> (Vec<Bytes>, bool) {
    render_events(decode_response_api_line(line), ctx, filter)
}

pub(crate) fn decode_anthropic_line(line: &str) -> Vec<StreamEvent> {
    let Some(payload) = line.strip_prefix("data: ").map(str::trim) else {
        return Vec::new();
    };
    let Ok(data) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    match data.get("type").and_then(|t| t.as_str()) {
        Some("content_block_delta") => {
            let delta = data.get("delta");
            let content = delta
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())
                .map(ToString::to_string);
            let reasoning_content = delta
                .and_then(|d| d.get("thinking"))
                .and_then(|t| t.as_str())
                .map(ToString::to_string);
            if content.is_none() && reasoning_content.is_none() {
                return Vec::new();
            }
            vec![StreamEvent::Delta {
                content,
                reasoning_content,
                finish_reason: None,
            }]
        }
        Some("message_delta") => data
            .get("delta")
            .and_then(|d| d.get("stop_reason"))
            .and_then(|r| r.as_str())
            .map(|reason| {
                vec![StreamEvent::Delta {
                    content: None,
                    reasoning_content: None,
                    finish_reason: Some(
                        super::anthropic::map_stop_reason(Some(reason)).to_string(),
                    ),
                }]
            })
            .unwrap_or_default(),
        Some("message_stop") => vec![StreamEvent::Done],
        Some("error") => vec![StreamEvent::Error(
            data.get("error").cloned().unwrap_or(data.clone()),
        )],
        _ => Vec::new(),
    }
}

pub(crate) fn decode_gemini_line(line: &str) -> Vec<StreamEvent> {
    let mut payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    // Without alt=sse the stream is a JSON array split across lines.
    payload = payload
        .trim_start_matches(['[', ','])
        .trim_end_matches([']', ','])
        .trim();
    if payload.is_empty() {
        return Vec::new();
    }
    if payload == "[DONE]" {
        return vec![StreamEvent::Done];
    }
    let Ok(data) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    let candidate = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let mut content = String::new();
    let mut thinking = String::new();
    if let Some(parts) = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                let is_thought = part
                    .get("thought")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if is_thought {
                    thinking.push_str(text);
                } else {
                    content.push_str(text);
                }
            }
        }
    }

    let finish_reason = candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(|f| f.as_str())
        .map(|reason| super::gemini::map_finish_reason(Some(reason)).to_string());

    if content.is_empty() && thinking.is_empty() && finish_reason.is_none() {
        return Vec::new();
    }
    vec![StreamEvent::Delta {
        content: (!content.is_empty()).then_some(content),
        reasoning_content: (!thinking.is_empty()).then_some(thinking),
        finish_reason,
    }]
}

pub(crate) fn decode_response_api_line(line: &str) -> Vec<StreamEvent> {
    let Some(payload) = line.strip_prefix("data: ").map(str::trim) else {
        return Vec::new();
    };
    if payload == "[DONE]" {
        return vec![StreamEvent::Done];
    }
    let Ok(data) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    match data.get("type").and_then(|t| t.as_str()) {
        Some("response.output_text.delta") => data
            .get("delta")
            .and_then(|d| d.as_str())
            .map(|text| {
                vec![StreamEvent::Delta {
                    content: Some(text.to_string()),
                    reasoning_content: None,
                    finish_reason: None,
                }]
            })
            .unwrap_or_default(),
        Some("response.completed") => vec![StreamEvent::Done],
        Some("response.failed") | Some("error") => vec![StreamEvent::Error(
            data.get("error").cloned().unwrap_or(data.clone()),
        )],
        _ => Vec::new(),
    }
}

fn render_events(
    events: Vec<StreamEvent>,
    ctx: &StreamContext,
    filter: &mut Option<StreamFilter>,
) -> (Vec<Bytes>, bool) {
    let mut frames = Vec::new();
    for event in events {
        match event {
            StreamEvent::Delta {
                content,
                reasoning_content,
                finish_reason,
            } => {
                frames.extend(emit_delta(
                    ctx,
                    filter,
                    content.as_deref(),
                    reasoning_content.as_deref(),
                    finish_reason.as_deref(),
                ));
            }
            StreamEvent::Done => {
                frames.extend(drain_filter(ctx, filter));
                frames.push(Bytes::from("data: [DONE]\n\n"));
                return (frames, true);
            }
            StreamEvent::Error(error) => {
                frames.extend(drain_filter(ctx, filter));
                frames.push(sse_frame(&json!({ "error": error })));
                frames.push(Bytes::from("data: [DONE]\n\n"));
                return (frames, true);
            }
        }
    }
    (frames, false)
}

// One canonical delta. With filtering active, content is cleaned and both
// the stripped thinking and any native reasoning go to the bus; without it,
// reasoning is forwarded to the client as reasoning_content.
fn emit_delta(
    ctx: &StreamContext,
    filter: &mut Option<StreamFilter>,
    content: Option<&str>,
    reasoning: Option<&str>,
    finish_reason: Option<&str>,
) -> Vec<Bytes> {
    let mut forwarded_content: Option<String> = None;
    let mut forwarded_reasoning: Option<String> = None;

    match filter.as_mut() {
        Some(filter) => {
            if let Some(reasoning) = reasoning {
                ctx.bus.publish_thinking(reasoning, Some(&ctx.model));
            }
            if let Some(content) = content {
                let (clean, thinking) = filter.push(content);
                if !thinking.is_empty() {
                    ctx.bus.publish_thinking(&thinking, Some(&ctx.model));
                }
                if !clean.is_empty() {
                    forwarded_content = Some(clean);
                }
            }
        }
        None => {
            forwarded_content = content.map(ToString::to_string);
            forwarded_reasoning = reasoning.map(ToString::to_string);
        }
    }

    if forwarded_content.is_none() && forwarded_reasoning.is_none() && finish_reason.is_none() {
        return Vec::new();
    }

    let mut delta = Map::new();
    if let Some(content) = forwarded_content {
        delta.insert("content".into(), Value::String(content));
    }
    if let Some(reasoning) = forwarded_reasoning {
        delta.insert("reasoning_content".into(), Value::String(reasoning));
    }

    let chunk = json!({
        "choices": [{
            "delta": Value::Object(delta),
            "index": 0,
            "finish_reason": finish_reason,
        }],
        "model": ctx.model,
    });
    vec![sse_frame(&chunk)]
}

// EOF/terminal flush: leftover clean text becomes one last delta, leftover
// partial-close text belongs to the thinking stream.
fn drain_filter(ctx: &StreamContext, filter: &mut Option<StreamFilter>) -> Vec<Bytes> {
    let Some(filter) = filter.as_mut() else {
        return Vec::new();
    };
    let (clean, thinking) = filter.finish();
    if !thinking.is_empty() {
        ctx.bus.publish_thinking(&thinking, Some(&ctx.model));
    }
    if clean.is_empty() {
        return Vec::new();
    }
    let chunk = json!({
        "choices": [{
            "delta": { "content": clean },
            "index": 0,
            "finish_reason": Value::Null,
        }],
        "model": ctx.model,
    });
    vec![sse_frame(&chunk)]
}

fn sse_frame(value: &Value) -> Bytes {
    Bytes::from(format!(
        "data: {}\n\n",
        serde_json::to_string(value).unwrap_or_default()
    ))
}
