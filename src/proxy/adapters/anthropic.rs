//! Anthropic Messages dialect. The first system message is hoisted to the
//! top-level `system` field, message content becomes block arrays, and
//! `max_tokens` is mandatory upstream so a default is filled in.

use serde_json::{json, Map, Value};

const DEFAULT_MAX_TOKENS: u64 = 4096;

pub fn transform_request(body: Value) -> Value {
    let empty = Map::new();
    let source = body.as_object().unwrap_or(&empty);

    let mut out = Map::new();
    if let Some(model) = source.get("model") {
        out.insert("model".into(), model.clone());
    }

    let mut system: Option<Value> = None;
    let mut messages: Vec<Value> = Vec::new();
    if let Some(Value::Array(items)) = source.get("messages") {
        for message in items {
            let role = message.get("role").and_then(|v| v.as_str()).unwrap_or("user");
            let content = message.get("content").cloned().unwrap_or(Value::Null);

            if role == "system" {
                if system.is_none() {
                    system = Some(content);
                }
                continue;
            }

            let mapped_role = if role == "user" || role == "tool" {
                "user"
            } else {
                "assistant"
            };
            let blocks = match content {
                Value::String(text) => json!([{ "type": "text", "text": text }]),
                already_blocks @ Value::Array(_) => already_blocks,
                other => json!([{ "type": "text", "text": other.to_string() }]),
            };
            messages.push(json!({ "role": mapped_role, "content": blocks }));
        }
    }
    out.insert("messages".into(), Value::Array(messages));
    if let Some(system) = system {
        out.insert("system".into(), system);
    }

    out.insert(
        "max_tokens".into(),
        source
            .get("max_tokens")
            .cloned()
            .unwrap_or(json!(DEFAULT_MAX_TOKENS)),
    );
    for key in ["temperature", "top_p", "top_k", "stream"] {
        if let Some(value) = source.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    if let Some(stop) = source.get("stop") {
        out.insert("stop_sequences".into(), stop.clone());
    }

    Value::Object(out)
}

pub fn transform_response(response: Value) -> Value {
    let mut content = String::new();
    let mut reasoning = String::new();
    if let Some(blocks) = response.get("content").and_then(|c| c.as_array()) {
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        content.push_str(text);
                    }
                }
                Some("thinking") => {
                    if let Some(text) = block.get("thinking").and_then(|t| t.as_str()) {
                        reasoning.push_str(text);
                    }
                }
                _ => {}
            }
        }
    }

    let mut message = json!({ "role": "assistant", "content": content });
    if !reasoning.is_empty() {
        message["reasoning_content"] = Value::String(reasoning);
    }

    let usage = response.get("usage").cloned().unwrap_or(json!({}));
    let input_tokens = usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
    let output_tokens = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);

    json!({
        "id": response.get("id").cloned().unwrap_or(Value::String(String::new())),
        "object": "chat.completion",
        "model": response.get("model").cloned().unwrap_or(Value::String(String::new())),
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": map_stop_reason(
                response.get("stop_reason").and_then(|v| v.as_str())
            ),
        }],
        "usage": {
            "prompt_tokens": input_tokens,
            "completion_tokens": output_tokens,
            "total_tokens": input_tokens + output_tokens,
        },
    })
}

pub fn map_stop_reason(reason: Option<&str>) -> &'static str {
    match reason {
        Some("max_tokens") => "length",
        _ => "stop",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_is_hoisted() {
        let body = json!({
            "model": "claude-sonnet",
            "messages": [
                { "role": "system", "content": "be terse" },
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" },
            ],
            "stream": true,
        });

        let out = transform_request(body);
        assert_eq!(out["system"], "be terse");
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["type"], "text");
        assert_eq!(messages[0]["content"][0]["text"], "hi");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(out["stream"], true);
    }

    #[test]
    fn max_tokens_defaults_when_absent() {
        let out = transform_request(json!({ "model": "claude", "messages": [] }));
        assert_eq!(out["max_tokens"], 4096);

        let out = transform_request(json!({ "model": "claude", "messages": [], "max_tokens": 99 }));
        assert_eq!(out["max_tokens"], 99);
    }

    #[test]
    fn stop_becomes_stop_sequences() {
        let out = transform_request(json!({
            "model": "claude",
            "messages": [],
            "stop": ["END"],
        }));
        assert_eq!(out["stop_sequences"], json!(["END"]));
        assert!(out.get("stop").is_none());
    }

    #[test]
    fn openai_only_sampling_keys_are_dropped() {
        let out = transform_request(json!({
            "model": "claude",
            "messages": [],
            "presence_penalty": 0.5,
            "seed": 42,
        }));
        assert!(out.get("presence_penalty").is_none());
        assert!(out.get("seed").is_none());
    }

    #[test]
    fn response_concatenates_text_blocks() {
        let response = json!({
            "id": "msg_1",
            "model": "claude-sonnet",
            "content": [
                { "type": "text", "text": "Hel" },
                { "type": "text", "text": "lo" },
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 10, "output_tokens": 5 },
        });

        let out = transform_response(response);
        assert_eq!(out["choices"][0]["message"]["content"], "Hello");
        assert_eq!(out["choices"][0]["finish_reason"], "stop");
        assert_eq!(out["usage"]["total_tokens"], 15);
    }

    #[test]
    fn thinking_blocks_surface_as_reasoning_content() {
        let response = json!({
            "content": [
                { "type": "thinking", "thinking": "hmm" },
                { "type": "text", "text": "OK" },
            ],
            "stop_reason": "end_turn",
        });

        let out = transform_response(response);
        assert_eq!(out["choices"][0]["message"]["content"], "OK");
        assert_eq!(out["choices"][0]["message"]["reasoning_content"], "hmm");
    }

    #[test]
    fn max_tokens_stop_reason_maps_to_length() {
        assert_eq!(map_stop_reason(Some("max_tokens")), "length");
        assert_eq!(map_stop_reason(Some("end_turn")), "stop");
        assert_eq!(map_stop_reason(None), "stop");
    }
}
