//! Google Gemini dialect. Messages map to `contents` with user/model roles,
//! system text concatenates into `systemInstruction`, and sampling moves
//! under the camelCased `generationConfig`.

use serde_json::{json, Map, Value};

pub fn endpoint(base: &str, model: &str, stream: bool) -> String {
    if stream {
        format!("{}/v1beta/models/{}:streamGenerateContent?alt=sse", base, model)
    } else {
        format!("{}/v1beta/models/{}:generateContent", base, model)
    }
}

pub fn transform_request(body: Value, _model: &str) -> Value {
    let empty = Map::new();
    let source = body.as_object().unwrap_or(&empty);

    let mut contents: Vec<Value> = Vec::new();
    let mut system_parts: Vec<String> = Vec::new();
    if let Some(Value::Array(messages)) = source.get("messages") {
        for message in messages {
            let role = message.get("role").and_then(|v| v.as_str()).unwrap_or("user");
            let text = match message.get("content") {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };

            if role == "system" {
                system_parts.push(text);
                continue;
            }
            let gemini_role = if role == "assistant" { "model" } else { "user" };
            contents.push(json!({
                "role": gemini_role,
                "parts": [{ "text": text }],
            }));
        }
    }

    let mut out = Map::new();
    out.insert("contents".into(), Value::Array(contents));
    if !system_parts.is_empty() {
        out.insert(
            "systemInstruction".into(),
            json!({ "parts": [{ "text": system_parts.join("\n") }] }),
        );
    }

    let mut generation_config = Map::new();
    for (from, to) in [
        ("temperature", "temperature"),
        ("top_p", "topP"),
        ("top_k", "topK"),
        ("max_tokens", "maxOutputTokens"),
        ("stop", "stopSequences"),
    ] {
        if let Some(value) = source.get(from) {
            generation_config.insert(to.to_string(), value.clone());
        }
    }
    if !generation_config.is_empty() {
        out.insert("generationConfig".into(), Value::Object(generation_config));
    }

    Value::Object(out)
}

pub fn transform_response(response: Value) -> Value {
    let candidate = response
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let mut content = String::new();
    let mut reasoning = String::new();
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
                    reasoning.push_str(text);
                } else {
                    content.push_str(text);
                }
            }
        }
    }

    let finish_reason = map_finish_reason(
        candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(|f| f.as_str()),
    );

    let mut message = json!({ "role": "assistant", "content": content });
    if !reasoning.is_empty() {
        message["reasoning_content"] = Value::String(reasoning);
    }

    let usage = response.get("usageMetadata").cloned().unwrap_or(json!({}));
    json!({
        "id": "",
        "object": "chat.completion",
        "model": response.get("modelVersion").cloned().unwrap_or(Value::String(String::new())),
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
        }],
        "usage": {
            "prompt_tokens": usage.get("promptTokenCount").and_then(|v| v.as_u64()).unwrap_or(0),
            "completion_tokens": usage.get("candidatesTokenCount").and_then(|v| v.as_u64()).unwrap_or(0),
            "total_tokens": usage.get("totalTokenCount").and_then(|v| v.as_u64()).unwrap_or(0),
        },
    })
}

pub fn map_finish_reason(reason: Option<&str>) -> &'static str {
    match reason {
        Some("MAX_TOKENS") => "length",
        Some("SAFETY") | Some("RECITATION") => "content_filter",
        _ => "stop",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_map_to_contents_with_model_role() {
        let body = json!({
            "model": "gemini-2.5-pro",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "system", "content": "in English" },
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" },
            ],
            "temperature": 0.3,
            "top_p": 0.9,
            "max_tokens": 64,
        });

        let out = transform_request(body, "gemini-2.5-pro");
        let contents = out["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[0]["parts"][0]["text"], "hi");
        assert_eq!(
            out["systemInstruction"]["parts"][0]["text"],
            "be brief\nin English"
        );
        assert_eq!(out["generationConfig"]["temperature"], 0.3);
        assert_eq!(out["generationConfig"]["topP"], 0.9);
        assert_eq!(out["generationConfig"]["maxOutputTokens"], 64);
        assert!(out.get("messages").is_none());
    }

    #[test]
    fn endpoint_picks_stream_method() {
        assert_eq!(
            endpoint("https://g", "gemini-2.5-pro", true),
            "https://g/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            endpoint("https://g", "gemini-2.5-pro", false),
            "https://g/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn response_parts_concatenate() {
        let response = json!({
            "modelVersion": "gemini-2.5-pro",
            "candidates": [{
                "content": { "parts": [{ "text": "Hel" }, { "text": "lo" }] },
                "finishReason": "STOP",
            }],
            "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5 },
        });

        let out = transform_response(response);
        assert_eq!(out["choices"][0]["message"]["content"], "Hello");
        assert_eq!(out["choices"][0]["finish_reason"], "stop");
        assert_eq!(out["usage"]["total_tokens"], 5);
    }

    #[test]
    fn thought_parts_become_reasoning_content() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "pondering", "thought": true },
                    { "text": "answer" },
                ]},
            }],
        });

        let out = transform_response(response);
        assert_eq!(out["choices"][0]["message"]["content"], "answer");
        assert_eq!(out["choices"][0]["message"]["reasoning_content"], "pondering");
    }

    #[test]
    fn finish_reasons_are_mapped() {
        assert_eq!(map_finish_reason(Some("MAX_TOKENS")), "length");
        assert_eq!(map_finish_reason(Some("SAFETY")), "content_filter");
        assert_eq!(map_finish_reason(Some("STOP")), "stop");
        assert_eq!(map_finish_reason(None), "stop");
    }
}
