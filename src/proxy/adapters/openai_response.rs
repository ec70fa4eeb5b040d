//! OpenAI Response API dialect: `messages` become an `input` array of typed
//! text blocks, and `max_tokens` is spelled `max_output_tokens`.

use serde_json::{json, Value};

pub fn transform_request(mut body: Value) -> Value {
    let Some(obj) = body.as_object_mut() else {
        return body;
    };

    if let Some(Value::Array(messages)) = obj.remove("messages") {
        let input: Vec<Value> = messages
            .into_iter()
            .map(|message| {
                let role = message
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("user")
                    .to_string();
                match message.get("content").and_then(|v| v.as_str()) {
                    Some(text) => json!({
                        "role": role,
                        "content": [{ "type": "input_text", "text": text }],
                    }),
                    // Structured content is already block-shaped; keep it.
                    None => message,
                }
            })
            .collect();
        obj.insert("input".to_string(), Value::Array(input));
    }

    if let Some(max_tokens) = obj.remove("max_tokens") {
        obj.insert("max_output_tokens".to_string(), max_tokens);
    }

    body
}

pub fn transform_response(response: Value) -> Value {
    // Aggregate response objects carry `output`; anything else is assumed to
    // be chat-completion shaped already.
    let Some(output) = response.get("output") else {
        return response;
    };

    let content = match output {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| item.get("content").and_then(|c| c.as_array()))
            .flatten()
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };

    json!({
        "object": "chat.completion",
        "model": response.get("model").cloned().unwrap_or(Value::String(String::new())),
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop",
        }],
        "usage": response.get("usage").cloned().unwrap_or(json!({})),
    })
}
