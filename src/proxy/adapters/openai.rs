//! OpenAI-compatible dialect: the canonical shape, passed through.

use serde_json::Value;

pub fn transform_request(body: Value) -> Value {
    body
}

pub fn transform_response(response: Value) -> Value {
    response
}
