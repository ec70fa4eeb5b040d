//! Azure OpenAI: wire-identical to OpenAI; only the URL shape and the
//! credential header differ, and both live in the adapter dispatch.

use serde_json::Value;

pub fn transform_request(body: Value) -> Value {
    body
}

pub fn transform_response(response: Value) -> Value {
    response
}
