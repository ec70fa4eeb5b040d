//! Builds the dialect-specific JSON fragment that switches reasoning on or
//! off in an upstream request body.
//!
//! Effort legality is enforced twice with different policies: config writes
//! reject an unsupported effort outright (`config::validation`), while at
//! request time the effort is downgraded to the nearest supported level so a
//! stale profile or header override never fails a live request.

use crate::models::{ReasoningEffort, ReasoningParams, ReasoningType};
use serde_json::{json, Map, Value};

pub fn supported_efforts(reasoning_type: ReasoningType) -> &'static [ReasoningEffort] {
    use ReasoningEffort::*;
    match reasoning_type {
        ReasoningType::Deepseek => &[None, Auto],
        ReasoningType::Openai => &[Minimal, Low, Medium, High],
        ReasoningType::Anthropic => &[None, Low, Medium, High],
        ReasoningType::Gemini => &[None, Low, Medium, High, Auto],
        ReasoningType::Qwen => &[None, Low, Medium, High],
        ReasoningType::Openrouter => &[None, Low, Medium, High],
        ReasoningType::Custom => &[None, Minimal, Low, Medium, High, Auto],
    }
}

pub fn effort_supported(reasoning_type: ReasoningType, effort: ReasoningEffort) -> bool {
    supported_efforts(reasoning_type).contains(&effort)
}

// Request-time downgrade for efforts the dialect cannot express.
pub fn clamp_effort(reasoning_type: ReasoningType, effort: ReasoningEffort) -> ReasoningEffort {
    if effort_supported(reasoning_type, effort) {
        return effort;
    }
    match (reasoning_type, effort) {
        (ReasoningType::Deepseek, _) => ReasoningEffort::Auto,
        (_, ReasoningEffort::Minimal) => ReasoningEffort::Low,
        (_, ReasoningEffort::Auto) => ReasoningEffort::Medium,
        (_, ReasoningEffort::None) => ReasoningEffort::Low,
        (_, other) => other,
    }
}

// Default token budgets when the profile carries no explicit budget_tokens.
fn effort_budget(effort: ReasoningEffort) -> Option<u64> {
    match effort {
        ReasoningEffort::Minimal => Some(1024),
        ReasoningEffort::Low => Some(4096),
        ReasoningEffort::Medium => Some(16384),
        ReasoningEffort::High => Some(32768),
        ReasoningEffort::None | ReasoningEffort::Auto => Option::None,
    }
}

fn off_fragment(reasoning_type: ReasoningType) -> Value {
    match reasoning_type {
        ReasoningType::Deepseek | ReasoningType::Anthropic => {
            json!({ "thinking": { "type": "disabled" } })
        }
        // OpenAI reasoning models have no off switch; omitting the
        // parameter is the disabled state.
        ReasoningType::Openai => json!({}),
        ReasoningType::Gemini => json!({ "thinkingConfig": { "thinkingBudget": 0 } }),
        ReasoningType::Qwen => json!({ "enable_thinking": false }),
        ReasoningType::Openrouter => json!({ "reasoning": { "enabled": false } }),
        ReasoningType::Custom => json!({}),
    }
}

/// Build the JSON fragment for one request. The fragment is later merged
/// into the outbound body with [`deep_merge`].
pub fn build_fragment(params: &ReasoningParams) -> Value {
    if !params.enabled || params.effort == ReasoningEffort::None {
        return off_fragment(params.reasoning_type);
    }

    let effort = clamp_effort(params.reasoning_type, params.effort);
    let budget = params.budget_tokens.or_else(|| effort_budget(effort));

    let mut fragment = match params.reasoning_type {
        ReasoningType::Deepseek => json!({ "thinking": { "type": "enabled" } }),
        ReasoningType::Openai => {
            let level = match effort {
                ReasoningEffort::Minimal => "low",
                ReasoningEffort::Low => "low",
                ReasoningEffort::Medium => "medium",
                ReasoningEffort::High => "high",
                _ => "medium",
            };
            json!({ "reasoning_effort": level })
        }
        ReasoningType::Anthropic => {
            json!({
                "thinking": {
                    "type": "enabled",
                    "budget_tokens": budget.unwrap_or(16384),
                }
            })
        }
        ReasoningType::Gemini => {
            let thinking_budget: i64 = match budget {
                Some(n) => n as i64,
                Option::None => -1,
            };
            json!({
                "thinkingConfig": {
                    "thinkingBudget": thinking_budget,
                    "includeThoughts": true,
                }
            })
        }
        ReasoningType::Qwen => {
            let mut obj = json!({ "enable_thinking": true });
            if let Some(explicit) = params.budget_tokens {
                obj["thinking_budget"] = json!(explicit);
            }
            obj
        }
        ReasoningType::Openrouter => {
            json!({
                "reasoning": {
                    "enabled": true,
                    "max_tokens": budget.unwrap_or(16384),
                }
            })
        }
        ReasoningType::Custom => json!({}),
    };

    if !params.custom_params.is_empty() {
        deep_merge(&mut fragment, Value::Object(params.custom_params.clone()));
    }

    fragment
}

/// Merge `fragment` into `base`: shallow at the top level, recursing when
/// both sides hold JSON objects.
pub fn deep_merge(base: &mut Value, fragment: Value) {
    match (base, fragment) {
        (Value::Object(base_map), Value::Object(fragment_map)) => {
            for (key, value) in fragment_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, fragment) => *slot = fragment,
    }
}

// Enum catalog served to the front-end dropdowns.
pub fn catalog() -> Value {
    let type_entry = |t: ReasoningType, label: &str, description: &str| {
        json!({
            "value": t.as_str(),
            "label": label,
            "description": description,
            "supported_efforts": supported_efforts(t)
                .iter()
                .map(|e| e.as_str())
                .collect::<Vec<_>>(),
        })
    };

    json!({
        "types": [
            type_entry(ReasoningType::Deepseek, "DeepSeek (R1/V3.1)", "Uses the thinking.type parameter"),
            type_entry(ReasoningType::Openai, "OpenAI (o1/o3/GPT-5)", "Uses the reasoning_effort parameter"),
            type_entry(ReasoningType::Anthropic, "Anthropic (Claude 3.7/4)", "Uses the thinking.budget_tokens parameter"),
            type_entry(ReasoningType::Gemini, "Google (Gemini 2.5+)", "Uses the thinkingConfig parameter"),
            type_entry(ReasoningType::Qwen, "Qwen (Qwen3)", "Uses the enable_thinking parameter"),
            type_entry(ReasoningType::Openrouter, "OpenRouter", "Uses the reasoning.enabled parameter"),
            type_entry(ReasoningType::Custom, "Custom", "Deep-merges user-supplied JSON parameters"),
        ],
        "efforts": [
            { "value": "none", "label": "Off" },
            { "value": "minimal", "label": "Minimal" },
            { "value": "low", "label": "Low" },
            { "value": "medium", "label": "Medium" },
            { "value": "high", "label": "High" },
            { "value": "auto", "label": "Auto" },
        ],
    })
}
