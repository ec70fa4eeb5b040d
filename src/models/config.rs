use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiFormat {
    Openai,
    OpenaiResponse,
    Anthropic,
    Gemini,
    AzureOpenai,
}

impl ApiFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFormat::Openai => "openai",
            ApiFormat::OpenaiResponse => "openai-response",
            ApiFormat::Anthropic => "anthropic",
            ApiFormat::Gemini => "gemini",
            ApiFormat::AzureOpenai => "azure-openai",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "openai" => Some(ApiFormat::Openai),
            "openai-response" => Some(ApiFormat::OpenaiResponse),
            "anthropic" => Some(ApiFormat::Anthropic),
            "gemini" => Some(ApiFormat::Gemini),
            "azure-openai" => Some(ApiFormat::AzureOpenai),
            _ => None,
        }
    }
}

impl Default for ApiFormat {
    fn default() -> Self {
        ApiFormat::Openai
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Wildcard,
    Regex,
}

impl Default for MatchType {
    fn default() -> Self {
        MatchType::Wildcard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningType {
    Deepseek,
    Openai,
    Anthropic,
    Gemini,
    Qwen,
    Openrouter,
    Custom,
}

impl ReasoningType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningType::Deepseek => "deepseek",
            ReasoningType::Openai => "openai",
            ReasoningType::Anthropic => "anthropic",
            ReasoningType::Gemini => "gemini",
            ReasoningType::Qwen => "qwen",
            ReasoningType::Openrouter => "openrouter",
            ReasoningType::Custom => "custom",
        }
    }
}

impl Default for ReasoningType {
    fn default() -> Self {
        ReasoningType::Deepseek
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    None,
    Minimal,
    Low,
    Medium,
    High,
    Auto,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::None => "none",
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::Auto => "auto",
        }
    }
}

impl Default for ReasoningEffort {
    fn default() -> Self {
        ReasoningEffort::Auto
    }
}

fn default_base_url() -> String {
    crate::constants::DEFAULT_UPSTREAM_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_format: ApiFormat,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            api_format: ApiFormat::Openai,
        }
    }
}

impl UpstreamConfig {
    pub fn masked(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            api_key: mask_key(&self.api_key),
            api_format: self.api_format,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl LlmParams {
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningParams {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub reasoning_type: ReasoningType,
    #[serde(default)]
    pub effort: ReasoningEffort,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u64>,
    #[serde(default)]
    pub custom_params: Map<String, Value>,
    #[serde(default = "default_true")]
    pub filter_thinking_tags: bool,
}

impl Default for ReasoningParams {
    fn default() -> Self {
        Self {
            enabled: false,
            reasoning_type: ReasoningType::Deepseek,
            effort: ReasoningEffort::Auto,
            budget_tokens: None,
            custom_params: Map::new(),
            filter_thinking_tags: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub model_patterns: Vec<String>,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub llm_params: LlmParams,
    #[serde(default)]
    pub reasoning: ReasoningParams,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Profile {
    pub fn generated_id() -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("profile-{}", &hex[..8])
    }

    // Disabled profiles never match; invalid regex patterns are skipped.
    pub fn matches(&self, model: &str) -> bool {
        if !self.enabled || model.is_empty() {
            return false;
        }

        self.model_patterns.iter().any(|pattern| match self.match_type {
            MatchType::Exact => model == pattern,
            MatchType::Wildcard => wildcard_match(pattern, model),
            MatchType::Regex => match anchored_regex(pattern) {
                Ok(re) => re.is_match(model),
                Err(_) => false,
            },
        })
    }

    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.upstream = self.upstream.masked();
        copy
    }
}

// Glob matching with `*` and `?` only, full-string, no path semantics.
pub fn wildcard_match(pattern: &str, input: &str) -> bool {
    let mut regex_src = String::with_capacity(pattern.len() + 8);
    for ch in pattern.chars() {
        match ch {
            '*' => regex_src.push_str(".*"),
            '?' => regex_src.push('.'),
            c => regex_src.push_str(&regex::escape(&c.to_string())),
        }
    }
    match anchored_regex(&regex_src) {
        Ok(re) => re.is_match(input),
        Err(_) => false,
    }
}

// Profile regexes use the Rust `regex` flavor, implicitly anchored and
// case-sensitive.
pub fn anchored_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    regex::Regex::new(&format!("^(?:{})$", pattern))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub api_key: String,
}

fn default_port() -> u16 {
    crate::constants::DEFAULT_PROXY_PORT
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_key: String::new(),
        }
    }
}

impl ProxySettings {
    pub fn masked(&self) -> Self {
        Self {
            port: self.port,
            api_key: mask_key(&self.api_key),
        }
    }
}

fn default_version() -> u32 {
    crate::constants::CONFIG_DOCUMENT_VERSION
}

// The persisted configuration document, written atomically as one JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub default_profile: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            proxy: ProxySettings::default(),
            profiles: Vec::new(),
            default_profile: String::new(),
            version: default_version(),
        }
    }
}

pub fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    if key.len() <= 4 {
        return "****".to_string();
    }
    format!("***{}", &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(match_type: MatchType, patterns: &[&str]) -> Profile {
        Profile {
            id: "p1".into(),
            name: "Test".into(),
            model_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            match_type,
            priority: 0,
            enabled: true,
            upstream: UpstreamConfig::default(),
            llm_params: LlmParams::default(),
            reasoning: ReasoningParams::default(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn exact_match_requires_equality() {
        let p = profile_with(MatchType::Exact, &["gpt-4"]);
        assert!(p.matches("gpt-4"));
        assert!(!p.matches("gpt-4o"));
    }

    #[test]
    fn wildcard_match_is_full_string() {
        let p = profile_with(MatchType::Wildcard, &["gpt-*"]);
        assert!(p.matches("gpt-4"));
        assert!(p.matches("gpt-4o-mini"));
        assert!(!p.matches("my-gpt-4"));
    }

    #[test]
    fn wildcard_question_mark_matches_single_char() {
        let p = profile_with(MatchType::Wildcard, &["o?-preview"]);
        assert!(p.matches("o1-preview"));
        assert!(!p.matches("o11-preview"));
    }

    #[test]
    fn wildcard_escapes_regex_metacharacters() {
        let p = profile_with(MatchType::Wildcard, &["claude-3.5-*"]);
        assert!(p.matches("claude-3.5-sonnet"));
        assert!(!p.matches("claude-3x5-sonnet"));
    }

    #[test]
    fn regex_match_is_anchored() {
        let p = profile_with(MatchType::Regex, &["deepseek-(chat|reasoner)"]);
        assert!(p.matches("deepseek-chat"));
        assert!(!p.matches("deepseek-chat-v2"));
        assert!(!p.matches("x-deepseek-chat"));
    }

    #[test]
    fn invalid_regex_never_matches() {
        let p = profile_with(MatchType::Regex, &["("]);
        assert!(!p.matches("anything"));
    }

    #[test]
    fn disabled_profile_never_matches() {
        let mut p = profile_with(MatchType::Wildcard, &["*"]);
        p.enabled = false;
        assert!(!p.matches("gpt-4"));
    }

    #[test]
    fn mask_key_shows_last_four() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("abc"), "****");
        assert_eq!(mask_key("sk-1234567890"), "***7890");
    }

    #[test]
    fn api_format_round_trips_through_serde() {
        for format in [
            ApiFormat::Openai,
            ApiFormat::OpenaiResponse,
            ApiFormat::Anthropic,
            ApiFormat::Gemini,
            ApiFormat::AzureOpenai,
        ] {
            let s = serde_json::to_string(&format).unwrap();
            assert_eq!(s, format!("\"{}\"", format.as_str()));
            assert_eq!(ApiFormat::parse(format.as_str()), Some(format));
        }
        assert_eq!(ApiFormat::parse("grpc"), None);
    }

    #[test]
    fn llm_params_map_skips_absent_fields() {
        let params = LlmParams {
            temperature: Some(0.7),
            ..Default::default()
        };
        let map = params.to_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("temperature").and_then(|v| v.as_f64()), Some(0.7));
    }
}
