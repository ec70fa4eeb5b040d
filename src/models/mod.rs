pub mod config;

pub use config::{
    ApiFormat, ConfigDocument, LlmParams, MatchType, Profile, ProxySettings, ReasoningEffort,
    ReasoningParams, ReasoningType, UpstreamConfig,
};
