use crate::error::ProxyError;
use crate::models::{MatchType, Profile, ProxySettings};
use crate::proxy::reasoning;

pub fn validate_profile(profile: &Profile) -> Result<(), ProxyError> {
    if profile.name.trim().is_empty() {
        return Err(ProxyError::ConfigInvalid("Profile name is required".into()));
    }

    if profile.enabled && !profile.model_patterns.iter().any(|p| !p.trim().is_empty()) {
        return Err(ProxyError::ConfigInvalid(
            "An enabled profile needs at least one non-empty model pattern".into(),
        ));
    }

    if profile.match_type == MatchType::Regex {
        for pattern in &profile.model_patterns {
            if let Err(e) = crate::models::config::anchored_regex(pattern) {
                return Err(ProxyError::ConfigInvalid(format!(
                    "Invalid regex pattern '{}': {}",
                    pattern, e
                )));
            }
        }
    }

    validate_base_url(&profile.upstream.base_url)?;

    if profile.reasoning.enabled
        && !reasoning::effort_supported(profile.reasoning.reasoning_type, profile.reasoning.effort)
    {
        return Err(ProxyError::ConfigInvalid(format!(
            "Effort '{}' is not supported for reasoning type '{}'",
            profile.reasoning.effort.as_str(),
            profile.reasoning.reasoning_type.as_str()
        )));
    }

    Ok(())
}

pub fn validate_base_url(base_url: &str) -> Result<(), ProxyError> {
    let parsed = url::Url::parse(base_url)
        .map_err(|e| ProxyError::ConfigInvalid(format!("Invalid base_url '{}': {}", base_url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ProxyError::ConfigInvalid(format!(
            "Unsupported base_url scheme '{}'",
            other
        ))),
    }
}

pub fn validate_port(port: u64) -> Result<u16, ProxyError> {
    if (1..=65535).contains(&port) {
        Ok(port as u16)
    } else {
        Err(ProxyError::ConfigInvalid(
            "Port must be between 1 and 65535".into(),
        ))
    }
}

pub fn validate_proxy_settings(settings: &ProxySettings) -> Result<(), ProxyError> {
    validate_port(settings.port as u64).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReasoningEffort, ReasoningType};

    fn base_profile() -> Profile {
        Profile {
            id: "p1".into(),
            name: "Test".into(),
            model_patterns: vec!["gpt-*".into()],
            match_type: MatchType::Wildcard,
            priority: 0,
            enabled: true,
            upstream: Default::default(),
            llm_params: Default::default(),
            reasoning: Default::default(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn accepts_a_sound_profile() {
        assert!(validate_profile(&base_profile()).is_ok());
    }

    #[test]
    fn rejects_enabled_profile_without_patterns() {
        let mut p = base_profile();
        p.model_patterns = vec!["".into()];
        assert!(matches!(
            validate_profile(&p),
            Err(ProxyError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn disabled_profile_may_have_no_patterns() {
        let mut p = base_profile();
        p.enabled = false;
        p.model_patterns.clear();
        assert!(validate_profile(&p).is_ok());
    }

    #[test]
    fn rejects_broken_regex_pattern() {
        let mut p = base_profile();
        p.match_type = MatchType::Regex;
        p.model_patterns = vec!["(".into()];
        assert!(matches!(
            validate_profile(&p),
            Err(ProxyError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn rejects_malformed_base_url() {
        let mut p = base_profile();
        p.upstream.base_url = "not a url".into();
        assert!(validate_profile(&p).is_err());

        p.upstream.base_url = "ftp://example.com".into();
        assert!(validate_profile(&p).is_err());
    }

    #[test]
    fn rejects_effort_unsupported_for_type() {
        let mut p = base_profile();
        p.reasoning.enabled = true;
        p.reasoning.reasoning_type = ReasoningType::Deepseek;
        p.reasoning.effort = ReasoningEffort::High;
        assert!(matches!(
            validate_profile(&p),
            Err(ProxyError::ConfigInvalid(_))
        ));

        p.reasoning.effort = ReasoningEffort::Auto;
        assert!(validate_profile(&p).is_ok());
    }

    #[test]
    fn effort_check_skipped_when_reasoning_disabled() {
        let mut p = base_profile();
        p.reasoning.enabled = false;
        p.reasoning.reasoning_type = ReasoningType::Deepseek;
        p.reasoning.effort = ReasoningEffort::High;
        assert!(validate_profile(&p).is_ok());
    }

    #[test]
    fn port_bounds_are_enforced() {
        assert!(validate_port(0).is_err());
        assert!(validate_port(65536).is_err());
        assert_eq!(validate_port(8045).unwrap(), 8045);
    }
}
