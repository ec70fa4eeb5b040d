use crate::config::validation;
use crate::error::{ProxyError, ProxyResult};
use crate::models::{ConfigDocument, Profile, ProxySettings, UpstreamConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub fn config_path_from_env() -> PathBuf {
    std::env::var("THINKGATE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(crate::constants::DEFAULT_CONFIG_FILE))
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn default_bootstrap_profile() -> Profile {
    let now = now_rfc3339();
    Profile {
        id: "default".into(),
        name: "Default".into(),
        model_patterns: vec!["*".into()],
        match_type: crate::models::MatchType::Wildcard,
        priority: 0,
        enabled: true,
        upstream: UpstreamConfig {
            base_url: std::env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| crate::constants::DEFAULT_UPSTREAM_BASE_URL.to_string()),
            api_key: std::env::var("UPSTREAM_API_KEY").unwrap_or_default(),
            api_format: crate::models::ApiFormat::Openai,
        },
        llm_params: Default::default(),
        reasoning: Default::default(),
        created_at: now.clone(),
        updated_at: now,
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub model_patterns: Vec<String>,
    #[serde(default)]
    pub match_type: crate::models::MatchType,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "draft_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub llm_params: crate::models::LlmParams,
    #[serde(default)]
    pub reasoning: crate::models::ReasoningParams,
}

fn draft_enabled() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct ProxySettingsPatch {
    #[serde(default)]
    pub port: Option<u64>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub default_profile: Option<String>,
}

// Owns the persisted configuration document. Mutations take the write lock,
// validate, persist atomically, and only then become visible to readers;
// every reader clones a snapshot.
pub struct ConfigService {
    path: PathBuf,
    doc: RwLock<ConfigDocument>,
}

impl ConfigService {
    pub fn load(path: PathBuf) -> Result<Self, String> {
        let mut doc = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| format!("failed_to_read_config_file: {}", e))?;
            serde_json::from_str::<ConfigDocument>(&content)
                .map_err(|e| format!("failed_to_parse_config_file: {}", e))?
        } else {
            ConfigDocument::default()
        };

        if doc.profiles.is_empty() {
            info!("No profiles configured, creating the default profile");
            doc.profiles.push(default_bootstrap_profile());
            doc.default_profile = "default".into();
            persist(&path, &doc).map_err(|e| e.to_string())?;
        }

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    #[cfg(test)]
    pub fn in_memory(doc: ConfigDocument, path: PathBuf) -> Self {
        Self {
            path,
            doc: RwLock::new(doc),
        }
    }

    pub async fn proxy_settings(&self) -> ProxySettings {
        self.doc.read().await.proxy.clone()
    }

    // In-memory replacement used for environment overrides at startup;
    // intentionally not persisted so env secrets never land on disk.
    pub async fn replace_proxy_settings(&self, settings: ProxySettings) {
        self.doc.write().await.proxy = settings;
    }

    pub async fn update_proxy_settings(
        &self,
        patch: ProxySettingsPatch,
    ) -> ProxyResult<(ProxySettings, bool)> {
        let mut doc = self.doc.write().await;
        let mut restart_required = false;

        if let Some(port) = patch.port {
            let port = validation::validate_port(port)?;
            if port != doc.proxy.port {
                doc.proxy.port = port;
                restart_required = true;
            }
        }
        if let Some(api_key) = patch.api_key {
            doc.proxy.api_key = api_key;
        }

        persist(&self.path, &doc)?;
        Ok((doc.proxy.clone(), restart_required))
    }

    pub async fn profiles(&self) -> Vec<Profile> {
        self.doc.read().await.profiles.clone()
    }

    pub async fn get_profile(&self, id: &str) -> Option<Profile> {
        self.doc
            .read()
            .await
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn default_profile_id(&self) -> String {
        self.doc.read().await.default_profile.clone()
    }

    pub async fn default_profile(&self) -> Option<Profile> {
        let doc = self.doc.read().await;
        if doc.default_profile.is_empty() {
            return None;
        }
        doc.profiles
            .iter()
            .find(|p| p.id == doc.default_profile)
            .cloned()
    }

    // Resolution: every enabled profile with a matching pattern competes;
    // higher priority wins, earlier created_at breaks ties, then id order.
    // Falls back to the designated default profile only.
    pub async fn resolve(&self, model: &str) -> ProxyResult<Profile> {
        let doc = self.doc.read().await;
        let mut matches: Vec<&Profile> =
            doc.profiles.iter().filter(|p| p.matches(model)).collect();
        matches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(best) = matches.first() {
            return Ok((*best).clone());
        }

        if !doc.default_profile.is_empty() {
            if let Some(default) = doc.profiles.iter().find(|p| p.id == doc.default_profile) {
                return Ok(default.clone());
            }
            warn!(
                "[W-DEFAULT-PROFILE-MISSING] default_profile_id_not_found: {}",
                doc.default_profile
            );
        }

        Err(ProxyError::NoProfileMatch(model.to_string()))
    }

    pub async fn test_match(&self, model: &str) -> Value {
        let doc = self.doc.read().await;
        let all_matches: Vec<Value> = {
            let mut matches: Vec<&Profile> =
                doc.profiles.iter().filter(|p| p.matches(model)).collect();
            matches.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
            matches
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "name": p.name,
                        "patterns": p.model_patterns,
                        "match_type": p.match_type,
                        "priority": p.priority,
                        "enabled": p.enabled,
                    })
                })
                .collect()
        };
        drop(doc);

        let matched = match self.resolve(model).await {
            Ok(profile) => serde_json::to_value(profile.masked()).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };

        json!({
            "model": model,
            "matched": matched,
            "all_matches": all_matches,
        })
    }

    pub async fn create_profile(&self, draft: ProfileDraft) -> ProxyResult<Profile> {
        let now = now_rfc3339();
        let profile = Profile {
            id: draft.id.unwrap_or_else(Profile::generated_id),
            name: draft.name,
            model_patterns: draft.model_patterns,
            match_type: draft.match_type,
            priority: draft.priority,
            enabled: draft.enabled,
            upstream: draft.upstream,
            llm_params: draft.llm_params,
            reasoning: draft.reasoning,
            created_at: now.clone(),
            updated_at: now,
        };
        validation::validate_profile(&profile)?;

        let mut doc = self.doc.write().await;
        if doc.profiles.iter().any(|p| p.id == profile.id) {
            return Err(ProxyError::ConfigInvalid(format!(
                "Profile ID '{}' already exists",
                profile.id
            )));
        }
        doc.profiles.push(profile.clone());
        persist(&self.path, &doc)?;
        Ok(profile)
    }

    // Partial update: provided keys replace existing values, nested objects
    // merge key-by-key; id and created_at are immutable.
    pub async fn update_profile(&self, id: &str, patch: Value) -> ProxyResult<Profile> {
        let mut doc = self.doc.write().await;
        let position = doc
            .profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ProxyError::BadRequest(format!("Profile '{}' not found", id)))?;

        let existing = &doc.profiles[position];
        let mut merged = serde_json::to_value(existing)
            .map_err(|e| ProxyError::Internal(format!("profile_serialize_failed: {}", e)))?;
        merge_value(&mut merged, patch);

        let mut updated: Profile = serde_json::from_value(merged)
            .map_err(|e| ProxyError::BadRequest(format!("Invalid profile update: {}", e)))?;
        updated.id = existing.id.clone();
        updated.created_at = existing.created_at.clone();
        updated.updated_at = now_rfc3339();
        validation::validate_profile(&updated)?;

        doc.profiles[position] = updated.clone();
        persist(&self.path, &doc)?;
        Ok(updated)
    }

    pub async fn delete_profile(&self, id: &str) -> ProxyResult<()> {
        let mut doc = self.doc.write().await;
        let position = doc
            .profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ProxyError::BadRequest(format!("Profile '{}' not found", id)))?;

        if doc.profiles.len() <= 1 {
            return Err(ProxyError::ConfigInvalid(
                "Cannot delete the last profile".into(),
            ));
        }

        doc.profiles.remove(position);
        if doc.default_profile == id {
            doc.default_profile = doc.profiles[0].id.clone();
            info!(
                "Default profile reassigned to '{}' after deletion",
                doc.default_profile
            );
        }
        persist(&self.path, &doc)?;
        Ok(())
    }

    pub async fn set_default_profile(&self, id: &str) -> ProxyResult<()> {
        let mut doc = self.doc.write().await;
        if !doc.profiles.iter().any(|p| p.id == id) {
            return Err(ProxyError::BadRequest(format!("Profile '{}' not found", id)));
        }
        doc.default_profile = id.to_string();
        persist(&self.path, &doc)?;
        Ok(())
    }

    // Export carries full secrets; it is the backup/restore surface.
    pub async fn export(&self) -> ConfigDocument {
        self.doc.read().await.clone()
    }

    pub async fn import(&self, data: ImportDocument, merge: bool) -> ProxyResult<usize> {
        if data.profiles.is_empty() {
            return Err(ProxyError::BadRequest(
                "No profiles found in import data".into(),
            ));
        }
        for profile in &data.profiles {
            validation::validate_profile(profile)?;
        }

        let mut doc = self.doc.write().await;
        if merge {
            for profile in data.profiles {
                if !doc.profiles.iter().any(|p| p.id == profile.id) {
                    doc.profiles.push(profile);
                }
            }
        } else {
            doc.profiles = data.profiles;
            if let Some(default) = data.default_profile {
                doc.default_profile = default;
            }
        }
        persist(&self.path, &doc)?;
        Ok(doc.profiles.len())
    }
}

// Write-temp then rename so a crash mid-write never corrupts the document.
fn persist(path: &Path, doc: &ConfigDocument) -> ProxyResult<()> {
    let content = serde_json::to_string_pretty(doc)
        .map_err(|e| ProxyError::Internal(format!("failed_to_serialize_config: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .map_err(|e| ProxyError::Internal(format!("failed_to_write_config_temp: {}", e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| ProxyError::Internal(format!("failed_to_rename_config: {}", e)))?;
    Ok(())
}

fn merge_value(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_value(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, patch) => *base_slot = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchType;
    use crate::test_utils::temp_config_path;

    fn profile(id: &str, patterns: &[&str], match_type: MatchType, priority: i64) -> Profile {
        Profile {
            id: id.into(),
            name: id.into(),
            model_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            match_type,
            priority,
            enabled: true,
            upstream: Default::default(),
            llm_params: Default::default(),
            reasoning: Default::default(),
            created_at: format!("2024-01-0{}T00:00:00Z", (id.len() % 9) + 1),
            updated_at: String::new(),
        }
    }

    fn service_with(profiles: Vec<Profile>, default: &str) -> ConfigService {
        ConfigService::in_memory(
            ConfigDocument {
                proxy: Default::default(),
                profiles,
                default_profile: default.into(),
                version: 1,
            },
            temp_config_path(),
        )
    }

    #[tokio::test]
    async fn priority_wins_over_specificity() {
        let p1 = Profile {
            created_at: "2024-01-01T00:00:00Z".into(),
            ..profile("p1", &["gpt-*"], MatchType::Wildcard, 10)
        };
        let p2 = Profile {
            match_type: MatchType::Exact,
            created_at: "2024-01-02T00:00:00Z".into(),
            ..profile("p2", &["gpt-4"], MatchType::Exact, 5)
        };
        let service = service_with(vec![p1, p2], "");

        let resolved = service.resolve("gpt-4").await.unwrap();
        assert_eq!(resolved.id, "p1");
    }

    #[tokio::test]
    async fn priority_tie_breaks_on_created_at_then_id() {
        let mut a = profile("b-late", &["m-*"], MatchType::Wildcard, 1);
        a.created_at = "2024-02-01T00:00:00Z".into();
        let mut b = profile("a-early", &["m-*"], MatchType::Wildcard, 1);
        b.created_at = "2024-01-01T00:00:00Z".into();
        let service = service_with(vec![a, b], "");

        let resolved = service.resolve("m-1").await.unwrap();
        assert_eq!(resolved.id, "a-early");

        let mut c = profile("zz", &["n-*"], MatchType::Wildcard, 1);
        c.created_at = "2024-01-01T00:00:00Z".into();
        let mut d = profile("aa", &["n-*"], MatchType::Wildcard, 1);
        d.created_at = "2024-01-01T00:00:00Z".into();
        let service = service_with(vec![c, d], "");
        let resolved = service.resolve("n-1").await.unwrap();
        assert_eq!(resolved.id, "aa");
    }

    #[tokio::test]
    async fn falls_back_to_default_profile() {
        let catchall = profile("fallback", &["deepseek-*"], MatchType::Wildcard, 0);
        let service = service_with(vec![catchall], "fallback");

        let resolved = service.resolve("unknown-model").await.unwrap();
        assert_eq!(resolved.id, "fallback");
    }

    #[tokio::test]
    async fn no_match_and_no_default_fails() {
        let p = profile("p", &["deepseek-*"], MatchType::Wildcard, 0);
        let service = service_with(vec![p], "");

        let err = service.resolve("unknown-model").await.unwrap_err();
        assert!(matches!(err, ProxyError::NoProfileMatch(_)));
    }

    #[tokio::test]
    async fn resolution_is_deterministic() {
        let profiles = vec![
            profile("w1", &["x-*"], MatchType::Wildcard, 3),
            profile("w2", &["x-?"], MatchType::Wildcard, 3),
            profile("w3", &["x-1"], MatchType::Exact, 3),
        ];
        let service = service_with(profiles, "");
        let first = service.resolve("x-1").await.unwrap().id;
        for _ in 0..5 {
            assert_eq!(service.resolve("x-1").await.unwrap().id, first);
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let service = service_with(vec![profile("p1", &["*"], MatchType::Wildcard, 0)], "p1");
        let draft: ProfileDraft = serde_json::from_value(json!({
            "id": "p1",
            "name": "dup",
            "model_patterns": ["x"],
        }))
        .unwrap();

        let err = service.create_profile(draft).await.unwrap_err();
        assert!(matches!(err, ProxyError::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn create_generates_id_and_timestamps() {
        let service = service_with(vec![profile("p1", &["*"], MatchType::Wildcard, 0)], "p1");
        let draft: ProfileDraft = serde_json::from_value(json!({
            "name": "anthropic",
            "model_patterns": ["claude-*"],
        }))
        .unwrap();

        let created = service.create_profile(draft).await.unwrap();
        assert!(created.id.starts_with("profile-"));
        assert!(!created.created_at.is_empty());
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    async fn update_merges_nested_fields_and_preserves_identity() {
        let service = service_with(vec![profile("p1", &["*"], MatchType::Wildcard, 0)], "p1");
        let before = service.get_profile("p1").await.unwrap();

        let updated = service
            .update_profile(
                "p1",
                json!({
                    "priority": 7,
                    "upstream": { "base_url": "https://api.example.com" },
                    "reasoning": { "enabled": true, "type": "anthropic", "effort": "high" }
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.id, "p1");
        assert_eq!(updated.created_at, before.created_at);
        assert_eq!(updated.priority, 7);
        assert_eq!(updated.upstream.base_url, "https://api.example.com");
        // Untouched nested keys survive the merge.
        assert_eq!(updated.upstream.api_format, before.upstream.api_format);
        assert!(updated.reasoning.enabled);
    }

    #[tokio::test]
    async fn update_rejects_invalid_effort_for_type() {
        let service = service_with(vec![profile("p1", &["*"], MatchType::Wildcard, 0)], "p1");
        let err = service
            .update_profile(
                "p1",
                json!({
                    "reasoning": { "enabled": true, "type": "deepseek", "effort": "high" }
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn delete_refuses_last_profile_and_reassigns_default() {
        let service = service_with(
            vec![
                profile("p1", &["*"], MatchType::Wildcard, 0),
                profile("p2", &["x"], MatchType::Exact, 0),
            ],
            "p2",
        );

        service.delete_profile("p2").await.unwrap();
        assert_eq!(service.default_profile_id().await, "p1");

        let err = service.delete_profile("p1").await.unwrap_err();
        assert!(matches!(err, ProxyError::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn import_merge_skips_existing_ids() {
        let service = service_with(vec![profile("p1", &["*"], MatchType::Wildcard, 0)], "p1");
        let incoming = ImportDocument {
            profiles: vec![
                profile("p1", &["other"], MatchType::Exact, 9),
                profile("p2", &["claude-*"], MatchType::Wildcard, 1),
            ],
            default_profile: None,
        };

        let count = service.import(incoming, true).await.unwrap();
        assert_eq!(count, 2);
        // Existing p1 was not overwritten.
        let p1 = service.get_profile("p1").await.unwrap();
        assert_eq!(p1.model_patterns, vec!["*".to_string()]);
    }

    #[tokio::test]
    async fn import_replace_swaps_profiles_and_default() {
        let service = service_with(vec![profile("p1", &["*"], MatchType::Wildcard, 0)], "p1");
        let incoming = ImportDocument {
            profiles: vec![profile("p9", &["*"], MatchType::Wildcard, 0)],
            default_profile: Some("p9".into()),
        };

        service.import(incoming, false).await.unwrap();
        assert!(service.get_profile("p1").await.is_none());
        assert_eq!(service.default_profile_id().await, "p9");
    }

    #[tokio::test]
    async fn persist_round_trips_through_disk() {
        let path = temp_config_path();
        let service = ConfigService::load(path.clone()).unwrap();
        let draft: ProfileDraft = serde_json::from_value(json!({
            "name": "claude",
            "model_patterns": ["claude-*"],
            "upstream": { "base_url": "https://api.anthropic.com", "api_format": "anthropic" }
        }))
        .unwrap();
        let created = service.create_profile(draft).await.unwrap();

        let reloaded = ConfigService::load(path.clone()).unwrap();
        let profile = reloaded.get_profile(&created.id).await;
        let _ = std::fs::remove_file(&path);
        assert!(profile.is_some());
    }
}
