//! REST surface for profile and proxy-settings CRUD, import/export, and the
//! reasoning enum catalog consumed by the web UI.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::store::{ImportDocument, ProfileDraft, ProxySettingsPatch};
use crate::error::ProxyError;
use crate::proxy::handlers::errors::not_found_response;
use crate::proxy::reasoning;
use crate::proxy::state::AppState;

pub async fn get_reasoning_types() -> Json<Value> {
    Json(reasoning::catalog())
}

pub async fn get_proxy_config(State(state): State<AppState>) -> Json<Value> {
    let settings = state.config.proxy_settings().await;
    Json(serde_json::to_value(settings.masked()).unwrap_or(Value::Null))
}

pub async fn update_proxy_config(
    State(state): State<AppState>,
    Json(patch): Json<ProxySettingsPatch>,
) -> Result<Json<Value>, ProxyError> {
    let (settings, restart_required) = state.config.update_proxy_settings(patch).await?;

    if restart_required {
        info!("[CONFIG] Configuration updated. Restart required for port change.");
    } else {
        info!("[CONFIG] Configuration updated.");
    }

    Ok(Json(json!({
        "success": true,
        "restart_required": restart_required,
        "proxy": settings.masked(),
    })))
}

pub async fn get_profiles(State(state): State<AppState>) -> Json<Value> {
    let profiles: Vec<_> = state
        .config
        .profiles()
        .await
        .iter()
        .map(|p| p.masked())
        .collect();
    Json(json!({
        "profiles": profiles,
        "default_profile": state.config.default_profile_id().await,
    }))
}

pub async fn create_profile(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    let draft: ProfileDraft = serde_json::from_value(body)
        .map_err(|e| ProxyError::BadRequest(format!("Invalid profile: {}", e)))?;
    let profile = state.config.create_profile(draft).await?;
    info!("[PROFILE] Created profile: {}", profile.name);
    Ok(Json(json!({ "success": true, "profile": profile.masked() })))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.config.get_profile(&id).await {
        Some(profile) => Json(json!({ "profile": profile.masked() })).into_response(),
        None => not_found_response("Profile not found"),
    }
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    let profile = state.config.update_profile(&id, patch).await?;
    info!("[PROFILE] Updated profile: {}", id);
    Ok(Json(json!({ "success": true, "profile": profile.masked() })))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    state.config.delete_profile(&id).await?;
    info!("[PROFILE] Deleted profile: {}", id);
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct TestMatchRequest {
    pub model: String,
}

// Resolution dry-run: which profiles match, and which one wins.
pub async fn test_profile_match(
    State(state): State<AppState>,
    Json(request): Json<TestMatchRequest>,
) -> Json<Value> {
    Json(state.config.test_match(&request.model).await)
}

#[derive(Deserialize)]
pub struct SetDefaultRequest {
    pub profile_id: String,
}

pub async fn set_default_profile(
    State(state): State<AppState>,
    Json(request): Json<SetDefaultRequest>,
) -> Result<Json<Value>, ProxyError> {
    state.config.set_default_profile(&request.profile_id).await?;
    info!("[PROFILE] Default profile set to: {}", request.profile_id);
    Ok(Json(json!({
        "success": true,
        "default_profile": request.profile_id,
    })))
}

pub async fn export_config(State(state): State<AppState>) -> Json<Value> {
    let doc = state.config.export().await;
    Json(json!({
        "proxy": doc.proxy,
        "profiles": doc.profiles,
        "default_profile": doc.default_profile,
    }))
}

#[derive(Deserialize)]
pub struct ImportQuery {
    #[serde(default = "default_merge")]
    pub merge: bool,
}

fn default_merge() -> bool {
    true
}

pub async fn import_config(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    let document: ImportDocument = serde_json::from_value(body)
        .map_err(|e| ProxyError::BadRequest(format!("Invalid import document: {}", e)))?;

    let count = state.config.import(document, query.merge).await?;
    info!("[CONFIG] Imported configuration ({} profiles total)", count);
    Ok(Json(json!({ "success": true, "profiles_count": count })))
}
