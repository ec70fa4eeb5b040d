pub mod config;
pub mod constants;
pub mod error;
pub mod logger;
pub mod models;
pub mod proxy;
#[cfg(test)]
mod test_utils;

use std::sync::Arc;
use tracing::{error, info, warn};

fn apply_env_overrides(settings: &mut crate::models::ProxySettings) {
    if let Ok(key) = std::env::var("API_KEY") {
        if !key.trim().is_empty() {
            info!("Using proxy API key from environment");
            settings.api_key = key;
        }
    }

    if let Ok(port) = std::env::var("PORT") {
        let trimmed = port.trim();
        if !trimmed.is_empty() {
            match trimmed.parse::<u16>() {
                Ok(p) if p > 0 => {
                    settings.port = p;
                    info!("Using proxy port from environment: {}", p);
                }
                _ => warn!("[W-PORT-INVALID] ignoring_invalid_port_value: {}", port),
            }
        }
    }
}

async fn start_runtime() -> Result<(), i32> {
    let config_path = crate::config::store::config_path_from_env();
    let service = match crate::config::ConfigService::load(config_path) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("[E-CONFIG-LOAD] failed_to_load_config: {}", e);
            return Err(2);
        }
    };

    {
        let mut settings = service.proxy_settings().await;
        apply_env_overrides(&mut settings);
        service.replace_proxy_settings(settings).await;
    }

    let settings = service.proxy_settings().await;
    if let Err(e) = crate::config::validation::validate_proxy_settings(&settings) {
        error!("[E-CONFIG-INVALID] {}", e);
        return Err(2);
    }
    info!("Starting proxy service on port {}", settings.port);
    for profile in service.profiles().await {
        let status = if profile.enabled { "enabled" } else { "disabled" };
        let reasoning = if profile.reasoning.enabled {
            format!("reasoning={}", profile.reasoning.reasoning_type.as_str())
        } else {
            "no reasoning".to_string()
        };
        info!(
            "Profile {} ({}, {}) patterns: {}",
            profile.name,
            status,
            reasoning,
            profile.model_patterns.join(", ")
        );
    }

    let server = match crate::proxy::server::ProxyServer::start(service, settings.port).await {
        Ok(server) => server,
        Err(e) => {
            error!("[E-BIND] failed_to_bind_listener: {}", e);
            return Err(1);
        }
    };

    info!("Proxy is running. Press Ctrl+C to exit.");
    server.wait_for_shutdown().await;
    info!("Shutting down proxy service");
    Ok(())
}

pub fn run() {
    logger::init_logger();

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    let outcome = runtime.block_on(start_runtime());

    if let Err(code) = outcome {
        std::process::exit(code);
    }
}
