use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ConfigService;
use crate::proxy::handlers;
use crate::proxy::middleware::{auth_middleware, cors_layer};
use crate::proxy::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Completion and model-listing routes honor the optional bearer key;
    // config and diagnostics stay open (loopback deployment).
    let proxy_routes = Router::new()
        .route(
            "/v1/chat/completions",
            post(handlers::chat::handle_chat_completions),
        )
        .route("/v1/models", get(handlers::models::handle_list_models))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let open_routes = Router::new()
        .route("/health", get(handlers::models::handle_health))
        .route(
            "/v1/thinking/stream",
            get(handlers::thinking::handle_thinking_stream),
        )
        .route(
            "/v1/config/reasoning/types",
            get(handlers::config_api::get_reasoning_types),
        )
        .route(
            "/v1/config/proxy",
            get(handlers::config_api::get_proxy_config)
                .put(handlers::config_api::update_proxy_config),
        )
        .route(
            "/v1/config/profiles",
            get(handlers::config_api::get_profiles).post(handlers::config_api::create_profile),
        )
        .route(
            "/v1/config/profiles/test",
            post(handlers::config_api::test_profile_match),
        )
        .route(
            "/v1/config/profiles/:id",
            get(handlers::config_api::get_profile)
                .put(handlers::config_api::update_profile)
                .delete(handlers::config_api::delete_profile),
        )
        .route(
            "/v1/config/default-profile",
            put(handlers::config_api::set_default_profile),
        )
        .route("/v1/config/export", get(handlers::config_api::export_config))
        .route("/v1/config/import", post(handlers::config_api::import_config));

    Router::new()
        .merge(proxy_routes)
        .merge(open_routes)
        .layer(cors_layer())
        .with_state(state)
}

pub struct ProxyServer {
    handle: tokio::task::JoinHandle<()>,
}

impl ProxyServer {
    pub async fn start(config: Arc<ConfigService>, port: u16) -> Result<Self, String> {
        let state = AppState::new(config);
        let app = build_router(state);

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Address {} binding failed: {}", addr, e))?;

        info!("Proxy server started at http://{}", addr);

        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("[E-SERVE] server_terminated: {}", e);
            }
        });

        Ok(Self { handle })
    }

    pub async fn wait_for_shutdown(self) {
        let _ = self.handle.await;
    }
}
