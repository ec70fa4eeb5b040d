use crate::config::ConfigService;
use crate::proxy::thinking_bus::ThinkingBus;
use crate::proxy::upstream::UpstreamClient;
use std::sync::Arc;

// Axum application state. Config is copy-on-write inside ConfigService;
// the bus and upstream client are process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigService>,
    pub upstream: Arc<UpstreamClient>,
    pub thinking_bus: Arc<ThinkingBus>,
}

impl AppState {
    pub fn new(config: Arc<ConfigService>) -> Self {
        Self {
            config,
            upstream: Arc::new(UpstreamClient::new()),
            thinking_bus: Arc::new(ThinkingBus::new()),
        }
    }
}
