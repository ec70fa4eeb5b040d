use tower_http::cors::{Any, CorsLayer};

// The web UI is served from a different origin during development.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
