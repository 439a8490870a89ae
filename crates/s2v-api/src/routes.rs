//! API routes.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/storyboard/create", post(handlers::create_storyboard))
        .route("/shot/regenerate", post(handlers::regenerate_shot))
        .route("/video/render", post(handlers::render_video))
        .route(
            "/operation/:user_id/:operation_id",
            get(handlers::get_operation),
        );

    // Locally stored media is exposed under /static, matching the
    // fallback URLs the pipeline hands out when uploads fail.
    let static_dir = state.engine.config.data_dir.clone();

    // No request timeout layer: a render holds its request open for the
    // whole pipeline run, which can take many minutes.
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
