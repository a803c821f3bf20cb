use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::AppState;
use super::handlers::*;

/// data URI を受け取るため大きめにする
const BODY_LIMIT: usize = 20 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/satellite", get(get_satellite))
        .route("/validate", post(validate_image))
        .route("/candidates", get(get_candidates));

    let mut router = Router::new().merge(api.clone()).nest("/api", api);

    if let Some(dir) = &state.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(BODY_LIMIT))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
