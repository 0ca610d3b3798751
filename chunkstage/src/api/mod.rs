pub mod middleware;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::chunk::upload_chunk_handler;
use crate::service::merge::merge_handler;
use crate::service::status::verify_handler;
use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "chunk upload service is running" }))
        .route("/verify", post(verify_handler))
        .route(
            "/upload",
            post(upload_chunk_handler).layer(DefaultBodyLimit::max(state.config.body_limit)),
        )
        .route("/merge", post(merge_handler))
        .layer(axum::middleware::from_fn(middleware::preflight))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
