//! Control API router

use crate::handlers;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use userbox_core::ContainerManager;

/// Application state shared with handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ContainerManager>,
}

/// Creates the control API router with all endpoints
#[must_use]
pub fn create_router(manager: Arc<ContainerManager>) -> Router {
    let state = AppState { manager };

    Router::new()
        .route("/", get(handlers::index))
        .route("/create", post(handlers::create_container))
        .route("/destroy/{container_id}", post(handlers::destroy_container))
        .route("/restart/{container_id}", post(handlers::restart_container))
        .route("/health/{container_id}", get(handlers::container_health))
        .route("/list", get(handlers::list_containers))
        .layer(CatchPanicLayer::custom(handlers::handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
