use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

/// Create the application router
///
/// Every page is a plain GET so it can be driven from any browser,
/// including the ones on retro machines the device is plugged into.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/switch", get(handlers::switch_mode))
        .route("/list", get(handlers::list_images))
        .route("/mount/:file", get(handlers::mount_image))
        .route("/cdemu", get(handlers::mount_alternate_source))
        .route("/setup", get(handlers::setup))
        .route("/shutdown", get(handlers::shutdown))
        .route("/exit", get(handlers::exit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
