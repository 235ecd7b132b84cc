use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::DelayCascadeEngine;

pub fn doctor_status_routes(config: Arc<AppConfig>, engine: Arc<DelayCascadeEngine>) -> Router {
    // Waiting-room displays read status without logging in.
    let public_routes = Router::new().route("/{doctor_id}", get(handlers::get_doctor_status));

    let protected_routes = Router::new()
        .route("/{doctor_id}/late", post(handlers::mark_running_late))
        .route("/{doctor_id}/clear", post(handlers::clear_delay))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(engine)
}
