use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::RealtimeChannel;

pub fn notification_routes(config: Arc<AppConfig>, realtime: Arc<RealtimeChannel>) -> Router {
    Router::new()
        .route("/ws", get(handlers::notification_socket))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(realtime)
}
