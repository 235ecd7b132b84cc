use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;

use crate::handlers;
use crate::middleware::voice_agent_auth;
use crate::services::VoiceIntakeService;

pub fn voice_agent_routes(config: Arc<AppConfig>, service: Arc<VoiceIntakeService>) -> Router {
    Router::new()
        .route("/availability", post(handlers::voice_availability))
        .route("/book", post(handlers::voice_book))
        .layer(middleware::from_fn_with_state(config, voice_agent_auth))
        .with_state(service)
}
