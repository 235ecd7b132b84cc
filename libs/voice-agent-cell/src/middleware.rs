use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::VOICE_AGENT_KEY_HEADER;

/// Admits webhook calls carrying the configured shared key. With no key
/// configured every call is refused.
pub async fn voice_agent_auth(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !config.is_voice_agent_configured() {
        warn!("Voice agent webhook called but VOICE_AGENT_API_KEY is not set");
        return Err(AppError::Auth("Voice agent integration is not configured".to_string()));
    }

    let provided = headers
        .get(VOICE_AGENT_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Auth(format!("Missing {} header", VOICE_AGENT_KEY_HEADER)))?;

    if provided != config.voice_agent_api_key {
        warn!("Voice agent webhook rejected: key mismatch");
        return Err(AppError::Auth("Invalid voice agent key".to_string()));
    }

    Ok(next.run(request).await)
}
