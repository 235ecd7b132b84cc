use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::MarkLateRequest;
use crate::services::DelayCascadeEngine;

#[axum::debug_handler]
pub async fn get_doctor_status(
    State(engine): State<Arc<DelayCascadeEngine>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let status = engine.current_status(doctor_id).await?;

    Ok(Json(json!({
        "status": status,
        "is_delayed": status.status.is_delayed(),
    })))
}

#[axum::debug_handler]
pub async fn mark_running_late(
    State(engine): State<Arc<DelayCascadeEngine>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<MarkLateRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = engine.mark_running_late(doctor_id, request, &user).await?;

    Ok(Json(json!({
        "success": true,
        "status": outcome.status,
        "affected_appointments": outcome.affected_appointments,
        "failed_updates": outcome.failed_updates,
        "notifications_sent": outcome.notifications,
        "rescheduled": outcome.rescheduled,
    })))
}

#[axum::debug_handler]
pub async fn clear_delay(
    State(engine): State<Arc<DelayCascadeEngine>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let outcome = engine.clear_delay(doctor_id, &user).await?;

    Ok(Json(json!({
        "success": true,
        "cleared": outcome.cleared,
        "message": outcome.message,
        "reset_appointments": outcome.reset_appointments,
        "failed_updates": outcome.failed_updates,
        "status": outcome.status,
    })))
}
