use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{DoctorProfileResponse, Schedule};
use crate::services::DoctorService;

#[axum::debug_handler]
pub async fn get_doctor(
    State(service): State<Arc<DoctorService>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = service.get_doctor(doctor_id).await?;

    Ok(Json(json!(DoctorProfileResponse::from(doctor))))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(service): State<Arc<DoctorService>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(schedule): Json<Schedule>,
) -> Result<Json<Value>, AppError> {
    let doctor = service.update_schedule(doctor_id, schedule, &user).await?;

    Ok(Json(json!({
        "success": true,
        "doctor": DoctorProfileResponse::from(doctor),
    })))
}
