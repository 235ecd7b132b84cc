use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::models::{VoiceAvailabilityRequest, VoiceBookingOutcome, VoiceBookingRequest};
use crate::services::VoiceIntakeService;

#[axum::debug_handler]
pub async fn voice_availability(
    State(service): State<Arc<VoiceIntakeService>>,
    Json(request): Json<VoiceAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let availability = service.availability(request).await?;

    Ok(Json(json!({
        "success": true,
        "doctor_id": availability.doctor_id,
        "date": availability.date,
        "open_times": availability.open_times,
        "availability": availability.availability,
    })))
}

#[axum::debug_handler]
pub async fn voice_book(
    State(service): State<Arc<VoiceIntakeService>>,
    Json(request): Json<VoiceBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = service.book(request).await?;

    let status = match &outcome {
        VoiceBookingOutcome::Booked { .. } => StatusCode::CREATED,
        VoiceBookingOutcome::SlotUnavailable { .. } => StatusCode::CONFLICT,
    };
    let success = status == StatusCode::CREATED;

    let mut body = json!(outcome);
    if let Some(map) = body.as_object_mut() {
        map.insert("success".to_string(), json!(success));
    }

    Ok((status, Json(body)))
}
