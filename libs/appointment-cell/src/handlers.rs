use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentFilter, BookingRequest, BookingSource, CancelAppointmentRequest,
    CreateAppointmentRequest, DayQuery, SlotCheckQuery, UpdateStatusRequest,
};
use crate::services::BookingEngine;

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(engine): State<Arc<BookingEngine>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, AppError> {
    let day = engine.available_slots(doctor_id, query.date).await?;
    let open = day.open_slots().count();

    Ok(Json(json!({
        "availability": day,
        "open_slots": open,
    })))
}

#[axum::debug_handler]
pub async fn check_slot(
    State(engine): State<Arc<BookingEngine>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let slot = engine.check_slot(doctor_id, query.date, query.time).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "time": slot.time,
        "available": slot.available,
        "reason": slot.reason,
    })))
}

// ==============================================================================
// AUTHENTICATED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(engine): State<Arc<BookingEngine>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient = BookingEngine::resolve_patient(&request, &user)?;

    let appointment = engine
        .create(BookingRequest {
            doctor_id: request.doctor_id,
            date: request.appointment_date,
            time: request.appointment_time,
            consultation_type: request.consultation_type,
            patient,
            reason: request.reason,
            source: BookingSource::Direct,
            provenance: None,
            confirm_immediately: false,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(engine): State<Arc<BookingEngine>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = engine.get(appointment_id, &user).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(engine): State<Arc<BookingEngine>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = engine
        .update_status(appointment_id, request.status, request.notes, &user)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(engine): State<Arc<BookingEngine>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    body: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let reason = body.and_then(|Json(request)| request.reason);
    let appointment = engine.cancel(appointment_id, reason, &user).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(engine): State<Arc<BookingEngine>>,
    Path(doctor_id): Path<Uuid>,
    Query(filter): Query<AppointmentFilter>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointments = engine.list_by_doctor(doctor_id, filter, &user).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(engine): State<Arc<BookingEngine>>,
    Path(patient_id): Path<Uuid>,
    Query(filter): Query<AppointmentFilter>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointments = engine.list_by_patient(patient_id, filter.status, &user).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}
