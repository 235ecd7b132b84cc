use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::models::AppointmentError;
use doctor_cell::models::DoctorError;
use notification_cell::models::NotificationCounts;
use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_models::TimeOfDay;

pub const MIN_DELAY_MINUTES: u16 = 1;
pub const MAX_DELAY_MINUTES: u16 = 240;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DoctorStatusKind {
    #[default]
    OnTime,
    RunningLate,
    Emergency,
}

impl DoctorStatusKind {
    pub fn is_delayed(&self) -> bool {
        !matches!(self, DoctorStatusKind::OnTime)
    }
}

/// A doctor's punctuality for one day. One row per (doctor, date); earlier
/// days are never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorStatus {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub status_date: NaiveDate,
    pub status: DoctorStatusKind,
    pub delay_minutes: u16,
    pub reason: Option<String>,
    pub reported_by: Option<String>,
    #[serde(default)]
    pub affected_appointments: Vec<Uuid>,
    #[serde(default)]
    pub notifications_sent: NotificationCounts,
    pub cleared_at: Option<DateTime<Utc>>,
    pub cleared_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoctorStatus {
    /// An unsaved on-time record, used when nothing was reported for the day.
    pub fn on_time(doctor_id: Uuid, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            status_date: date,
            status: DoctorStatusKind::OnTime,
            delay_minutes: 0,
            reason: None,
            reported_by: None,
            affected_appointments: Vec::new(),
            notifications_sent: NotificationCounts::default(),
            cleared_at: None,
            cleared_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkLateRequest {
    pub delay_minutes: u16,
    #[serde(default)]
    pub reason: Option<String>,
    /// Report as an emergency rather than plain lateness.
    #[serde(default)]
    pub emergency: bool,
}

/// One appointment's new estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RescheduledAppointment {
    pub appointment_id: Uuid,
    pub original_time: TimeOfDay,
    pub estimated_time: TimeOfDay,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelayOutcome {
    pub status: DoctorStatus,
    pub affected_appointments: usize,
    pub failed_updates: usize,
    pub notifications: NotificationCounts,
    pub rescheduled: Vec<RescheduledAppointment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearOutcome {
    pub cleared: bool,
    pub message: String,
    pub reset_appointments: usize,
    pub failed_updates: usize,
    pub status: Option<DoctorStatus>,
}

#[derive(Debug, Error)]
pub enum DelayError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SupabaseError> for DelayError {
    fn from(err: SupabaseError) -> Self {
        DelayError::Database(err.to_string())
    }
}

impl From<DoctorError> for DelayError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::Database(msg) => DelayError::Database(msg),
            other => DelayError::NotFound(other.to_string()),
        }
    }
}

impl From<AppointmentError> for DelayError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => DelayError::Validation(msg),
            AppointmentError::NotFound(msg) => DelayError::NotFound(msg),
            AppointmentError::Forbidden(msg) => DelayError::Forbidden(msg),
            AppointmentError::Conflict(msg) | AppointmentError::Database(msg) => DelayError::Database(msg),
        }
    }
}

impl From<DelayError> for AppError {
    fn from(err: DelayError) -> Self {
        match err {
            DelayError::Validation(msg) => AppError::ValidationError(msg),
            DelayError::NotFound(msg) => AppError::NotFound(msg),
            DelayError::Forbidden(msg) => AppError::Forbidden(msg),
            DelayError::Database(msg) => AppError::Database(msg),
        }
    }
}
