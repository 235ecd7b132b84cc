use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::DoctorError;
use notification_cell::models::Recipient;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::TimeOfDay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    #[serde(alias = "no_show")]
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that hold a slot.
    pub const ACTIVE: [AppointmentStatus; 2] = [AppointmentStatus::Pending, AppointmentStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no-show" | "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(AppointmentError::Validation(format!("Unknown appointment status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsultationType {
    Online,
    #[serde(alias = "in_person")]
    InPerson,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    #[default]
    Direct,
    VoiceAgent,
}

/// Contact details kept on the booking itself, so voice bookings without an
/// account still reach the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContact {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// What the voice agent originally heard, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProvenance {
    pub call_id: Option<String>,
    pub provider: Option<String>,
    pub raw_date: String,
    pub raw_time: String,
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub patient_contact: PatientContact,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeOfDay,
    pub duration: u16,
    pub status: AppointmentStatus,
    pub consultation_type: ConsultationType,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub estimated_time: Option<TimeOfDay>,
    pub delay_minutes: Option<u16>,
    pub booking_source: BookingSource,
    pub voice_provenance: Option<VoiceProvenance>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_patient(&self, user: &User) -> bool {
        self.patient_id.is_some_and(|id| user.is_user(id))
    }

    pub fn recipient(&self) -> Recipient {
        Recipient {
            user_id: self.patient_id,
            name: self.patient_contact.name.clone(),
            email: self.patient_contact.email.clone(),
        }
    }
}

/// The patient side of a booking.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientInfo {
    pub patient_id: Option<Uuid>,
    pub contact: PatientContact,
}

/// Input to `BookingEngine::create`, after the caller has resolved who the
/// patient is.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub consultation_type: ConsultationType,
    pub patient: PatientInfo,
    pub reason: Option<String>,
    pub source: BookingSource,
    pub provenance: Option<VoiceProvenance>,
    /// Skip `pending` and book straight into `confirmed`. Only honoured for
    /// voice-agent bookings.
    pub confirm_immediately: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeOfDay,
    pub consultation_type: ConsultationType,
    pub patient_id: Option<Uuid>,
    pub patient_contact: Option<PatientContact>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentFilter {
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct SlotCheckQuery {
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AppointmentError {
    pub fn slot_taken() -> Self {
        AppointmentError::Conflict("Time slot already booked".to_string())
    }

    pub fn appointment_not_found() -> Self {
        AppointmentError::NotFound("Appointment not found".to_string())
    }
}

impl From<DoctorError> for AppointmentError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound | DoctorError::Inactive | DoctorError::ScheduleNotConfigured => {
                AppointmentError::NotFound(err.to_string())
            }
            DoctorError::InvalidSchedule(msg) => AppointmentError::Validation(msg),
            DoctorError::Unauthorized => AppointmentError::Forbidden(err.to_string()),
            DoctorError::Database(msg) => AppointmentError::Database(msg),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(msg) => AppError::NotFound(msg),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::Database(msg) => AppError::Database(msg),
        }
    }
}
