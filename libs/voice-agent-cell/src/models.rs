use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, ConsultationType};
use doctor_cell::models::DayAvailability;
use shared_models::error::AppError;
use shared_models::TimeOfDay;

/// Header the voice platform sends its shared key in.
pub const VOICE_AGENT_KEY_HEADER: &str = "x-voice-agent-key";

/// How many open times are offered back when the requested one is taken.
pub const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Deserialize)]
pub struct VoiceAvailabilityRequest {
    pub doctor_id: Uuid,
    /// As spoken, e.g. "tomorrow" or "next monday".
    pub date: String,
}

/// Webhook payload for a booking captured on a call. Date and time arrive as
/// the caller said them.
#[derive(Debug, Deserialize)]
pub struct VoiceBookingRequest {
    pub doctor_id: Uuid,
    pub date: String,
    pub time: String,
    pub patient_name: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default = "default_consultation_type")]
    pub consultation_type: ConsultationType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

fn default_consultation_type() -> ConsultationType {
    ConsultationType::InPerson
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceAvailability {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub open_times: Vec<TimeOfDay>,
    pub availability: DayAvailability,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoiceBookingOutcome {
    Booked {
        appointment: Appointment,
    },
    /// The time could not be booked; `alternatives` are open times the agent
    /// can offer instead.
    SlotUnavailable {
        message: String,
        date: NaiveDate,
        requested_time: TimeOfDay,
        alternatives: Vec<TimeOfDay>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Could not understand the date '{0}'")]
    UnrecognizedDate(String),

    #[error("Could not understand the time '{0}'")]
    UnrecognizedTime(String),
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Booking(#[from] AppointmentError),
}

impl From<VoiceError> for AppError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::Normalize(e) => AppError::ValidationError(e.to_string()),
            VoiceError::Booking(e) => e.into(),
        }
    }
}
