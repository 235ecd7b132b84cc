use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::TimeOfDay;

/// Who an event is about, from the patient side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayNotice {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_user_id: Option<Uuid>,
    pub doctor_name: String,
    pub patient: Recipient,
    pub appointment_date: NaiveDate,
    pub original_time: TimeOfDay,
    pub estimated_time: TimeOfDay,
    pub delay_minutes: u16,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayClearedNotice {
    pub doctor_id: Uuid,
    pub doctor_user_id: Option<Uuid>,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub cleared_by: String,
    pub appointment_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleNotice {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_user_id: Option<Uuid>,
    pub doctor_name: String,
    pub patient: Recipient,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeOfDay,
    pub status: String,
    pub previous_status: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationEvent {
    DoctorDelay(DelayNotice),
    DelayCleared(DelayClearedNotice),
    AppointmentLifecycle(LifecycleNotice),
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::DoctorDelay(_) => "doctor_delay",
            NotificationEvent::DelayCleared(_) => "delay_cleared",
            NotificationEvent::AppointmentLifecycle(_) => "appointment_lifecycle",
        }
    }

    pub fn appointment_id(&self) -> Option<Uuid> {
        match self {
            NotificationEvent::DoctorDelay(n) => Some(n.appointment_id),
            NotificationEvent::AppointmentLifecycle(n) => Some(n.appointment_id),
            NotificationEvent::DelayCleared(_) => None,
        }
    }

    pub fn patient(&self) -> Option<&Recipient> {
        match self {
            NotificationEvent::DoctorDelay(n) => Some(&n.patient),
            NotificationEvent::AppointmentLifecycle(n) => Some(&n.patient),
            NotificationEvent::DelayCleared(_) => None,
        }
    }

    /// Users that should see this event on their personal realtime feed.
    pub fn audience(&self) -> Vec<Uuid> {
        let (patient, doctor) = match self {
            NotificationEvent::DoctorDelay(n) => (n.patient.user_id, n.doctor_user_id),
            NotificationEvent::AppointmentLifecycle(n) => (n.patient.user_id, n.doctor_user_id),
            NotificationEvent::DelayCleared(n) => (None, n.doctor_user_id),
        };

        let mut users: Vec<Uuid> = patient.into_iter().chain(doctor).collect();
        users.dedup();
        users
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Realtime,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Email => f.write_str("email"),
            ChannelKind::Realtime => f.write_str("realtime"),
        }
    }
}

/// What a channel did with an event it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Nothing to do: no address, nobody listening, or event not relevant.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    /// Handed to a background task; a later failure is only logged.
    Queued,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn sent_on(&self, channel: ChannelKind) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.channel == channel && o.status == DeliveryStatus::Sent)
    }

    pub fn queued_on(&self, channel: ChannelKind) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.channel == channel && o.status == DeliveryStatus::Queued)
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, DeliveryStatus::Failed(_)))
            .count()
    }
}

/// Per-channel tallies across many dispatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCounts {
    pub email: u32,
    pub realtime: u32,
    pub failed: u32,
}

impl NotificationCounts {
    pub fn record(&mut self, report: &DispatchReport) {
        for outcome in &report.outcomes {
            match (&outcome.status, outcome.channel) {
                (DeliveryStatus::Sent | DeliveryStatus::Queued, ChannelKind::Email) => self.email += 1,
                (DeliveryStatus::Sent | DeliveryStatus::Queued, ChannelKind::Realtime) => self.realtime += 1,
                (DeliveryStatus::Failed(_), _) => self.failed += 1,
                (DeliveryStatus::Skipped, _) => {}
            }
        }
    }

    pub fn total_sent(&self) -> u32 {
        self.email + self.realtime
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Compose(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Failed to serialize notification: {0}")]
    Serialization(#[from] serde_json::Error),
}
