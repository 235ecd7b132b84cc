use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::{SupabaseClient, SupabaseError};
use shared_models::TimeOfDay;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

const APPOINTMENTS_TABLE: &str = "appointments";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Time slot already booked")]
    SlotTaken,

    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment is no longer in the expected status")]
    StatusChanged,

    #[error("Storage error: {0}")]
    Backend(String),
}

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::UniqueViolation(_) => StoreError::SlotTaken,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlotTaken => AppointmentError::slot_taken(),
            StoreError::NotFound => AppointmentError::appointment_not_found(),
            StoreError::StatusChanged => AppointmentError::Conflict(
                "Appointment was modified by another request, reload and retry".to_string(),
            ),
            StoreError::Backend(msg) => AppointmentError::Database(msg),
        }
    }
}

/// Filter for listing appointments. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AppointmentQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub statuses: Vec<AppointmentStatus>,
    /// Only appointments starting at or after this time.
    pub from_time: Option<TimeOfDay>,
}

impl AppointmentQuery {
    pub fn for_doctor(doctor_id: Uuid) -> Self {
        Self { doctor_id: Some(doctor_id), ..Self::default() }
    }

    pub fn for_patient(patient_id: Uuid) -> Self {
        Self { patient_id: Some(patient_id), ..Self::default() }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_statuses(mut self, statuses: &[AppointmentStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn starting_from(mut self, time: TimeOfDay) -> Self {
        self.from_time = Some(time);
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == Some(id))
            && self.date.map_or(true, |d| appointment.appointment_date == d)
            && (self.statuses.is_empty() || self.statuses.contains(&appointment.status))
            && self.from_time.map_or(true, |t| appointment.appointment_time >= t)
    }

    /// PostgREST query string, ordered by date then time.
    fn to_postgrest(&self) -> String {
        let mut parts = vec!["select=*".to_string()];

        if let Some(id) = self.doctor_id {
            parts.push(format!("doctor_id=eq.{}", id));
        }
        if let Some(id) = self.patient_id {
            parts.push(format!("patient_id=eq.{}", id));
        }
        if let Some(date) = self.date {
            parts.push(format!("appointment_date=eq.{}", date));
        }
        if !self.statuses.is_empty() {
            let list: Vec<&str> = self.statuses.iter().map(AppointmentStatus::as_str).collect();
            parts.push(format!("status=in.({})", list.join(",")));
        }
        if let Some(time) = self.from_time {
            parts.push(format!("appointment_time=gte.{}", time));
        }

        parts.push("order=appointment_date.asc,appointment_time.asc".to_string());
        parts.join("&")
    }
}

/// A status write, applied only if the stored status still equals the
/// expected one.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub expected: AppointmentStatus,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
}

/// Estimated start written by the delay cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayStamp {
    pub estimated_time: TimeOfDay,
    pub delay_minutes: u16,
}

/// Persistence for appointments.
///
/// `insert` must refuse a second pending/confirmed booking for the same
/// doctor, date and time with [`StoreError::SlotTaken`], atomically.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError>;

    async fn update_status(&self, id: Uuid, change: &StatusChange) -> Result<Appointment, StoreError>;

    /// Sets or clears the delay stamp on an active appointment.
    async fn set_delay(&self, id: Uuid, delay: Option<DelayStamp>) -> Result<Appointment, StoreError>;
}

/// Backed by the `appointments` table. Slot uniqueness comes from the partial
/// unique index on (doctor_id, appointment_date, appointment_time) for active
/// statuses.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn active_filter(id: Uuid) -> String {
        format!("id=eq.{}&status=in.(pending,confirmed)", id)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let stored = self.supabase.insert(APPOINTMENTS_TABLE, appointment).await?;
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let rows: Vec<Appointment> = self
            .supabase
            .select(APPOINTMENTS_TABLE, &format!("id=eq.{}&limit=1", id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        let rows = self
            .supabase
            .select(APPOINTMENTS_TABLE, &query.to_postgrest())
            .await?;
        Ok(rows)
    }

    async fn update_status(&self, id: Uuid, change: &StatusChange) -> Result<Appointment, StoreError> {
        let mut patch = Map::new();
        patch.insert("status".into(), json!(change.status));
        patch.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
        if let Some(notes) = &change.notes {
            patch.insert("notes".into(), json!(notes));
        }
        if let Some(reason) = &change.cancellation_reason {
            patch.insert("cancellation_reason".into(), json!(reason));
        }

        let filter = format!("id=eq.{}&status=eq.{}", id, change.expected);
        let rows: Vec<Appointment> = self
            .supabase
            .update(APPOINTMENTS_TABLE, &filter, Value::Object(patch))
            .await?;

        match rows.into_iter().next() {
            Some(updated) => Ok(updated),
            None => match self.get(id).await? {
                Some(_) => Err(StoreError::StatusChanged),
                None => Err(StoreError::NotFound),
            },
        }
    }

    async fn set_delay(&self, id: Uuid, delay: Option<DelayStamp>) -> Result<Appointment, StoreError> {
        let patch = json!({
            "estimated_time": delay.map(|d| d.estimated_time),
            "delay_minutes": delay.map(|d| d.delay_minutes),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<Appointment> = self
            .supabase
            .update(APPOINTMENTS_TABLE, &Self::active_filter(id), patch)
            .await?;

        rows.into_iter().next().ok_or(StoreError::NotFound)
    }
}

/// Process-local store. Check and insert happen under one write lock, which
/// gives the same guarantee as the database index within a single process.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record as-is, bypassing the slot check.
    pub async fn put(&self, appointment: Appointment) {
        self.appointments.write().await.insert(appointment.id, appointment);
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        if appointment.is_active() {
            let taken = appointments.values().any(|existing| {
                existing.is_active()
                    && existing.doctor_id == appointment.doctor_id
                    && existing.appointment_date == appointment.appointment_date
                    && existing.appointment_time == appointment.appointment_time
            });
            if taken {
                debug!(
                    "Slot {} {} for doctor {} already held",
                    appointment.appointment_date, appointment.appointment_time, appointment.doctor_id
                );
                return Err(StoreError::SlotTaken);
            }
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();

        found.sort_by_key(|a| (a.appointment_date, a.appointment_time));
        Ok(found)
    }

    async fn update_status(&self, id: Uuid, change: &StatusChange) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments.get_mut(&id).ok_or(StoreError::NotFound)?;

        if appointment.status != change.expected {
            warn!(
                "Appointment {} is {} but {} was expected",
                id, appointment.status, change.expected
            );
            return Err(StoreError::StatusChanged);
        }

        appointment.status = change.status;
        if change.notes.is_some() {
            appointment.notes = change.notes.clone();
        }
        if change.cancellation_reason.is_some() {
            appointment.cancellation_reason = change.cancellation_reason.clone();
        }
        appointment.updated_at = Utc::now();

        Ok(appointment.clone())
    }

    async fn set_delay(&self, id: Uuid, delay: Option<DelayStamp>) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&id)
            .filter(|a| a.is_active())
            .ok_or(StoreError::NotFound)?;

        appointment.estimated_time = delay.map(|d| d.estimated_time);
        appointment.delay_minutes = delay.map(|d| d.delay_minutes);
        appointment.updated_at = Utc::now();

        Ok(appointment.clone())
    }
}
