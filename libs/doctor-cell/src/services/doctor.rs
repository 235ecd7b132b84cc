use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;
use shared_models::auth::User;

use crate::models::{Doctor, DoctorError, Schedule};

const DOCTORS_TABLE: &str = "doctors";

/// Read/write access to doctor records.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, DoctorError>;

    async fn save_schedule(&self, doctor_id: Uuid, schedule: &Schedule) -> Result<Doctor, DoctorError>;
}

pub struct SupabaseDoctorDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDoctorDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn find_one(&self, filter: String) -> Result<Option<Doctor>, DoctorError> {
        let rows: Vec<Doctor> = self
            .supabase
            .select(DOCTORS_TABLE, &format!("{}&limit=1", filter))
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseDoctorDirectory {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        self.find_one(format!("id=eq.{}", doctor_id)).await
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        self.find_one(format!("user_id=eq.{}", user_id)).await
    }

    async fn save_schedule(&self, doctor_id: Uuid, schedule: &Schedule) -> Result<Doctor, DoctorError> {
        let patch = json!({
            "schedule": schedule,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<Doctor> = self
            .supabase
            .update(DOCTORS_TABLE, &format!("id=eq.{}", doctor_id), patch)
            .await?;

        rows.into_iter().next().ok_or(DoctorError::NotFound)
    }
}

/// Process-local directory for tests and local runs.
#[derive(Default)]
pub struct InMemoryDoctorDirectory {
    doctors: RwLock<HashMap<Uuid, Doctor>>,
}

impl InMemoryDoctorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, doctor: Doctor) {
        self.doctors.write().await.insert(doctor.id, doctor);
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryDoctorDirectory {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        Ok(self.doctors.read().await.get(&doctor_id).cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        Ok(self
            .doctors
            .read()
            .await
            .values()
            .find(|d| d.user_id == user_id)
            .cloned())
    }

    async fn save_schedule(&self, doctor_id: Uuid, schedule: &Schedule) -> Result<Doctor, DoctorError> {
        let mut doctors = self.doctors.write().await;
        let doctor = doctors.get_mut(&doctor_id).ok_or(DoctorError::NotFound)?;
        doctor.schedule = Some(schedule.clone());
        doctor.updated_at = Utc::now();
        Ok(doctor.clone())
    }
}

pub struct DoctorService {
    directory: Arc<dyn DoctorDirectory>,
}

impl DoctorService {
    pub fn new(directory: Arc<dyn DoctorDirectory>) -> Self {
        Self { directory }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor {}", doctor_id);
        self.directory
            .find_doctor(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound)
    }

    /// Looks up a doctor that can take bookings right now.
    pub async fn get_active_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        let doctor = self.get_doctor(doctor_id).await?;
        if !doctor.is_active {
            warn!("Doctor {} is inactive", doctor_id);
            return Err(DoctorError::Inactive);
        }
        Ok(doctor)
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        self.directory.find_by_user(user_id).await
    }

    /// Replaces a doctor's schedule. The doctor themself, staff and admins may do this.
    pub async fn update_schedule(
        &self,
        doctor_id: Uuid,
        schedule: Schedule,
        actor: &User,
    ) -> Result<Doctor, DoctorError> {
        let doctor = self.get_doctor(doctor_id).await?;

        if !doctor.is_user(actor) && !actor.is_clinic_staff() {
            return Err(DoctorError::Unauthorized);
        }

        let schedule = schedule.normalized();
        schedule.validate()?;

        let updated = self.directory.save_schedule(doctor_id, &schedule).await?;
        info!(
            "Schedule for doctor {} updated by {}: {} days, {} every {} min",
            doctor_id,
            actor.id,
            schedule.working_days.len(),
            schedule.working_hours,
            schedule.appointment_duration
        );

        Ok(updated)
    }
}
