use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{DelayError, DoctorStatus};

const STATUS_TABLE: &str = "doctor_statuses";

/// Storage for per-day doctor status, keyed by (doctor, date).
#[async_trait]
pub trait DoctorStatusStore: Send + Sync {
    async fn find(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Option<DoctorStatus>, DelayError>;

    /// Inserts the record, or replaces the existing one for the same doctor and date.
    async fn upsert(&self, status: &DoctorStatus) -> Result<DoctorStatus, DelayError>;
}

pub struct SupabaseDoctorStatusStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDoctorStatusStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl DoctorStatusStore for SupabaseDoctorStatusStore {
    async fn find(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Option<DoctorStatus>, DelayError> {
        let rows: Vec<DoctorStatus> = self
            .supabase
            .select(
                STATUS_TABLE,
                &format!("doctor_id=eq.{}&status_date=eq.{}&limit=1", doctor_id, date),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, status: &DoctorStatus) -> Result<DoctorStatus, DelayError> {
        let stored = self
            .supabase
            .upsert(STATUS_TABLE, "doctor_id,status_date", status)
            .await?;
        Ok(stored)
    }
}

#[derive(Default)]
pub struct InMemoryDoctorStatusStore {
    statuses: RwLock<HashMap<(Uuid, NaiveDate), DoctorStatus>>,
}

impl InMemoryDoctorStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DoctorStatusStore for InMemoryDoctorStatusStore {
    async fn find(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Option<DoctorStatus>, DelayError> {
        Ok(self.statuses.read().await.get(&(doctor_id, date)).cloned())
    }

    async fn upsert(&self, status: &DoctorStatus) -> Result<DoctorStatus, DelayError> {
        let mut statuses = self.statuses.write().await;
        let key = (status.doctor_id, status.status_date);

        let mut stored = status.clone();
        if let Some(existing) = statuses.get(&key) {
            stored.id = existing.id;
            stored.created_at = existing.created_at;
        }
        statuses.insert(key, stored.clone());

        Ok(stored)
    }
}
