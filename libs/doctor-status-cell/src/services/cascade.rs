use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::services::{AppointmentQuery, AppointmentStore, DelayStamp};
use doctor_cell::models::Doctor;
use doctor_cell::services::DoctorService;
use notification_cell::models::{DelayClearedNotice, DelayNotice, NotificationCounts, NotificationEvent};
use notification_cell::services::NotificationDispatcher;
use shared_models::auth::User;
use shared_utils::Clock;

use crate::models::{
    ClearOutcome, DelayError, DelayOutcome, DoctorStatus, DoctorStatusKind, MarkLateRequest,
    RescheduledAppointment, MAX_DELAY_MINUTES, MIN_DELAY_MINUTES,
};
use crate::services::store::DoctorStatusStore;

const DEFAULT_REASON: &str = "Doctor is running late";

/// Pushes a doctor's delay onto the rest of today's bookings and takes it
/// back off again.
///
/// Appointment updates are best effort: a failed write is logged and counted
/// and the loop carries on with the next appointment.
pub struct DelayCascadeEngine {
    doctors: Arc<DoctorService>,
    appointments: Arc<dyn AppointmentStore>,
    statuses: Arc<dyn DoctorStatusStore>,
    notifier: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl DelayCascadeEngine {
    pub fn new(
        doctors: Arc<DoctorService>,
        appointments: Arc<dyn AppointmentStore>,
        statuses: Arc<dyn DoctorStatusStore>,
        notifier: NotificationDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { doctors, appointments, statuses, notifier, clock }
    }

    /// Today's status, or an unsaved on-time record when nothing was reported.
    pub async fn current_status(&self, doctor_id: Uuid) -> Result<DoctorStatus, DelayError> {
        let doctor = self.doctors.get_doctor(doctor_id).await?;
        let today = self.clock.today();

        Ok(self
            .statuses
            .find(doctor.id, today)
            .await?
            .unwrap_or_else(|| DoctorStatus::on_time(doctor.id, today)))
    }

    pub async fn mark_running_late(
        &self,
        doctor_id: Uuid,
        request: MarkLateRequest,
        actor: &User,
    ) -> Result<DelayOutcome, DelayError> {
        if !(MIN_DELAY_MINUTES..=MAX_DELAY_MINUTES).contains(&request.delay_minutes) {
            return Err(DelayError::Validation(format!(
                "Delay must be between {} and {} minutes",
                MIN_DELAY_MINUTES, MAX_DELAY_MINUTES
            )));
        }

        let doctor = self.doctors.get_doctor(doctor_id).await?;
        Self::authorize(&doctor, actor)?;

        let delay = request.delay_minutes;
        let reason = request
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REASON.to_string());

        let today = self.clock.today();
        let remaining = self.remaining_today(doctor.id).await?;
        debug!(
            "Doctor {} running {} min late; {} appointments remain today",
            doctor.id,
            delay,
            remaining.len()
        );

        let mut rescheduled = Vec::new();
        let mut notifications = NotificationCounts::default();
        let mut failed_updates = 0;

        for appointment in remaining {
            let original = appointment.appointment_time;
            let estimated = original.saturating_add_minutes(delay);
            if original.checked_add_minutes(delay).is_none() {
                warn!(
                    "Estimated time for appointment {} clamped to {} (would pass midnight)",
                    appointment.id, estimated
                );
            }

            let stamp = DelayStamp { estimated_time: estimated, delay_minutes: delay };
            let updated = match self.appointments.set_delay(appointment.id, Some(stamp)).await {
                Ok(updated) => updated,
                Err(e) => {
                    warn!("Failed to apply delay to appointment {}: {}", appointment.id, e);
                    failed_updates += 1;
                    continue;
                }
            };

            let event = NotificationEvent::DoctorDelay(DelayNotice {
                appointment_id: updated.id,
                doctor_id: doctor.id,
                doctor_user_id: Some(doctor.user_id),
                doctor_name: doctor.display_name(),
                patient: updated.recipient(),
                appointment_date: updated.appointment_date,
                original_time: original,
                estimated_time: estimated,
                delay_minutes: delay,
                reason: reason.clone(),
            });
            notifications.record(&self.notifier.dispatch(&event).await);

            rescheduled.push(RescheduledAppointment {
                appointment_id: updated.id,
                original_time: original,
                estimated_time: estimated,
            });
        }

        let mut status = self
            .statuses
            .find(doctor.id, today)
            .await?
            .unwrap_or_else(|| DoctorStatus::on_time(doctor.id, today));
        status.status = if request.emergency {
            DoctorStatusKind::Emergency
        } else {
            DoctorStatusKind::RunningLate
        };
        status.delay_minutes = delay;
        status.reason = Some(reason);
        status.reported_by = Some(actor.id.clone());
        status.affected_appointments = rescheduled.iter().map(|r| r.appointment_id).collect();
        status.notifications_sent = notifications;
        status.cleared_at = None;
        status.cleared_by = None;
        status.updated_at = Utc::now();

        let status = self.statuses.upsert(&status).await?;

        info!(
            "Doctor {} marked {} min late by {}: {} appointments updated, {} failed, {} notifications sent",
            doctor.id,
            delay,
            actor.id,
            rescheduled.len(),
            failed_updates,
            notifications.total_sent()
        );

        Ok(DelayOutcome {
            status,
            affected_appointments: rescheduled.len(),
            failed_updates,
            notifications,
            rescheduled,
        })
    }

    /// Resets today's delay. Calling it with no active delay reports that
    /// and changes nothing.
    pub async fn clear_delay(&self, doctor_id: Uuid, actor: &User) -> Result<ClearOutcome, DelayError> {
        let doctor = self.doctors.get_doctor(doctor_id).await?;
        Self::authorize(&doctor, actor)?;

        let today = self.clock.today();
        let mut status = match self.statuses.find(doctor.id, today).await? {
            Some(status) if status.status.is_delayed() => status,
            _ => {
                debug!("No active delay to clear for doctor {}", doctor.id);
                return Ok(ClearOutcome {
                    cleared: false,
                    message: "No active delay for today".to_string(),
                    reset_appointments: 0,
                    failed_updates: 0,
                    status: None,
                });
            }
        };

        let mut reset = Vec::new();
        let mut failed_updates = 0;

        for appointment in self.remaining_today(doctor.id).await? {
            if appointment.estimated_time.is_none() && appointment.delay_minutes.is_none() {
                continue;
            }
            match self.appointments.set_delay(appointment.id, None).await {
                Ok(_) => reset.push(appointment.id),
                Err(e) => {
                    warn!("Failed to clear delay on appointment {}: {}", appointment.id, e);
                    failed_updates += 1;
                }
            }
        }

        let now = Utc::now();
        status.status = DoctorStatusKind::OnTime;
        status.delay_minutes = 0;
        status.cleared_at = Some(now);
        status.cleared_by = Some(actor.id.clone());
        status.updated_at = now;
        let status = self.statuses.upsert(&status).await?;

        let event = NotificationEvent::DelayCleared(DelayClearedNotice {
            doctor_id: doctor.id,
            doctor_user_id: Some(doctor.user_id),
            doctor_name: doctor.display_name(),
            date: today,
            cleared_by: actor.id.clone(),
            appointment_ids: reset.clone(),
        });
        self.notifier.dispatch(&event).await;

        info!(
            "Delay cleared for doctor {} by {}: {} appointments reset, {} failed",
            doctor.id,
            actor.id,
            reset.len(),
            failed_updates
        );

        Ok(ClearOutcome {
            cleared: true,
            message: "Delay cleared".to_string(),
            reset_appointments: reset.len(),
            failed_updates,
            status: Some(status),
        })
    }

    /// Today's pending/confirmed appointments that have not started yet.
    async fn remaining_today(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, DelayError> {
        let query = AppointmentQuery::for_doctor(doctor_id)
            .on(self.clock.today())
            .with_statuses(&AppointmentStatus::ACTIVE)
            .starting_from(self.clock.time_of_day());

        self.appointments
            .list(&query)
            .await
            .map_err(|e| DelayError::Database(e.to_string()))
    }

    fn authorize(doctor: &Doctor, actor: &User) -> Result<(), DelayError> {
        if doctor.is_user(actor) || actor.is_admin() {
            return Ok(());
        }
        Err(DelayError::Forbidden(
            "Only the doctor or an administrator can report or clear a delay".to_string(),
        ))
    }
}
