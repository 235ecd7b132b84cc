use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::{DayAvailability, Doctor, Slot, UnavailableReason};
use doctor_cell::services::{AvailabilityChecker, DoctorService};
use notification_cell::models::{LifecycleNotice, NotificationEvent};
use notification_cell::services::NotificationDispatcher;
use shared_models::auth::{Role, User};
use shared_models::TimeOfDay;
use shared_utils::Clock;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentStatus, BookingRequest,
    BookingSource, CreateAppointmentRequest, PatientContact, PatientInfo,
};
use crate::services::lifecycle::validate_transition;
use crate::services::store::{AppointmentQuery, AppointmentStore, StatusChange};

/// Sole writer of appointment status.
pub struct BookingEngine {
    doctors: Arc<DoctorService>,
    store: Arc<dyn AppointmentStore>,
    notifier: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl BookingEngine {
    pub fn new(
        doctors: Arc<DoctorService>,
        store: Arc<dyn AppointmentStore>,
        notifier: NotificationDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { doctors, store, notifier, clock }
    }

    pub fn store(&self) -> &Arc<dyn AppointmentStore> {
        &self.store
    }

    async fn booked_times(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeOfDay>, AppointmentError> {
        let query = AppointmentQuery::for_doctor(doctor_id)
            .on(date)
            .with_statuses(&AppointmentStatus::ACTIVE);

        Ok(self
            .store
            .list(&query)
            .await?
            .into_iter()
            .map(|a| a.appointment_time)
            .collect())
    }

    /// Every slot of the doctor's day, annotated with availability.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<DayAvailability, AppointmentError> {
        let doctor = self.doctors.get_active_doctor(doctor_id).await?;
        let schedule = doctor.bookable_schedule()?;

        let booked = self.booked_times(doctor_id, date).await?;
        let slots = AvailabilityChecker::new(schedule, booked).annotate_day(date);

        Ok(DayAvailability {
            doctor_id,
            date,
            working_day: schedule.works_on_date(date),
            appointment_duration: schedule.appointment_duration,
            slots,
        })
    }

    /// Single-slot check, as run before a booking.
    pub async fn check_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: TimeOfDay,
    ) -> Result<Slot, AppointmentError> {
        let doctor = self.doctors.get_active_doctor(doctor_id).await?;
        let schedule = doctor.bookable_schedule()?;

        if !schedule.works_on_date(date) {
            return Ok(Slot::blocked(time, UnavailableReason::NotWorkingDay));
        }

        let booked = self.booked_times(doctor_id, date).await?;
        Ok(AvailabilityChecker::new(schedule, booked).check(time))
    }

    pub async fn create(&self, request: BookingRequest) -> Result<Appointment, AppointmentError> {
        let doctor = self.doctors.get_active_doctor(request.doctor_id).await?;
        let schedule = doctor.bookable_schedule()?;

        if request.date < self.clock.today() {
            return Err(AppointmentError::Validation(
                "Cannot book appointments in the past".to_string(),
            ));
        }

        if !schedule.works_on_date(request.date) {
            return Err(AppointmentError::Validation(format!(
                "Doctor does not work on {}",
                request.date.weekday()
            )));
        }

        if request.patient.contact.name.trim().is_empty() {
            return Err(AppointmentError::Validation("Patient name is required".to_string()));
        }

        let booked = self.booked_times(request.doctor_id, request.date).await?;
        let slot = AvailabilityChecker::new(schedule, booked).check(request.time);
        match slot.reason {
            None => {}
            Some(UnavailableReason::AlreadyBooked) => return Err(AppointmentError::slot_taken()),
            Some(reason) => {
                return Err(AppointmentError::Validation(format!("Time slot unavailable: {}", reason)))
            }
        }

        let status = if request.source == BookingSource::VoiceAgent && request.confirm_immediately {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        };

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            patient_id: request.patient.patient_id,
            patient_contact: request.patient.contact,
            appointment_date: request.date,
            appointment_time: request.time,
            duration: schedule.appointment_duration,
            status,
            consultation_type: request.consultation_type,
            reason: request.reason,
            notes: None,
            estimated_time: None,
            delay_minutes: None,
            booking_source: request.source,
            voice_provenance: request.provenance,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        // The store is the arbiter: a concurrent booking that slipped past the
        // check above is rejected here.
        let stored = self.store.insert(&appointment).await?;

        info!(
            "Booked appointment {} with doctor {} on {} at {} ({})",
            stored.id, stored.doctor_id, stored.appointment_date, stored.appointment_time, stored.status
        );

        self.notify(&stored, &doctor, None).await;
        Ok(stored)
    }

    pub async fn get(&self, appointment_id: Uuid, actor: &User) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let doctor = self.doctors.get_doctor(appointment.doctor_id).await?;
        Self::authorize_view(&appointment, &doctor, actor)?;
        Ok(appointment)
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        notes: Option<String>,
        actor: &User,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let doctor = self.doctors.get_doctor(appointment.doctor_id).await?;

        let patient_cancelling = status == AppointmentStatus::Cancelled && appointment.is_patient(actor);
        if !patient_cancelling && !doctor.is_user(actor) && !actor.is_clinic_staff() {
            return Err(AppointmentError::Forbidden(
                "Only the doctor or clinic staff may change this appointment".to_string(),
            ));
        }

        validate_transition(appointment.status, status)?;

        let change = StatusChange {
            expected: appointment.status,
            status,
            notes,
            cancellation_reason: None,
        };
        self.apply(appointment, &doctor, change, actor).await
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        actor: &User,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let doctor = self.doctors.get_doctor(appointment.doctor_id).await?;
        Self::authorize_view(&appointment, &doctor, actor)?;

        if matches!(
            appointment.status,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        ) {
            return Err(AppointmentError::Conflict(
                "Cannot cancel completed or already cancelled appointment".to_string(),
            ));
        }
        validate_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let change = StatusChange {
            expected: appointment.status,
            status: AppointmentStatus::Cancelled,
            notes: None,
            cancellation_reason: reason,
        };
        self.apply(appointment, &doctor, change, actor).await
    }

    pub async fn list_by_doctor(
        &self,
        doctor_id: Uuid,
        filter: AppointmentFilter,
        actor: &User,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let doctor = self.doctors.get_doctor(doctor_id).await?;
        if !doctor.is_user(actor) && !actor.is_clinic_staff() {
            return Err(AppointmentError::Forbidden(
                "Not authorized to view this doctor's appointments".to_string(),
            ));
        }

        let mut query = AppointmentQuery::for_doctor(doctor_id);
        query.date = filter.date;
        query.statuses = filter.status.into_iter().collect();

        self.list(&query).await
    }

    pub async fn list_by_patient(
        &self,
        patient_id: Uuid,
        status: Option<AppointmentStatus>,
        actor: &User,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if !actor.is_user(patient_id) && !actor.is_clinic_staff() {
            return Err(AppointmentError::Forbidden(
                "Not authorized to view this patient's appointments".to_string(),
            ));
        }

        let mut query = AppointmentQuery::for_patient(patient_id);
        query.statuses = status.into_iter().collect();

        self.list(&query).await
    }

    /// Resolves the patient for a direct booking. Patients book for
    /// themselves; doctors and staff book on behalf of someone.
    pub fn resolve_patient(
        request: &CreateAppointmentRequest,
        actor: &User,
    ) -> Result<PatientInfo, AppointmentError> {
        let actor_id = Uuid::parse_str(&actor.id)
            .map_err(|_| AppointmentError::Forbidden("Invalid user id".to_string()))?;

        let patient_id = match actor.role() {
            Some(Role::Patient) => {
                if request.patient_id.is_some_and(|id| id != actor_id) {
                    return Err(AppointmentError::Forbidden(
                        "Patients can only book appointments for themselves".to_string(),
                    ));
                }
                Some(actor_id)
            }
            Some(_) => request.patient_id,
            None => {
                return Err(AppointmentError::Forbidden("A role is required to book".to_string()));
            }
        };

        let contact = match (&request.patient_contact, actor.role()) {
            (Some(contact), _) => contact.clone(),
            (None, Some(Role::Patient)) => PatientContact {
                name: actor.email.clone().unwrap_or_else(|| "Patient".to_string()),
                email: actor.email.clone(),
                phone: None,
            },
            (None, _) => {
                return Err(AppointmentError::Validation(
                    "Patient contact details are required".to_string(),
                ));
            }
        };

        Ok(PatientInfo { patient_id, contact })
    }

    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments = self.store.list(query).await?;
        appointments.sort_by_key(|a| (a.appointment_date, a.appointment_time));
        debug!("Listed {} appointments", appointments.len());
        Ok(appointments)
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get(appointment_id)
            .await?
            .ok_or_else(AppointmentError::appointment_not_found)
    }

    async fn apply(
        &self,
        appointment: Appointment,
        doctor: &Doctor,
        change: StatusChange,
        actor: &User,
    ) -> Result<Appointment, AppointmentError> {
        let previous = appointment.status;
        let updated = self.store.update_status(appointment.id, &change).await?;

        info!(
            "Appointment {} moved {} -> {} by {}",
            updated.id, previous, updated.status, actor.id
        );

        self.notify(&updated, doctor, Some(previous)).await;
        Ok(updated)
    }

    fn authorize_view(appointment: &Appointment, doctor: &Doctor, actor: &User) -> Result<(), AppointmentError> {
        if appointment.is_patient(actor) || doctor.is_user(actor) || actor.is_admin() {
            return Ok(());
        }
        Err(AppointmentError::Forbidden(
            "Not authorized to access this appointment".to_string(),
        ))
    }

    async fn notify(&self, appointment: &Appointment, doctor: &Doctor, previous: Option<AppointmentStatus>) {
        let event = NotificationEvent::AppointmentLifecycle(LifecycleNotice {
            appointment_id: appointment.id,
            doctor_id: doctor.id,
            doctor_user_id: Some(doctor.user_id),
            doctor_name: doctor.display_name(),
            patient: appointment.recipient(),
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            status: appointment.status.to_string(),
            previous_status: previous.map(|s| s.to_string()),
            reason: appointment.cancellation_reason.clone(),
        });

        let report = self.notifier.dispatch(&event).await;
        if report.failures() > 0 {
            warn!(
                "Appointment {} is {} but {} notification channel(s) failed",
                appointment.id,
                appointment.status,
                report.failures()
            );
        }
    }
}
