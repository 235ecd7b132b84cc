use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, BookingRequest, BookingSource, PatientContact, PatientInfo, VoiceProvenance,
};
use appointment_cell::services::BookingEngine;
use shared_models::TimeOfDay;
use shared_utils::Clock;

use crate::models::{
    VoiceAvailability, VoiceAvailabilityRequest, VoiceBookingOutcome, VoiceBookingRequest, VoiceError,
    MAX_ALTERNATIVES,
};
use crate::services::normalizer::DateTimeNormalizer;

/// Bridges the voice platform's webhooks onto the booking engine.
pub struct VoiceIntakeService {
    engine: Arc<BookingEngine>,
    normalizer: Arc<dyn DateTimeNormalizer>,
    clock: Arc<dyn Clock>,
    auto_confirm: bool,
}

impl VoiceIntakeService {
    pub fn new(
        engine: Arc<BookingEngine>,
        normalizer: Arc<dyn DateTimeNormalizer>,
        clock: Arc<dyn Clock>,
        auto_confirm: bool,
    ) -> Self {
        Self { engine, normalizer, clock, auto_confirm }
    }

    pub async fn availability(&self, request: VoiceAvailabilityRequest) -> Result<VoiceAvailability, VoiceError> {
        let date = self.normalizer.normalize_date(&request.date, self.clock.today())?;
        let availability = self.engine.available_slots(request.doctor_id, date).await?;
        let open_times = availability.open_slots().map(|slot| slot.time).collect();

        debug!("Voice availability for doctor {} on {} ('{}')", request.doctor_id, date, request.date);

        Ok(VoiceAvailability {
            doctor_id: request.doctor_id,
            date,
            open_times,
            availability,
        })
    }

    /// Books the spoken date and time. A taken or blocked time is not an
    /// error here: the agent gets alternatives to read back to the caller.
    pub async fn book(&self, request: VoiceBookingRequest) -> Result<VoiceBookingOutcome, VoiceError> {
        let date = self.normalizer.normalize_date(&request.date, self.clock.today())?;
        let time = self.normalizer.normalize_time(&request.time)?;

        debug!(
            "Voice booking '{}' '{}' normalised to {} {} (call {:?})",
            request.date, request.time, date, time, request.call_id
        );

        let slot = self.engine.check_slot(request.doctor_id, date, time).await?;
        if let Some(reason) = slot.reason {
            return self
                .unavailable(request.doctor_id, date, time, format!("Time slot unavailable: {}", reason))
                .await;
        }

        let booking = BookingRequest {
            doctor_id: request.doctor_id,
            date,
            time,
            consultation_type: request.consultation_type,
            patient: PatientInfo {
                patient_id: None,
                contact: PatientContact {
                    name: request.patient_name,
                    email: request.patient_email,
                    phone: request.patient_phone,
                },
            },
            reason: request.reason,
            source: BookingSource::VoiceAgent,
            provenance: Some(VoiceProvenance {
                call_id: request.call_id,
                provider: request.provider,
                raw_date: request.date,
                raw_time: request.time,
                transcript: request.transcript,
            }),
            confirm_immediately: self.auto_confirm,
        };

        match self.engine.create(booking).await {
            Ok(appointment) => {
                info!(
                    "Voice agent booked appointment {} ({}) for {}",
                    appointment.id, appointment.status, appointment.patient_contact.name
                );
                Ok(VoiceBookingOutcome::Booked { appointment })
            }
            // Lost a race with another booking after the check above.
            Err(AppointmentError::Conflict(message)) => {
                self.unavailable(request.doctor_id, date, time, message).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn unavailable(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        requested_time: TimeOfDay,
        message: String,
    ) -> Result<VoiceBookingOutcome, VoiceError> {
        let day = self.engine.available_slots(doctor_id, date).await?;
        let open: Vec<TimeOfDay> = day.open_slots().map(|slot| slot.time).collect();

        // Prefer times after the requested one, then fall back to earlier ones.
        let (later, earlier): (Vec<TimeOfDay>, Vec<TimeOfDay>) =
            open.into_iter().partition(|time| *time > requested_time);
        let alternatives = later
            .into_iter()
            .chain(earlier.into_iter().rev())
            .take(MAX_ALTERNATIVES)
            .collect();

        Ok(VoiceBookingOutcome::SlotUnavailable {
            message,
            date,
            requested_time,
            alternatives,
        })
    }
}
