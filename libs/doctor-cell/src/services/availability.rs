use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::debug;

use shared_models::TimeOfDay;

use crate::models::{Schedule, Slot, UnavailableReason};
use crate::services::schedule::generate_slots;

/// Classifies start times for one doctor on one date.
///
/// Rules run in order and the first failure wins: working hours, then the
/// slot grid, then breaks, then existing pending/confirmed bookings. A time
/// passing the first three is exactly a start [`generate_slots`] would yield.
pub struct AvailabilityChecker<'a> {
    schedule: &'a Schedule,
    booked: HashSet<TimeOfDay>,
}

impl<'a> AvailabilityChecker<'a> {
    /// `booked_times` are the start times of the doctor's active bookings on the
    /// date being checked.
    pub fn new(schedule: &'a Schedule, booked_times: impl IntoIterator<Item = TimeOfDay>) -> Self {
        Self {
            schedule,
            booked: booked_times.into_iter().collect(),
        }
    }

    pub fn check(&self, time: TimeOfDay) -> Slot {
        if !self.schedule.fits_working_hours(time) {
            return Slot::blocked(time, UnavailableReason::OutsideWorkingHours);
        }

        if !self.schedule.on_slot_grid(time) {
            return Slot::blocked(time, UnavailableReason::NotASlotStart);
        }

        if self.schedule.break_at(time).is_some() {
            return Slot::blocked(time, UnavailableReason::DuringBreakTime);
        }

        if self.booked.contains(&time) {
            return Slot::blocked(time, UnavailableReason::AlreadyBooked);
        }

        Slot::open(time)
    }

    /// Every generated slot for `date`, annotated.
    pub fn annotate_day(&self, date: NaiveDate) -> Vec<Slot> {
        let slots: Vec<Slot> = generate_slots(self.schedule, date)
            .into_iter()
            .map(|time| self.check(time))
            .collect();

        debug!(
            "Annotated {} slots for {} ({} booked)",
            slots.len(),
            date,
            slots.iter().filter(|s| !s.available).count()
        );

        slots
    }
}
