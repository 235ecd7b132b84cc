use chrono::NaiveDate;

use shared_models::TimeOfDay;

use crate::models::Schedule;

/// Candidate start times for `date`, ascending.
///
/// Starts at the opening time and steps by the appointment duration while the
/// whole slot still fits before closing. Starts that fall inside a break are
/// skipped. Non-working days yield nothing. Pure: bookings are not consulted.
pub fn generate_slots(schedule: &Schedule, date: NaiveDate) -> Vec<TimeOfDay> {
    if !schedule.works_on_date(date) || schedule.appointment_duration == 0 {
        return Vec::new();
    }

    let step = schedule.appointment_duration;
    let mut slots = Vec::new();
    let mut current = Some(schedule.working_hours.start);

    while let Some(time) = current {
        if !schedule.fits_working_hours(time) {
            break;
        }
        if schedule.break_at(time).is_none() {
            slots.push(time);
        }
        current = time.checked_add_minutes(step);
    }

    slots
}
