use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::TimeOfDay;

pub const MIN_APPOINTMENT_DURATION: u16 = 5;
pub const MAX_APPOINTMENT_DURATION: u16 = 240;

/// Half-open wall-clock interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start <= time && time < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn encloses(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn length_minutes(&self) -> u16 {
        self.end.minutes().saturating_sub(self.start.minutes())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A doctor's weekly bookable pattern. Weekdays serialize as `Mon`..`Sun`;
/// full names are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub working_days: Vec<Weekday>,
    pub working_hours: TimeRange,
    #[serde(default)]
    pub break_times: Vec<TimeRange>,
    pub appointment_duration: u16,
}

impl Schedule {
    pub fn works_on(&self, weekday: Weekday) -> bool {
        self.working_days.contains(&weekday)
    }

    pub fn works_on_date(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        self.works_on(date.weekday())
    }

    /// Whether a slot starting at `time` fits entirely inside working hours.
    pub fn fits_working_hours(&self, time: TimeOfDay) -> bool {
        time >= self.working_hours.start
            && time.minutes_after(self.appointment_duration) <= self.working_hours.end.minutes() as u32
    }

    /// Whether `time` lands on the grid stepped out from opening time.
    pub fn on_slot_grid(&self, time: TimeOfDay) -> bool {
        self.appointment_duration > 0
            && time >= self.working_hours.start
            && (time.minutes() - self.working_hours.start.minutes()) % self.appointment_duration == 0
    }

    pub fn break_at(&self, time: TimeOfDay) -> Option<&TimeRange> {
        self.break_times.iter().find(|b| b.contains(time))
    }

    /// Sorts and de-duplicates working days and orders breaks by start time.
    pub fn normalized(mut self) -> Self {
        self.working_days.sort_by_key(|d| d.num_days_from_monday());
        self.working_days.dedup();
        self.break_times.sort_by_key(|b| b.start);
        self
    }

    pub fn validate(&self) -> Result<(), DoctorError> {
        let hours = self.working_hours;
        if hours.start >= hours.end {
            return Err(DoctorError::InvalidSchedule(format!(
                "Working hours start ({}) must be before end ({})",
                hours.start, hours.end
            )));
        }

        if !(MIN_APPOINTMENT_DURATION..=MAX_APPOINTMENT_DURATION).contains(&self.appointment_duration) {
            return Err(DoctorError::InvalidSchedule(format!(
                "Appointment duration must be between {} and {} minutes",
                MIN_APPOINTMENT_DURATION, MAX_APPOINTMENT_DURATION
            )));
        }

        if self.appointment_duration > hours.length_minutes() {
            return Err(DoctorError::InvalidSchedule(
                "Appointment duration exceeds working hours".to_string(),
            ));
        }

        let mut previous: Option<&TimeRange> = None;
        for brk in &self.break_times {
            if brk.start >= brk.end {
                return Err(DoctorError::InvalidSchedule(format!("Break {} is empty or inverted", brk)));
            }
            if !hours.encloses(brk) {
                return Err(DoctorError::InvalidSchedule(format!(
                    "Break {} is outside working hours {}",
                    brk, hours
                )));
            }
            if let Some(prev) = previous {
                if brk.start < prev.start || prev.overlaps(brk) {
                    return Err(DoctorError::InvalidSchedule(format!(
                        "Breaks {} and {} overlap or are out of order",
                        prev, brk
                    )));
                }
            }
            previous = Some(brk);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub specialty: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn display_name(&self) -> String {
        format!("Dr. {}", self.full_name())
    }

    pub fn is_user(&self, user: &User) -> bool {
        user.is_user(self.user_id)
    }

    /// Derived from the record itself; there is no stored completion flag.
    pub fn is_profile_complete(&self) -> bool {
        self.is_active
            && !self.first_name.trim().is_empty()
            && !self.last_name.trim().is_empty()
            && self.schedule.is_some()
    }

    pub fn bookable_schedule(&self) -> Result<&Schedule, DoctorError> {
        if !self.is_active {
            return Err(DoctorError::Inactive);
        }
        self.schedule.as_ref().ok_or(DoctorError::ScheduleNotConfigured)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorProfileResponse {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub full_name: String,
    pub profile_complete: bool,
}

impl From<Doctor> for DoctorProfileResponse {
    fn from(doctor: Doctor) -> Self {
        Self {
            full_name: doctor.display_name(),
            profile_complete: doctor.is_profile_complete(),
            doctor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableReason {
    #[serde(rename = "outside working hours")]
    OutsideWorkingHours,
    #[serde(rename = "during break time")]
    DuringBreakTime,
    #[serde(rename = "time slot already booked")]
    AlreadyBooked,
    #[serde(rename = "not a working day")]
    NotWorkingDay,
    #[serde(rename = "not a slot start")]
    NotASlotStart,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::OutsideWorkingHours => "outside working hours",
            UnavailableReason::DuringBreakTime => "during break time",
            UnavailableReason::AlreadyBooked => "time slot already booked",
            UnavailableReason::NotWorkingDay => "not a working day",
            UnavailableReason::NotASlotStart => "not a slot start",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub time: TimeOfDay,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
}

impl Slot {
    pub fn open(time: TimeOfDay) -> Self {
        Self { time, available: true, reason: None }
    }

    pub fn blocked(time: TimeOfDay, reason: UnavailableReason) -> Self {
        Self { time, available: false, reason: Some(reason) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub working_day: bool,
    pub appointment_duration: u16,
    pub slots: Vec<Slot>,
}

impl DayAvailability {
    pub fn open_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.available)
    }
}

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor is not active")]
    Inactive,

    #[error("Doctor profile not found: schedule is not configured")]
    ScheduleNotConfigured,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Not authorized to manage this doctor's schedule")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SupabaseError> for DoctorError {
    fn from(err: SupabaseError) -> Self {
        DoctorError::Database(err.to_string())
    }
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound | DoctorError::Inactive | DoctorError::ScheduleNotConfigured => {
                AppError::NotFound(err.to_string())
            }
            DoctorError::InvalidSchedule(msg) => AppError::ValidationError(msg),
            DoctorError::Unauthorized => AppError::Forbidden(err.to_string()),
            DoctorError::Database(msg) => AppError::Database(msg),
        }
    }
}
