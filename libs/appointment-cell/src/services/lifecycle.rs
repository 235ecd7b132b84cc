use tracing::warn;

use crate::models::{AppointmentError, AppointmentStatus};

/// Statuses reachable in one step from `current`. Terminal statuses have none.
pub fn allowed_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Pending => &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
        AppointmentStatus::Confirmed => &[
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => &[],
    }
}

pub fn validate_transition(
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if allowed_transitions(current).contains(&next) {
        return Ok(());
    }

    warn!("Rejected status transition {} -> {}", current, next);
    Err(AppointmentError::Conflict(format!(
        "Cannot change appointment status from {} to {}",
        current, next
    )))
}
