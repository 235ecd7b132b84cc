use chrono::{NaiveDate, Weekday};
use assert_matches::assert_matches;

use doctor_cell::models::*;
use doctor_cell::services::{generate_slots, AvailabilityChecker};
use shared_models::TimeOfDay;

fn t(raw: &str) -> TimeOfDay {
    TimeOfDay::parse(raw).unwrap()
}

fn weekday_schedule(start: &str, end: &str, duration: u16, breaks: &[(&str, &str)]) -> Schedule {
    Schedule {
        working_days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        working_hours: TimeRange::new(t(start), t(end)),
        break_times: breaks.iter().map(|(s, e)| TimeRange::new(t(s), t(e))).collect(),
        appointment_duration: duration,
    }
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

fn as_strings(slots: &[TimeOfDay]) -> Vec<String> {
    slots.iter().map(|s| s.to_string()).collect()
}

#[test]
fn morning_clinic_generates_half_hour_slots() {
    let schedule = weekday_schedule("09:00", "12:00", 30, &[]);

    let slots = generate_slots(&schedule, monday());

    assert_eq!(
        as_strings(&slots),
        vec!["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"]
    );
}

#[test]
fn non_working_day_has_no_slots() {
    let schedule = weekday_schedule("09:00", "12:00", 30, &[]);
    let sunday = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    assert!(generate_slots(&schedule, sunday).is_empty());
}

#[test]
fn slot_generation_is_deterministic() {
    let schedules = [
        weekday_schedule("08:00", "17:00", 15, &[("12:00", "13:00")]),
        weekday_schedule("09:10", "11:50", 25, &[]),
        weekday_schedule("07:00", "19:00", 45, &[("10:00", "10:15"), ("15:00", "15:30")]),
    ];

    for schedule in &schedules {
        let first = generate_slots(schedule, monday());
        let second = generate_slots(schedule, monday());
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(first, sorted, "slots must be strictly ascending");
    }
}

#[test]
fn no_generated_slot_starts_inside_a_break() {
    let schedule = weekday_schedule(
        "08:00",
        "18:00",
        20,
        &[("10:00", "10:30"), ("12:10", "13:20"), ("16:45", "17:00")],
    );

    let slots = generate_slots(&schedule, monday());
    assert!(!slots.is_empty());

    for slot in &slots {
        for brk in &schedule.break_times {
            assert!(
                !(brk.start <= *slot && *slot < brk.end),
                "{} falls inside break {}",
                slot,
                brk
            );
        }
    }
}

#[test]
fn break_start_is_reported_during_break_time() {
    let schedule = weekday_schedule("09:00", "12:00", 30, &[("10:00", "10:30"), ("13:00", "14:00")]);
    let checker = AvailabilityChecker::new(&schedule, []);

    let slot = checker.check(t("10:00"));

    assert!(!slot.available);
    assert_eq!(slot.reason, Some(UnavailableReason::DuringBreakTime));
    assert_eq!(slot.reason.unwrap().to_string(), "during break time");
}

#[test]
fn availability_rules_apply_in_order() {
    let schedule = weekday_schedule("09:00", "12:00", 30, &[("10:00", "10:30")]);
    let checker = AvailabilityChecker::new(&schedule, [t("09:30"), t("10:00")]);

    // 11:45 + 30 runs past closing.
    assert_eq!(checker.check(t("11:45")).reason, Some(UnavailableReason::OutsideWorkingHours));
    assert_eq!(checker.check(t("08:30")).reason, Some(UnavailableReason::OutsideWorkingHours));
    // Booked and inside a break: the break wins.
    assert_eq!(checker.check(t("10:00")).reason, Some(UnavailableReason::DuringBreakTime));
    assert_eq!(checker.check(t("09:30")).reason, Some(UnavailableReason::AlreadyBooked));
    assert!(checker.check(t("11:30")).available);
}

#[test]
fn off_grid_times_are_not_slot_starts() {
    let schedule = weekday_schedule("09:00", "12:00", 30, &[("10:00", "10:30")]);
    let checker = AvailabilityChecker::new(&schedule, [t("09:30")]);

    let slot = checker.check(t("09:15"));
    assert!(!slot.available);
    assert_eq!(slot.reason, Some(UnavailableReason::NotASlotStart));
    assert_eq!(slot.reason.unwrap().to_string(), "not a slot start");
    // Off the grid and inside the break.
    assert_eq!(checker.check(t("10:10")).reason, Some(UnavailableReason::NotASlotStart));
}

#[test]
fn open_times_match_generated_slots() {
    let schedule = weekday_schedule("08:10", "17:00", 25, &[("12:00", "13:05")]);
    let checker = AvailabilityChecker::new(&schedule, []);
    let generated = generate_slots(&schedule, monday());

    for minute in 0..24 * 60 {
        let time = TimeOfDay::from_minutes(minute).unwrap();
        assert_eq!(
            checker.check(time).available,
            generated.contains(&time),
            "checker and generator disagree at {}",
            time
        );
    }
}

#[test]
fn annotated_day_marks_booked_slots() {
    let schedule = weekday_schedule("09:00", "12:00", 30, &[]);
    let checker = AvailabilityChecker::new(&schedule, [t("09:00"), t("11:00")]);

    let day = checker.annotate_day(monday());

    assert_eq!(day.len(), 6);
    let booked: Vec<String> = day
        .iter()
        .filter(|s| s.reason == Some(UnavailableReason::AlreadyBooked))
        .map(|s| s.time.to_string())
        .collect();
    assert_eq!(booked, vec!["09:00", "11:00"]);
}

#[test]
fn schedule_validation_rejects_bad_shapes() {
    let inverted = weekday_schedule("12:00", "09:00", 30, &[]);
    assert_matches!(inverted.validate(), Err(DoctorError::InvalidSchedule(_)));

    let too_short = weekday_schedule("09:00", "12:00", 2, &[]);
    assert_matches!(too_short.validate(), Err(DoctorError::InvalidSchedule(_)));

    let break_outside = weekday_schedule("09:00", "12:00", 30, &[("13:00", "14:00")]);
    assert_matches!(break_outside.validate(), Err(DoctorError::InvalidSchedule(_)));

    let overlapping = weekday_schedule("09:00", "17:00", 30, &[("10:00", "11:00"), ("10:30", "11:30")]);
    assert_matches!(overlapping.validate(), Err(DoctorError::InvalidSchedule(_)));

    let fine = weekday_schedule("09:00", "17:00", 30, &[("12:00", "13:00")]);
    assert_matches!(fine.validate(), Ok(()));
}

#[test]
fn schedule_reads_short_and_long_weekday_names() {
    let schedule: Schedule = serde_json::from_value(serde_json::json!({
        "working_days": ["Monday", "Wed", "Fri"],
        "working_hours": { "start": "09:00", "end": "17:00" },
        "appointment_duration": 20
    }))
    .unwrap();

    assert_eq!(schedule.working_days, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
    assert!(schedule.break_times.is_empty());

    let value = serde_json::to_value(&schedule).unwrap();
    assert_eq!(value["working_days"][1], "Wed");
    assert_eq!(value["working_hours"]["start"], "09:00");
}
