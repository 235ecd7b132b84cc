use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc, Weekday};
use tokio::sync::Barrier;
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::*;
use doctor_cell::models::{Doctor, Schedule, TimeRange, UnavailableReason};
use doctor_cell::services::{DoctorService, InMemoryDoctorDirectory};
use notification_cell::services::{NotificationDispatcher, RealtimeChannel};
use shared_models::TimeOfDay;
use shared_utils::test_utils::TestUser;
use shared_utils::FixedClock;

fn t(raw: &str) -> TimeOfDay {
    TimeOfDay::parse(raw).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

struct Clinic {
    engine: Arc<BookingEngine>,
    store: Arc<InMemoryAppointmentStore>,
    realtime: Arc<RealtimeChannel>,
    doctor: Doctor,
    doctor_user: TestUser,
}

async fn clinic() -> Clinic {
    let store = Arc::new(InMemoryAppointmentStore::new());
    clinic_over(store.clone(), store).await
}

/// `engine_store` is what the engine talks to; `store` is the backing store
/// the test inspects.
async fn clinic_over(store: Arc<InMemoryAppointmentStore>, engine_store: Arc<dyn AppointmentStore>) -> Clinic {
    let doctor_user = TestUser::doctor("ada@clinic.test");
    let doctor = Doctor {
        id: Uuid::new_v4(),
        user_id: doctor_user.uuid(),
        first_name: "Ada".to_string(),
        last_name: "Okafor".to_string(),
        email: Some("ada@clinic.test".to_string()),
        specialty: None,
        is_active: true,
        schedule: Some(Schedule {
            working_days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            working_hours: TimeRange::new(t("09:00"), t("12:00")),
            break_times: vec![TimeRange::new(t("10:00"), t("10:30"))],
            appointment_duration: 30,
        }),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let directory = Arc::new(InMemoryDoctorDirectory::new());
    directory.insert(doctor.clone()).await;

    let realtime = Arc::new(RealtimeChannel::new());
    let clock = Arc::new(FixedClock::at(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), t("08:00")));

    let engine = Arc::new(BookingEngine::new(
        Arc::new(DoctorService::new(directory)),
        engine_store,
        NotificationDispatcher::default().with_channel(realtime.clone()),
        clock,
    ));

    Clinic { engine, store, realtime, doctor, doctor_user }
}

fn request(doctor_id: Uuid, date: NaiveDate, time: &str, patient: &TestUser) -> BookingRequest {
    BookingRequest {
        doctor_id,
        date,
        time: t(time),
        consultation_type: ConsultationType::InPerson,
        patient: PatientInfo {
            patient_id: Some(patient.uuid()),
            contact: PatientContact {
                name: "Sam Patel".to_string(),
                email: Some(patient.email.clone()),
                phone: None,
            },
        },
        reason: Some("Check-up".to_string()),
        source: BookingSource::Direct,
        provenance: None,
        confirm_immediately: false,
    }
}

#[tokio::test]
async fn second_booking_for_same_slot_conflicts() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    let other = TestUser::patient("kim@example.com");

    let first = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:00", &patient))
        .await
        .unwrap();
    assert_eq!(first.status, AppointmentStatus::Pending);
    assert_eq!(first.duration, 30);

    let second = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:00", &other))
        .await;
    assert_matches!(second, Err(AppointmentError::Conflict(msg)) if msg == "Time slot already booked");
}

/// Holds the first `stalled` listings until all of them have read, so
/// concurrent bookings all pass the availability check before any inserts.
struct StallingStore {
    inner: Arc<InMemoryAppointmentStore>,
    gate: Barrier,
    stalled: usize,
    listings: AtomicUsize,
    inserts: AtomicUsize,
}

impl StallingStore {
    fn new(inner: Arc<InMemoryAppointmentStore>, stalled: usize) -> Self {
        Self {
            inner,
            gate: Barrier::new(stalled),
            stalled,
            listings: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AppointmentStore for StallingStore {
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(appointment).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        let listed = self.inner.list(query).await;
        if self.listings.fetch_add(1, Ordering::SeqCst) < self.stalled {
            self.gate.wait().await;
        }
        listed
    }

    async fn update_status(&self, id: Uuid, change: &StatusChange) -> Result<Appointment, StoreError> {
        self.inner.update_status(id, change).await
    }

    async fn set_delay(&self, id: Uuid, delay: Option<DelayStamp>) -> Result<Appointment, StoreError> {
        self.inner.set_delay(id, delay).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_bookings_for_one_slot_have_one_winner() {
    let backing = Arc::new(InMemoryAppointmentStore::new());
    let stalling = Arc::new(StallingStore::new(backing.clone(), 2));
    let clinic = clinic_over(backing, stalling.clone()).await;
    let a = TestUser::patient("a@example.com");
    let b = TestUser::patient("b@example.com");

    let first = tokio::spawn({
        let engine = clinic.engine.clone();
        let request = request(clinic.doctor.id, monday(), "11:00", &a);
        async move { engine.create(request).await }
    });
    let second = tokio::spawn({
        let engine = clinic.engine.clone();
        let request = request(clinic.doctor.id, monday(), "11:00", &b);
        async move { engine.create(request).await }
    });

    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    // Both saw a free slot, so the store had to pick the winner.
    assert_eq!(stalling.inserts.load(Ordering::SeqCst), 2);
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(AppointmentError::Conflict(msg)) if msg == "Time slot already booked"))
            .count(),
        1
    );

    let active = clinic
        .store
        .list(
            &AppointmentQuery::for_doctor(clinic.doctor.id)
                .on(monday())
                .with_statuses(&AppointmentStatus::ACTIVE),
        )
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn in_memory_store_enforces_slot_uniqueness_on_its_own() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    let booked = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:30", &patient))
        .await
        .unwrap();

    let mut duplicate = booked.clone();
    duplicate.id = Uuid::new_v4();

    assert_matches!(clinic.store.insert(&duplicate).await, Err(StoreError::SlotTaken));
}

#[tokio::test]
async fn cancelled_slot_can_be_booked_again() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");

    let first = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:00", &patient))
        .await
        .unwrap();
    clinic.engine.cancel(first.id, None, &patient.to_user()).await.unwrap();

    let again = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:00", &patient))
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn cancelling_completed_appointment_conflicts() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    let doctor = clinic.doctor_user.to_user();

    let booked = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:00", &patient))
        .await
        .unwrap();
    clinic
        .engine
        .update_status(booked.id, AppointmentStatus::Confirmed, None, &doctor)
        .await
        .unwrap();
    clinic
        .engine
        .update_status(booked.id, AppointmentStatus::Completed, Some("Seen".to_string()), &doctor)
        .await
        .unwrap();

    let result = clinic
        .engine
        .cancel(booked.id, Some("changed my mind".to_string()), &patient.to_user())
        .await;
    assert_matches!(
        result,
        Err(AppointmentError::Conflict(msg)) if msg == "Cannot cancel completed or already cancelled appointment"
    );

    let stored = clinic.store.get(booked.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Completed);
    assert_eq!(stored.notes.as_deref(), Some("Seen"));
}

#[tokio::test]
async fn terminal_appointments_never_change_status() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    let admin = TestUser::admin("admin@clinic.test").to_user();

    let booked = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "11:30", &patient))
        .await
        .unwrap();
    clinic
        .engine
        .update_status(booked.id, AppointmentStatus::Confirmed, None, &admin)
        .await
        .unwrap();
    clinic
        .engine
        .update_status(booked.id, AppointmentStatus::NoShow, None, &admin)
        .await
        .unwrap();

    for next in [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ] {
        let result = clinic.engine.update_status(booked.id, next, None, &admin).await;
        assert_matches!(result, Err(AppointmentError::Conflict(_)));
    }

    let stored = clinic.store.get(booked.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::NoShow);
}

#[tokio::test]
async fn booking_validation_errors() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");

    let past = NaiveDate::from_ymd_opt(2025, 5, 30).unwrap();
    assert_matches!(
        clinic.engine.create(request(clinic.doctor.id, past, "09:00", &patient)).await,
        Err(AppointmentError::Validation(msg)) if msg == "Cannot book appointments in the past"
    );

    let saturday = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
    assert_matches!(
        clinic.engine.create(request(clinic.doctor.id, saturday, "09:00", &patient)).await,
        Err(AppointmentError::Validation(_))
    );

    assert_matches!(
        clinic.engine.create(request(clinic.doctor.id, monday(), "10:00", &patient)).await,
        Err(AppointmentError::Validation(msg)) if msg.contains("during break time")
    );

    assert_matches!(
        clinic.engine.create(request(clinic.doctor.id, monday(), "11:45", &patient)).await,
        Err(AppointmentError::Validation(msg)) if msg.contains("outside working hours")
    );

    assert_matches!(
        clinic.engine.create(request(clinic.doctor.id, monday(), "09:10", &patient)).await,
        Err(AppointmentError::Validation(_))
    );

    assert_matches!(
        clinic.engine.create(request(Uuid::new_v4(), monday(), "09:00", &patient)).await,
        Err(AppointmentError::NotFound(_))
    );
}

#[tokio::test]
async fn voice_bookings_can_be_confirmed_immediately() {
    let clinic = clinic().await;
    let mut voice = request(clinic.doctor.id, monday(), "09:30", &TestUser::patient("v@example.com"));
    voice.patient.patient_id = None;
    voice.source = BookingSource::VoiceAgent;
    voice.confirm_immediately = true;

    let booked = clinic.engine.create(voice).await.unwrap();

    assert_eq!(booked.status, AppointmentStatus::Confirmed);
    assert_eq!(booked.booking_source, BookingSource::VoiceAgent);

    // The flag means nothing for direct bookings.
    let mut direct = request(clinic.doctor.id, monday(), "10:30", &TestUser::patient("d@example.com"));
    direct.confirm_immediately = true;
    assert_eq!(clinic.engine.create(direct).await.unwrap().status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn available_slots_reflect_breaks_and_bookings() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:30", &patient))
        .await
        .unwrap();

    let day = clinic.engine.available_slots(clinic.doctor.id, monday()).await.unwrap();

    let times: Vec<String> = day.slots.iter().map(|s| s.time.to_string()).collect();
    assert_eq!(times, vec!["09:00", "09:30", "10:30", "11:00", "11:30"]);
    assert_eq!(day.slots[1].reason, Some(UnavailableReason::AlreadyBooked));
    assert_eq!(day.open_slots().count(), 4);

    let check = clinic.engine.check_slot(clinic.doctor.id, monday(), t("10:00")).await.unwrap();
    assert_eq!(check.reason, Some(UnavailableReason::DuringBreakTime));

    let sunday = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
    let check = clinic.engine.check_slot(clinic.doctor.id, sunday, t("09:00")).await.unwrap();
    assert_eq!(check.reason, Some(UnavailableReason::NotWorkingDay));
}

#[tokio::test]
async fn slot_check_and_create_agree_on_off_grid_times() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");

    let check = clinic.engine.check_slot(clinic.doctor.id, monday(), t("09:15")).await.unwrap();
    assert!(!check.available);
    assert_eq!(check.reason, Some(UnavailableReason::NotASlotStart));

    assert_matches!(
        clinic.engine.create(request(clinic.doctor.id, monday(), "09:15", &patient)).await,
        Err(AppointmentError::Validation(msg)) if msg == "Time slot unavailable: not a slot start"
    );

    // Whatever the checker calls open, create accepts.
    for slot in clinic.engine.available_slots(clinic.doctor.id, monday()).await.unwrap().slots {
        let check = clinic.engine.check_slot(clinic.doctor.id, monday(), slot.time).await.unwrap();
        assert_eq!(check, slot);
    }
    let open = clinic.engine.check_slot(clinic.doctor.id, monday(), t("11:30")).await.unwrap();
    assert!(open.available);
    assert!(clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "11:30", &patient))
        .await
        .is_ok());
}

#[tokio::test]
async fn listings_are_ordered_by_date_then_time() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    let tuesday = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();

    for (date, time) in [(tuesday, "09:00"), (monday(), "11:00"), (monday(), "09:00")] {
        clinic
            .engine
            .create(request(clinic.doctor.id, date, time, &patient))
            .await
            .unwrap();
    }

    let mine = clinic
        .engine
        .list_by_patient(patient.uuid(), None, &patient.to_user())
        .await
        .unwrap();
    let order: Vec<(NaiveDate, String)> = mine
        .iter()
        .map(|a| (a.appointment_date, a.appointment_time.to_string()))
        .collect();
    assert_eq!(
        order,
        vec![
            (monday(), "09:00".to_string()),
            (monday(), "11:00".to_string()),
            (tuesday, "09:00".to_string()),
        ]
    );

    let doctors_monday = clinic
        .engine
        .list_by_doctor(
            clinic.doctor.id,
            AppointmentFilter { date: Some(monday()), status: Some(AppointmentStatus::Pending) },
            &clinic.doctor_user.to_user(),
        )
        .await
        .unwrap();
    assert_eq!(doctors_monday.len(), 2);
}

#[tokio::test]
async fn strangers_cannot_see_or_cancel() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    let stranger = TestUser::patient("eve@example.com").to_user();

    let booked = clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:00", &patient))
        .await
        .unwrap();

    assert_matches!(clinic.engine.get(booked.id, &stranger).await, Err(AppointmentError::Forbidden(_)));
    assert_matches!(
        clinic.engine.cancel(booked.id, None, &stranger).await,
        Err(AppointmentError::Forbidden(_))
    );
    assert_matches!(
        clinic.engine.list_by_patient(patient.uuid(), None, &stranger).await,
        Err(AppointmentError::Forbidden(_))
    );

    // Staff may not view or cancel someone else's booking.
    let staff = TestUser::staff("desk@clinic.test").to_user();
    assert_matches!(clinic.engine.get(booked.id, &staff).await, Err(AppointmentError::Forbidden(_)));
    assert_matches!(
        clinic.engine.cancel(booked.id, None, &staff).await,
        Err(AppointmentError::Forbidden(_))
    );

    let admin = TestUser::admin("admin@clinic.test").to_user();
    assert!(clinic.engine.get(booked.id, &admin).await.is_ok());
    assert!(clinic.engine.get(booked.id, &clinic.doctor_user.to_user()).await.is_ok());

    // Patients may cancel but not confirm their own booking.
    assert_matches!(
        clinic
            .engine
            .update_status(booked.id, AppointmentStatus::Confirmed, None, &patient.to_user())
            .await,
        Err(AppointmentError::Forbidden(_))
    );
    assert!(clinic.engine.cancel(booked.id, None, &patient.to_user()).await.is_ok());
}

#[tokio::test]
async fn lifecycle_changes_are_pushed_to_the_patient() {
    let clinic = clinic().await;
    let patient = TestUser::patient("sam@example.com");
    let mut feed = clinic.realtime.subscribe(patient.uuid()).await;

    clinic
        .engine
        .create(request(clinic.doctor.id, monday(), "09:00", &patient))
        .await
        .unwrap();

    let payload: serde_json::Value = serde_json::from_str(&feed.recv().await.unwrap()).unwrap();
    assert_eq!(payload["event"]["type"], "appointment_lifecycle");
    assert_eq!(payload["event"]["data"]["status"], "pending");
    assert_eq!(payload["event"]["data"]["doctor_name"], "Dr. Ada Okafor");
}
