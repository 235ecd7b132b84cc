use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, Utc, Weekday};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::*;
use appointment_cell::router::appointment_routes;
use appointment_cell::services::*;
use doctor_cell::models::{Doctor, Schedule, TimeRange};
use doctor_cell::services::{DoctorService, InMemoryDoctorDirectory};
use notification_cell::services::NotificationDispatcher;
use shared_database::SupabaseClient;
use shared_models::TimeOfDay;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};
use shared_utils::FixedClock;

fn t(raw: &str) -> TimeOfDay {
    TimeOfDay::parse(raw).unwrap()
}

async fn app_with_doctor() -> (Router, Uuid, TestConfig) {
    let config = TestConfig::default();
    let doctor = Doctor {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        first_name: "Ada".to_string(),
        last_name: "Okafor".to_string(),
        email: None,
        specialty: None,
        is_active: true,
        schedule: Some(Schedule {
            working_days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            working_hours: TimeRange::new(t("09:00"), t("12:00")),
            break_times: vec![],
            appointment_duration: 30,
        }),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let doctor_id = doctor.id;

    let directory = Arc::new(InMemoryDoctorDirectory::new());
    directory.insert(doctor).await;

    let engine = BookingEngine::new(
        Arc::new(DoctorService::new(directory)),
        Arc::new(InMemoryAppointmentStore::new()),
        NotificationDispatcher::default(),
        Arc::new(FixedClock::at(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), t("08:00"))),
    );

    (appointment_routes(config.to_arc(), Arc::new(engine)), doctor_id, config)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn book(token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn slot_listing_is_public() {
    let (app, doctor_id, _) = app_with_doctor().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/doctors/{}/slots?date=2025-06-02", doctor_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["open_slots"], 6);
    assert_eq!(body["availability"]["slots"][0]["time"], "09:00");
    assert_eq!(body["availability"]["working_day"], true);
}

#[tokio::test]
async fn patient_books_then_double_booking_is_409() {
    let (app, doctor_id, config) = app_with_doctor().await;
    let patient = TestUser::patient("sam@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let body = json!({
        "doctor_id": doctor_id,
        "appointment_date": "2025-06-02",
        "appointment_time": "09:00",
        "consultation_type": "in-person",
        "patient_contact": { "name": "Sam Patel", "email": "sam@example.com" }
    });

    let response = app.clone().oneshot(book(&token, body.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["appointment"]["status"], "pending");
    assert_eq!(created["appointment"]["patient_id"], patient.id);

    let response = app.clone().oneshot(book(&token, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await["error"], "Time slot already booked");

    let check = app
        .oneshot(
            Request::builder()
                .uri(format!("/doctors/{}/slots/check?date=2025-06-02&time=09:00", doctor_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let check = read_json(check).await;
    assert_eq!(check["available"], false);
    assert_eq!(check["reason"], "time slot already booked");
}

#[tokio::test]
async fn patient_cannot_book_for_someone_else() {
    let (app, doctor_id, config) = app_with_doctor().await;
    let patient = TestUser::patient("sam@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let response = app
        .oneshot(book(
            &token,
            json!({
                "doctor_id": doctor_id,
                "appointment_date": "2025-06-02",
                "appointment_time": "09:00",
                "consultation_type": "online",
                "patient_id": Uuid::new_v4()
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn booking_requires_token() {
    let (app, doctor_id, _) = app_with_doctor().await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "doctor_id": doctor_id }).to_string()))
        .unwrap();

    assert_eq!(app.oneshot(request).await.unwrap().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_moves_appointment_through_lifecycle() {
    let (app, doctor_id, config) = app_with_doctor().await;
    let staff = TestUser::staff("desk@clinic.test");
    let token = JwtTestUtils::create_test_token(&staff, &config.jwt_secret, None);

    let response = app
        .clone()
        .oneshot(book(
            &token,
            json!({
                "doctor_id": doctor_id,
                "appointment_date": "2025-06-03",
                "appointment_time": "10:30",
                "consultation_type": "online",
                "patient_contact": { "name": "Walk In", "phone": "+15550100" }
            }),
        ))
        .await
        .unwrap();
    let id = read_json(response).await["appointment"]["id"].as_str().unwrap().to_string();

    let patch = |status: &str| {
        Request::builder()
            .method("PATCH")
            .uri(format!("/{}/status", id))
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "status": status }).to_string()))
            .unwrap()
    };

    assert_eq!(app.clone().oneshot(patch("confirmed")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.clone().oneshot(patch("completed")).await.unwrap().status(), StatusCode::OK);

    let cancel = Request::builder()
        .method("POST")
        .uri(format!("/{}/cancel", id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "reason": "duplicate" }).to_string()))
        .unwrap();
    // Cancel is reserved for the owner, the doctor and admins.
    let response = app.oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await["error"], "Not authorized to access this appointment");
}

#[tokio::test]
async fn supabase_store_maps_unique_violation_to_slot_taken() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::error_response(
            "duplicate key value violates unique constraint \"appointments_active_slot_key\"",
            "23505",
        )))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let store = SupabaseAppointmentStore::new(Arc::new(SupabaseClient::new(&config)));

    let appointment = Appointment {
        id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        patient_id: None,
        patient_contact: PatientContact { name: "Sam".to_string(), email: None, phone: None },
        appointment_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        appointment_time: t("09:00"),
        duration: 30,
        status: AppointmentStatus::Pending,
        consultation_type: ConsultationType::Online,
        reason: None,
        notes: None,
        estimated_time: None,
        delay_minutes: None,
        booking_source: BookingSource::Direct,
        voice_provenance: None,
        cancellation_reason: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    assert_matches!(store.insert(&appointment).await, Err(StoreError::SlotTaken));
}

#[tokio::test]
async fn supabase_store_lists_with_postgrest_filters() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("appointment_date", "eq.2025-06-02"))
        .and(query_param("status", "in.(pending,confirmed)"))
        .and(query_param("appointment_time", "gte.14:00"))
        .and(query_param("order", "appointment_date.asc,appointment_time.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                &patient_id.to_string(),
                "2025-06-02",
                "15:00",
                "confirmed"
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let store = SupabaseAppointmentStore::new(Arc::new(SupabaseClient::new(&config)));

    let query = AppointmentQuery::for_doctor(doctor_id)
        .on(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap())
        .with_statuses(&AppointmentStatus::ACTIVE)
        .starting_from(t("14:00"));
    let found = store.list(&query).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].appointment_time, t("15:00"));
    assert_eq!(found[0].status, AppointmentStatus::Confirmed);
    assert_eq!(found[0].consultation_type, ConsultationType::InPerson);
}

#[tokio::test]
async fn supabase_status_update_reports_concurrent_change() {
    let mock_server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                "2025-06-02",
                "09:00",
                "cancelled"
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let store = SupabaseAppointmentStore::new(Arc::new(SupabaseClient::new(&config)));

    let change = StatusChange {
        expected: AppointmentStatus::Pending,
        status: AppointmentStatus::Confirmed,
        notes: None,
        cancellation_reason: None,
    };
    assert_matches!(store.update_status(id, &change).await, Err(StoreError::StatusChanged));
}
