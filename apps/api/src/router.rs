use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use appointment_cell::services::BookingEngine;
use doctor_cell::router::doctor_routes;
use doctor_cell::services::DoctorService;
use doctor_status_cell::router::doctor_status_routes;
use doctor_status_cell::services::DelayCascadeEngine;
use notification_cell::router::notification_routes;
use notification_cell::services::RealtimeChannel;
use shared_config::AppConfig;
use voice_agent_cell::router::voice_agent_routes;
use voice_agent_cell::services::VoiceIntakeService;

/// Everything the cells need, built once in `main`.
pub struct AppServices {
    pub doctors: Arc<DoctorService>,
    pub booking: Arc<BookingEngine>,
    pub delays: Arc<DelayCascadeEngine>,
    pub realtime: Arc<RealtimeChannel>,
    pub voice: Arc<VoiceIntakeService>,
}

pub fn create_router(config: Arc<AppConfig>, services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/doctors", doctor_routes(config.clone(), services.doctors))
        .nest("/appointments", appointment_routes(config.clone(), services.booking))
        .nest("/doctor-status", doctor_status_routes(config.clone(), services.delays))
        .nest("/notifications", notification_routes(config.clone(), services.realtime))
        .nest("/voice-agent", voice_agent_routes(config, services.voice))
}
