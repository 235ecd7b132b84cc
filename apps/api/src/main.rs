use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::{BookingEngine, SupabaseAppointmentStore};
use doctor_cell::services::{DoctorService, SupabaseDoctorDirectory};
use doctor_status_cell::services::{DelayCascadeEngine, SupabaseDoctorStatusStore};
use notification_cell::services::{EmailChannel, NotificationDispatcher, RealtimeChannel};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::{Clock, SystemClock};
use voice_agent_cell::services::{HeuristicNormalizer, VoiceIntakeService};

use crate::router::AppServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    let config = Arc::new(AppConfig::from_env());
    let supabase = Arc::new(SupabaseClient::new(&config));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Notification channels
    let realtime = Arc::new(RealtimeChannel::new());
    let mut notifier = NotificationDispatcher::default().with_channel(realtime.clone());
    match EmailChannel::from_config(&config) {
        Ok(Some(email)) => notifier = notifier.with_channel(Arc::new(email)),
        Ok(None) => {}
        Err(e) => warn!("Email notifications disabled: {}", e),
    }
    info!("Notification dispatcher ready with {} channel(s)", notifier.channel_count());

    // Engines
    let doctors = Arc::new(DoctorService::new(Arc::new(SupabaseDoctorDirectory::new(supabase.clone()))));
    let appointments = Arc::new(SupabaseAppointmentStore::new(supabase.clone()));

    let booking = Arc::new(BookingEngine::new(
        doctors.clone(),
        appointments.clone(),
        notifier.clone(),
        clock.clone(),
    ));
    let delays = Arc::new(DelayCascadeEngine::new(
        doctors.clone(),
        appointments,
        Arc::new(SupabaseDoctorStatusStore::new(supabase)),
        notifier,
        clock.clone(),
    ));
    let voice = Arc::new(VoiceIntakeService::new(
        booking.clone(),
        Arc::new(HeuristicNormalizer::new()),
        clock,
        config.voice_agent_auto_confirm,
    ));

    if !config.is_voice_agent_configured() {
        warn!("VOICE_AGENT_API_KEY not set - voice agent webhooks will be refused");
    }

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let services = AppServices { doctors, booking, delays, realtime, voice };

    // Build the application router
    let app = router::create_router(config.clone(), services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
