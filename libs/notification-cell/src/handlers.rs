use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, State,
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::services::RealtimeChannel;

/// Upgrades to a WebSocket carrying the caller's notification feed. Staff and
/// admins get the clinic-wide feed.
pub async fn notification_socket(
    State(realtime): State<Arc<RealtimeChannel>>,
    Extension(user): Extension<User>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let user_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))?;
    let staff_feed = user.is_clinic_staff();

    info!("Notification socket requested by {} (staff feed: {})", user_id, staff_feed);

    Ok(ws.on_upgrade(move |socket| stream_notifications(socket, realtime, user_id, staff_feed)))
}

async fn stream_notifications(
    socket: WebSocket,
    realtime: Arc<RealtimeChannel>,
    user_id: Uuid,
    staff_feed: bool,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut feed = if staff_feed {
        realtime.subscribe_global()
    } else {
        realtime.subscribe(user_id).await
    };

    let welcome = json!({
        "type": "connected",
        "user_id": user_id,
        "feed": if staff_feed { "clinic" } else { "personal" },
        "timestamp": Utc::now().to_rfc3339(),
    });

    if sender.send(Message::Text(welcome.to_string().into())).await.is_ok() {
        loop {
            tokio::select! {
                received = feed.recv() => match received {
                    Ok(payload) => {
                        if sender.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Notification feed for {} lagged by {} messages", user_id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    drop(feed);
    realtime.release(user_id).await;
    debug!("Notification socket closed for {}", user_id);
}
