use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::{ChannelKind, Delivery, NotificationError, NotificationEvent};
use crate::services::dispatcher::NotificationChannel;

const USER_CHANNEL_CAPACITY: usize = 100;
const GLOBAL_CHANNEL_CAPACITY: usize = 1000;

pub type FeedReceiver = broadcast::Receiver<String>;

/// In-process push feed: one broadcast channel per connected user plus a
/// clinic-wide feed that staff dashboards subscribe to.
pub struct RealtimeChannel {
    users: RwLock<HashMap<Uuid, broadcast::Sender<String>>>,
    global: broadcast::Sender<String>,
}

impl Default for RealtimeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeChannel {
    pub fn new() -> Self {
        let (global, _) = broadcast::channel(GLOBAL_CHANNEL_CAPACITY);
        Self {
            users: RwLock::new(HashMap::new()),
            global,
        }
    }

    pub async fn subscribe(&self, user_id: Uuid) -> FeedReceiver {
        let mut users = self.users.write().await;
        users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(USER_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_global(&self) -> FeedReceiver {
        self.global.subscribe()
    }

    /// Drops the user's channel once its last subscriber is gone.
    pub async fn release(&self, user_id: Uuid) {
        let mut users = self.users.write().await;
        if users.get(&user_id).is_some_and(|s| s.receiver_count() == 0) {
            users.remove(&user_id);
            debug!("Removed realtime channel for user {}", user_id);
        }
    }

    pub async fn connected_users(&self) -> Vec<Uuid> {
        self.users.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl NotificationChannel for RealtimeChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Realtime
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<Delivery, NotificationError> {
        let payload = serde_json::to_string(&json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
        }))?;

        let mut receivers = 0;
        {
            let users = self.users.read().await;
            for user_id in event.audience() {
                if let Some(sender) = users.get(&user_id) {
                    // Err only means nobody is listening right now.
                    receivers += sender.send(payload.clone()).unwrap_or(0);
                }
            }
        }
        receivers += self.global.send(payload).unwrap_or(0);

        if receivers == 0 {
            debug!("No realtime listeners for {} event", event.kind());
            return Ok(Delivery::Skipped);
        }

        Ok(Delivery::Sent)
    }
}
