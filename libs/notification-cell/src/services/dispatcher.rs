use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::{
    ChannelKind, ChannelOutcome, Delivery, DeliveryStatus, DispatchReport, NotificationError,
    NotificationEvent,
};

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, event: &NotificationEvent) -> Result<Delivery, NotificationError>;

    /// Whether this channel has anything to do for `event`. Checked before a
    /// background hand-off so skipped events are not reported as queued.
    fn accepts(&self, _event: &NotificationEvent) -> bool {
        true
    }

    /// Slow channels (SMTP) are delivered on a spawned task so the caller
    /// never waits on them.
    fn deliver_in_background(&self) -> bool {
        false
    }
}

/// Fans events out to every configured channel.
///
/// A failing channel is logged and reported, never returned as an error, so a
/// caller's state change is never undone by a notification problem. Channels
/// that deliver in the background are reported as queued; their outcome only
/// reaches the logs.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub async fn dispatch(&self, event: &NotificationEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for channel in &self.channels {
            let status = if !channel.accepts(event) {
                DeliveryStatus::Skipped
            } else if channel.deliver_in_background() {
                Self::spawn_delivery(channel.clone(), event.clone());
                DeliveryStatus::Queued
            } else {
                match channel.deliver(event).await {
                    Ok(Delivery::Sent) => DeliveryStatus::Sent,
                    Ok(Delivery::Skipped) => DeliveryStatus::Skipped,
                    Err(e) => {
                        warn!(
                            "{} notification for {:?} failed on {}: {}",
                            event.kind(),
                            event.appointment_id(),
                            channel.kind(),
                            e
                        );
                        DeliveryStatus::Failed(e.to_string())
                    }
                }
            };

            report.outcomes.push(ChannelOutcome {
                channel: channel.kind(),
                status,
            });
        }

        debug!("Dispatched {} notification: {:?}", event.kind(), report.outcomes);
        report
    }

    fn spawn_delivery(channel: Arc<dyn NotificationChannel>, event: NotificationEvent) {
        tokio::spawn(async move {
            match channel.deliver(&event).await {
                Ok(delivery) => debug!(
                    "Background {} notification for {:?} on {}: {:?}",
                    event.kind(),
                    event.appointment_id(),
                    channel.kind(),
                    delivery
                ),
                Err(e) => warn!(
                    "Background {} notification for {:?} failed on {}: {}",
                    event.kind(),
                    event.appointment_id(),
                    channel.kind(),
                    e
                ),
            }
        });
    }
}
