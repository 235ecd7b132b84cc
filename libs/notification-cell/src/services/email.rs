use std::fmt::Display;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::models::{ChannelKind, Delivery, NotificationError, NotificationEvent};
use crate::services::dispatcher::NotificationChannel;

pub type SmtpMailer = AsyncSmtpTransport<Tokio1Executor>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Plain-text email for an event, or `None` when the patient has no address
/// or the event is not patient-facing.
pub fn render_email(event: &NotificationEvent) -> Option<RenderedEmail> {
    match event {
        NotificationEvent::DoctorDelay(notice) => {
            let to = notice.patient.email.clone()?;
            let body = format!(
                "Dear {},\n\n\
                 {} is running approximately {} minutes late today.\n\n\
                 Your appointment on {} was scheduled for {}.\n\
                 The new estimated time is {}.\n\n\
                 Reason: {}\n\n\
                 We apologise for the inconvenience.\n",
                notice.patient.name,
                notice.doctor_name,
                notice.delay_minutes,
                notice.appointment_date,
                notice.original_time,
                notice.estimated_time,
                notice.reason,
            );
            Some(RenderedEmail {
                to,
                subject: format!("Appointment delay: new estimated time {}", notice.estimated_time),
                body,
            })
        }
        NotificationEvent::AppointmentLifecycle(notice) => {
            let to = notice.patient.email.clone()?;
            let mut body = format!(
                "Dear {},\n\nYour appointment with {} on {} at {} is now {}.\n",
                notice.patient.name,
                notice.doctor_name,
                notice.appointment_date,
                notice.appointment_time,
                notice.status,
            );
            if let Some(reason) = &notice.reason {
                body.push_str(&format!("\nReason: {}\n", reason));
            }
            Some(RenderedEmail {
                to,
                subject: format!("Your appointment is {}", notice.status),
                body,
            })
        }
        NotificationEvent::DelayCleared(_) => None,
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotificationError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Sends patient-facing events over any lettre async transport.
pub struct EmailChannel<T> {
    transport: T,
    from: Mailbox,
}

impl<T> EmailChannel<T> {
    pub fn new(transport: T, from: &str) -> Result<Self, NotificationError> {
        Ok(Self {
            transport,
            from: parse_mailbox(from)?,
        })
    }
}

impl EmailChannel<SmtpMailer> {
    /// SMTP relay from configuration; `None` when SMTP is not configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, NotificationError> {
        if !config.is_email_configured() {
            return Ok(None);
        }

        let builder = if config.smtp_username.is_empty() {
            SmtpMailer::builder_dangerous(&config.smtp_host)
        } else {
            SmtpMailer::relay(&config.smtp_host)
                .map_err(|e| NotificationError::Smtp(e.to_string()))?
                .credentials(Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.clone(),
                ))
        };

        let transport = builder.port(config.smtp_port).build();
        info!("Email notifications enabled via {}:{}", config.smtp_host, config.smtp_port);

        Self::new(transport, &config.smtp_from).map(Some)
    }
}

#[async_trait]
impl<T> NotificationChannel for EmailChannel<T>
where
    T: AsyncTransport + Send + Sync,
    T::Error: Display,
{
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn accepts(&self, event: &NotificationEvent) -> bool {
        event.patient().is_some_and(|patient| patient.email.is_some())
    }

    fn deliver_in_background(&self) -> bool {
        true
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<Delivery, NotificationError> {
        let Some(email) = render_email(event) else {
            return Ok(Delivery::Skipped);
        };

        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| NotificationError::Compose(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Smtp(e.to_string()))?;

        debug!("Sent {} email to {}", event.kind(), email.to);
        Ok(Delivery::Sent)
    }
}
