pub mod dispatcher;
pub mod email;
pub mod realtime;

pub use dispatcher::{NotificationChannel, NotificationDispatcher};
pub use email::{render_email, EmailChannel, RenderedEmail, SmtpMailer};
pub use realtime::RealtimeChannel;
