use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from: String,
    pub voice_agent_api_key: String,
    pub voice_agent_auto_confirm: bool,
    pub port: u16,
}

fn string_var(name: &str, fallback: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        if fallback.is_empty() {
            warn!("{} not set, using empty value", name);
        } else {
            warn!("{} not set, using default", name);
        }
        fallback.to_string()
    })
}

fn parsed_var<T: FromStr>(name: &str, fallback: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            fallback
        }),
        Err(_) => fallback,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: string_var("SUPABASE_URL", ""),
            supabase_anon_key: string_var("SUPABASE_ANON_PUBLIC_KEY", ""),
            supabase_service_role_key: string_var("SUPABASE_SERVICE_ROLE_KEY", ""),
            supabase_jwt_secret: string_var("SUPABASE_JWT_SECRET", ""),
            smtp_host: string_var("SMTP_HOST", ""),
            smtp_port: parsed_var("SMTP_PORT", 587),
            smtp_username: string_var("SMTP_USERNAME", ""),
            smtp_password: string_var("SMTP_PASSWORD", ""),
            smtp_from: string_var("SMTP_FROM", "Clinic <noreply@clinic.local>"),
            voice_agent_api_key: string_var("VOICE_AGENT_API_KEY", ""),
            voice_agent_auto_confirm: parsed_var("VOICE_AGENT_AUTO_CONFIRM", true),
            port: parsed_var("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if !config.is_email_configured() {
            warn!("SMTP not configured - email notifications disabled");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.smtp_host.is_empty() && !self.smtp_from.is_empty()
    }

    pub fn is_voice_agent_configured(&self) -> bool {
        !self.voice_agent_api_key.is_empty()
    }

    /// Server-side writes use the service role key when one is configured so
    /// the engines are not subject to per-user row level security.
    pub fn supabase_server_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}
