use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Empty response from {0}")]
    EmptyResponse(String),
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_credentials(&config.supabase_url, config.supabase_server_key())
    }

    pub fn with_credentials(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Without a user token the request runs as the configured key's role.
        let bearer = auth_token.unwrap_or(&self.api_key);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", bearer))?);

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Self::classify_error(status, error_text));
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    fn classify_error(status: StatusCode, error_text: String) -> SupabaseError {
        let parsed: Option<PostgrestErrorBody> = serde_json::from_str(&error_text).ok();
        let pg_code = parsed.as_ref().and_then(|b| b.code.as_deref());

        let unique_violation = pg_code == Some(UNIQUE_VIOLATION)
            || (status == StatusCode::CONFLICT && pg_code.is_none());

        if unique_violation {
            let message = parsed
                .and_then(|b| b.message)
                .unwrap_or(error_text);
            warn!("Unique constraint rejected write: {}", message);
            return SupabaseError::UniqueViolation(message);
        }

        error!("API error ({}): {}", status, error_text);
        match status.as_u16() {
            401 | 403 => SupabaseError::Auth(error_text),
            404 => SupabaseError::NotFound(error_text),
            code => SupabaseError::Api { status: code, body: error_text },
        }
    }

    fn representation_headers(prefer: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static(prefer));
        headers
    }

    /// `GET /rest/v1/{table}?{query}`.
    pub async fn select<T>(&self, table: &str, query: &str) -> Result<Vec<T>, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let path = if query.is_empty() {
            format!("/rest/v1/{}", table)
        } else {
            format!("/rest/v1/{}?{}", table, query)
        };
        self.request(Method::GET, &path, None, None).await
    }

    /// Inserts one row and returns the stored representation.
    pub async fn insert<B, T>(&self, table: &str, row: &B) -> Result<T, SupabaseError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        let rows: Vec<T> = self
            .request_with_headers(
                Method::POST,
                &path,
                None,
                Some(serde_json::to_value(row)?),
                Some(Self::representation_headers("return=representation")),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| SupabaseError::EmptyResponse(path))
    }

    /// Patches every row matching `filter` and returns the updated rows.
    pub async fn update<T>(&self, table: &str, filter: &str, patch: Value) -> Result<Vec<T>, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?{}", table, filter);
        self.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(patch),
            Some(Self::representation_headers("return=representation")),
        )
        .await
    }

    /// Inserts or merges one row on the given unique columns.
    pub async fn upsert<B, T>(&self, table: &str, on_conflict: &str, row: &B) -> Result<T, SupabaseError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?on_conflict={}", table, on_conflict);
        let rows: Vec<T> = self
            .request_with_headers(
                Method::POST,
                &path,
                None,
                Some(serde_json::to_value(row)?),
                Some(Self::representation_headers(
                    "resolution=merge-duplicates,return=representation",
                )),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| SupabaseError::EmptyResponse(path))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
