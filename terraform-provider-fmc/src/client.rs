//! FMC API Client for Terraform Provider
//!
//! Thin async wrapper over the FMC REST API: token login and refresh,
//! domain resolution, paging, retries on throttling/server errors and a
//! client side request rate limit.

use crate::config::{ClientSettings, Credentials};
use crate::version::FmcVersion;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

pub const AUTH_PATH: &str = "/api/fmc_platform/v1/auth/generatetoken";
pub const REFRESH_PATH: &str = "/api/fmc_platform/v1/auth/refreshtoken";
pub const VERSION_PATH: &str = "/api/fmc_platform/v1/info/serverversion";
pub const DOMAIN_INFO_PATH: &str = "/api/fmc_platform/v1/info/domain";

/// UUID of the `Global` domain, identical on every FMC
pub const GLOBAL_DOMAIN_UUID: &str = "e276abec-e0f2-11e3-8169-6d9ed49b625f";

/// Page size used by `get_all`
pub const PAGE_LIMIT: usize = 1000;

// Header names must be lowercase for `HeaderMap::insert`
const HEADER_ACCESS_TOKEN: &str = "x-auth-access-token";
const HEADER_REFRESH_TOKEN: &str = "x-auth-refresh-token";
const HEADER_DOMAIN_UUID: &str = "domain_uuid";
const HEADER_DOMAINS: &str = "domains";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// FMC domain as announced at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub uuid: String,
}

#[derive(Debug, Default)]
struct AuthState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    domain_uuid: Option<String>,
    domains: Vec<Domain>,
}

/// FMC API Client
#[derive(Clone)]
pub struct FmcClient {
    http: reqwest::Client,
    settings: Arc<ClientSettings>,
    auth: Arc<RwLock<AuthState>>,
    next_slot: Arc<Mutex<Instant>>,
}

impl FmcClient {
    /// Create a new client; no request is sent until `login`
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.insecure)
            .build()?;

        Ok(Self {
            http,
            settings: Arc::new(settings),
            auth: Arc::new(RwLock::new(AuthState::default())),
            next_slot: Arc::new(Mutex::new(Instant::now())),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Obtain an access token (password mode) and the domain list
    pub async fn login(&self) -> Result<()> {
        let (username, password) = match &self.settings.credentials {
            Credentials::Token(_) => {
                let mut auth = self.auth.write().await;
                auth.domain_uuid = Some(GLOBAL_DOMAIN_UUID.to_string());
                return Ok(());
            }
            Credentials::Password { username, password } => (username, password),
        };

        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        let url = format!("{}{}", self.settings.url, AUTH_PATH);

        self.throttle().await;
        tracing::debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Basic {}", basic))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::AuthFailed);
        }
        if !status.is_success() {
            let message = error_message(&response.text().await.unwrap_or_default());
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let headers = response.headers();
        let access_token = header_str(headers, HEADER_ACCESS_TOKEN).ok_or(ClientError::AuthFailed)?;
        let domains: Vec<Domain> = header_str(headers, HEADER_DOMAINS)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        let mut auth = self.auth.write().await;
        auth.access_token = Some(access_token);
        auth.refresh_token = header_str(headers, HEADER_REFRESH_TOKEN);
        auth.domain_uuid = header_str(headers, HEADER_DOMAIN_UUID);
        auth.domains = domains;

        tracing::info!(
            "Authenticated to FMC at {} ({} domains)",
            self.settings.url,
            auth.domains.len()
        );
        Ok(())
    }

    /// Refresh the access token, falling back to a full login
    async fn reauthenticate(&self) -> Result<()> {
        let tokens = {
            let auth = self.auth.read().await;
            auth.access_token.clone().zip(auth.refresh_token.clone())
        };

        if let Some((access, refresh)) = tokens {
            let url = format!("{}{}", self.settings.url, REFRESH_PATH);
            self.throttle().await;
            tracing::debug!("POST {}", url);
            let response = self
                .http
                .post(&url)
                .header(HEADER_ACCESS_TOKEN, access)
                .header(HEADER_REFRESH_TOKEN, refresh)
                .send()
                .await?;

            if response.status().is_success() {
                if let Some(token) = header_str(response.headers(), HEADER_ACCESS_TOKEN) {
                    let refresh = header_str(response.headers(), HEADER_REFRESH_TOKEN);
                    let mut auth = self.auth.write().await;
                    auth.access_token = Some(token);
                    if refresh.is_some() {
                        auth.refresh_token = refresh;
                    }
                    return Ok(());
                }
            }
            tracing::debug!("Token refresh rejected with {}", response.status());
        }

        self.login().await
    }

    /// Resolve a domain name to its UUID.
    ///
    /// `None` falls back to the provider level domain, then to the
    /// domain returned at login.
    pub async fn domain_uuid(&self, domain: Option<&str>) -> Result<String> {
        let Some(name) = domain.or(self.settings.domain.as_deref()) else {
            return Ok(self
                .auth
                .read()
                .await
                .domain_uuid
                .clone()
                .unwrap_or_else(|| GLOBAL_DOMAIN_UUID.to_string()));
        };

        if self.auth.read().await.domains.is_empty() {
            self.load_domains().await?;
        }

        self.auth
            .read()
            .await
            .domains
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.uuid.clone())
            .ok_or_else(|| ClientError::UnknownDomain(name.to_string()))
    }

    async fn load_domains(&self) -> Result<()> {
        let items = self.get_all(DOMAIN_INFO_PATH, &[]).await?;
        let domains: Vec<Domain> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        self.auth.write().await.domains = domains;
        Ok(())
    }

    /// Full path of a configuration endpoint within a domain
    pub async fn config_path(&self, domain: Option<&str>, suffix: &str) -> Result<String> {
        let uuid = self.domain_uuid(domain).await?;
        Ok(format!("/api/fmc_config/v1/domain/{}{}", uuid, suffix))
    }

    /// Version reported by the FMC server
    pub async fn server_version(&self) -> Result<FmcVersion> {
        let body: Value = self.get(VERSION_PATH).await?;
        let raw = body
            .pointer("/items/0/serverVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::InvalidResponse("serverVersion missing".to_string()))?;
        raw.parse()
            .map_err(|e| ClientError::InvalidResponse(format!("serverVersion '{}': {}", raw, e)))
    }

    // ========================================================================
    // Verbs
    // ========================================================================

    /// GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    /// GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let body = self.send(Method::GET, path, query, None).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// GET every page of a collection (`expanded=true`)
    pub async fn get_all(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut params = query.to_vec();
            params.push(("expanded", "true".to_string()));
            params.push(("offset", offset.to_string()));
            params.push(("limit", PAGE_LIMIT.to_string()));

            let page = self.send(Method::GET, path, &params, None).await?;
            let batch = page
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let total = page.pointer("/paging/count").and_then(|v| v.as_u64());

            let received = batch.len();
            items.extend(batch);

            let done = received < PAGE_LIMIT
                || total.map_or(true, |count| items.len() as u64 >= count);
            if done {
                break;
            }
            offset += received;
        }

        Ok(items)
    }

    /// POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self.send(Method::POST, path, query, Some(&body)).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self.send(Method::PUT, path, &[], Some(&body)).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// DELETE request
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.delete_with_query(path, &[]).await.map(|_| ())
    }

    /// DELETE request with query parameters (bulk deletes)
    pub async fn delete_with_query(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.send(Method::DELETE, path, query, None).await
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.settings.url, path);
        let mut attempt = 0u32;
        let mut reauthenticated = false;

        loop {
            self.throttle().await;
            tracing::debug!("{} {} {:?}", method, url, query);

            let mut request = self
                .http
                .request(method.clone(), &url)
                .headers(self.headers().await)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                // a timed out POST may have been applied; never send it twice
                Err(e)
                    if (e.is_connect() || (e.is_timeout() && is_idempotent(&method)))
                        && attempt < self.settings.max_retries =>
                {
                    attempt += 1;
                    tracing::warn!("{} {} failed ({}), retry {}", method, url, e, attempt);
                    tokio::time::sleep(self.backoff(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED
                && !reauthenticated
                && matches!(self.settings.credentials, Credentials::Password { .. })
            {
                tracing::info!("Access token rejected, logging in again");
                reauthenticated = true;
                self.reauthenticate().await?;
                continue;
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || (status.is_server_error() && is_idempotent(&method));
            if retryable && attempt < self.settings.max_retries {
                attempt += 1;
                tracing::warn!("{} {} returned {}, retry {}", method, url, status, attempt);
                tokio::time::sleep(self.backoff(attempt)).await;
                continue;
            }

            return self.handle_response(response).await;
        }
    }

    /// Build headers for requests
    async fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        match &self.settings.credentials {
            Credentials::Token(token) => {
                if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
            }
            Credentials::Password { .. } => {
                let auth = self.auth.read().await;
                if let Some(token) = &auth.access_token {
                    if let Ok(mut value) = HeaderValue::from_str(token) {
                        value.set_sensitive(true);
                        headers.insert(HEADER_ACCESS_TOKEN, value);
                    }
                }
            }
        }

        headers
    }

    /// Exponential backoff for the given (1-based) retry
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.settings
            .backoff_min
            .saturating_mul(factor)
            .min(self.settings.backoff_max)
    }

    /// Space requests evenly to stay under `reqs_per_minute`
    async fn throttle(&self) {
        if self.settings.reqs_per_minute == 0 {
            return;
        }
        let interval = Duration::from_secs(60) / self.settings.reqs_per_minute;

        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + interval;
            slot - now
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Handle API response
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(ClientError::AuthFailed),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(error_message(&body))),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            }),
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Methods that are safe to resend after an ambiguous failure
fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::PUT | Method::DELETE)
}

/// Flatten the FMC error envelope into one line.
///
/// FMC answers with `{"error":{"messages":[{"description":"..."}]}}`;
/// anything else is passed through as is.
pub fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let descriptions: Vec<&str> = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/messages"))
        .and_then(|v| v.as_array())
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m.get("description").and_then(|d| d.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if descriptions.is_empty() {
        body.trim().to_string()
    } else {
        descriptions.join("; ")
    }
}
