// Async HTTP client for the backend's snapshot endpoints.
//
// Base path: configurable (e.g. https://host/api/v1/)
// Auth: `Authorization: Bearer <token>` on every request

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::Error;
use crate::transport::TransportConfig;
use crate::wire::{self, ListResponse, RawRecord};

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for `GET /alerts`, `GET /devices` and
/// `GET /devices/my-devices`.
///
/// The bearer token is passed per call so a rotated session token is
/// picked up on the next poll without rebuilding the client.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Build from a base URL and transport config.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, Self::normalize_base_url(base_url)?))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Ensure a trailing slash so relative joins append instead of replace.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    pub async fn list_alerts(&self, token: &SecretString) -> Result<Vec<RawRecord>, Error> {
        self.get_list("alerts", token).await
    }

    /// Every device. Operators and admins only.
    pub async fn list_devices(&self, token: &SecretString) -> Result<Vec<RawRecord>, Error> {
        self.get_list("devices", token).await
    }

    /// Devices owned by the session's user.
    pub async fn list_my_devices(&self, token: &SecretString) -> Result<Vec<RawRecord>, Error> {
        self.get_list("devices/my-devices", token).await
    }

    // ── HTTP plumbing ────────────────────────────────────────────────

    async fn get_list(&self, path: &str, token: &SecretString) -> Result<Vec<RawRecord>, Error> {
        let url = self.base_url.join(path)?;
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::parse_error(status, resp).await);
        }

        let body = resp.text().await?;
        let list: ListResponse = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })?;

        Ok(wire::parse_items(list.into_items()))
    }

    async fn parse_error(status: StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(|err| match err.detail {
                Some(Value::String(s)) => Some(s),
                Some(other) => Some(other.to_string()),
                None => err.message,
            })
            .unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                }
            });

        // 403 only means this endpoint is off-limits; the token is fine.
        if status == StatusCode::UNAUTHORIZED {
            Error::Unauthorized {
                status: status.as_u16(),
                message,
            }
        } else {
            Error::Http {
                status: status.as_u16(),
                message,
            }
        }
    }
}
