//! Authenticated HTTP client for the MeshLogic REST API.
//!
//! `MeshLogicClient` owns one `reqwest::Client` configured with the bearer
//! credential, JSON content type and a per-request timeout. Every request
//! goes through [`MeshLogicClient::send`], which is the single place where
//! non-success statuses become typed errors:
//!
//! | Status | Error |
//! |--------|-------|
//! | 401 | `MeshLogicError::Authentication` |
//! | 404 | `MeshLogicError::NotFound` (message names the path) |
//! | 429 | `MeshLogicError::RateLimit` (`Retry-After`, default 60 s) |
//! | other >= 400 | `MeshLogicError::Api` (code/message from the body) |
//!
//! Nothing is retried. `max_retries` is accepted for parity with the other
//! MeshLogic SDKs and reported by [`MeshLogicClient::max_retries`], but no
//! request path consults it.
//!
//! Resource access goes through the facades returned by
//! [`events()`](MeshLogicClient::events), [`devices()`](MeshLogicClient::devices)
//! and [`patterns()`](MeshLogicClient::patterns).
//!
//! ## Lifetime
//!
//! The client holds pooled sockets until it is dropped. Call
//! [`close`](MeshLogicClient::close) to release them at a specific point, or
//! let the value fall out of scope; either way release happens on every exit
//! path, including early returns through `?`.
//!
//! ## Sharing
//!
//! The client holds no mutable state, so it is `Send + Sync` and concurrent
//! calls through `&MeshLogicClient` (or an `Arc`) are fine.

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::config::ClientConfig;
use crate::devices::Devices;
use crate::error::{MeshLogicError, Result};
use crate::events::Events;
use crate::patterns::Patterns;

/// Connect timeout for API calls. Covers TCP + TLS handshake only.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `User-Agent` sent with every request.
const USER_AGENT: &str = concat!("meshlogic-rust/", env!("CARGO_PKG_VERSION"));

/// Builds the underlying `reqwest::Client`.
///
/// Only static headers go into the defaults; the bearer credential is
/// attached per request so it never sits in a shared header map.
fn build_http_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()?)
}

/// Authenticated client for the MeshLogic API.
pub struct MeshLogicClient {
    http: Client,
    base_url: String,
    region: String,
    api_key: SecretString,
    max_retries: u32,
}

impl MeshLogicClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// - `MeshLogicError::Authentication`: no API key in `config` and
    ///   `MESHLOGIC_API_KEY` is unset or empty. Checked before any I/O.
    /// - `MeshLogicError::Config`: the resolved base URL is not an
    ///   absolute http(s) URL.
    /// - `MeshLogicError::Network`: the HTTP stack failed to initialise.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let base_url = config.resolved_base_url();
        validate_base_url(&base_url)?;

        tracing::debug!(
            %base_url,
            region = %config.region,
            timeout_ms = config.timeout.as_millis() as u64,
            max_retries = config.max_retries,
            "meshlogic client created"
        );

        Ok(MeshLogicClient {
            http: build_http_client(config.timeout)?,
            base_url,
            region: config.region,
            api_key,
            max_retries: config.max_retries,
        })
    }

    /// Builds a client with default settings, taking the key from
    /// `MESHLOGIC_API_KEY`.
    pub fn from_env() -> Result<Self> {
        MeshLogicClient::new(ClientConfig::default())
    }

    /// Shorthand for a client with an explicit key and default settings.
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        MeshLogicClient::new(ClientConfig::default().with_api_key(api_key))
    }

    /// Events: list, get, export and the live stream.
    pub fn events(&self) -> Events<'_> {
        Events::new(self)
    }

    /// Monitored devices and fleet status.
    pub fn devices(&self) -> Devices<'_> {
        Devices::new(self)
    }

    /// Detection patterns and their match history.
    pub fn patterns(&self) -> Patterns<'_> {
        Patterns::new(self)
    }

    /// Base URL requests are sent to, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Region this client was configured with.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Configured retry budget. Reported only; requests are never retried.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub(crate) fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Releases the underlying connection pool.
    ///
    /// Equivalent to dropping the client; exists so the release point can
    /// be spelled out.
    pub fn close(self) {
        tracing::debug!(base_url = %self.base_url, "meshlogic client closed");
        drop(self);
    }

    /// Sends an authenticated request and maps non-success statuses.
    ///
    /// `path` is absolute from the API root (`/v1/...`). `query` is encoded
    /// with `serde_urlencoded`, so `None` fields are omitted entirely.
    async fn send<Q: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Q>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.api_key.expose_secret());
        if let Some(query) = query {
            request = request.query(query);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(%method, path, status = status.as_u16(), "meshlogic request");

        if status.is_client_error() || status.is_server_error() {
            return Err(error_from_response(response, path).await);
        }
        Ok(response)
    }

    /// GETs `path` and returns the decoded JSON body.
    ///
    /// An empty body decodes as an empty object.
    pub(crate) async fn get_json<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: Option<&Q>,
    ) -> Result<Value> {
        let body = self.send(Method::GET, path, query).await?.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// GETs `path` and returns the body untouched.
    pub(crate) async fn get_bytes<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: Option<&Q>,
    ) -> Result<Bytes> {
        Ok(self.send(Method::GET, path, query).await?.bytes().await?)
    }
}

impl std::fmt::Debug for MeshLogicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshLogicClient")
            .field("base_url", &self.base_url)
            .field("region", &self.region)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Reads the headers and body of a failed response and builds the error.
///
/// A body that cannot be read is treated as empty; the status alone still
/// determines the error kind.
async fn error_from_response(response: Response, path: &str) -> MeshLogicError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(path, retry_after = ?retry_after, "meshlogic rate limit hit");
    }
    MeshLogicError::from_response(status, retry_after.as_deref(), &body, path)
}

fn validate_base_url(base_url: &str) -> Result<()> {
    let url = Url::parse(base_url)
        .map_err(|e| MeshLogicError::Config(format!("invalid base URL '{base_url}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(MeshLogicError::Config(format!(
            "base URL must use http or https, got '{other}'"
        ))),
    }
}
