//! Client configuration: credential, endpoint and timeouts.
//!
//! Resolution order for each setting:
//!
//! - **API key**: explicit value, else the `MESHLOGIC_API_KEY` environment
//!   variable. Empty strings count as unset. No key means construction
//!   fails with [`MeshLogicError::Authentication`] before any I/O.
//! - **Base URL**: explicit override, else the region table, else the
//!   default region (`ap-southeast-2`).
//!
//! A config file (TOML) can supply any of the fields:
//!
//! ```toml
//! api_key = "ml_live_..."
//! region = "eu-west-1"
//! base_url = "https://api.eu.meshlogic.ai"
//! timeout_secs = 30
//! max_retries = 3
//! ```

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{MeshLogicError, Result};

/// Environment variable consulted when no API key is passed explicitly.
pub const API_KEY_ENV: &str = "MESHLOGIC_API_KEY";

/// Region used when none is given or the given one is unknown.
pub const DEFAULT_REGION: &str = "ap-southeast-2";

/// Default per-request timeout for non-streaming calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default value of [`ClientConfig::max_retries`].
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// API base URLs by region.
const ENDPOINTS: &[(&str, &str)] = &[
    ("ap-southeast-2", "https://api.meshlogic.ai"),
    ("us-east-1", "https://api.us.meshlogic.ai"),
    ("eu-west-1", "https://api.eu.meshlogic.ai"),
];

/// Returns the base URL for a known region.
pub fn endpoint_for_region(region: &str) -> Option<&'static str> {
    ENDPOINTS
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, url)| *url)
}

/// Settings for [`MeshLogicClient`](crate::client::MeshLogicClient).
///
/// `max_retries` is carried for compatibility with other MeshLogic SDKs
/// and surfaced through the client, but no request is ever retried.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Explicit API key. `None` defers to [`API_KEY_ENV`].
    pub api_key: Option<SecretString>,
    /// Region selecting the base URL.
    pub region: String,
    /// Base URL override; wins over `region`.
    pub base_url: Option<String>,
    /// Timeout applied to each non-streaming request.
    pub timeout: Duration,
    /// Accepted and reported; never applied.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_key: None,
            region: DEFAULT_REGION.to_string(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// On-disk form of [`ClientConfig`]. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_key: Option<String>,
    region: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

impl ClientConfig {
    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Overrides the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the (unused) retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Parses a TOML config document. Missing fields keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| MeshLogicError::Config(format!("invalid config file: {e}")))?;
        let defaults = ClientConfig::default();
        Ok(ClientConfig {
            api_key: file
                .api_key
                .filter(|key| !key.is_empty())
                .map(SecretString::from),
            region: file.region.unwrap_or(defaults.region),
            base_url: file.base_url,
            timeout: file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: file.max_retries.unwrap_or(defaults.max_retries),
        })
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MeshLogicError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        ClientConfig::from_toml_str(&content)
    }

    /// The base URL requests will be sent to, without a trailing slash.
    pub fn resolved_base_url(&self) -> String {
        let url = match &self.base_url {
            Some(url) => url.as_str(),
            None => endpoint_for_region(&self.region)
                .or_else(|| endpoint_for_region(DEFAULT_REGION))
                .unwrap_or("https://api.meshlogic.ai"),
        };
        url.trim_end_matches('/').to_string()
    }

    /// Resolves the API key from this config or the environment.
    pub(crate) fn resolve_api_key(&self) -> Result<SecretString> {
        use secrecy::ExposeSecret;

        if let Some(key) = &self.api_key {
            if !key.expose_secret().is_empty() {
                return Ok(key.clone());
            }
        }
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(SecretString::from(key)),
            _ => Err(MeshLogicError::authentication(format!(
                "API key required. Provide one explicitly or set the {API_KEY_ENV} environment variable."
            ))),
        }
    }
}
