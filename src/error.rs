//! Typed error hierarchy for the meshlogic crate.
//!
//! `MeshLogicError` covers every failure a caller can observe. Each variant
//! maps to one system boundary:
//!
//! | Variant | Boundary | `code()` | `status_code()` |
//! |---------|----------|----------|-----------------|
//! | `Authentication` | missing credential, HTTP 401 | `AUTH_ERROR` | 401 |
//! | `NotFound` | HTTP 404 | `NOT_FOUND` | 404 |
//! | `RateLimit` | HTTP 429 | `RATE_LIMIT` | 429 |
//! | `Validation` | malformed input, unknown event type | `VALIDATION_ERROR` | 400 |
//! | `Api` | any other HTTP status >= 400 | from the error body | response status |
//! | `Decode` | response payload missing fields or carrying bad values | - | - |
//! | `Parse` | response body is not JSON | - | - |
//! | `Network` | DNS, TCP, TLS, request timeout | - | - |
//! | `WebSocket` | live stream connect/send/receive | - | - |
//! | `Config` | unreadable config file, bad base URL | - | - |
//!
//! Nothing in the crate retries. Every error crosses the facade boundary
//! unchanged and recovery is the caller's decision.

use reqwest::StatusCode;

/// Seconds to wait when a 429 response has no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Unified error type for all meshlogic library operations.
#[derive(Debug, thiserror::Error)]
pub enum MeshLogicError {
    /// No credential could be resolved, or the API rejected it (HTTP 401).
    #[error("[AUTH_ERROR] {message}")]
    Authentication {
        /// Human-readable description of the failure.
        message: String,
    },

    /// The requested resource does not exist (HTTP 404).
    ///
    /// The message names the request path so callers can tell which lookup
    /// failed when several are chained.
    #[error("[NOT_FOUND] {message}")]
    NotFound {
        /// Human-readable description, including the request path.
        message: String,
    },

    /// The API is throttling this credential (HTTP 429).
    #[error("{message}. Retry after {retry_after} seconds.")]
    RateLimit {
        /// Human-readable description of the failure.
        message: String,
        /// Seconds the server asked us to wait, parsed from `Retry-After`.
        /// Falls back to [`DEFAULT_RETRY_AFTER_SECS`].
        retry_after: u64,
    },

    /// Input was rejected before or during decoding.
    #[error("{}", render_validation(.message, .field.as_deref()))]
    Validation {
        /// Human-readable description of the failure.
        message: String,
        /// Name of the offending field, when known.
        field: Option<String>,
    },

    /// Any other non-success status. `code` and `message` come from the
    /// decoded error body when the server supplied them.
    #[error("[{code}] {message}")]
    Api {
        /// Machine-readable code from the body, or `UNKNOWN`.
        code: String,
        /// Message from the body, or `Unknown error`.
        message: String,
        /// HTTP status returned by the API.
        status: StatusCode,
    },

    /// A response decoded as JSON but did not have the expected shape.
    #[error("malformed payload: {0}")]
    Decode(#[from] DecodeError),

    /// The response body was not valid JSON.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport failure with no HTTP status (DNS, TCP, TLS, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The live event stream failed to connect, send or receive.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Client configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Shape errors raised while turning an untyped payload into a record.
///
/// Callers should treat every variant as "the server sent something this
/// client version does not understand".
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A required field was absent or `null`.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Payload key that was expected.
        field: String,
    },

    /// A field was present but held an unusable value.
    #[error("invalid value for field '{field}': {value}")]
    InvalidValue {
        /// Payload key holding the bad value.
        field: String,
        /// The offending value, rendered as JSON.
        value: String,
    },

    /// A timestamp field was not ISO-8601 / RFC 3339.
    #[error("invalid timestamp in field '{field}': {value}")]
    InvalidTimestamp {
        /// Payload key holding the bad value.
        field: String,
        /// The string that failed to parse.
        value: String,
        /// Parser diagnostics.
        #[source]
        source: chrono::ParseError,
    },

    /// The payload (or a list element) was not a JSON object.
    #[error("expected a JSON object for {context}")]
    NotAnObject {
        /// What was being decoded.
        context: String,
    },
}

fn render_validation(message: &str, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("Validation error on field '{field}': {message}"),
        None => format!("Validation error: {message}"),
    }
}

impl MeshLogicError {
    /// Builds an `Authentication` error.
    pub fn authentication(message: impl Into<String>) -> Self {
        MeshLogicError::Authentication {
            message: message.into(),
        }
    }

    /// Builds a `Validation` error, optionally naming the offending field.
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        MeshLogicError::Validation {
            message: message.into(),
            field: field.map(str::to_owned),
        }
    }

    /// Machine-readable error code, when this failure kind has one.
    pub fn code(&self) -> Option<&str> {
        match self {
            MeshLogicError::Authentication { .. } => Some("AUTH_ERROR"),
            MeshLogicError::NotFound { .. } => Some("NOT_FOUND"),
            MeshLogicError::RateLimit { .. } => Some("RATE_LIMIT"),
            MeshLogicError::Validation { .. } => Some("VALIDATION_ERROR"),
            MeshLogicError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// HTTP-style status associated with this failure kind.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MeshLogicError::Authentication { .. } => Some(401),
            MeshLogicError::NotFound { .. } => Some(404),
            MeshLogicError::RateLimit { .. } => Some(429),
            MeshLogicError::Validation { .. } => Some(400),
            MeshLogicError::Api { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }

    /// The bare message, without the code prefix added by `Display`.
    ///
    /// Wrapped library errors (decode, parse, transport) have no separate
    /// message and render in full.
    pub fn message(&self) -> String {
        match self {
            MeshLogicError::Authentication { message }
            | MeshLogicError::NotFound { message }
            | MeshLogicError::RateLimit { message, .. }
            | MeshLogicError::Validation { message, .. }
            | MeshLogicError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Seconds to wait before retrying, for rate-limit failures only.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            MeshLogicError::RateLimit { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Translates a non-success HTTP response into the matching failure.
    ///
    /// `retry_after` is the raw `Retry-After` header, `body` the raw
    /// response body and `path` the request path (used in 404 messages).
    pub(crate) fn from_response(
        status: StatusCode,
        retry_after: Option<&str>,
        body: &[u8],
        path: &str,
    ) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => {
                MeshLogicError::authentication("Invalid or expired API key")
            }
            StatusCode::NOT_FOUND => MeshLogicError::NotFound {
                message: format!("Resource not found: {path}"),
            },
            StatusCode::TOO_MANY_REQUESTS => MeshLogicError::RateLimit {
                message: "Rate limit exceeded".to_string(),
                retry_after: parse_retry_after(retry_after),
            },
            _ => {
                let body: serde_json::Value =
                    serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
                let field = |name: &str, fallback: &str| {
                    body.get(name)
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or(fallback)
                        .to_string()
                };
                MeshLogicError::Api {
                    code: field("code", "UNKNOWN"),
                    message: field("message", "Unknown error"),
                    status,
                }
            }
        }
    }
}

/// Parses a delay-seconds `Retry-After` value. HTTP-date forms and garbage
/// fall back to [`DEFAULT_RETRY_AFTER_SECS`].
fn parse_retry_after(header: Option<&str>) -> u64 {
    header
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, MeshLogicError>;
