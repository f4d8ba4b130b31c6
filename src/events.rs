//! Event queries, bulk export and the live stream.
//!
//! | Method | API Path |
//! |--------|----------|
//! | [`Events::list`] | GET `/v1/events` |
//! | [`Events::get`] | GET `/v1/events/{id}` |
//! | [`Events::export`] | GET `/v1/events/export` |
//! | [`Events::stream`] | WebSocket `/v1/events/stream` |
//!
//! Filters are plain `Option`s. Unset filters are left off the query
//! string entirely, and `limit`/`offset` go out verbatim: the server owns
//! the valid ranges.

use bytes::Bytes;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::client::MeshLogicClient;
use crate::error::Result;
use crate::event::{Event, EventType};
use crate::payload::Page;
use crate::stream::{EventStream, StreamSubscription};

// ── Request types ──────────────────────────────────────────────────────

/// Query parameters for [`Events::list`].
///
/// `since`/`until` accept ISO-8601 instants or the relative forms the API
/// understands (`"1h"`, `"24h"`); they are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventsListParams {
    /// Only events of this type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    /// Only events from this device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Lower time bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Upper time bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    /// Page size. Defaults to 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Page offset. Defaults to 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl Default for EventsListParams {
    fn default() -> Self {
        EventsListParams {
            event_type: None,
            device_id: None,
            since: None,
            until: None,
            limit: Some(100),
            offset: Some(0),
        }
    }
}

/// File format for [`Events::export`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    /// JSON array of events.
    #[default]
    Json,
    /// Comma-separated values.
    Csv,
    /// Apache Parquet.
    Parquet,
}

/// Query parameters for [`Events::export`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportParams {
    /// Output format. Always sent.
    pub format: ExportFormat,
    /// Only events of this type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    /// Lower time bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Upper time bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

// ── Facade ─────────────────────────────────────────────────────────────

/// Event operations. Obtained from [`MeshLogicClient::events`].
#[derive(Debug, Clone, Copy)]
pub struct Events<'a> {
    client: &'a MeshLogicClient,
}

impl<'a> Events<'a> {
    pub(crate) fn new(client: &'a MeshLogicClient) -> Self {
        Events { client }
    }

    /// Lists events matching `params`, newest first.
    ///
    /// Each element of the response's `events` array is decoded through
    /// [`Event::from_map`]; one bad element fails the whole call.
    ///
    /// # Errors
    ///
    /// - `MeshLogicError::Authentication` / `RateLimit` / `Api`: non-success status.
    /// - `MeshLogicError::Validation`: an element has an unknown `type`.
    /// - `MeshLogicError::Decode`: an element is missing required fields.
    /// - `MeshLogicError::Network`: transport-level failure.
    pub async fn list(&self, params: &EventsListParams) -> Result<Page<Event>> {
        let body = self.client.get_json("/v1/events", Some(params)).await?;
        Page::from_value(&body, "events", Event::from_map)
    }

    /// Fetches a single event by id.
    ///
    /// # Errors
    ///
    /// - `MeshLogicError::NotFound`: no event with that id.
    /// - Otherwise as for [`Events::list`].
    pub async fn get(&self, event_id: &str) -> Result<Event> {
        let path = format!("/v1/events/{event_id}");
        let body = self.client.get_json::<()>(&path, None).await?;
        Event::from_value(&body)
    }

    /// Exports events as an opaque file in the requested format.
    ///
    /// The body is returned as-is; CSV and Parquet are not parsed.
    ///
    /// # Errors
    ///
    /// Same status mapping as [`Events::list`].
    pub async fn export(&self, params: &ExportParams) -> Result<Bytes> {
        let bytes = self
            .client
            .get_bytes("/v1/events/export", Some(params))
            .await?;
        tracing::debug!(format = %params.format, bytes = bytes.len(), "events exported");
        Ok(bytes)
    }

    /// Opens the live event stream and sends the subscription frame.
    ///
    /// Returns once the subscription has been sent; read events with
    /// [`EventStream::next_event`]. See [`crate::stream`] for the frame
    /// protocol and termination rules.
    ///
    /// # Errors
    ///
    /// - `MeshLogicError::WebSocket`: the upgrade or the first send failed.
    /// - `MeshLogicError::Config`: the base URL has no WebSocket equivalent.
    pub async fn stream(&self, subscription: &StreamSubscription) -> Result<EventStream> {
        EventStream::connect(self.client, subscription).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_default_sends_paging_only() {
        let encoded = serde_urlencoded::to_string(EventsListParams::default()).unwrap();
        assert_eq!(encoded, "limit=100&offset=0");
    }

    #[test]
    fn list_params_omit_unset_filters() {
        let params = EventsListParams {
            event_type: Some(EventType::Network),
            device_id: Some("dev-1".to_string()),
            limit: None,
            offset: None,
            ..EventsListParams::default()
        };
        let encoded = serde_urlencoded::to_string(&params).unwrap();
        assert_eq!(encoded, "type=network&device_id=dev-1");
        assert!(!encoded.contains("since"), "unset filters must not be sent");
    }

    #[test]
    fn list_params_pass_limit_through_verbatim() {
        // No client-side clamping: the server decides what is too large.
        let params = EventsListParams {
            limit: Some(50_000),
            ..EventsListParams::default()
        };
        let encoded = serde_urlencoded::to_string(&params).unwrap();
        assert!(encoded.contains("limit=50000"));
    }

    #[test]
    fn export_params_always_send_format() {
        let encoded = serde_urlencoded::to_string(ExportParams::default()).unwrap();
        assert_eq!(encoded, "format=json");

        let params = ExportParams {
            format: ExportFormat::Parquet,
            event_type: Some(EventType::File),
            since: Some("24h".to_string()),
            until: None,
        };
        let encoded = serde_urlencoded::to_string(&params).unwrap();
        assert_eq!(encoded, "format=parquet&type=file&since=24h");
    }

    #[test]
    fn export_format_parses_from_cli_spelling() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
