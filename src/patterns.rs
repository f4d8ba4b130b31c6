//! Detection patterns and their match history.
//!
//! | Method | API Path |
//! |--------|----------|
//! | [`Patterns::list`] | GET `/v1/patterns` |
//! | [`Patterns::matches`] | GET `/v1/patterns/matches` |

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::client::MeshLogicClient;
use crate::error::Result;
use crate::payload::{self, Map, Page};

/// How urgent a pattern (or a match of it) is.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Critical.
    Critical,
}

/// A detection rule evaluated server-side against incoming events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    /// Pattern identifier.
    pub id: String,
    /// Short name.
    pub name: String,
    /// Grouping such as `persistence` or `exfiltration`.
    pub category: String,
    /// What the pattern detects.
    pub description: String,
    /// Severity assigned to matches.
    pub severity: Severity,
    /// Whether the pattern is currently evaluated. Defaults to `true`.
    pub enabled: bool,
}

impl Pattern {
    /// Decodes a pattern from its JSON object.
    pub fn from_map(map: &Map) -> Result<Self> {
        Ok(Pattern {
            id: payload::required_str(map, "id")?,
            name: payload::required_str(map, "name")?,
            category: payload::required_str(map, "category")?,
            description: payload::required_str(map, "description")?,
            severity: payload::required_enum(map, "severity")?,
            enabled: payload::bool_or(map, "enabled", true)?,
        })
    }
}

/// One occurrence of a pattern firing on an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    /// Match identifier.
    pub id: String,
    /// Pattern that fired.
    pub pattern_id: String,
    /// Name of that pattern at match time.
    pub pattern_name: String,
    /// Event that triggered it.
    pub event_id: String,
    /// Device the event came from.
    pub device_id: String,
    /// When the match was recorded.
    pub timestamp: DateTime<Utc>,
    /// Severity at match time.
    pub severity: Severity,
    /// Pattern-specific evidence. Empty when the server sends none.
    pub details: Map,
}

impl PatternMatch {
    /// Decodes a match from its JSON object.
    pub fn from_map(map: &Map) -> Result<Self> {
        Ok(PatternMatch {
            id: payload::required_str(map, "id")?,
            pattern_id: payload::required_str(map, "pattern_id")?,
            pattern_name: payload::required_str(map, "pattern_name")?,
            event_id: payload::required_str(map, "event_id")?,
            device_id: payload::required_str(map, "device_id")?,
            timestamp: payload::required_timestamp(map, "timestamp")?,
            severity: payload::required_enum(map, "severity")?,
            details: payload::object_or_empty(map, "details")?,
        })
    }
}

/// Query parameters for [`Patterns::list`]. Both filters default to unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternsListParams {
    /// Only patterns in this category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Only enabled (`true`) or disabled (`false`) patterns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Query parameters for [`Patterns::matches`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchesParams {
    /// Only matches of this pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    /// Only matches on this device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Lower time bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Page size. Defaults to 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Default for MatchesParams {
    fn default() -> Self {
        MatchesParams {
            pattern_id: None,
            device_id: None,
            since: None,
            limit: Some(100),
        }
    }
}

/// Pattern operations. Obtained from [`MeshLogicClient::patterns`].
#[derive(Debug, Clone, Copy)]
pub struct Patterns<'a> {
    client: &'a MeshLogicClient,
}

impl<'a> Patterns<'a> {
    pub(crate) fn new(client: &'a MeshLogicClient) -> Self {
        Patterns { client }
    }

    /// Lists detection patterns.
    pub async fn list(&self, params: &PatternsListParams) -> Result<Page<Pattern>> {
        let body = self.client.get_json("/v1/patterns", Some(params)).await?;
        Page::from_value(&body, "patterns", Pattern::from_map)
    }

    /// Lists recent pattern matches, newest first.
    pub async fn matches(&self, params: &MatchesParams) -> Result<Page<PatternMatch>> {
        let body = self
            .client
            .get_json("/v1/patterns/matches", Some(params))
            .await?;
        Page::from_value(&body, "matches", PatternMatch::from_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pattern_enabled_defaults_true() {
        let body = json!({
            "id": "p1", "name": "Reverse shell", "category": "execution",
            "description": "Shell with socket stdio", "severity": "critical"
        });
        let pattern = Pattern::from_map(body.as_object().unwrap()).unwrap();
        assert!(pattern.enabled);
        assert_eq!(pattern.severity, Severity::Critical);
    }

    #[test]
    fn match_details_default_empty() {
        let body = json!({
            "id": "m1", "pattern_id": "p1", "pattern_name": "Reverse shell",
            "event_id": "e1", "device_id": "d1",
            "timestamp": "2025-03-04T05:06:07Z", "severity": "high"
        });
        let m = PatternMatch::from_map(body.as_object().unwrap()).unwrap();
        assert!(m.details.is_empty());
        assert_eq!(m.severity, Severity::High);
    }

    #[test]
    fn severities_order_by_urgency() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Info < Severity::Low);
    }

    #[test]
    fn enabled_filter_encodes_as_lowercase_bool() {
        let params = PatternsListParams {
            category: None,
            enabled: Some(false),
        };
        assert_eq!(serde_urlencoded::to_string(&params).unwrap(), "enabled=false");
        assert_eq!(
            serde_urlencoded::to_string(PatternsListParams::default()).unwrap(),
            ""
        );
    }

    #[test]
    fn matches_params_default_to_limit_only() {
        assert_eq!(
            serde_urlencoded::to_string(MatchesParams::default()).unwrap(),
            "limit=100"
        );
    }
}
