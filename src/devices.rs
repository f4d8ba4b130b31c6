//! Monitored devices and fleet status.
//!
//! | Method | API Path |
//! |--------|----------|
//! | [`Devices::list`] | GET `/v1/devices` |
//! | [`Devices::get`] | GET `/v1/devices/{id}` |
//! | [`Devices::status`] | GET `/v1/devices/status` |

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::client::MeshLogicClient;
use crate::error::Result;
use crate::payload::{self, Map, Page};

// ── Response types ─────────────────────────────────────────────────────

/// Operating system family of a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    /// Linux.
    Linux,
    /// macOS.
    Macos,
    /// Windows.
    Windows,
}

/// Agent connectivity as last reported.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceStatus {
    /// Agent is connected and reporting.
    Online,
    /// Agent has not reported recently.
    Offline,
    /// Agent is connected but some sensors are failing.
    Degraded,
}

/// A device running the MeshLogic agent.
///
/// Every field is required; a device payload missing any of them is
/// rejected as malformed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    /// Device identifier.
    pub id: String,
    /// Hostname as reported by the agent.
    pub hostname: String,
    /// OS family.
    pub platform: Platform,
    /// OS version string.
    pub os_version: String,
    /// Agent version string.
    pub agent_version: String,
    /// Last time the agent checked in.
    pub last_seen: DateTime<Utc>,
    /// Connectivity state.
    pub status: DeviceStatus,
    /// Owning tenant.
    pub customer_id: String,
}

impl Device {
    /// Decodes a device from its JSON object.
    pub fn from_map(map: &Map) -> Result<Self> {
        Ok(Device {
            id: payload::required_str(map, "id")?,
            hostname: payload::required_str(map, "hostname")?,
            platform: payload::required_enum(map, "platform")?,
            os_version: payload::required_str(map, "os_version")?,
            agent_version: payload::required_str(map, "agent_version")?,
            last_seen: payload::required_timestamp(map, "last_seen")?,
            status: payload::required_enum(map, "status")?,
            customer_id: payload::required_str(map, "customer_id")?,
        })
    }

    /// Decodes a device from any JSON value.
    pub fn from_value(value: &Value) -> Result<Self> {
        Device::from_map(payload::as_object(value, "device")?)
    }
}

/// Device counts across the fleet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetStatus {
    /// All devices.
    pub total: u64,
    /// Devices currently online.
    pub online: u64,
    /// Devices currently offline.
    pub offline: u64,
    /// Devices online with failing sensors.
    pub degraded: u64,
    /// Full response, including any breakdowns not typed here.
    #[serde(skip)]
    pub raw: Map,
}

impl FleetStatus {
    fn from_value(value: &Value) -> Result<Self> {
        let map = payload::as_object(value, "fleet status")?;
        Ok(FleetStatus {
            total: payload::int_or(map, "total", 0)?,
            online: payload::int_or(map, "online", 0)?,
            offline: payload::int_or(map, "offline", 0)?,
            degraded: payload::int_or(map, "degraded", 0)?,
            raw: map.clone(),
        })
    }
}

// ── Request types ──────────────────────────────────────────────────────

/// Query parameters for [`Devices::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevicesListParams {
    /// Only devices in this state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    /// Only devices on this OS family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Page size. Defaults to 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Page offset. Defaults to 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl Default for DevicesListParams {
    fn default() -> Self {
        DevicesListParams {
            status: None,
            platform: None,
            limit: Some(100),
            offset: Some(0),
        }
    }
}

// ── Facade ─────────────────────────────────────────────────────────────

/// Device operations. Obtained from [`MeshLogicClient::devices`].
#[derive(Debug, Clone, Copy)]
pub struct Devices<'a> {
    client: &'a MeshLogicClient,
}

impl<'a> Devices<'a> {
    pub(crate) fn new(client: &'a MeshLogicClient) -> Self {
        Devices { client }
    }

    /// Lists devices matching `params`.
    ///
    /// # Errors
    ///
    /// - `MeshLogicError::Authentication` / `RateLimit` / `Api`: non-success status.
    /// - `MeshLogicError::Decode`: a device is missing fields or has an
    ///   unknown platform/status.
    /// - `MeshLogicError::Network`: transport-level failure.
    pub async fn list(&self, params: &DevicesListParams) -> Result<Page<Device>> {
        let body = self.client.get_json("/v1/devices", Some(params)).await?;
        Page::from_value(&body, "devices", Device::from_map)
    }

    /// Fetches one device by id.
    ///
    /// # Errors
    ///
    /// - `MeshLogicError::NotFound`: unknown device id; the message
    ///   includes the request path.
    /// - Otherwise as for [`Devices::list`].
    pub async fn get(&self, device_id: &str) -> Result<Device> {
        let path = format!("/v1/devices/{device_id}");
        let body = self.client.get_json::<()>(&path, None).await?;
        Device::from_value(&body)
    }

    /// Fetches device counts by connectivity state.
    pub async fn status(&self) -> Result<FleetStatus> {
        let body = self
            .client
            .get_json::<()>("/v1/devices/status", None)
            .await?;
        FleetStatus::from_value(&body)
    }
}
