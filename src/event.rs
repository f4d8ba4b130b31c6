//! Telemetry event records and the polymorphic event decoder.
//!
//! The API delivers every event as one flat JSON object. A `type`
//! discriminator says which extra fields ride along with the common ones:
//!
//! ```json
//! {
//!   "id": "e1", "type": "file", "action": "rename",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "device_id": "d1", "customer_id": "c1",
//!   "path": "/tmp/a", "target_path": "/tmp/b"
//! }
//! ```
//!
//! [`Event`] is a closed enum over the three known shapes. Each variant
//! embeds an [`EventBase`] holding the common fields plus the untouched
//! source object (`raw`), so fields added server-side are never lost even
//! before this crate learns to type them.
//!
//! ## Decoding rules
//!
//! 1. `type` defaults to `process` when absent. Any other value outside
//!    `process | file | network` is a [`MeshLogicError::Validation`].
//! 2. The chosen variant decodes the *whole* payload: base fields and
//!    variant fields in one pass.
//! 3. Optional variant fields fall back to `0`, `""`, `"tcp"` (network
//!    protocol) or `None` (`exit_code`, `target_path`).
//! 4. `id`, `timestamp`, `device_id` and `customer_id` are required.
//! 5. `timestamp` must be RFC 3339; it is normalised to UTC.
//! 6. `action` defaults per variant (`exec`, `open`, `connect`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::error::{MeshLogicError, Result};
use crate::payload::{self, Map};

// ── Discriminators ─────────────────────────────────────────────────────

/// The `type` discriminator of an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventType {
    /// Process lifecycle: exec, exit, fork.
    Process,
    /// Filesystem activity: open, write, delete, rename.
    File,
    /// Socket activity: connect, accept, send, receive.
    Network,
}

/// What happened. The meaningful subset depends on [`EventType`], but the
/// server is not held to it: any action decodes under any type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventAction {
    /// A process image was executed.
    Exec,
    /// A process exited; `exit_code` is usually set.
    Exit,
    /// A process forked.
    Fork,
    /// A file was opened.
    Open,
    /// A file was written.
    Write,
    /// A file was deleted.
    Delete,
    /// A file was renamed; `target_path` is usually set.
    Rename,
    /// An outbound connection was made.
    Connect,
    /// An inbound connection was accepted.
    Accept,
    /// Data was sent.
    Send,
    /// Data was received.
    Receive,
}

// ── Records ────────────────────────────────────────────────────────────

/// Fields shared by every event variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBase {
    /// Opaque event identifier.
    pub id: String,
    /// What happened.
    pub action: EventAction,
    /// When it happened, in UTC.
    pub timestamp: DateTime<Utc>,
    /// Device that reported the event.
    pub device_id: String,
    /// Tenant that owns the device.
    pub customer_id: String,
    /// The complete payload this record was decoded from.
    #[serde(skip)]
    pub raw: Map,
}

impl EventBase {
    fn from_map(map: &Map, default_action: EventAction) -> Result<Self> {
        Ok(EventBase {
            id: payload::required_str(map, "id")?,
            action: payload::enum_or(map, "action", default_action)?,
            timestamp: payload::required_timestamp(map, "timestamp")?,
            device_id: payload::required_str(map, "device_id")?,
            customer_id: payload::required_str(map, "customer_id")?,
            raw: map.clone(),
        })
    }
}

/// A process lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessEvent {
    /// Common event fields.
    #[serde(flatten)]
    pub base: EventBase,
    /// Process id.
    pub pid: u32,
    /// Parent process id.
    pub ppid: u32,
    /// Short process name.
    pub process_name: String,
    /// Absolute path of the executable image.
    pub executable_path: String,
    /// Full command line.
    pub command_line: String,
    /// Account the process ran as.
    pub user: String,
    /// Exit status; only reported for `exit` actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ProcessEvent {
    /// Decodes a process event from a full event payload.
    pub fn from_map(map: &Map) -> Result<Self> {
        Ok(ProcessEvent {
            base: EventBase::from_map(map, EventAction::Exec)?,
            pid: payload::int_or(map, "pid", 0)?,
            ppid: payload::int_or(map, "ppid", 0)?,
            process_name: payload::str_or(map, "process_name", "")?,
            executable_path: payload::str_or(map, "executable_path", "")?,
            command_line: payload::str_or(map, "command_line", "")?,
            user: payload::str_or(map, "user", "")?,
            exit_code: payload::optional_int(map, "exit_code")?,
        })
    }
}

/// A filesystem event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEvent {
    /// Common event fields.
    #[serde(flatten)]
    pub base: EventBase,
    /// Path the action applied to.
    pub path: String,
    /// Destination path; only reported for `rename` actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    /// Process that touched the file.
    pub pid: u32,
    /// Name of that process.
    pub process_name: String,
}

impl FileEvent {
    /// Decodes a file event from a full event payload.
    pub fn from_map(map: &Map) -> Result<Self> {
        Ok(FileEvent {
            base: EventBase::from_map(map, EventAction::Open)?,
            path: payload::str_or(map, "path", "")?,
            target_path: payload::optional_str(map, "target_path")?,
            pid: payload::int_or(map, "pid", 0)?,
            process_name: payload::str_or(map, "process_name", "")?,
        })
    }
}

/// A network socket event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEvent {
    /// Common event fields.
    #[serde(flatten)]
    pub base: EventBase,
    /// Process owning the socket.
    pub pid: u32,
    /// Name of that process.
    pub process_name: String,
    /// Local address.
    pub local_address: String,
    /// Local port.
    pub local_port: u16,
    /// Remote address.
    pub remote_address: String,
    /// Remote port.
    pub remote_port: u16,
    /// Transport protocol, `tcp` unless the server says otherwise.
    pub protocol: String,
}

impl NetworkEvent {
    /// Decodes a network event from a full event payload.
    pub fn from_map(map: &Map) -> Result<Self> {
        Ok(NetworkEvent {
            base: EventBase::from_map(map, EventAction::Connect)?,
            pid: payload::int_or(map, "pid", 0)?,
            process_name: payload::str_or(map, "process_name", "")?,
            local_address: payload::str_or(map, "local_address", "")?,
            local_port: payload::int_or(map, "local_port", 0)?,
            remote_address: payload::str_or(map, "remote_address", "")?,
            remote_port: payload::int_or(map, "remote_port", 0)?,
            protocol: payload::str_or(map, "protocol", "tcp")?,
        })
    }
}

/// A telemetry event of any known type.
///
/// Serializes back to the wire shape, with `type` as the tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// `type = "process"`.
    Process(ProcessEvent),
    /// `type = "file"`.
    File(FileEvent),
    /// `type = "network"`.
    Network(NetworkEvent),
}

impl Event {
    /// Decodes any JSON value that should hold a single event.
    pub fn from_value(value: &Value) -> Result<Self> {
        Event::from_map(payload::as_object(value, "event")?)
    }

    /// Reads the discriminator and dispatches to the variant decoder.
    pub fn from_map(map: &Map) -> Result<Self> {
        match event_type(map)? {
            EventType::Process => ProcessEvent::from_map(map).map(Event::Process),
            EventType::File => FileEvent::from_map(map).map(Event::File),
            EventType::Network => NetworkEvent::from_map(map).map(Event::Network),
        }
    }

    /// The variant's discriminator.
    pub fn kind(&self) -> EventType {
        match self {
            Event::Process(_) => EventType::Process,
            Event::File(_) => EventType::File,
            Event::Network(_) => EventType::Network,
        }
    }

    /// Fields shared by every variant.
    pub fn base(&self) -> &EventBase {
        match self {
            Event::Process(e) => &e.base,
            Event::File(e) => &e.base,
            Event::Network(e) => &e.base,
        }
    }

    /// Event identifier.
    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// What happened.
    pub fn action(&self) -> EventAction {
        self.base().action
    }

    /// When it happened.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.base().timestamp
    }

    /// Reporting device.
    pub fn device_id(&self) -> &str {
        &self.base().device_id
    }

    /// Owning tenant.
    pub fn customer_id(&self) -> &str {
        &self.base().customer_id
    }

    /// The complete source payload, including fields this crate does not type.
    pub fn raw(&self) -> &Map {
        &self.base().raw
    }

    /// Process id of the actor, present on every variant.
    pub fn pid(&self) -> u32 {
        match self {
            Event::Process(e) => e.pid,
            Event::File(e) => e.pid,
            Event::Network(e) => e.pid,
        }
    }

    /// Process name of the actor, present on every variant.
    pub fn process_name(&self) -> &str {
        match self {
            Event::Process(e) => &e.process_name,
            Event::File(e) => &e.process_name,
            Event::Network(e) => &e.process_name,
        }
    }
}

impl TryFrom<&Value> for Event {
    type Error = MeshLogicError;

    fn try_from(value: &Value) -> Result<Self> {
        Event::from_value(value)
    }
}

fn event_type(map: &Map) -> Result<EventType> {
    match map.get("type") {
        None | Some(Value::Null) => Ok(EventType::Process),
        Some(Value::String(raw)) => raw.parse().map_err(|_| {
            MeshLogicError::validation(format!("unrecognized event type '{raw}'"), Some("type"))
        }),
        Some(other) => Err(MeshLogicError::validation(
            format!("event type must be a string, got {other}"),
            Some("type"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use serde_json::json;

    fn base_payload(kind: &str) -> Value {
        json!({
            "id": "e1",
            "type": kind,
            "timestamp": "2025-01-01T00:00:00Z",
            "device_id": "d1",
            "customer_id": "c1"
        })
    }

    fn with(mut value: Value, extra: Value) -> Value {
        let target = value.as_object_mut().unwrap();
        for (k, v) in extra.as_object().unwrap() {
            target.insert(k.clone(), v.clone());
        }
        value
    }

    #[test]
    fn file_delete_scenario() {
        let payload = with(
            base_payload("file"),
            json!({"action": "delete", "path": "/tmp/x"}),
        );
        let event = Event::from_value(&payload).unwrap();
        let Event::File(file) = &event else {
            panic!("expected file event, got {event:?}");
        };
        assert_eq!(file.base.action, EventAction::Delete);
        assert_eq!(file.path, "/tmp/x");
        assert_eq!(file.target_path, None);
        assert_eq!(file.pid, 0, "missing pid defaults to 0");
        assert_eq!(event.kind(), EventType::File);
    }

    #[test]
    fn missing_type_decodes_as_process() {
        let mut payload = base_payload("process");
        payload.as_object_mut().unwrap().remove("type");
        let event = Event::from_value(&payload).unwrap();
        assert_eq!(event.kind(), EventType::Process);
        assert_eq!(event.action(), EventAction::Exec, "process action defaults to exec");
    }

    #[test]
    fn missing_type_still_requires_base_fields() {
        let payload = json!({"timestamp": "2025-01-01T00:00:00Z"});
        let err = Event::from_value(&payload).unwrap_err();
        assert!(
            matches!(err, MeshLogicError::Decode(DecodeError::MissingField { ref field }) if field == "id"),
            "got {err:?}"
        );
    }

    #[test]
    fn unknown_type_is_a_validation_failure() {
        let err = Event::from_value(&base_payload("dns")).unwrap_err();
        match err {
            MeshLogicError::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("type"));
                assert!(message.contains("dns"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn non_string_type_is_a_validation_failure() {
        let err = Event::from_value(&with(base_payload("x"), json!({"type": 3}))).unwrap_err();
        assert!(matches!(err, MeshLogicError::Validation { .. }));
    }

    #[test]
    fn each_required_base_field_is_enforced() {
        for field in ["id", "timestamp", "device_id", "customer_id"] {
            let mut payload = base_payload("network");
            payload.as_object_mut().unwrap().remove(field);
            let err = Event::from_value(&payload).unwrap_err();
            assert!(
                matches!(&err, MeshLogicError::Decode(DecodeError::MissingField { field: f }) if f == field),
                "removing '{field}' should fail with MissingField, got {err:?}"
            );
        }
    }

    #[test]
    fn bad_timestamp_fails() {
        let payload = with(base_payload("file"), json!({"timestamp": "last tuesday"}));
        let err = Event::from_value(&payload).unwrap_err();
        assert!(matches!(
            err,
            MeshLogicError::Decode(DecodeError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn unknown_action_fails() {
        let payload = with(base_payload("file"), json!({"action": "chmod"}));
        let err = Event::from_value(&payload).unwrap_err();
        assert!(matches!(
            err,
            MeshLogicError::Decode(DecodeError::InvalidValue { ref field, .. }) if field == "action"
        ));
    }

    #[test]
    fn variant_defaults_apply() {
        let file = Event::from_value(&base_payload("file")).unwrap();
        assert_eq!(file.action(), EventAction::Open);

        let Event::Network(net) = Event::from_value(&base_payload("network")).unwrap() else {
            panic!("expected network event");
        };
        assert_eq!(net.base.action, EventAction::Connect);
        assert_eq!(net.protocol, "tcp");
        assert_eq!(net.local_port, 0);
        assert_eq!(net.remote_address, "");

        let Event::Process(proc_) = Event::from_value(&base_payload("process")).unwrap() else {
            panic!("expected process event");
        };
        assert_eq!(proc_.exit_code, None);
        assert_eq!(proc_.command_line, "");
    }

    #[test]
    fn process_exit_carries_exit_code() {
        let payload = with(
            base_payload("process"),
            json!({
                "action": "exit", "pid": 4242, "ppid": 1,
                "process_name": "curl", "executable_path": "/usr/bin/curl",
                "command_line": "curl https://example.com", "user": "root",
                "exit_code": 7
            }),
        );
        let Event::Process(p) = Event::from_value(&payload).unwrap() else {
            panic!("expected process event");
        };
        assert_eq!(p.base.action, EventAction::Exit);
        assert_eq!(p.pid, 4242);
        assert_eq!(p.ppid, 1);
        assert_eq!(p.user, "root");
        assert_eq!(p.exit_code, Some(7));
    }

    #[test]
    fn raw_keeps_unknown_fields() {
        let payload = with(
            base_payload("network"),
            json!({"remote_port": 443, "ja3": "771,4865-4866", "geo": {"cc": "AU"}}),
        );
        let event = Event::from_value(&payload).unwrap();
        assert_eq!(event.raw(), payload.as_object().unwrap());
        assert_eq!(event.raw()["ja3"], "771,4865-4866");
    }

    #[test]
    fn typed_fields_survive_reencoding() {
        let payloads = [
            with(
                base_payload("process"),
                json!({"action": "fork", "pid": 10, "ppid": 2, "process_name": "sh",
                       "executable_path": "/bin/sh", "command_line": "sh -c id",
                       "user": "alice", "exit_code": 0}),
            ),
            with(
                base_payload("file"),
                json!({"action": "rename", "path": "/a", "target_path": "/b",
                       "pid": 3, "process_name": "mv"}),
            ),
            with(
                base_payload("network"),
                json!({"action": "accept", "pid": 9, "process_name": "nginx",
                       "local_address": "10.0.0.1", "local_port": 443,
                       "remote_address": "203.0.113.9", "remote_port": 51234,
                       "protocol": "udp"}),
            ),
        ];
        for payload in payloads {
            let event = Event::from_value(&payload).unwrap();
            let encoded = serde_json::to_value(&event).unwrap();
            for (key, original) in payload.as_object().unwrap() {
                if key == "timestamp" {
                    continue;
                }
                assert_eq!(&encoded[key], original, "field '{key}' changed on re-encode");
            }
            let decoded_again = Event::from_value(&encoded).unwrap();
            assert_eq!(decoded_again.timestamp(), event.timestamp());
            assert_eq!(decoded_again.kind(), event.kind());
        }
    }

    #[test]
    fn shared_accessors_cover_all_variants() {
        let payload = with(base_payload("file"), json!({"pid": 77, "process_name": "vim"}));
        let event = Event::try_from(&payload).unwrap();
        assert_eq!(event.id(), "e1");
        assert_eq!(event.device_id(), "d1");
        assert_eq!(event.customer_id(), "c1");
        assert_eq!(event.pid(), 77);
        assert_eq!(event.process_name(), "vim");
    }

    #[test]
    fn event_type_strings_are_lowercase() {
        assert_eq!(EventType::Network.to_string(), "network");
        assert_eq!("file".parse::<EventType>().unwrap(), EventType::File);
        assert!("File".parse::<EventType>().is_err());
    }
}
