//! Async Rust client library for the MeshLogic security-telemetry API.
//!
//! Provides an authenticated HTTP client, typed decoding of the polymorphic
//! process/file/network event payloads, facades for events, devices and
//! detection patterns, and a WebSocket consumer for the live event stream.
//!
//! # Modules
//!
//! - [`client`]: Authenticated HTTP wrapper and status-code translation.
//! - [`config`]: Client settings, region table, TOML loading.
//! - [`error`]: Typed error hierarchy (`MeshLogicError`) for all library operations.
//! - [`event`]: Event records and the polymorphic decoder.
//! - [`events`]: List, get, export and stream events.
//! - [`devices`]: Device lookup, listing and fleet status.
//! - [`patterns`]: Detection patterns and matches.
//! - [`payload`]: Field extraction from untyped JSON objects, and [`Page`].
//! - [`stream`]: Live event subscription over WebSocket.
//!
//! # Quick Start
//!
//! ```ignore
//! use meshlogic::{ClientConfig, MeshLogicClient};
//! use meshlogic::events::EventsListParams;
//!
//! let client = MeshLogicClient::new(ClientConfig::default().with_api_key("ml_live_..."))?;
//! let page = client.events().list(&EventsListParams::default()).await?;
//! for event in &page.items {
//!     println!("{} {} {}", event.kind(), event.action(), event.process_name());
//! }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod devices;
pub mod error;
pub mod event;
pub mod events;
pub mod patterns;
pub mod payload;
pub mod stream;

pub use client::MeshLogicClient;
pub use config::ClientConfig;
pub use error::{DecodeError, MeshLogicError, Result};
pub use event::{Event, EventAction, EventBase, EventType, FileEvent, NetworkEvent, ProcessEvent};
pub use payload::Page;
pub use stream::{EventStream, StreamSubscription};
