//! Pulsewire - resilient push-notification client.
//!
//! This crate maintains a persistent push channel to a server and turns
//! inbound push events into a locally-managed, time-limited queue of
//! user-visible notifications.
//!
//! # Architecture
//!
//! Data flows one way through three components:
//!
//! - **[`connection::PushClient`]** - owns the single socket; implements
//!   the connect/retry/heartbeat state machine (exponential backoff,
//!   25s keep-alive pings, indefinite retries)
//! - **[`dispatch::Dispatcher`]** - classifies each inbound frame as
//!   control (consumed) or user-facing (validated, normalized, forwarded)
//! - **[`store::NotificationStore`]** - owns the ordered collection of
//!   active notifications and each item's auto-dismiss timer
//!
//! The presentation layer subscribes to the store and reports manual
//! dismissals back into it; it never touches the transport.
//!
//! # Modules
//!
//! - [`connection`] - push channel lifecycle management
//! - [`dispatch`] - inbound frame classification and routing
//! - [`store`] - notification queue and data model
//! - [`ws`] - WebSocket transport wrapper
//! - [`config`] - configuration loading/saving
//! - [`constants`] - timing constants

// Library modules
pub mod config;
pub mod connection;
pub mod constants;
pub mod dispatch;
pub mod store;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use connection::{ConnectionState, PushClient};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use store::{NewNotification, NotificationItem, NotificationKind, NotificationStore};
