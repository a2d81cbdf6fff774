//! # Alert Channel
//!
//! Real-time alert delivery for the HR back-office: a STOMP-over-WebSocket
//! client with a bounded fixed-interval reconnect, an idempotent topic
//! registry and typed listener fan-out.
//!
//! ## Features
//!
//! - **Connection Manager**: `disconnected → connecting → connected | error`
//!   with de-duplicated status notifications
//! - **Bounded Reconnect**: constant interval, capped attempt count, fully
//!   cancellable by `disconnect()`
//! - **Structural Classification**: alert upserts, deletions and stats ticks
//!   recognised by payload shape behind a pluggable [`channel::EventClassifier`]
//! - **Typed Listeners**: per-event emitters with idempotent disposers and
//!   panic isolation
//! - **Consumer Feed**: REST snapshot plus pushed deltas folded into a local
//!   projection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alert_channel::channel::{AlertChannel, ChannelConfig, ConnectionState, Topic};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = AlertChannel::new(ChannelConfig::new("http://localhost:8080/ws"))?;
//!
//!     let _status = channel.on_status(|state| println!("alert channel: {state}"));
//!     let _alerts = channel.on_alert(|alert| println!("[{}] {}", alert.severity, alert.message));
//!
//!     channel.connect().await?;
//!     channel.subscribe_topic(Topic::employee_alerts(42));
//!     channel.subscribe_topic(Topic::stats());
//!
//!     tokio::signal::ctrl_c().await?;
//!     channel.disconnect();
//!     assert_eq!(channel.state(), ConnectionState::Disconnected);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod feed;
pub(crate) mod reconnect;
pub mod rest;
pub mod stomp;
pub mod transport;

// Re-export commonly used types
pub use channel::{
    Alert, AlertChannel, ChannelConfig, ChannelOptions, ConnectionState, Disposer, Topic,
};
pub use error::{ChannelError, ChannelResult};
pub use feed::{AlertFeed, AlertProjection, FeedOptions};
pub use rest::{AlertsApi, HttpAlertsApi};
pub use transport::{FrameSink, FrameStream, Session, Transport, WsTransport};
