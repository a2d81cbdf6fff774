//! Real-time alert channel over STOMP.
//!
//! The channel keeps one STOMP session to the backend's SockJS endpoint,
//! retries on a fixed interval with a bounded budget, and fans classified
//! frames out to typed listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌───────────────┐   frames   ┌──────────┐
//! │ AlertChannel │────────────▶│ session driver│◀──────────▶│  broker  │
//! │   (Clone)    │             │  (per attempt)│            └──────────┘
//! └──────┬───────┘             └───────┬───────┘
//!        │ on_*                        │ MESSAGE
//!        ▼                             ▼
//! ┌──────────────┐   classify  ┌───────────────┐
//! │   Emitter<T> │◀────────────│EventClassifier│
//! └──────────────┘             └───────────────┘
//! ```
//!
//! # State machine
//!
//! | From | Event | To |
//! |------|-------|----|
//! | `disconnected`, `error` | `connect()` | `connecting` |
//! | `connecting` | session established | `connected` |
//! | `connecting` | attempt failed | `error` (+ retry) |
//! | `connected` | transport error | `error` (+ retry) |
//! | `connected` | transport closed | `disconnected` (+ retry) |
//! | any | `disconnect()` | `disconnected` |
//!
//! Status listeners see each transition once; repeated transitions to the
//! same state are not reported.
//!
//! # Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `url` | `http://localhost:8080/ws` | SockJS or WebSocket endpoint |
//! | `reconnect_interval` | 3s | Fixed delay before each retry |
//! | `max_reconnect_attempts` | 5 | Retries before settling in `error` |
//! | `heartbeat_interval` | 4s | STOMP heart-beat offered both ways |
//! | `connect_timeout` | 10s | Upgrade plus handshake budget |
//!
//! # Module Structure
//!
//! - `config`: connection configuration and partial overlays
//! - `types`: topics, subscription handles, connection state
//! - `events`: alert domain events
//! - `protocol`: the classification seam
//! - [`handlers`]: classifier implementations
//! - `emitter`: listener lists and disposers
//! - `subscription`: topic registry
//! - `connection`: the manager and its session driver

mod config;
mod connection;
mod emitter;
mod events;
pub mod handlers;
mod protocol;
mod subscription;
mod types;

pub use config::{ChannelConfig, ChannelOptions, DEFAULT_URL};
pub use connection::{AlertChannel, AlertChannelBuilder};
pub use emitter::{Disposer, Emitter};
pub use events::{Alert, AlertDeleted, InboundEvent, ReadState, Severity, StatsChanged};
pub use handlers::{StructuralClassifier, StructuralConfig};
pub use protocol::EventClassifier;
pub use subscription::SubscriptionRegistry;
pub use types::{
    ConnectionEpoch, ConnectionState, EMPLOYEE_TOPIC_PREFIX, GLOBAL_TOPIC, STATS_TOPIC,
    SubscriptionId, Topic,
};
