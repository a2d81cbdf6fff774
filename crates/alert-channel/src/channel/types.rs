//! Core type definitions for the alert channel.

use std::{borrow::Borrow, fmt};

use serde::Serialize;

pub const EMPLOYEE_TOPIC_PREFIX: &str = "/topic/alertes/employe";
pub const GLOBAL_TOPIC: &str = "/topic/alertes/global";
pub const STATS_TOPIC: &str = "/topic/alertes/stats";

/// Subscription target, the STOMP destination string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Create a new topic from a string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Alerts addressed to a single employee.
    pub fn employee_alerts(user_id: i64) -> Self {
        Self(format!("{EMPLOYEE_TOPIC_PREFIX}/{user_id}"))
    }

    /// Alerts broadcast to privileged roles.
    pub fn global_alerts() -> Self {
        Self(GLOBAL_TOPIC.to_string())
    }

    /// Unread-count change notifications.
    pub fn stats() -> Self {
        Self(STATS_TOPIC.to_string())
    }

    /// Whether frames on this topic are stats ticks rather than alerts.
    pub fn is_stats(&self) -> bool {
        self.0 == STATS_TOPIC
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport handle of a live subscription, sent as the STOMP `id` header.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub(crate) fn from_seq(seq: u64) -> Self {
        Self(format!("sub-{seq}"))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SubscriptionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection state machine states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected. Initial state.
    #[default]
    Disconnected,
    /// A transport attempt is in flight.
    Connecting,
    /// STOMP session established.
    Connected,
    /// The last attempt or session failed.
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether a fresh `connect()` starts a new transport attempt.
    pub fn accepts_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Generation counter for transport attempts. Callbacks that carry an older
/// epoch than the manager's current one are stale and ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionEpoch(pub u64);

impl ConnectionEpoch {
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
