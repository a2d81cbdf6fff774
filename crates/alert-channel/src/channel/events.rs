//! Domain events carried by alert frames.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Alert severity, wire field `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Wire values accepted by the structural classifier.
    pub const WIRE_VALUES: [&'static str; 3] = ["INFO", "WARNING", "ERROR"];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Read state of an alert, wire field `status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadState {
    Unread,
    Read,
}

impl ReadState {
    pub const WIRE_VALUES: [&'static str; 2] = ["UNREAD", "READ"];

    pub fn is_unread(&self) -> bool {
        matches!(self, Self::Unread)
    }
}

/// An alert as pushed on the alert topics and returned by the REST API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
    #[serde(rename = "status")]
    pub read_state: ReadState,
    /// ISO-8601 creation time, kept as sent by the backend.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Addressee. `None` for global alerts.
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Alert {
    pub fn is_unread(&self) -> bool {
        self.read_state.is_unread()
    }
}

/// An alert was removed server-side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AlertDeleted {
    pub id: i64,
}

/// The unread count of a user changed. `None` means "any user".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StatsChanged {
    pub user_id: Option<i64>,
}

impl StatsChanged {
    /// Whether this tick concerns `user_id`.
    pub fn concerns(&self, user_id: i64) -> bool {
        self.user_id.is_none_or(|id| id == user_id)
    }
}

/// Classified inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Upsert(Alert),
    Delete(AlertDeleted),
    StatsTick(StatsChanged),
    /// Well-formed JSON matching none of the known shapes.
    Unrecognized,
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "upsert",
            Self::Delete(_) => "delete",
            Self::StatsTick(_) => "stats",
            Self::Unrecognized => "unrecognized",
        }
    }
}
