//! Shape-based classifier with configurable field names.
//!
//! Rules, in order:
//!
//! 1. numeric id, string message, severity in `INFO|WARNING|ERROR` and read
//!    state in `UNREAD|READ` → [`InboundEvent::Upsert`]
//! 2. action field equal to the delete sentinel plus a numeric id →
//!    [`InboundEvent::Delete`]
//! 3. anything on the stats topic → [`InboundEvent::StatsTick`]
//! 4. otherwise [`InboundEvent::Unrecognized`]

use serde_json::{Map, Value};

use crate::{
    channel::{
        events::{Alert, AlertDeleted, InboundEvent, ReadState, Severity, StatsChanged},
        protocol::EventClassifier,
        types::Topic,
    },
    error::ChannelResult,
};

/// Field names and sentinels used by [`StructuralClassifier`].
#[derive(Clone, Debug)]
pub struct StructuralConfig {
    /// Alert identifier (e.g. "id").
    pub id_field: String,
    /// Alert text (e.g. "message").
    pub message_field: String,
    /// Severity field (e.g. "type").
    pub severity_field: String,
    /// Read state field (e.g. "status").
    pub read_state_field: String,
    /// Operation field of delete notices (e.g. "action").
    pub action_field: String,
    /// Value of `action_field` announcing a deletion.
    pub delete_action: String,
    /// Candidate id fields of delete notices, first match wins.
    pub delete_id_fields: Vec<String>,
    /// User identifier of stats ticks (e.g. "userId").
    pub user_id_field: String,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            message_field: "message".to_string(),
            severity_field: "type".to_string(),
            read_state_field: "status".to_string(),
            action_field: "action".to_string(),
            delete_action: "DELETE".to_string(),
            delete_id_fields: vec!["alerteId".to_string(), "id".to_string()],
            user_id_field: "userId".to_string(),
        }
    }
}

impl StructuralConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the action field name.
    pub fn action_field(mut self, field: impl Into<String>) -> Self {
        self.action_field = field.into();
        self
    }

    /// Set the delete sentinel value.
    pub fn delete_action(mut self, value: impl Into<String>) -> Self {
        self.delete_action = value.into();
        self
    }

    /// Set the user id field name.
    pub fn user_id_field(mut self, field: impl Into<String>) -> Self {
        self.user_id_field = field.into();
        self
    }
}

/// Default classifier for the alert backend.
///
/// # Example
///
/// ```rust
/// use alert_channel::channel::{InboundEvent, StructuralClassifier, EventClassifier, Topic};
///
/// let classifier = StructuralClassifier::new();
/// let event = classifier
///     .classify(&Topic::global_alerts(), r#"{"action":"DELETE","alerteId":7}"#)
///     .unwrap();
/// assert!(matches!(event, InboundEvent::Delete(d) if d.id == 7));
/// ```
#[derive(Clone, Debug, Default)]
pub struct StructuralClassifier {
    config: StructuralConfig,
}

impl StructuralClassifier {
    /// Create a new classifier with default field names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Customize the configuration.
    pub fn with_config(mut self, f: impl FnOnce(StructuralConfig) -> StructuralConfig) -> Self {
        self.config = f(self.config);
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &StructuralConfig {
        &self.config
    }

    fn looks_like_alert(&self, obj: &Map<String, Value>) -> bool {
        let c = &self.config;
        let in_set = |field: &str, allowed: &[&str]| {
            obj.get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| allowed.contains(&v))
        };
        obj.get(&c.id_field).is_some_and(Value::is_i64)
            && obj.get(&c.message_field).is_some_and(Value::is_string)
            && in_set(&c.severity_field, &Severity::WIRE_VALUES)
            && in_set(&c.read_state_field, &ReadState::WIRE_VALUES)
    }

    fn to_alert(&self, obj: &Map<String, Value>) -> Option<Alert> {
        let c = &self.config;
        let severity = serde_json::from_value(obj.get(&c.severity_field)?.clone()).ok()?;
        let read_state = serde_json::from_value(obj.get(&c.read_state_field)?.clone()).ok()?;
        Some(Alert {
            id: obj.get(&c.id_field)?.as_i64()?,
            message: obj.get(&c.message_field)?.as_str()?.to_string(),
            severity,
            read_state,
            timestamp: obj
                .get("timestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
            user_id: obj.get(&c.user_id_field).and_then(Value::as_i64),
        })
    }

    fn delete_id(&self, obj: &Map<String, Value>) -> Option<i64> {
        let c = &self.config;
        if obj.get(&c.action_field).and_then(Value::as_str) != Some(c.delete_action.as_str()) {
            return None;
        }
        c.delete_id_fields
            .iter()
            .find_map(|field| obj.get(field).and_then(Value::as_i64))
    }

    fn stats_user(&self, value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::Object(obj) => obj.get(&self.config.user_id_field).and_then(Value::as_i64),
            _ => None,
        }
    }
}

impl EventClassifier for StructuralClassifier {
    fn classify(&self, topic: &Topic, body: &str) -> ChannelResult<InboundEvent> {
        let value: Value = serde_json::from_str(body)?;

        if let Value::Object(obj) = &value {
            if self.looks_like_alert(obj)
                && let Some(alert) = self.to_alert(obj)
            {
                return Ok(InboundEvent::Upsert(alert));
            }
            if let Some(id) = self.delete_id(obj) {
                return Ok(InboundEvent::Delete(AlertDeleted { id }));
            }
        }

        if topic.is_stats() {
            return Ok(InboundEvent::StatsTick(StatsChanged {
                user_id: self.stats_user(&value),
            }));
        }

        Ok(InboundEvent::Unrecognized)
    }
}
