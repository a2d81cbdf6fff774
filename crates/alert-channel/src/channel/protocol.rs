//! Classification seam between raw frame bodies and domain events.
//!
//! The backend sends alert payloads without an explicit event-type
//! discriminant, so the default [`StructuralClassifier`] infers the kind from
//! the payload's shape. A backend that adds a discriminant only needs a new
//! [`EventClassifier`] implementation.
//!
//! [`StructuralClassifier`]: super::handlers::StructuralClassifier

use super::{events::InboundEvent, types::Topic};
use crate::error::ChannelResult;

/// Turns the body of a `MESSAGE` frame into an [`InboundEvent`].
///
/// # Example
///
/// ```rust
/// use alert_channel::{
///     ChannelResult,
///     channel::{AlertDeleted, EventClassifier, InboundEvent, Topic},
/// };
///
/// struct TaggedClassifier;
///
/// impl EventClassifier for TaggedClassifier {
///     fn classify(&self, _topic: &Topic, body: &str) -> ChannelResult<InboundEvent> {
///         let value: serde_json::Value = serde_json::from_str(body)?;
///         Ok(match (value["event"].as_str(), value["id"].as_i64()) {
///             (Some("deleted"), Some(id)) => InboundEvent::Delete(AlertDeleted { id }),
///             _ => InboundEvent::Unrecognized,
///         })
///     }
/// }
/// ```
pub trait EventClassifier: Send + Sync + 'static {
    /// Classify a frame body received on `topic`.
    ///
    /// Returns `Err` only when the body cannot be parsed at all; well-formed
    /// payloads of unknown shape map to [`InboundEvent::Unrecognized`].
    fn classify(&self, topic: &Topic, body: &str) -> ChannelResult<InboundEvent>;
}
