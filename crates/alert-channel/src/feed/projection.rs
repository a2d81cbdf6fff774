//! Local view of one user's alerts.

use crate::channel::{Alert, ReadState};

/// Alert list (newest first) plus unread counter, reconciled from a REST
/// snapshot and pushed deltas.
///
/// The counter is the server's number after a snapshot and is adjusted by
/// deltas until the next one, so it may differ from the number of unread
/// alerts in the list when the list is paginated server-side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlertProjection {
    alerts: Vec<Alert>,
    unread: u64,
}

impl AlertProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh snapshot.
    pub fn apply_snapshot(&mut self, alerts: Vec<Alert>, unread: u64) {
        self.alerts = alerts;
        self.unread = unread;
    }

    /// Insert a new alert at the front or replace the one with the same id.
    /// Returns `true` for an insert.
    pub fn apply_upsert(&mut self, alert: Alert) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(existing) => {
                match (existing.is_unread(), alert.is_unread()) {
                    (true, false) => self.unread = self.unread.saturating_sub(1),
                    (false, true) => self.unread += 1,
                    _ => {}
                }
                *existing = alert;
                false
            }
            None => {
                if alert.is_unread() {
                    self.unread += 1;
                }
                self.alerts.insert(0, alert);
                true
            }
        }
    }

    /// Remove an alert, returning it if it was present.
    pub fn apply_delete(&mut self, id: i64) -> Option<Alert> {
        let index = self.alerts.iter().position(|a| a.id == id)?;
        let removed = self.alerts.remove(index);
        if removed.is_unread() {
            self.unread = self.unread.saturating_sub(1);
        }
        Some(removed)
    }

    /// Mark an alert read. Returns `true` if it was unread.
    pub fn apply_read(&mut self, id: i64) -> bool {
        let Some(alert) = self.alerts.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        if !alert.is_unread() {
            return false;
        }
        alert.read_state = ReadState::Read;
        self.unread = self.unread.saturating_sub(1);
        true
    }

    pub fn set_unread_count(&mut self, unread: u64) {
        self.unread = unread;
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn get(&self, id: i64) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Severity;

    fn alert(id: i64, read_state: ReadState) -> Alert {
        Alert {
            id,
            message: format!("alert {id}"),
            severity: Severity::Info,
            read_state,
            timestamp: None,
            user_id: Some(1),
        }
    }

    #[test]
    fn test_upsert_inserts_newest_first() {
        let mut projection = AlertProjection::new();
        assert!(projection.apply_upsert(alert(1, ReadState::Unread)));
        assert!(projection.apply_upsert(alert(2, ReadState::Read)));

        let ids: Vec<i64> = projection.alerts().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(projection.unread_count(), 1);
    }

    #[test]
    fn test_upsert_replaces_and_adjusts_counter() {
        let mut projection = AlertProjection::new();
        projection.apply_snapshot(vec![alert(1, ReadState::Unread)], 1);

        assert!(!projection.apply_upsert(alert(1, ReadState::Read)));
        assert_eq!(projection.len(), 1);
        assert_eq!(projection.unread_count(), 0);

        assert!(!projection.apply_upsert(alert(1, ReadState::Unread)));
        assert_eq!(projection.unread_count(), 1);
    }

    #[test]
    fn test_delete_adjusts_counter() {
        let mut projection = AlertProjection::new();
        projection.apply_snapshot(
            vec![alert(2, ReadState::Read), alert(1, ReadState::Unread)],
            1,
        );

        assert_eq!(projection.apply_delete(2).map(|a| a.id), Some(2));
        assert_eq!(projection.unread_count(), 1);
        assert!(projection.apply_delete(1).is_some());
        assert_eq!(projection.unread_count(), 0);
        assert!(projection.apply_delete(1).is_none());
        assert!(projection.is_empty());
    }

    #[test]
    fn test_read_is_idempotent() {
        let mut projection = AlertProjection::new();
        projection.apply_snapshot(vec![alert(1, ReadState::Unread)], 1);

        assert!(projection.apply_read(1));
        assert!(!projection.apply_read(1));
        assert!(!projection.apply_read(99));
        assert_eq!(projection.unread_count(), 0);
        assert_eq!(projection.get(1).map(|a| a.read_state), Some(ReadState::Read));
    }

    #[test]
    fn test_counter_never_underflows() {
        let mut projection = AlertProjection::new();
        projection.apply_snapshot(vec![alert(1, ReadState::Unread)], 0);
        assert!(projection.apply_delete(1).is_some());
        assert_eq!(projection.unread_count(), 0);
    }
}
