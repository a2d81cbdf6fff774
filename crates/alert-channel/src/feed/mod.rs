//! Per-user alert feed on top of a shared [`AlertChannel`].
//!
//! [`AlertFeed`] loads a REST snapshot, keeps the user's topics subscribed
//! across reconnects and folds pushed events into an [`AlertProjection`].
//! Several feeds may share one channel; stopping a feed leaves the channel
//! up.

mod projection;

use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use projection::AlertProjection;

use crate::{
    channel::{Alert, AlertChannel, ConnectionState, Disposer, Emitter, Topic},
    error::ChannelResult,
    rest::AlertsApi,
};

/// What a feed subscribes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedOptions {
    pub user_id: i64,
    /// Also follow `/topic/alertes/global`.
    pub include_global: bool,
    /// Follow `/topic/alertes/stats` and re-fetch the unread count on ticks.
    pub include_stats: bool,
    /// Reload the snapshot after a reconnect, since pushes may have been
    /// missed while down.
    pub refresh_on_reconnect: bool,
}

impl FeedOptions {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            include_global: false,
            include_stats: true,
            refresh_on_reconnect: true,
        }
    }

    #[must_use]
    pub fn include_global(mut self, enabled: bool) -> Self {
        self.include_global = enabled;
        self
    }

    #[must_use]
    pub fn include_stats(mut self, enabled: bool) -> Self {
        self.include_stats = enabled;
        self
    }

    #[must_use]
    pub fn refresh_on_reconnect(mut self, enabled: bool) -> Self {
        self.refresh_on_reconnect = enabled;
        self
    }

    /// Topics this feed keeps subscribed.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics = vec![Topic::employee_alerts(self.user_id)];
        if self.include_global {
            topics.push(Topic::global_alerts());
        }
        if self.include_stats {
            topics.push(Topic::stats());
        }
        topics
    }

    /// Whether a pushed alert belongs in this feed.
    fn accepts(&self, user_id: Option<i64>) -> bool {
        self.include_global || user_id.is_none_or(|id| id == self.user_id)
    }
}

/// A pushed change, kept while a snapshot load is in flight so it can be
/// replayed over the snapshot. Replaying is idempotent.
#[derive(Clone, Debug)]
enum Delta {
    Upsert(Alert),
    Delete(i64),
    Read(i64),
}

impl Delta {
    fn apply(&self, projection: &mut AlertProjection) {
        match self {
            Self::Upsert(alert) => {
                projection.apply_upsert(alert.clone());
            }
            Self::Delete(id) => {
                projection.apply_delete(*id);
            }
            Self::Read(id) => {
                projection.apply_read(*id);
            }
        }
    }
}

#[derive(Default)]
struct FeedState {
    projection: AlertProjection,
    /// Snapshot loads in flight.
    loading: usize,
    /// Deltas received since the oldest in-flight load started.
    buffered: Vec<Delta>,
}

struct FeedShared {
    options: FeedOptions,
    api: Arc<dyn AlertsApi>,
    state: Mutex<FeedState>,
    changes: Emitter<AlertProjection>,
}

impl FeedShared {
    /// Apply a change now, and remember it if a load is in flight. Listeners
    /// get a snapshot taken after the lock is released.
    fn push(&self, delta: Delta) {
        let snapshot = {
            let mut state = self.state.lock();
            delta.apply(&mut state.projection);
            if state.loading > 0 {
                state.buffered.push(delta);
            }
            state.projection.clone()
        };
        self.changes.emit(&snapshot);
    }

    async fn load(&self) -> ChannelResult<(Vec<Alert>, u64)> {
        let user_id = self.options.user_id;
        let alerts = self.api.fetch_alerts(user_id).await?;
        let unread = self.api.unread_count(user_id).await?;
        Ok((alerts, unread))
    }

    /// Replace the projection with a fresh snapshot, then replay every delta
    /// pushed while it was loading.
    async fn refresh(&self) -> ChannelResult<()> {
        self.state.lock().loading += 1;
        let loaded = self.load().await;

        let snapshot = {
            let mut state = self.state.lock();
            state.loading -= 1;
            let replay = if state.loading == 0 {
                mem::take(&mut state.buffered)
            } else {
                state.buffered.clone()
            };
            let (alerts, unread) = loaded?;
            debug!(
                user_id = self.options.user_id,
                alerts = alerts.len(),
                unread,
                replayed = replay.len(),
                "Alert snapshot loaded"
            );
            state.projection.apply_snapshot(alerts, unread);
            for delta in &replay {
                delta.apply(&mut state.projection);
            }
            state.projection.clone()
        };
        self.changes.emit(&snapshot);
        Ok(())
    }

    async fn refresh_unread(&self) -> ChannelResult<()> {
        let unread = self.api.unread_count(self.options.user_id).await?;
        let snapshot = {
            let mut state = self.state.lock();
            state.projection.set_unread_count(unread);
            state.projection.clone()
        };
        self.changes.emit(&snapshot);
        Ok(())
    }
}

/// A running per-user feed. Dropping it disposes its listeners.
pub struct AlertFeed {
    channel: AlertChannel,
    shared: Arc<FeedShared>,
    disposers: Vec<Disposer>,
}

impl AlertFeed {
    /// Register listeners, subscribe the feed's topics (now if the channel is
    /// connected, and again after every reconnect), then load the snapshot.
    ///
    /// Pushes that arrive while the snapshot is loading are replayed over it.
    pub async fn start(
        channel: AlertChannel,
        api: Arc<dyn AlertsApi>,
        options: FeedOptions,
    ) -> ChannelResult<Self> {
        let shared = Arc::new(FeedShared {
            options,
            api,
            state: Mutex::new(FeedState::default()),
            changes: Emitter::new("feed"),
        });

        let mut disposers = Vec::with_capacity(4);

        let s = Arc::clone(&shared);
        disposers.push(channel.on_alert(move |alert| {
            if !s.options.accepts(alert.user_id) {
                return;
            }
            debug!(id = alert.id, "Alert folded into feed");
            s.push(Delta::Upsert(alert.clone()));
        }));

        let s = Arc::clone(&shared);
        disposers.push(channel.on_alert_deleted(move |deleted| {
            debug!(id = deleted.id, "Alert removed from feed");
            s.push(Delta::Delete(deleted.id));
        }));

        if shared.options.include_stats {
            let s = Arc::clone(&shared);
            disposers.push(channel.on_stats(move |tick| {
                if !tick.concerns(s.options.user_id) {
                    return;
                }
                let s = Arc::clone(&s);
                tokio::spawn(async move {
                    if let Err(err) = s.refresh_unread().await {
                        warn!(error = %err, "Unread count refresh failed");
                    }
                });
            }));
        }

        let s = Arc::clone(&shared);
        let ch = channel.clone();
        let seen_connected = AtomicBool::new(channel.is_connected());
        disposers.push(channel.on_status(move |state| {
            if *state != ConnectionState::Connected {
                return;
            }
            for topic in s.options.topics() {
                ch.subscribe_topic(topic);
            }
            let reconnected = seen_connected.swap(true, Ordering::AcqRel);
            if reconnected && s.options.refresh_on_reconnect {
                let s = Arc::clone(&s);
                tokio::spawn(async move {
                    if let Err(err) = s.refresh().await {
                        warn!(error = %err, "Snapshot refresh after reconnect failed");
                    }
                });
            }
        }));

        if channel.is_connected() {
            for topic in shared.options.topics() {
                channel.subscribe_topic(topic);
            }
        }

        if let Err(err) = shared.refresh().await {
            for disposer in disposers {
                disposer.dispose();
            }
            return Err(err);
        }
        info!(user_id = shared.options.user_id, "Alert feed started");

        Ok(Self {
            channel,
            shared,
            disposers,
        })
    }

    pub fn options(&self) -> &FeedOptions {
        &self.shared.options
    }

    pub fn channel(&self) -> &AlertChannel {
        &self.channel
    }

    /// Copy of the current projection.
    pub fn snapshot(&self) -> AlertProjection {
        self.shared.state.lock().projection.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.shared.state.lock().projection.unread_count()
    }

    /// Called with a fresh snapshot after every change.
    pub fn on_change<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&AlertProjection) + Send + Sync + 'static,
    {
        self.shared.changes.on(callback)
    }

    /// Reload list and counter from the API.
    pub async fn refresh(&self) -> ChannelResult<()> {
        self.shared.refresh().await
    }

    /// Mark an alert read server-side, then locally.
    pub async fn mark_read(&self, alert_id: i64) -> ChannelResult<()> {
        self.shared.api.mark_read(alert_id).await?;
        self.shared.push(Delta::Read(alert_id));
        Ok(())
    }

    /// Delete an alert server-side, then locally.
    pub async fn delete(&self, alert_id: i64) -> ChannelResult<()> {
        self.shared.api.delete(alert_id).await?;
        self.shared.push(Delta::Delete(alert_id));
        Ok(())
    }

    /// Dispose every listener. Topics stay subscribed on the shared channel.
    pub fn stop(&mut self) {
        if self.disposers.is_empty() {
            return;
        }
        for disposer in self.disposers.drain(..) {
            disposer.dispose();
        }
        info!(user_id = self.shared.options.user_id, "Alert feed stopped");
    }
}

impl Drop for AlertFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        let options = FeedOptions::new(3);
        assert_eq!(
            options.topics(),
            vec![Topic::employee_alerts(3), Topic::stats()]
        );

        let options = FeedOptions::new(3).include_global(true).include_stats(false);
        assert_eq!(
            options.topics(),
            vec![Topic::employee_alerts(3), Topic::global_alerts()]
        );
    }

    #[test]
    fn test_accepts() {
        let options = FeedOptions::new(3);
        assert!(options.accepts(Some(3)));
        assert!(options.accepts(None));
        assert!(!options.accepts(Some(4)));
        assert!(FeedOptions::new(3).include_global(true).accepts(Some(4)));
    }
}
