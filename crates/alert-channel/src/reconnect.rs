use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

/// Fixed-interval, bounded reconnection policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ReconnectPolicy {
    pub(crate) interval: Duration,
    pub(crate) max_attempts: u32,
}

impl ReconnectPolicy {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.interval.is_zero() {
            return Err("Reconnect interval must be > 0".to_string());
        }
        Ok(())
    }

    /// Delay before the retry that follows `attempts` completed retries, or
    /// `None` once the budget is spent.
    pub(crate) fn next_delay(&self, attempts: u32) -> Option<Duration> {
        (attempts < self.max_attempts).then_some(self.interval)
    }
}

/// Handle to a scheduled retry. Cancelling it guarantees the callback never
/// runs.
#[derive(Debug)]
pub(crate) struct ReconnectTimer {
    token: CancellationToken,
}

impl ReconnectTimer {
    /// Run `on_fire` after `delay` unless cancelled first.
    ///
    /// The callback receives the timer's token so it can re-check
    /// cancellation under its own lock before acting.
    pub(crate) fn schedule<F, Fut>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => on_fire(child).await,
            }
        });
        Self { token }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
