//! The connection manager.
//!
//! [`AlertChannel`] is a cheap `Clone` handle over shared state. Each
//! connection attempt runs in its own driver task that owns the [`Session`];
//! the handle talks to it through an unbounded command channel and a
//! cancellation token. All state changes happen under one lock, and every
//! listener callback runs after that lock is released.

use std::{
    fmt, mem,
    sync::{Arc, Weak},
    time::Duration,
};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    config::{ChannelConfig, ChannelOptions},
    emitter::{Disposer, Emitter},
    events::{Alert, AlertDeleted, InboundEvent, StatsChanged},
    handlers::StructuralClassifier,
    protocol::EventClassifier,
    subscription::SubscriptionRegistry,
    types::{ConnectionEpoch, ConnectionState, SubscriptionId, Topic},
};
use crate::{
    error::{ChannelError, ChannelResult},
    reconnect::ReconnectTimer,
    stomp::{Command, Decoded, Frame},
    transport::{Session, Transport, WsTransport},
};

/// Upper bound on closing a transport that may already be dead.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands from the handle to the session driver.
#[derive(Debug)]
enum SessionCommand {
    Subscribe { id: SubscriptionId, topic: Topic },
    Unsubscribe { id: SubscriptionId },
}

/// Why a driver left its receive loop.
enum SessionEnd {
    /// `disconnect()` or a newer attempt took over.
    Cancelled,
    /// The transport failed or the server went away.
    Lost(ChannelError),
}

/// Handle to the driver task of the current attempt.
struct SessionControl {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
}

/// An attempt registered under the lock whose driver is not running yet.
struct PendingAttempt {
    changed: Option<ConnectionState>,
    epoch: ConnectionEpoch,
    config: ChannelConfig,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancellationToken,
}

struct Shared {
    config: ChannelConfig,
    status: ConnectionState,
    attempts: u32,
    epoch: ConnectionEpoch,
    session: Option<SessionControl>,
    reconnect: Option<ReconnectTimer>,
    waiters: Vec<oneshot::Sender<ChannelResult<()>>>,
    subscriptions: SubscriptionRegistry,
}

impl Shared {
    /// Move to `next`, returning it only if it differs from the current state.
    fn transition(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if self.status == next {
            return None;
        }
        debug!(from = %self.status, to = %next, epoch = self.epoch.0, "State transition");
        self.status = next;
        Some(next)
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            timer.cancel();
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn EventClassifier>,
    shared: Mutex<Shared>,
    alerts: Emitter<Alert>,
    deletions: Emitter<AlertDeleted>,
    stats: Emitter<StatsChanged>,
    statuses: Emitter<ConnectionState>,
}

/// Builder for [`AlertChannel`].
#[must_use]
pub struct AlertChannelBuilder {
    config: ChannelConfig,
    transport: Option<Arc<dyn Transport>>,
    classifier: Option<Arc<dyn EventClassifier>>,
}

impl AlertChannelBuilder {
    /// Replace the WebSocket transport.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the default [`StructuralClassifier`].
    pub fn classifier(mut self, classifier: impl EventClassifier) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Validate the configuration and build the channel. Nothing connects
    /// until [`AlertChannel::connect`] is called.
    pub fn build(self) -> ChannelResult<AlertChannel> {
        self.config.validate().map_err(ChannelError::config)?;
        let inner = Inner {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(WsTransport::new())),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(StructuralClassifier::new())),
            shared: Mutex::new(Shared {
                config: self.config,
                status: ConnectionState::Disconnected,
                attempts: 0,
                epoch: ConnectionEpoch::default(),
                session: None,
                reconnect: None,
                waiters: Vec::new(),
                subscriptions: SubscriptionRegistry::new(),
            }),
            alerts: Emitter::new("alert"),
            deletions: Emitter::new("alert_deleted"),
            stats: Emitter::new("stats"),
            statuses: Emitter::new("status"),
        };
        Ok(AlertChannel {
            inner: Arc::new(inner),
        })
    }
}

/// Real-time alert channel.
///
/// One instance is built by the composition root and cloned into every
/// consumer. Clones share the session, the subscriptions and the listeners.
///
/// ```rust,no_run
/// use alert_channel::channel::{AlertChannel, ChannelConfig, Topic};
///
/// # async fn run() -> alert_channel::ChannelResult<()> {
/// let channel = AlertChannel::new(ChannelConfig::new("http://localhost:8080/ws"))?;
/// let _alerts = channel.on_alert(|alert| println!("{}: {}", alert.severity, alert.message));
///
/// channel.connect().await?;
/// channel.subscribe_topic(Topic::employee_alerts(42));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AlertChannel {
    inner: Arc<Inner>,
}

impl AlertChannel {
    /// Channel over WebSocket with the structural classifier.
    pub fn new(config: ChannelConfig) -> ChannelResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ChannelConfig) -> AlertChannelBuilder {
        AlertChannelBuilder {
            config,
            transport: None,
            classifier: None,
        }
    }

    /// Merge `options` into the configuration. Takes effect on the next
    /// attempt; a live session is left alone.
    pub fn configure(&self, options: &ChannelOptions) -> ChannelResult<()> {
        let mut shared = self.inner.shared.lock();
        let mut config = shared.config.clone();
        config.apply(options);
        config.validate().map_err(ChannelError::config)?;
        debug!(url = %config.url, "Configuration updated");
        shared.config = config;
        Ok(())
    }

    /// Connect, resolving once the STOMP session is up.
    ///
    /// Resolves immediately when already connected. While an attempt is in
    /// flight the call joins it. The result is the outcome of that one
    /// attempt; automatic retries after a failure are reported only through
    /// [`on_status`](Self::on_status).
    pub async fn connect(&self) -> ChannelResult<()> {
        let (rx, attempt) = {
            let mut shared = self.inner.shared.lock();
            let (tx, rx) = oneshot::channel();
            if shared.status.is_connected() {
                return Ok(());
            }
            shared.attempts = 0;
            let attempt = if shared.status.accepts_connect() {
                shared.cancel_reconnect();
                Some(self.inner.start_attempt(&mut shared))
            } else {
                None
            };
            shared.waiters.push(tx);
            (rx, attempt)
        };
        if let Some(attempt) = attempt {
            self.inner.launch(attempt);
        }
        rx.await.unwrap_or(Err(ChannelError::Cancelled))
    }

    /// Tear the session down and stay down.
    ///
    /// Cancels any pending retry, unsubscribes every topic, sends a
    /// best-effort `DISCONNECT` and rejects in-flight [`connect`](Self::connect)
    /// calls with [`ChannelError::Cancelled`]. Safe to call in any state.
    pub fn disconnect(&self) {
        let (changed, waiters) = {
            let mut shared = self.inner.shared.lock();
            shared.epoch = shared.epoch.next();
            shared.cancel_reconnect();
            let drained = shared.subscriptions.drain();
            if let Some(session) = shared.session.take() {
                for (topic, id) in drained {
                    debug!(%topic, %id, "Unsubscribing on disconnect");
                    let _ = session.cmd_tx.send(SessionCommand::Unsubscribe { id });
                }
                session.cancel.cancel();
            }
            shared.attempts = 0;
            let waiters = mem::take(&mut shared.waiters);
            (shared.transition(ConnectionState::Disconnected), waiters)
        };
        if changed.is_some() {
            info!("Alert channel disconnected");
        }
        self.inner.notify(changed);
        for waiter in waiters {
            let _ = waiter.send(Err(ChannelError::Cancelled));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.shared.lock().status.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().status
    }

    /// Automatic retries made since the last explicit connect or success.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().attempts
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ChannelConfig {
        self.inner.shared.lock().config.clone()
    }

    /// Subscribe to `topic` on the live session.
    ///
    /// Returns `false` without side effects when the channel is not connected
    /// or the topic is already subscribed. Subscriptions do not survive a
    /// reconnect; consumers re-subscribe when they see `Connected`.
    pub fn subscribe_topic(&self, topic: impl Into<Topic>) -> bool {
        let topic = topic.into();
        let mut shared = self.inner.shared.lock();
        if !shared.status.is_connected() {
            debug!(%topic, state = %shared.status, "Not connected, subscribe skipped");
            return false;
        }
        let Some(cmd_tx) = shared.session.as_ref().map(|s| s.cmd_tx.clone()) else {
            debug!(%topic, "No live session, subscribe skipped");
            return false;
        };
        let Some(id) = shared.subscriptions.insert(topic.clone()) else {
            debug!(%topic, "Already subscribed");
            return false;
        };

        debug!(%topic, %id, "Subscribing");
        let command = SessionCommand::Subscribe {
            id,
            topic: topic.clone(),
        };
        if cmd_tx.send(command).is_err() {
            shared.subscriptions.remove(&topic);
            debug!(%topic, "Session driver gone, subscribe dropped");
            return false;
        }
        true
    }

    /// Drop the subscription for `topic`. Returns whether one existed.
    pub fn unsubscribe_topic(&self, topic: &Topic) -> bool {
        let mut shared = self.inner.shared.lock();
        let Some(id) = shared.subscriptions.remove(topic) else {
            debug!(%topic, "Not subscribed");
            return false;
        };
        debug!(%topic, %id, "Unsubscribing");
        if let Some(session) = shared.session.as_ref() {
            let _ = session.cmd_tx.send(SessionCommand::Unsubscribe { id });
        }
        true
    }

    /// Topics with a live subscription, sorted.
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.inner.shared.lock().subscriptions.topics()
    }

    /// Called for every created or updated alert.
    pub fn on_alert<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.inner.alerts.on(callback)
    }

    /// Called for every server-side deletion.
    pub fn on_alert_deleted<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&AlertDeleted) + Send + Sync + 'static,
    {
        self.inner.deletions.on(callback)
    }

    /// Called for every stats tick.
    pub fn on_stats<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&StatsChanged) + Send + Sync + 'static,
    {
        self.inner.stats.on(callback)
    }

    /// Called on every state change, never twice in a row with the same
    /// state.
    pub fn on_status<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.statuses.on(callback)
    }
}

impl fmt::Debug for AlertChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("AlertChannel")
            .field("url", &shared.config.url)
            .field("state", &shared.status)
            .field("attempts", &shared.attempts)
            .field("subscriptions", &shared.subscriptions.len())
            .finish()
    }
}

impl Inner {
    fn notify(&self, changed: Option<ConnectionState>) {
        if let Some(state) = changed {
            self.statuses.emit(&state);
        }
    }

    /// Begin a fresh attempt under the lock. The driver is spawned by
    /// [`launch`](Self::launch) once the lock is released.
    fn start_attempt(&self, shared: &mut Shared) -> PendingAttempt {
        shared.epoch = shared.epoch.next();
        let epoch = shared.epoch;
        let cancel = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        if let Some(stale) = shared.session.replace(SessionControl {
            cmd_tx,
            cancel: cancel.clone(),
        }) {
            stale.cancel.cancel();
        }

        info!(url = %shared.config.url, epoch = epoch.0, attempt = shared.attempts, "Connecting");
        PendingAttempt {
            changed: shared.transition(ConnectionState::Connecting),
            epoch,
            config: shared.config.clone(),
            cmd_rx,
            cancel,
        }
    }

    /// Report `Connecting`, then spawn the driver, so listeners never see
    /// the outcome of an attempt before the attempt itself.
    fn launch(self: &Arc<Self>, attempt: PendingAttempt) {
        self.notify(attempt.changed);
        tokio::spawn(run_session(
            Arc::clone(self),
            attempt.epoch,
            attempt.config,
            attempt.cmd_rx,
            attempt.cancel,
        ));
    }

    /// Arm the retry timer if the budget allows. Returns whether a retry was
    /// scheduled.
    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) -> bool {
        let policy = shared.config.reconnect_policy();
        let Some(delay) = policy.next_delay(shared.attempts) else {
            warn!(
                attempts = shared.attempts,
                max = policy.max_attempts,
                "Reconnect attempts exhausted"
            );
            return false;
        };

        info!(
            attempt = shared.attempts + 1,
            max = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        let inner: Weak<Self> = Arc::downgrade(self);
        let epoch = shared.epoch;
        shared.cancel_reconnect();
        shared.reconnect = Some(ReconnectTimer::schedule(delay, move |token| async move {
            if let Some(inner) = inner.upgrade() {
                inner.fire_reconnect(epoch, &token);
            }
        }));
        true
    }

    fn fire_reconnect(self: &Arc<Self>, epoch: ConnectionEpoch, token: &CancellationToken) {
        let attempt = {
            let mut shared = self.shared.lock();
            if token.is_cancelled() || shared.epoch != epoch {
                debug!(epoch = epoch.0, "Stale reconnect timer ignored");
                return;
            }
            shared.reconnect = None;
            shared.attempts += 1;
            self.start_attempt(&mut shared)
        };
        self.launch(attempt);
    }

    /// The transport attempt of `epoch` could not be established.
    fn attempt_failed(self: &Arc<Self>, epoch: ConnectionEpoch, err: ChannelError) {
        let (changed, waiters) = {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch {
                debug!(epoch = epoch.0, error = %err, "Stale attempt failure ignored");
                return;
            }
            warn!(error = %err, attempt = shared.attempts, "Connection attempt failed");
            shared.session = None;
            shared.subscriptions.drain();
            let changed = shared.transition(ConnectionState::Error);
            self.schedule_reconnect(&mut shared);
            (changed, mem::take(&mut shared.waiters))
        };
        self.notify(changed);
        for waiter in waiters {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    /// The session of `epoch` is up. Returns `false` when it is stale and
    /// must be closed.
    fn session_opened(&self, epoch: ConnectionEpoch) -> bool {
        let (changed, waiters) = {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch {
                return false;
            }
            shared.attempts = 0;
            shared.cancel_reconnect();
            let changed = shared.transition(ConnectionState::Connected);
            (changed, mem::take(&mut shared.waiters))
        };
        info!(epoch = epoch.0, "Alert channel connected");
        self.notify(changed);
        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }
        true
    }

    /// The established session of `epoch` ended without `disconnect()`.
    fn session_lost(self: &Arc<Self>, epoch: ConnectionEpoch, err: ChannelError) {
        let changed = {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch {
                return;
            }
            warn!(error = %err, "Alert session lost");
            shared.session = None;
            shared.subscriptions.drain();
            let scheduled = self.schedule_reconnect(&mut shared);
            let next = if err.is_close() && scheduled {
                ConnectionState::Disconnected
            } else {
                ConnectionState::Error
            };
            shared.transition(next)
        };
        self.notify(changed);
    }

    /// Route one `MESSAGE` frame to the listeners of its event kind.
    fn dispatch(&self, epoch: ConnectionEpoch, frame: &Frame) {
        let Some(sub_id) = frame.subscription() else {
            debug!("MESSAGE without subscription header dropped");
            return;
        };
        let topic = {
            let shared = self.shared.lock();
            if shared.epoch != epoch {
                return;
            }
            match shared.subscriptions.topic_for(sub_id) {
                Some(topic) => topic.clone(),
                None => {
                    debug!(subscription = sub_id, "Frame for inactive subscription dropped");
                    return;
                }
            }
        };

        let body = match frame.body_text() {
            Ok(body) => body,
            Err(err) => {
                warn!(%topic, error = %err, "Dropping non-text alert frame");
                return;
            }
        };

        match self.classifier.classify(&topic, body) {
            Ok(InboundEvent::Upsert(alert)) => {
                debug!(%topic, id = alert.id, "Alert received");
                self.alerts.emit(&alert);
            }
            Ok(InboundEvent::Delete(deleted)) => {
                debug!(%topic, id = deleted.id, "Alert deletion received");
                self.deletions.emit(&deleted);
            }
            Ok(InboundEvent::StatsTick(stats)) => {
                debug!(%topic, user_id = ?stats.user_id, "Stats tick received");
                self.stats.emit(&stats);
            }
            Ok(InboundEvent::Unrecognized) => {
                debug!(%topic, "Unrecognized payload dropped");
            }
            Err(err) => {
                warn!(%topic, error = %err, "Dropping malformed alert frame");
            }
        }
    }
}

/// Driver of one connection attempt.
async fn run_session(
    inner: Arc<Inner>,
    epoch: ConnectionEpoch,
    config: ChannelConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(epoch = epoch.0, "Attempt cancelled while connecting");
            return;
        }
        result = tokio::time::timeout(config.connect_timeout, inner.transport.open(&config)) => {
            result.unwrap_or_else(|_| Err(ChannelError::timeout(config.connect_timeout)))
        }
    };

    let mut session = match opened {
        Ok(session) => session,
        Err(err) => {
            inner.attempt_failed(epoch, err);
            return;
        }
    };

    if cancel.is_cancelled() || !inner.session_opened(epoch) {
        debug!(epoch = epoch.0, "Closing session opened after cancellation");
        close_sink(&mut session).await;
        return;
    }

    match drive(&inner, epoch, &mut session, &mut cmd_rx, &cancel).await {
        SessionEnd::Cancelled => {
            if tokio::time::timeout(CLOSE_TIMEOUT, shutdown(&mut session, &mut cmd_rx))
                .await
                .is_err()
            {
                warn!(epoch = epoch.0, "Shutdown timed out, dropping transport");
            }
        }
        SessionEnd::Lost(err) => {
            // State and retry first; closing a dead transport can stall.
            inner.session_lost(epoch, err);
            close_sink(&mut session).await;
        }
    }
}

async fn drive(
    inner: &Inner,
    epoch: ConnectionEpoch,
    session: &mut Session,
    cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let heartbeat = session.heartbeat;
    let deadline = heartbeat.incoming_deadline();
    let mut ticker = heartbeat_ticker(heartbeat.outgoing, heartbeat.incoming);
    let mut last_sent = Instant::now();
    let mut last_received = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    return SessionEnd::Cancelled;
                };
                if let Err(err) = send_command(session, cmd).await {
                    return SessionEnd::Lost(err);
                }
                last_sent = Instant::now();
            }
            item = session.stream.next() => {
                match item {
                    Some(Ok(Decoded::Heartbeat)) => last_received = Instant::now(),
                    Some(Ok(Decoded::Frame(frame))) => {
                        last_received = Instant::now();
                        match frame.command {
                            Command::Message => inner.dispatch(epoch, &frame),
                            Command::Error => {
                                let message = frame.error_message().unwrap_or("ERROR frame");
                                return SessionEnd::Lost(ChannelError::protocol(message));
                            }
                            Command::Receipt => debug!(receipt = ?frame.get("receipt-id"), "Receipt"),
                            other => debug!(command = %other, "Ignoring unexpected frame"),
                        }
                    }
                    Some(Err(err)) => return SessionEnd::Lost(err),
                    None => return SessionEnd::Lost(ChannelError::connection_closed(None)),
                }
            }
            _ = tick(&mut ticker) => {
                if let Some(deadline) = deadline
                    && last_received.elapsed() > deadline
                {
                    return SessionEnd::Lost(ChannelError::timeout(deadline));
                }
                if !heartbeat.outgoing.is_zero() && last_sent.elapsed() >= heartbeat.outgoing {
                    if let Err(err) = session.sink.send_heartbeat().await {
                        return SessionEnd::Lost(err);
                    }
                    last_sent = Instant::now();
                }
            }
        }
    }
}

async fn send_command(session: &mut Session, cmd: SessionCommand) -> ChannelResult<()> {
    let frame = match &cmd {
        SessionCommand::Subscribe { id, topic } => Frame::subscribe(id.as_str(), topic.as_str()),
        SessionCommand::Unsubscribe { id } => Frame::unsubscribe(id.as_str()),
    };
    session.sink.send_frame(frame).await
}

/// Flush queued unsubscribes, say goodbye and close.
async fn shutdown(session: &mut Session, cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>) {
    while let Ok(cmd) = cmd_rx.try_recv() {
        if let Err(err) = send_command(session, cmd).await {
            debug!(error = %err, "Transport gone during shutdown");
            close_sink(session).await;
            return;
        }
    }
    if let Err(err) = session.sink.send_frame(Frame::disconnect(None)).await {
        debug!(error = %err, "DISCONNECT not delivered");
    }
    close_sink(session).await;
}

async fn close_sink(session: &mut Session) {
    match tokio::time::timeout(CLOSE_TIMEOUT, session.sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(error = %err, "Transport close failed"),
        Err(_) => warn!(
            timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
            "Transport close timed out"
        ),
    }
}

/// One timer serving both heartbeat directions, ticking at the shorter
/// non-zero interval.
fn heartbeat_ticker(outgoing: Duration, incoming: Duration) -> Option<Interval> {
    let period = [outgoing, incoming]
        .into_iter()
        .filter(|d| !d.is_zero())
        .min()?;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
