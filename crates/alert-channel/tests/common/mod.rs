//! Scripted in-memory transport and helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use alert_channel::{
    AlertChannel, ChannelConfig, ChannelError, ChannelResult, ConnectionState, FrameSink,
    Session, Transport,
    stomp::{Command, Decoded, Frame, Heartbeat},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// What the next `open` does.
pub enum Open {
    Succeed,
    Fail(ChannelError),
    /// Never completes.
    Hang,
    /// Completes successfully once the sender fires.
    Gated(oneshot::Receiver<()>),
}

struct MockState {
    script: VecDeque<Open>,
    fallback_ok: bool,
    heartbeat: Heartbeat,
    close_hangs: bool,
    opens: usize,
    sessions: Vec<MockSession>,
}

/// Transport whose `open` outcomes are scripted by the test.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn with_fallback(fallback_ok: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                fallback_ok,
                heartbeat: Heartbeat::DISABLED,
                close_hangs: false,
                opens: 0,
                sessions: Vec::new(),
            })),
        }
    }

    /// Every unscripted open succeeds.
    pub fn succeeding() -> Self {
        Self::with_fallback(true)
    }

    /// Every unscripted open fails with a WebSocket error.
    pub fn failing() -> Self {
        Self::with_fallback(false)
    }

    pub fn script(&self, outcome: Open) -> &Self {
        self.state.lock().script.push_back(outcome);
        self
    }

    /// Script a gated open and return its release handle.
    pub fn script_gated(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script(Open::Gated(rx));
        tx
    }

    /// Heartbeat reported by subsequent sessions.
    pub fn set_heartbeat(&self, heartbeat: Heartbeat) {
        self.state.lock().heartbeat = heartbeat;
    }

    /// Make `close()` of subsequent sessions never complete, as on a dead
    /// TCP connection with a full send buffer.
    pub fn set_close_hangs(&self, hangs: bool) {
        self.state.lock().close_hangs = hangs;
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn sessions(&self) -> Vec<MockSession> {
        self.state.lock().sessions.clone()
    }

    /// Most recently opened session.
    pub fn session(&self) -> MockSession {
        self.state
            .lock()
            .sessions
            .last()
            .cloned()
            .expect("no session opened")
    }

    fn new_session(&self) -> Session {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChannelResult<Decoded>>();
        let handle = MockSession {
            inbound: Arc::new(Mutex::new(Some(tx))),
            sent: Arc::new(Mutex::new(Vec::new())),
            heartbeats: Arc::new(Mutex::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            close_hangs: Arc::new(AtomicBool::new(false)),
        };
        let heartbeat = {
            let mut state = self.state.lock();
            handle
                .close_hangs
                .store(state.close_hangs, Ordering::SeqCst);
            state.sessions.push(handle.clone());
            state.heartbeat
        };
        Session {
            sink: Box::new(MockSink {
                session: handle.clone(),
            }),
            stream: Box::pin(futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx))),
            heartbeat,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _config: &ChannelConfig) -> ChannelResult<Session> {
        let outcome = {
            let mut state = self.state.lock();
            state.opens += 1;
            match state.script.pop_front() {
                Some(outcome) => outcome,
                None if state.fallback_ok => Open::Succeed,
                None => Open::Fail(ChannelError::websocket("connection refused")),
            }
        };
        match outcome {
            Open::Succeed => Ok(self.new_session()),
            Open::Fail(err) => Err(err),
            Open::Hang => std::future::pending().await,
            Open::Gated(rx) => {
                let _ = rx.await;
                Ok(self.new_session())
            }
        }
    }
}

/// Test-side view of one opened session.
#[derive(Clone)]
pub struct MockSession {
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<ChannelResult<Decoded>>>>>,
    sent: Arc<Mutex<Vec<Frame>>>,
    heartbeats: Arc<Mutex<usize>>,
    closed: Arc<AtomicBool>,
    close_hangs: Arc<AtomicBool>,
}

impl MockSession {
    fn push(&self, item: ChannelResult<Decoded>) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.send(item);
        }
    }

    /// Deliver a `MESSAGE` frame for subscription `id`.
    pub fn message(&self, id: &str, body: &str) {
        let frame = Frame::new(Command::Message)
            .header("subscription", id)
            .header("destination", "/topic/test")
            .header("message-id", "m-1")
            .with_body(body.to_string());
        self.push(Ok(Decoded::Frame(frame)));
    }

    /// Deliver a `MESSAGE` on whatever subscription the client opened for
    /// `destination`.
    pub fn publish(&self, destination: &str, body: &str) {
        let id = self
            .subscription_id(destination)
            .unwrap_or_else(|| panic!("no subscription for {destination}"));
        self.message(&id, body);
    }

    pub fn server_error(&self, message: &str) {
        let frame = Frame::new(Command::Error).header("message", message);
        self.push(Ok(Decoded::Frame(frame)));
    }

    pub fn heartbeat(&self) {
        self.push(Ok(Decoded::Heartbeat));
    }

    /// End the inbound stream, as a peer close does.
    pub fn hang_up(&self) {
        self.inbound.lock().take();
    }

    pub fn fail(&self, err: ChannelError) {
        self.push(Err(err));
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent.lock().iter().map(|f| f.command).collect()
    }

    /// Id of the latest `SUBSCRIBE` sent for `destination`.
    pub fn subscription_id(&self, destination: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|f| f.command == Command::Subscribe && f.destination() == Some(destination))
            .and_then(|f| f.get("id").map(str::to_string))
    }

    pub fn heartbeats_sent(&self) -> usize {
        *self.heartbeats.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockSink {
    session: MockSession,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()> {
        if self.session.is_closed() {
            return Err(ChannelError::connection_closed(None));
        }
        self.session.sent.lock().push(frame);
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> ChannelResult<()> {
        *self.session.heartbeats.lock() += 1;
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.session.closed.store(true, Ordering::SeqCst);
        if self.session.close_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Config with a short, predictable retry schedule.
pub fn test_config() -> ChannelConfig {
    ChannelConfig::new("ws://alerts.test/ws")
        .reconnect_interval(Duration::from_secs(3))
        .max_reconnect_attempts(3)
        .connect_timeout(Duration::from_secs(5))
}

pub fn channel(transport: &MockTransport) -> AlertChannel {
    AlertChannel::builder(test_config())
        .transport(transport.clone())
        .build()
        .expect("valid config")
}

/// Record every status notification.
pub fn record_status(channel: &AlertChannel) -> Arc<Mutex<Vec<ConnectionState>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = channel.on_status(move |state| sink.lock().push(*state));
    seen
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
