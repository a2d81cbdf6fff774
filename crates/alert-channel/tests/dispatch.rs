mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use alert_channel::{
    AlertChannel, ConnectionState, Disposer, Topic,
    channel::{Alert, AlertDeleted, ReadState, Severity, StatsChanged},
};
use common::{MockSession, MockTransport, channel, settle};
use parking_lot::Mutex;

const USER_TOPIC: &str = "/topic/alertes/employe/3";
const GLOBAL: &str = "/topic/alertes/global";
const STATS: &str = "/topic/alertes/stats";

const ALERT_7: &str = r#"{"id":7,"message":"Leave request approved","type":"INFO","status":"UNREAD","timestamp":"2024-01-01T00:00:00Z","userId":3}"#;

async fn connected() -> (MockTransport, AlertChannel, MockSession) {
    let transport = MockTransport::succeeding();
    let channel = channel(&transport);
    channel.connect().await.unwrap();
    channel.subscribe_topic(Topic::employee_alerts(3));
    channel.subscribe_topic(Topic::global_alerts());
    channel.subscribe_topic(Topic::stats());
    settle().await;
    let session = transport.session();
    (transport, channel, session)
}

fn collect<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |value: &T| sink.lock().push(value.clone()))
}

#[tokio::test(start_paused = true)]
async fn test_alert_payload_reaches_alert_listeners() {
    let (_transport, channel, session) = connected().await;
    let (alerts, on_alert) = collect::<Alert>();
    let (deleted, on_deleted) = collect::<AlertDeleted>();
    let (stats, on_stats) = collect::<StatsChanged>();
    let _a = channel.on_alert(on_alert);
    let _d = channel.on_alert_deleted(on_deleted);
    let _s = channel.on_stats(on_stats);

    session.publish(USER_TOPIC, ALERT_7);
    settle().await;

    let alerts = alerts.lock();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, 7);
    assert_eq!(alerts[0].message, "Leave request approved");
    assert_eq!(alerts[0].severity, Severity::Info);
    assert_eq!(alerts[0].read_state, ReadState::Unread);
    assert!(deleted.lock().is_empty());
    assert!(stats.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_notice_reaches_delete_listeners() {
    let (_transport, channel, session) = connected().await;
    let (alerts, on_alert) = collect::<Alert>();
    let (deleted, on_deleted) = collect::<AlertDeleted>();
    let _a = channel.on_alert(on_alert);
    let _d = channel.on_alert_deleted(on_deleted);

    session.publish(GLOBAL, r#"{"action":"DELETE","alerteId":7}"#);
    settle().await;

    assert_eq!(*deleted.lock(), vec![AlertDeleted { id: 7 }]);
    assert!(alerts.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stats_ticks_reach_stats_listeners() {
    let (_transport, channel, session) = connected().await;
    let (stats, on_stats) = collect::<StatsChanged>();
    let _s = channel.on_stats(on_stats);

    session.publish(STATS, r#"{"userId":3,"unread":2}"#);
    session.publish(STATS, "4");
    settle().await;

    assert_eq!(
        *stats.lock(),
        vec![
            StatsChanged { user_id: Some(3) },
            StatsChanged { user_id: Some(4) }
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_do_not_stop_the_session() {
    let (_transport, channel, session) = connected().await;
    let (alerts, on_alert) = collect::<Alert>();
    let _a = channel.on_alert(on_alert);

    session.publish(USER_TOPIC, "{not json");
    session.publish(USER_TOPIC, r#"{"hello":"world"}"#);
    session.publish(USER_TOPIC, ALERT_7);
    settle().await;

    assert_eq!(alerts.lock().len(), 1);
    assert_eq!(channel.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_frames_for_inactive_subscriptions_are_dropped() {
    let (_transport, channel, session) = connected().await;
    let (alerts, on_alert) = collect::<Alert>();
    let _a = channel.on_alert(on_alert);

    session.message("sub-99", ALERT_7);
    let id = session.subscription_id(USER_TOPIC).unwrap();
    channel.unsubscribe_topic(&Topic::employee_alerts(3));
    session.message(&id, ALERT_7);
    settle().await;

    assert!(alerts.lock().is_empty());
    assert!(channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_block_others() {
    let (_transport, channel, session) = connected().await;
    let count = Arc::new(AtomicUsize::new(0));

    let _bad = channel.on_alert(|_| panic!("listener failure"));
    let c = Arc::clone(&count);
    let _good = channel.on_alert(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    session.publish(USER_TOPIC, ALERT_7);
    session.publish(USER_TOPIC, ALERT_7);
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_disposed_listener_stops_receiving() {
    let (_transport, channel, session) = connected().await;
    let count = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&count);
    let disposer = channel.on_alert(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    session.publish(USER_TOPIC, ALERT_7);
    settle().await;
    disposer.dispose();
    disposer.dispose();
    session.publish(USER_TOPIC, ALERT_7);
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_listener_disposed_by_earlier_listener_is_skipped() {
    let (_transport, channel, session) = connected().await;
    let count = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Disposer>>> = Arc::new(Mutex::new(None));

    let s = Arc::clone(&slot);
    let _first = channel.on_alert(move |_| {
        if let Some(disposer) = s.lock().as_ref() {
            disposer.dispose();
        }
    });
    let c = Arc::clone(&count);
    let second = channel.on_alert(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    *slot.lock() = Some(second);

    session.publish(USER_TOPIC, ALERT_7);
    session.publish(USER_TOPIC, ALERT_7);
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_same_callback_registered_twice_runs_twice() {
    let (_transport, channel, session) = connected().await;
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let callback = move |_: &AlertDeleted| {
        c.fetch_add(1, Ordering::SeqCst);
    };

    let _one = channel.on_alert_deleted(callback.clone());
    let _two = channel.on_alert_deleted(callback);

    session.publish(GLOBAL, r#"{"action":"DELETE","id":1}"#);
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_listener_may_disconnect_during_dispatch() {
    let (_transport, channel, session) = connected().await;
    let count = Arc::new(AtomicUsize::new(0));

    let ch = channel.clone();
    let _stopper = channel.on_alert(move |_| ch.disconnect());
    let c = Arc::clone(&count);
    let _after = channel.on_alert(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    session.publish(USER_TOPIC, ALERT_7);
    session.publish(USER_TOPIC, ALERT_7);
    settle().await;

    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(session.is_closed());
}
