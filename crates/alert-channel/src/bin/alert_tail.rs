//! alert-tail - follow the alert channel from a terminal.
//!
//! Connects to the backend's STOMP endpoint, subscribes the requested topics
//! and logs every status change and event until Ctrl-C.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use alert_channel::{
    AlertChannel, AlertFeed, ChannelConfig, ChannelOptions, ConnectionState, FeedOptions,
    HttpAlertsApi, Topic,
};
use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Tail real-time HR alerts.
///
/// Options are read from an optional TOML file using the camelCase keys
/// `url`, `reconnectInterval`, `maxReconnectAttempts`, `heartbeatInterval`
/// and `connectTimeout` (milliseconds). Flags override the file.
#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    /// TOML file with channel options
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// STOMP endpoint (SockJS http(s) URL or raw ws(s) URL)
    #[arg(long, env = "ALERT_CHANNEL_URL")]
    url: Option<String>,

    /// Follow the alerts of this employee
    #[arg(short, long)]
    user_id: Option<i64>,

    /// Follow global alerts
    #[arg(long)]
    global: bool,

    /// Follow unread-count ticks
    #[arg(long)]
    stats: bool,

    /// Fixed delay between reconnect attempts
    #[arg(long, value_name = "MS")]
    reconnect_interval_ms: Option<u64>,

    /// Reconnect attempts before giving up
    #[arg(long, value_name = "N")]
    max_reconnect_attempts: Option<u32>,

    /// STOMP heart-beat interval, 0 disables
    #[arg(long, value_name = "MS")]
    heartbeat_ms: Option<u64>,

    /// Bearer token sent in CONNECT and to the REST API
    #[arg(long, env = "ALERT_CHANNEL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// REST base URL. With --user-id, keeps a local feed and logs the unread
    /// count.
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ChannelOptions {
        ChannelOptions {
            url: self.url.clone(),
            reconnect_interval: self.reconnect_interval_ms,
            max_reconnect_attempts: self.max_reconnect_attempts,
            heartbeat_interval: self.heartbeat_ms,
            connect_timeout: None,
        }
    }

    fn topics(&self) -> Vec<Topic> {
        let mut topics = Vec::new();
        if let Some(user_id) = self.user_id {
            topics.push(Topic::employee_alerts(user_id));
        }
        if self.global {
            topics.push(Topic::global_alerts());
        }
        if self.stats {
            topics.push(Topic::stats());
        }
        topics
    }
}

fn load_options(path: &Path) -> anyhow::Result<ChannelOptions> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid options in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = ChannelConfig::default();
    if let Some(path) = &cli.config {
        config.apply(&load_options(path)?);
    }
    config.apply(&cli.overrides());
    if let Some(token) = &cli.token {
        config = config.bearer_token(token);
    }

    let topics = cli.topics();
    if topics.is_empty() {
        warn!("No topic selected, only status changes will be shown");
    }

    let channel = AlertChannel::new(config).context("invalid channel configuration")?;
    info!(url = %channel.config().url, topics = topics.len(), "Starting alert-tail");

    let mut disposers = vec![
        channel.on_alert(|alert| {
            info!(
                id = alert.id,
                severity = %alert.severity,
                unread = alert.is_unread(),
                user_id = ?alert.user_id,
                "{}",
                alert.message
            );
        }),
        channel.on_alert_deleted(|deleted| info!(id = deleted.id, "Alert deleted")),
        channel.on_stats(|tick| info!(user_id = ?tick.user_id, "Unread count changed")),
    ];

    let mut feed = None;
    match (&cli.api_url, cli.user_id) {
        (Some(api_url), Some(user_id)) => {
            let mut api = HttpAlertsApi::new(api_url.as_str())?;
            if let Some(token) = &cli.token {
                api = api.bearer_token(token.as_str());
            }
            let options = FeedOptions::new(user_id)
                .include_global(cli.global)
                .include_stats(cli.stats);
            let started = AlertFeed::start(channel.clone(), Arc::new(api), options)
                .await
                .context("failed to load alert snapshot")?;
            info!(
                alerts = started.snapshot().len(),
                unread = started.unread_count(),
                "Alert snapshot loaded"
            );
            disposers.push(started.on_change(|projection| {
                info!(
                    alerts = projection.len(),
                    unread = projection.unread_count(),
                    "Feed updated"
                );
            }));
            feed = Some(started);
        }
        (Some(_), None) => warn!("--api-url needs --user-id, REST feed disabled"),
        _ => {}
    }

    let ch = channel.clone();
    let resubscribe = feed.is_none();
    disposers.push(channel.on_status(move |state| {
        match state {
            ConnectionState::Connected => info!("Alert channel connected"),
            ConnectionState::Error => warn!(attempts = ch.reconnect_attempts(), "Alert channel error"),
            other => info!(state = %other, "Alert channel status"),
        }
        if resubscribe && state.is_connected() {
            for topic in &topics {
                ch.subscribe_topic(topic.clone());
            }
        }
    }));

    if let Err(err) = channel.connect().await {
        error!(error = %err, "Initial connection failed, retrying in the background");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutting down");

    if let Some(mut feed) = feed {
        feed.stop();
    }
    for disposer in disposers {
        disposer.dispose();
    }
    channel.disconnect();
    Ok(())
}
