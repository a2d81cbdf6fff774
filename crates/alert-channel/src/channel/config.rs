//! Alert channel configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::reconnect::ReconnectPolicy;

/// Default STOMP endpoint of the backend.
pub const DEFAULT_URL: &str = "http://localhost:8080/ws";

/// Configuration for the alert channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    // URL
    /// STOMP endpoint. `http(s)` URLs address the SockJS endpoint and are
    /// mapped to its raw WebSocket path; `ws(s)` URLs are used as given.
    pub url: String,

    // Reconnection settings
    /// Fixed delay before each automatic retry.
    pub reconnect_interval: Duration,
    /// Number of automatic retries after a failure before settling in `Error`.
    pub max_reconnect_attempts: u32,

    // Heartbeat settings
    /// Heart-beat offered in both directions. Zero disables heartbeats.
    pub heartbeat_interval: Duration,

    // Connection
    /// Timeout for the WebSocket upgrade plus the STOMP handshake.
    pub connect_timeout: Duration,
    /// Extra `CONNECT` headers, e.g. `Authorization`.
    pub connect_headers: Vec<(String, String)>,
    /// Maximum inbound frame size in bytes.
    pub max_frame_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect_interval: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(4),
            connect_timeout: Duration::from_secs(10),
            connect_headers: Vec::new(),
            max_frame_size: 1024 * 1024, // 1 MB
        }
    }
}

impl ChannelConfig {
    /// Create a new configuration with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the reconnect interval.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the maximum number of automatic retries.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a header to the STOMP `CONNECT` frame.
    #[must_use]
    pub fn connect_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_headers.push((name.into(), value.into()));
        self
    }

    /// Send `Authorization: Bearer <token>` in `CONNECT`.
    #[must_use]
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.connect_header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Set the maximum inbound frame size.
    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Merge a partial overlay. Fields absent from `options` are untouched.
    pub fn apply(&mut self, options: &ChannelOptions) {
        if let Some(url) = &options.url {
            self.url.clone_from(url);
        }
        if let Some(ms) = options.reconnect_interval {
            self.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = options.max_reconnect_attempts {
            self.max_reconnect_attempts = attempts;
        }
        if let Some(ms) = options.heartbeat_interval {
            self.heartbeat_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = options.connect_timeout {
            self.connect_timeout = Duration::from_millis(ms);
        }
    }

    pub(crate) fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: self.reconnect_interval,
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// URL handed to the WebSocket client.
    ///
    /// `http://host/ws` becomes `ws://host/ws/websocket`, the raw WebSocket
    /// transport every SockJS endpoint exposes.
    pub fn websocket_url(&self) -> String {
        let url = self.url.trim_end_matches('/');
        let mapped = if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return url.to_string();
        };
        if mapped.ends_with("/websocket") {
            mapped
        } else {
            format!("{mapped}/websocket")
        }
    }

    /// Host part of the URL, sent as the STOMP `host` header.
    pub fn host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        without_scheme
            .split(['/', '?'])
            .next()
            .and_then(|authority| authority.rsplit('@').next())
            .map(|host_port| match host_port.find(']') {
                // Bracketed IPv6 literal; the port, if any, follows the bracket.
                Some(end) if host_port.starts_with('[') => &host_port[..=end],
                _ => host_port
                    .rsplit_once(':')
                    .map_or(host_port, |(host, _)| host),
            })
            .unwrap_or_default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if !["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
        {
            return Err("URL scheme must be ws, wss, http or https".to_string());
        }
        self.reconnect_policy().validate()?;
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.max_frame_size == 0 {
            return Err("Max frame size must be > 0".to_string());
        }
        Ok(())
    }
}

/// Partial configuration, deserialised from the camelCase surface
/// `{ url, reconnectInterval, maxReconnectAttempts, heartbeatInterval }`
/// with millisecond integers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChannelOptions {
    pub url: Option<String>,
    pub reconnect_interval: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat_interval: Option<u64>,
    pub connect_timeout: Option<u64>,
}

impl ChannelOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.reconnect_interval, Duration::from_secs(3));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(4));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.connect_headers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ChannelConfig::new("wss://hr.example.com/ws")
            .reconnect_interval(Duration::from_millis(500))
            .max_reconnect_attempts(10)
            .heartbeat_interval(Duration::ZERO)
            .bearer_token("abc");

        assert_eq!(config.reconnect_interval, Duration::from_millis(500));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert!(config.heartbeat_interval.is_zero());
        assert_eq!(
            config.connect_headers,
            vec![("Authorization".to_string(), "Bearer abc".to_string())]
        );
    }

    #[test]
    fn test_apply_merges_only_present_fields() {
        let mut config = ChannelConfig::new("ws://a/ws");
        config.apply(&ChannelOptions {
            reconnect_interval: Some(1500),
            max_reconnect_attempts: Some(2),
            ..Default::default()
        });

        assert_eq!(config.url, "ws://a/ws");
        assert_eq!(config.reconnect_interval, Duration::from_millis(1500));
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(4));
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: ChannelOptions = serde_json::from_str(
            r#"{"url":"http://hr:8080/ws","reconnectInterval":3000,"maxReconnectAttempts":5,"heartbeatInterval":10000}"#,
        )
        .unwrap();
        assert_eq!(options.url.as_deref(), Some("http://hr:8080/ws"));
        assert_eq!(options.reconnect_interval, Some(3000));
        assert_eq!(options.heartbeat_interval, Some(10000));
        assert!(!options.is_empty());
        assert!(ChannelOptions::default().is_empty());
    }

    #[test]
    fn test_options_reject_unknown_fields() {
        assert!(serde_json::from_str::<ChannelOptions>(r#"{"retries":3}"#).is_err());
    }

    #[test]
    fn test_websocket_url_mapping() {
        assert_eq!(
            ChannelConfig::new("http://localhost:8080/ws").websocket_url(),
            "ws://localhost:8080/ws/websocket"
        );
        assert_eq!(
            ChannelConfig::new("https://hr.example.com/ws/").websocket_url(),
            "wss://hr.example.com/ws/websocket"
        );
        assert_eq!(
            ChannelConfig::new("ws://localhost:9000/stomp").websocket_url(),
            "ws://localhost:9000/stomp"
        );
    }

    #[test]
    fn test_host_extraction() {
        assert_eq!(ChannelConfig::new("http://localhost:8080/ws").host(), "localhost");
        assert_eq!(ChannelConfig::new("wss://user@hr.example.com/ws").host(), "hr.example.com");
        assert_eq!(ChannelConfig::new("ws://127.0.0.1:9/").host(), "127.0.0.1");
    }

    #[test]
    fn test_host_extraction_ipv6() {
        assert_eq!(ChannelConfig::new("ws://[::1]/ws").host(), "[::1]");
        assert_eq!(ChannelConfig::new("ws://[::1]:8080/ws").host(), "[::1]");
        assert_eq!(
            ChannelConfig::new("wss://user@[2001:db8::7]:443/ws?x=1").host(),
            "[2001:db8::7]"
        );
    }

    #[test]
    fn test_validation_empty_url() {
        let result = ChannelConfig::new("").validate();
        assert_eq!(result.unwrap_err(), "URL cannot be empty");
    }

    #[test]
    fn test_validation_bad_scheme() {
        let result = ChannelConfig::new("ftp://host/ws").validate();
        assert_eq!(result.unwrap_err(), "URL scheme must be ws, wss, http or https");
    }

    #[test]
    fn test_validation_zero_reconnect_interval() {
        let result = ChannelConfig::new("ws://host/ws")
            .reconnect_interval(Duration::ZERO)
            .validate();
        assert_eq!(result.unwrap_err(), "Reconnect interval must be > 0");
    }

    #[test]
    fn test_validation_zero_connect_timeout() {
        let result = ChannelConfig::new("ws://host/ws")
            .connect_timeout(Duration::ZERO)
            .validate();
        assert_eq!(result.unwrap_err(), "Connect timeout must be > 0");
    }
}
