//! REST collaborator for alert snapshots and mutations.
//!
//! The push channel only carries deltas. Consumers load the initial list and
//! unread count, and mark or delete alerts, through [`AlertsApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    channel::Alert,
    error::{ChannelError, ChannelResult},
};

/// Alert endpoints of the backend.
#[async_trait]
pub trait AlertsApi: Send + Sync + 'static {
    /// All alerts addressed to `user_id`, newest first.
    async fn fetch_alerts(&self, user_id: i64) -> ChannelResult<Vec<Alert>>;

    /// Number of unread alerts of `user_id`.
    async fn unread_count(&self, user_id: i64) -> ChannelResult<u64>;

    /// Mark one alert as read.
    async fn mark_read(&self, alert_id: i64) -> ChannelResult<()>;

    /// Delete one alert.
    async fn delete(&self, alert_id: i64) -> ChannelResult<()>;
}

/// [`AlertsApi`] over HTTP with `reqwest`.
///
/// | Operation | Request |
/// |-----------|---------|
/// | `fetch_alerts` | `GET /api/alertes/employe/{userId}` |
/// | `unread_count` | `GET /api/alertes/employe/{userId}/non-lues/count` |
/// | `mark_read` | `PUT /api/alertes/{id}/lue` |
/// | `delete` | `DELETE /api/alertes/{id}` |
#[derive(Clone, Debug)]
pub struct HttpAlertsApi {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl HttpAlertsApi {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Client for the backend at `base_url`, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> ChannelResult<Self> {
        Self::with_timeout(base_url, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ChannelResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ChannelError::config(format!(
                "REST base URL must be http or https: {base_url}"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            client,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> ChannelResult<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), %body, "Alert API request failed");
        Err(ChannelError::api(status.as_u16(), body))
    }
}

#[async_trait]
impl AlertsApi for HttpAlertsApi {
    async fn fetch_alerts(&self, user_id: i64) -> ChannelResult<Vec<Alert>> {
        let url = self.url(&format!("/api/alertes/employe/{user_id}"));
        debug!(%url, "Fetching alerts");
        let response = self.send(self.client.get(&url)).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn unread_count(&self, user_id: i64) -> ChannelResult<u64> {
        let url = self.url(&format!("/api/alertes/employe/{user_id}/non-lues/count"));
        debug!(%url, "Fetching unread count");
        let response = self.send(self.client.get(&url)).await?;
        let body = response.text().await?;
        parse_count(&body)
    }

    async fn mark_read(&self, alert_id: i64) -> ChannelResult<()> {
        let url = self.url(&format!("/api/alertes/{alert_id}/lue"));
        debug!(%url, "Marking alert read");
        self.send(self.client.put(&url)).await?;
        Ok(())
    }

    async fn delete(&self, alert_id: i64) -> ChannelResult<()> {
        let url = self.url(&format!("/api/alertes/{alert_id}"));
        debug!(%url, "Deleting alert");
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}

/// The count endpoint answers either a bare number or `{"count": n}`.
fn parse_count(body: &str) -> ChannelResult<u64> {
    let value: Value = serde_json::from_str(body)?;
    let count = match &value {
        Value::Number(n) => n.as_u64(),
        Value::Object(obj) => obj.get("count").and_then(Value::as_u64),
        _ => None,
    };
    count.ok_or_else(|| ChannelError::Serialization {
        message: format!("unexpected unread count payload: {body}"),
    })
}
