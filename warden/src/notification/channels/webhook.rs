//! Webhook channel: posts each message as JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::NotificationChannel;
use crate::notification::events::{MessageKind, OutboundMessage, Severity};
use crate::utils::http_client::build_client;
use crate::utils::process::tail;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    /// `POST` (default), `PUT` or `PATCH`.
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    /// Messages below this severity are not posted. Defaults to warning, so
    /// digests and recoveries stay out of chat rooms unless asked for.
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_min_severity() -> Severity {
    Severity::Warning
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            method: default_method(),
            headers: BTreeMap::new(),
            auth: None,
            min_severity: default_min_severity(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookAuth {
    Bearer { token: String },
    Basic { username: String, password: String },
    /// Arbitrary header, e.g. `X-Api-Key`.
    Header { name: String, value: String },
}

/// Body posted to the webhook.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    kind: MessageKind,
    severity: Severity,
    component: Option<&'a str>,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    timestamp: DateTime<Utc>,
}

impl<'a> From<&'a OutboundMessage> for WebhookPayload<'a> {
    fn from(message: &'a OutboundMessage) -> Self {
        Self {
            kind: message.kind,
            severity: message.severity,
            component: message.component.as_deref(),
            to: &message.to,
            subject: &message.subject,
            body: &message.body,
            timestamp: message.timestamp,
        }
    }
}

pub struct WebhookChannel {
    config: WebhookConfig,
    method: Method,
    headers: HeaderMap,
    client: Client,
}

impl WebhookChannel {
    /// Build the channel, rejecting a bad method, URL or header up front
    /// rather than on the first alert.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let method = match config.method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "PATCH" => Method::PATCH,
            other => {
                return Err(Error::config(format!(
                    "webhook: unsupported method {}",
                    other
                )));
            }
        };
        if config.enabled {
            reqwest::Url::parse(&config.url)
                .map_err(|e| Error::config(format!("webhook: invalid url: {}", e)))?;
        }

        let headers = request_headers(&config)?;
        let client = build_client(Duration::from_secs(config.timeout_secs));
        Ok(Self {
            config,
            method,
            headers,
            client,
        })
    }

    fn wants(&self, severity: Severity) -> bool {
        severity >= self.config.min_severity
    }
}

fn header(name: &str, value: &str, sensitive: bool) -> Result<(HeaderName, HeaderValue)> {
    let name = name
        .parse::<HeaderName>()
        .map_err(|e| Error::config(format!("webhook: bad header name {}: {}", name, e)))?;
    let mut value = value
        .parse::<HeaderValue>()
        .map_err(|e| Error::config(format!("webhook: bad value for header {}: {}", name, e)))?;
    value.set_sensitive(sensitive);
    Ok((name, value))
}

fn request_headers(config: &WebhookConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let (name, value) = header(name, value, false)?;
        headers.insert(name, value);
    }

    let auth = match &config.auth {
        Some(WebhookAuth::Bearer { token }) => {
            Some(header(AUTHORIZATION.as_str(), &format!("Bearer {}", token), true)?)
        }
        Some(WebhookAuth::Header { name, value }) => Some(header(name, value, true)?),
        Some(WebhookAuth::Basic { .. }) | None => None,
    };
    if let Some((name, value)) = auth {
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_enabled() || !self.wants(message.severity) {
            return Ok(());
        }

        let mut request = self
            .client
            .request(self.method.clone(), &self.config.url)
            .headers(self.headers.clone())
            .json(&WebhookPayload::from(message));
        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::notify("webhook", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::notify(
                "webhook",
                format!("{} - {}", status, tail(&body, 256)),
            ));
        }

        debug!(url = %self.config.url, status = status.as_u16(), "Webhook accepted message");
        Ok(())
    }
}
