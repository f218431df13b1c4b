//! HTTP probe.
//!
//! Issues one request and checks the status code and, optionally, the body.
//! Used for the web process health endpoint and for minimal completion
//! requests against AI providers.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, header::HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::Probe;
use crate::utils::http_client::build_client;
use crate::utils::process::tail;
use crate::{Error, Result};

/// HTTP probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProbeConfig {
    /// Component name, e.g. `web` or `provider:gemini`.
    pub name: String,
    /// Target URL.
    pub url: String,
    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON request body.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Bearer token sent as `Authorization`.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default)]
    pub bearer_token_env: Option<String>,
    /// Accepted status codes; empty means any 2xx.
    #[serde(default)]
    pub expected_status: Vec<u16>,
    /// Substring that must appear in the response body.
    #[serde(default)]
    pub expect_body_contains: Option<String>,
    /// Per-probe timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Advisory probes alert but never restart.
    #[serde(default)]
    pub advisory: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpProbeConfig {
    pub fn get(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            bearer_token: None,
            bearer_token_env: None,
            expected_status: Vec::new(),
            expect_body_contains: None,
            timeout_secs: None,
            advisory: false,
        }
    }
}

pub struct HttpProbe {
    config: HttpProbeConfig,
    method: Method,
    headers: HeaderMap,
    client: Client,
}

impl HttpProbe {
    pub fn new(config: HttpProbeConfig) -> Result<Self> {
        let method = config
            .method
            .to_uppercase()
            .parse::<Method>()
            .map_err(|_| Error::config(format!("probe {}: invalid method {}", config.name, config.method)))?;
        reqwest::Url::parse(&config.url)
            .map_err(|e| Error::config(format!("probe {}: invalid url: {}", config.name, e)))?;

        let headers = build_headers(&config)?;
        let client = build_client(
            config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(Duration::ZERO),
        );

        Ok(Self {
            config,
            method,
            headers,
            client,
        })
    }

    fn status_accepted(&self, status: u16) -> bool {
        if self.config.expected_status.is_empty() {
            (200..300).contains(&status)
        } else {
            self.config.expected_status.contains(&status)
        }
    }
}

fn build_headers(config: &HttpProbeConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in &config.headers {
        let name = name
            .parse::<reqwest::header::HeaderName>()
            .map_err(|e| Error::config(format!("probe {}: bad header name: {}", config.name, e)))?;
        let value = value
            .parse::<reqwest::header::HeaderValue>()
            .map_err(|e| Error::config(format!("probe {}: bad header value: {}", config.name, e)))?;
        headers.insert(name, value);
    }

    let token = config.bearer_token.clone().or_else(|| {
        config
            .bearer_token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    });
    if let Some(token) = token {
        let mut value = format!("Bearer {}", token)
            .parse::<reqwest::header::HeaderValue>()
            .map_err(|_| Error::config(format!("probe {}: bad bearer token", config.name)))?;
        value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }

    Ok(headers)
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn restart_eligible(&self) -> bool {
        !self.config.advisory
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_secs.map(Duration::from_secs)
    }

    async fn check(&self) -> Result<()> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.config.url)
            .headers(self.headers.clone());
        if let Some(body) = &self.config.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::probe(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();

        if !self.status_accepted(status) {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::probe(format!(
                "unexpected status {}: {}",
                status,
                tail(body.trim(), 200)
            )));
        }

        if let Some(needle) = &self.config.expect_body_contains {
            let body = response
                .text()
                .await
                .map_err(|e| Error::probe(format!("reading body failed: {}", e)))?;
            if !body.contains(needle.as_str()) {
                return Err(Error::probe(format!("response body missing {:?}", needle)));
            }
        }

        trace!(component = %self.config.name, status, "HTTP probe passed");
        Ok(())
    }
}
