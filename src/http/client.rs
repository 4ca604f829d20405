//! HTTP client with rate limiting and a single 429 retry

use super::rate_limit::RateLimiter;
use crate::auth::CredentialProvider;
use crate::config::ApiSettings;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Query string as ordered key/value pairs
pub type QueryParams = Vec<(String, String)>;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL every path is joined onto (must end with `/`)
    pub base_url: Url,
    /// Request timeout
    pub timeout: Duration,
    /// Minimum spacing between consecutive calls
    pub min_request_interval: Duration,
    /// Sleep before retrying a 429
    pub rate_limit_backoff: Duration,
    /// User agent string
    pub user_agent: String,
}

impl HttpClientConfig {
    /// Config with default timeout, spacing and backoff
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(60),
            min_request_interval: Duration::from_millis(350),
            rate_limit_backoff: Duration::from_millis(2000),
            user_agent: format!("stagesync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Config from the `api` settings section
    pub fn from_settings(settings: &ApiSettings, base_url: Url) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            min_request_interval: Duration::from_millis(settings.min_request_interval_ms),
            rate_limit_backoff: Duration::from_millis(settings.rate_limit_backoff_ms),
            ..Self::new(base_url)
        }
    }

    /// Set the request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the minimum call spacing
    #[must_use]
    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    /// Set the 429 backoff
    #[must_use]
    pub fn rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }
}

/// JSON client for the upstream API
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a client without credentials
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let rate_limiter = RateLimiter::with_interval(config.min_request_interval);

        Ok(Self {
            client,
            config,
            credentials: None,
            rate_limiter,
        })
    }

    /// Attach a credential provider
    #[must_use]
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Resolve an endpoint path against the base URL
    pub fn url_for(&self, path: &str) -> Result<Url> {
        Ok(self.config.base_url.join(path.trim_start_matches('/'))?)
    }

    /// GET a JSON document.
    ///
    /// A 429 sleeps for the configured backoff and retries the same call once;
    /// a second 429 is returned as [`Error::RateLimited`]. Other non-success
    /// statuses become [`Error::HttpStatus`]. An empty body decodes as `null`.
    pub async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<JsonValue> {
        let url = self.url_for(path)?;
        let mut retried = false;

        loop {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let mut req = self
                .client
                .get(url.clone())
                .header(ACCEPT, "application/json");
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(ref provider) = self.credentials {
                req = req.bearer_auth(provider.bearer_token().await?);
            }

            let response = req.send().await.map_err(|e| self.transport_error(e))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                #[allow(clippy::cast_possible_truncation)]
                let backoff_ms = self.config.rate_limit_backoff.as_millis() as u64;
                if retried {
                    return Err(Error::RateLimited { backoff_ms });
                }
                warn!(path, backoff_ms, "Rate limited (429), retrying once");
                tokio::time::sleep(self.config.rate_limit_backoff).await;
                retried = true;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::http_status(status.as_u16(), body));
            }

            let body = response.text().await.map_err(|e| self.transport_error(e))?;
            debug!(path, status = status.as_u16(), bytes = body.len(), "GET succeeded");
            if body.trim().is_empty() {
                return Ok(JsonValue::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            #[allow(clippy::cast_possible_truncation)]
            return Error::Timeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            };
        }
        Error::Http(e)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("rate_limiter", &self.rate_limiter)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}
