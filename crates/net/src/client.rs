//! HTTP client with connection pooling and retry logic

use assetpack_config::NetworkConfig;
use assetpack_errors::{Error, NetworkError};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // 5 minutes for large model files
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            retry_count: 0,
            retry_delay: Duration::from_secs(1),
            user_agent: format!("assetpack/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&NetworkConfig> for NetConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            timeout: config.timeout(),
            connect_timeout: config.connect_timeout(),
            retry_count: config.retries,
            retry_delay: config.retry_delay(),
            ..Self::default()
        }
    }
}

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ClientInit(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Execute a GET request with retries
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts, including
    /// network timeouts, connection failures, or server errors.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.retry_request(url, || self.client.get(url).send())
            .await
    }

    /// Execute a request, retrying transient failures up to `retry_count` times
    ///
    /// Only timeouts, refused connections and 5xx responses are retried.
    /// Every retry is logged at warn level.
    async fn retry_request<F, Fut>(&self, url: &str, mut f: F) -> Result<Response, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            let can_retry = attempt < self.config.retry_count;
            let reason = match f().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if let Some(retry_after) = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                        {
                            return Err(NetworkError::RateLimited {
                                seconds: retry_after,
                            }
                            .into());
                        }
                    }
                    if !(status.is_server_error() && can_retry) {
                        return Ok(response);
                    }
                    format!("HTTP {status}")
                }
                Err(e) => {
                    if !(Self::is_transient(&e) && can_retry) {
                        return Err(Self::map_error(url, &e));
                    }
                    e.to_string()
                }
            };

            attempt += 1;
            tracing::warn!(url, attempt, reason = %reason, "request failed, retrying");
            tokio::time::sleep(self.config.retry_delay * attempt).await;
        }
    }

    /// Transport failures that may succeed on a second attempt
    fn is_transient(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }

    fn map_error(url: &str, error: &reqwest::Error) -> Error {
        if error.is_timeout() {
            NetworkError::Timeout {
                url: url.to_string(),
            }
            .into()
        } else if error.is_connect() {
            NetworkError::ConnectionRefused(error.to_string()).into()
        } else {
            NetworkError::DownloadFailed {
                url: url.to_string(),
                message: error.to_string(),
            }
            .into()
        }
    }
}
