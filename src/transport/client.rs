use futures::StreamExt;
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::util::validate_base_url;

/// Retries per logical call unless the caller asks otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Failures surfaced by [`TransportClient::request`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Malformed URL, path, or parameters. A programming error, never retried.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// HTTP 401
    #[error("Not authorized")]
    Auth,
    /// HTTP 429 on every attempt
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    /// Any other non-2xx status
    #[error("Server error: status {0}")]
    Server(u16),
    /// DNS, connect, reset, or timeout on every attempt
    #[error("Network failure after {attempts} attempts: {message}")]
    Network { attempts: u32, message: String },
    /// 2xx body did not match the expected schema
    #[error("Failed to decode response: {0}")]
    Decoding(String),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

impl TransportError {
    /// Returns true if a later user-initiated retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited { .. }
                | TransportError::Network { .. }
                | TransportError::Server(500..=599)
        )
    }
}

/// Outcome of a single attempt, before the retry policy is applied.
enum AttemptError {
    RateLimited,
    Transport(String),
    Fatal(TransportError),
}

/// Create a redirect policy with loop detection and limited hops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// HTTP client for the news API.
///
/// Stateless apart from the connection pool inside `reqwest::Client`, so it is
/// cheap to clone and share between tasks.
#[derive(Clone)]
pub struct TransportClient {
    http: reqwest::Client,
    base_url: Url,
    // Stub for auth: token refresh is out of scope, a static token is sent as-is.
    token: Option<SecretString>,
    attempt_timeout: Duration,
    rate_limit_delay: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("attempt_timeout", &self.attempt_timeout)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl TransportClient {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let base_url = validate_base_url(&config.api_base_url)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.resource_timeout())
            .connect_timeout(config.attempt_timeout())
            .redirect(create_redirect_policy())
            .user_agent(concat!("matchday/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token: config.api_token.clone().map(SecretString::from),
            attempt_timeout: config.attempt_timeout(),
            rate_limit_delay: config.rate_limit_delay(),
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Configured retry budget for [`get`](Self::get).
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// GET with the configured retry budget.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, TransportError> {
        self.request(path, Method::GET, params, self.max_retries)
            .await
    }

    /// Perform a request and decode a JSON body into `T`.
    ///
    /// # Retry policy
    ///
    /// At most `max_retries + 1` attempts are made, and the budget is shared
    /// between the two retryable causes:
    ///
    /// - HTTP 429: wait the fixed rate-limit delay (1s), then retry.
    ///   Exhaustion yields [`TransportError::RateLimited`].
    /// - Transport failures (DNS, connect, reset, per-attempt timeout): retry
    ///   immediately. Exhaustion yields [`TransportError::Network`].
    ///
    /// 401, other non-2xx statuses, and decoding failures return at once.
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        method: Method,
        params: &[(&str, String)],
        max_retries: u32,
    ) -> Result<T, TransportError> {
        let url = self.build_url(path, params)?;
        let mut attempts: u32 = 0;

        let body = loop {
            attempts += 1;
            match self.attempt(&method, &url).await {
                Ok(body) => break body,
                Err(AttemptError::RateLimited) => {
                    if attempts > max_retries {
                        tracing::warn!(url = %url, attempts, "Rate limited, retries exhausted");
                        return Err(TransportError::RateLimited { attempts });
                    }
                    tracing::warn!(
                        url = %url,
                        attempt = attempts,
                        delay_ms = self.rate_limit_delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(self.rate_limit_delay).await;
                }
                Err(AttemptError::Transport(message)) => {
                    if attempts > max_retries {
                        tracing::warn!(url = %url, attempts, error = %message, "Network failure, retries exhausted");
                        return Err(TransportError::Network { attempts, message });
                    }
                    tracing::debug!(
                        url = %url,
                        attempt = attempts,
                        error = %message,
                        "Retrying after transport failure"
                    );
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        };

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Response did not match expected schema");
            TransportError::Decoding(e.to_string())
        })
    }

    fn build_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, TransportError> {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return Err(TransportError::InvalidRequest("empty path".to_string()));
        }
        let mut url = self
            .base_url
            .join(relative)
            .map_err(|e| TransportError::InvalidRequest(format!("{path}: {e}")))?;

        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                if key.is_empty() {
                    return Err(TransportError::InvalidRequest(
                        "empty query parameter name".to_string(),
                    ));
                }
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn attempt(&self, method: &Method, url: &Url) -> Result<Vec<u8>, AttemptError> {
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let exchange = async {
            let response = request.send().await.map_err(classify_reqwest_error)?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(AttemptError::Fatal(TransportError::Auth));
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(AttemptError::RateLimited);
            }
            if !status.is_success() {
                return Err(AttemptError::Fatal(TransportError::Server(status.as_u16())));
            }

            read_limited_bytes(response, MAX_RESPONSE_SIZE).await
        };

        tokio::time::timeout(self.attempt_timeout, exchange)
            .await
            .map_err(|_| {
                AttemptError::Transport(format!(
                    "request timed out after {}ms",
                    self.attempt_timeout.as_millis()
                ))
            })?
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> AttemptError {
    if err.is_builder() {
        AttemptError::Fatal(TransportError::InvalidRequest(err.to_string()))
    } else {
        AttemptError::Transport(err.to_string())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, AttemptError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(AttemptError::Fatal(TransportError::ResponseTooLarge(limit)));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AttemptError::Transport(e.to_string()))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(AttemptError::Fatal(TransportError::ResponseTooLarge(limit)));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
