//! Shared HTTP plumbing for the collaborator adapters: client construction,
//! transient-error classification and exponential-backoff retry.

use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RetryConfig;

/// Failure of one HTTP exchange, classified for retry.
#[derive(Debug)]
pub enum HttpFailure {
    /// Network trouble, 429 or 5xx. Worth retrying.
    Transient(String),
    /// Anything else. Retrying will not help.
    Permanent(String),
}

impl HttpFailure {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = format!("HTTP {status}: {}", truncate(body, 300));
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::Transient(message)
        } else {
            Self::Permanent(message)
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

impl From<reqwest::Error> for HttpFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

/// Exponential backoff bounded by a maximum attempt count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            initial,
            max,
        }
    }

    /// No retries at all.
    pub const fn none() -> Self {
        Self::new(0, Duration::from_millis(1), Duration::from_millis(1))
    }

    /// Run `operation`, retrying transient failures with exponential backoff.
    ///
    /// `collaborator` names the remote service in the resulting error.
    pub async fn run<T, F, Fut>(&self, collaborator: &str, mut operation: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HttpFailure>>,
    {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial)
            .with_max_interval(self.max)
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        let max_retries = self.max_retries;
        backoff::future::retry(backoff, || {
            attempt += 1;
            let current = attempt;
            let fut = operation();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(HttpFailure::Transient(message)) if current <= max_retries => {
                        warn!(collaborator, attempt = current, %message, "transient HTTP failure, retrying");
                        Err(backoff::Error::transient(message))
                    }
                    Err(failure) => Err(backoff::Error::permanent(failure.message().to_string())),
                }
            }
        })
        .await
        .map_err(|message| DomainError::collaborator(collaborator, message))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }
}

/// Build a reqwest client with a request timeout.
pub fn build_client(timeout_secs: u64) -> DomainResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("dockloop/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DomainError::ValidationFailed(format!("cannot build HTTP client: {e}")))
}

/// Direct (unkeyed) rate limiter allowing `per_second` requests per second.
pub fn rate_limiter(per_second: u32) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(rate))
}

/// Resolve an API key from config, then the named environment variable.
pub fn resolve_api_key(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::to_string)
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.trim().is_empty()))
}

pub fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}
