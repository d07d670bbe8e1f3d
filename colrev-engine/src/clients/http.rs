//! Shared HTTP plumbing for the metadata providers
//!
//! Every provider client owns a [`ProviderHttp`]: a `reqwest` client with the
//! colrev user agent, a `governor` rate limiter and a retry policy. Requests
//! that fail with a network error, a 429 or a 5xx response are retried up
//! to [`MAX_RETRIES`] times.

use governor::{Quota, RateLimiter};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// User-Agent header sent to every provider
pub const USER_AGENT: &str = concat!(
    "colrev/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/CoLRev-Environment/colrev)"
);

/// Retry cap for provider requests
pub const MAX_RETRIES: u32 = 3;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single provider request (after retries)
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Declare a provider error enum with the standard variants
///
/// The enum converts from [`RequestError`] and into the engine-wide
/// [`colrev_common::Error::Http`].
macro_rules! provider_error {
    ($name:ident, $service:literal) => {
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            #[error("Network error: {0}")]
            NetworkError(String),

            #[error("Not found: {0}")]
            NotFound(String),

            #[error("Rate limit exceeded")]
            RateLimitExceeded,

            #[error("API error {0}: {1}")]
            ApiError(u16, String),

            #[error("Parse error: {0}")]
            ParseError(String),
        }

        impl $name {
            /// Whether the provider answered with a body that did not decode
            pub fn is_malformed(&self) -> bool {
                matches!(self, Self::ParseError(_))
            }

            pub fn is_not_found(&self) -> bool {
                matches!(self, Self::NotFound(_))
            }
        }

        impl From<$crate::clients::http::RequestError> for $name {
            fn from(e: $crate::clients::http::RequestError) -> Self {
                use $crate::clients::http::RequestError as R;
                match e {
                    R::NetworkError(m) => Self::NetworkError(m),
                    R::NotFound(m) => Self::NotFound(m),
                    R::RateLimitExceeded => Self::RateLimitExceeded,
                    R::ApiError(code, m) => Self::ApiError(code, m),
                    R::ParseError(m) => Self::ParseError(m),
                }
            }
        }

        impl From<$name> for colrev_common::Error {
            fn from(e: $name) -> Self {
                colrev_common::Error::Http {
                    service: $service.to_string(),
                    message: e.to_string(),
                }
            }
        }
    };
}
pub(crate) use provider_error;

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base`, `2 * base`, `4 * base`, ...
    Exponential(Duration),
    Fixed(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential(base) => *base * 2u32.saturating_pow(attempt),
            Backoff::Fixed(delay) => *delay,
        }
    }
}

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct ProviderHttp {
    client: Client,
    rate_limiter: DirectLimiter,
    backoff: Backoff,
    service: &'static str,
}

impl ProviderHttp {
    /// Build the client for `service`, allowing `per_second` requests
    pub fn new(service: &'static str, per_second: u32, backoff: Backoff) -> Result<Self, RequestError> {
        Self::with_headers(service, per_second, backoff, header::HeaderMap::new())
    }

    pub fn with_headers(
        service: &'static str,
        per_second: u32,
        backoff: Backoff,
        mut headers: header::HeaderMap,
    ) -> Result<Self, RequestError> {
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| RequestError::NetworkError(e.to_string()))?;
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            backoff,
            service,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request built by `build`, retrying transient failures
    ///
    /// 404 maps to [`RequestError::NotFound`] without retrying.
    pub async fn send<F>(&self, what: &str, build: F) -> Result<Response, RequestError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            self.rate_limiter.until_ready().await;
            debug!(service = self.service, request = what, attempt, "Provider request");

            let outcome = match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(RequestError::NotFound(what.to_string()));
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        RequestError::RateLimitExceeded
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        let error = RequestError::ApiError(status.as_u16(), text);
                        if !status.is_server_error() {
                            return Err(error);
                        }
                        error
                    }
                }
                Err(e) => RequestError::NetworkError(e.to_string()),
            };

            if attempt >= MAX_RETRIES {
                warn!(service = self.service, request = what, error = %outcome, "Giving up after retries");
                return Err(outcome);
            }
            let delay = self.backoff.delay(attempt);
            debug!(service = self.service, delay_ms = delay.as_millis() as u64, error = %outcome, "Retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// GET and decode a JSON body
    pub async fn get_json<T, F>(&self, what: &str, build: F) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(what, build).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RequestError::ParseError(e.to_string()))
    }

    /// GET a text body
    pub async fn get_text<F>(&self, what: &str, build: F) -> Result<String, RequestError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(what, build).await?;
        response
            .text()
            .await
            .map_err(|e| RequestError::ParseError(e.to_string()))
    }

    /// GET raw bytes
    pub async fn get_bytes<F>(&self, what: &str, build: F) -> Result<Vec<u8>, RequestError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(what, build).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| RequestError::NetworkError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles() {
        let backoff = Backoff::Exponential(Duration::from_millis(500));
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(Backoff::Fixed(Duration::from_millis(200)).delay(2), Duration::from_millis(200));
    }

    #[test]
    fn user_agent_names_colrev() {
        assert!(USER_AGENT.starts_with("colrev/"));
    }
}
