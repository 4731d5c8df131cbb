//! Blocking HTTP transport for gateway calls.
//!
//! HTTP statuses are turned into `GatewayError`s here. Everything above the
//! `Transport` trait only sees response bodies.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::types::FORM_CONTENT_TYPE;

const USER_AGENT_VALUE: &str = concat!("alipay-gateway/", env!("CARGO_PKG_VERSION"));

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Carries a form-encoded request to the gateway and returns the raw body.
pub trait Transport: Send + Sync + fmt::Debug {
    fn post_form(&self, url: &str, body: &str) -> GatewayResult<String>;
}

/// Blocking reqwest transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64, max_retries: u32) -> GatewayResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| GatewayError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_retries,
        })
    }

    fn post_once(&self, url: &str, body: &str) -> GatewayResult<String> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body.to_string())
            .send()?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => response.text().map_err(|e| GatewayError::Network {
                message: format!("failed to read response body: {}", e),
            }),

            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(GatewayError::RateLimited { retry_after })
            }

            _ => {
                let message = response.text().unwrap_or_else(|_| status.to_string());
                Err(GatewayError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                })
            }
        }
    }
}

impl Transport for HttpTransport {
    fn post_form(&self, url: &str, body: &str) -> GatewayResult<String> {
        let mut retries = 0;

        loop {
            debug!(url = %url, attempt = retries + 1, "posting gateway request");
            match self.post_once(url, body) {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;

                    let backoff = retry_backoff(&e, retries);

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    std::thread::sleep(backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Jittered delay before retry number `retry` (1-based).
///
/// Honors `Retry-After` within ±10%; otherwise exponential up to 30 s.
fn retry_backoff(error: &GatewayError, retry: u32) -> Duration {
    use rand::Rng;

    match error {
        GatewayError::RateLimited {
            retry_after: Some(retry_after),
        } => {
            let base_ms = (*retry_after).min(MAX_BACKOFF).as_millis() as u64;
            let jitter_factor: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
            Duration::from_millis(jittered_ms.max(100))
        }
        _ => {
            // 2^5 s already exceeds the cap.
            let base_backoff = Duration::from_secs(1u64 << retry.min(5)).min(MAX_BACKOFF);
            let jittered_ms = rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
            Duration::from_millis(jittered_ms.max(10))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error() -> GatewayError {
        GatewayError::Network {
            message: "HTTP 503".to_string(),
        }
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        for retry in [1, 2, 5, 6, 63, 64, 1000, u32::MAX] {
            let backoff = retry_backoff(&network_error(), retry);
            assert!(backoff >= Duration::from_millis(10));
            assert!(backoff <= MAX_BACKOFF, "retry {retry}: {backoff:?}");
        }
        assert!(retry_backoff(&network_error(), 1) <= Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_honors_retry_after() {
        let limited = GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(10)),
        };
        let backoff = retry_backoff(&limited, 1);
        assert!(backoff >= Duration::from_millis(9000));
        assert!(backoff <= Duration::from_millis(11000));

        let huge = GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(3600)),
        };
        assert!(retry_backoff(&huge, 1) <= Duration::from_millis(33000));
    }
}
