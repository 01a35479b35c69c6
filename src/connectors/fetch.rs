use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::common::constants;
use crate::common::error::SourceError;
use crate::config::RetrySettings;
use crate::observability::metrics;

/// Retry policy for outbound calls. Transient failures back off
/// exponentially; everything else fails on the first attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_backoff_ms: s.base_backoff_ms,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base, 2x base, 4x base, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(6);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Timeouts, connection-level failures, 5xx and rate-limit responses are
/// retried; other statuses are treated as permanent for this run.
pub fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 429
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Build the standard header set: a realistic browser profile overlaid
/// with any per-source headers from the registry document.
pub fn request_headers(extra: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(constants::USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(constants::ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(constants::ACCEPT_LANGUAGE),
    );
    for (name, value) in extra {
        let parsed = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        );
        match parsed {
            (Ok(n), Ok(v)) => {
                headers.insert(n, v);
            }
            _ => warn!(header = %name, "ignoring invalid header from registry document"),
        }
    }
    headers
}

/// GET `url` and return the body bytes, retrying transient failures per
/// the policy. Non-2xx terminal statuses and empty bodies are
/// `SourceError`s rather than panics or silent successes.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<Vec<u8>, SourceError> {
    let mut attempt: u32 = 0;
    loop {
        let t0 = Instant::now();
        let result = client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if (200..=299).contains(&status) {
                    let bytes = resp.bytes().await?.to_vec();
                    metrics::sources::request_success();
                    metrics::sources::request_duration(t0.elapsed().as_secs_f64());
                    metrics::sources::payload_bytes(bytes.len());
                    if bytes.is_empty() {
                        return Err(SourceError::EmptyPayload { url: url.to_string() });
                    }
                    return Ok(bytes);
                }

                metrics::sources::request_error();
                if is_transient_status(status) && attempt + 1 < policy.max_attempts {
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(url, status, attempt, delay_ms = delay.as_millis() as u64, "transient status, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(SourceError::Status { status, url: url.to_string() });
            }
            Err(e) => {
                metrics::sources::request_error();
                if is_transient_error(&e) && attempt + 1 < policy.max_attempts {
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(url, error = %e, attempt, delay_ms = delay.as_millis() as u64, "transient error, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(SourceError::Http(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_backoff_ms: 100,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert!(is_transient_status(500));
        assert!(is_transient_status(503));
        assert!(is_transient_status(429));
        assert!(!is_transient_status(404));
        assert!(!is_transient_status(403));
    }

    #[test]
    fn registry_headers_overlay_defaults() {
        let mut extra = HashMap::new();
        extra.insert("X-Requested-With".to_string(), "fetch".to_string());
        let headers = request_headers(&extra);
        assert!(headers.contains_key(USER_AGENT));
        assert_eq!(headers.get("x-requested-with").unwrap(), "fetch");
    }
}
