//! The transport seam and a bounded retry wrapper.

use std::thread;
use std::time::Duration;

use log::warn;
use thiserror::Error;

use crate::request::{RawResponse, RequestSpec};

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The request could not be built (bad URL, bad header, ...).
    #[error("invalid request for {url}: {message}")]
    InvalidRequest {
        /// Requested URL.
        url: String,
        /// What was wrong.
        message: String,
    },
    /// DNS failure, refused connection, reset, TLS failure and similar.
    #[error("network error contacting {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Description reported by the client.
        message: String,
    },
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },
    /// The server answered with a non-2xx status and the caller treats that as fatal.
    #[error("request to {url} failed with status {status}")]
    Status {
        /// URL including the query string.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

impl TransportError {
    /// Whether retrying the same request could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// Perform a single GET.
///
/// Implementations return every completed exchange as a [`RawResponse`],
/// including non-2xx statuses; deciding whether those are fatal is left to the
/// caller. No retries happen at this layer.
pub trait Transport {
    /// Fetch `request` and return the raw response.
    fn fetch(&self, request: &RequestSpec) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn fetch(&self, request: &RequestSpec) -> Result<RawResponse, TransportError> {
        (**self).fetch(request)
    }
}

/// Bounded retry settings for [`RetryingTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retrying.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy allowing `max_attempts` tries with the given initial backoff.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; the first retry is attempt 2.
        let doublings = attempt.saturating_sub(2).min(16);
        self.backoff.saturating_mul(1_u32 << doublings)
    }
}

/// Wraps a transport and retries transient failures.
///
/// Only [`TransportError::Network`] and [`TransportError::Timeout`] are
/// retried. Completed responses, whatever their status, are returned as-is.
#[derive(Debug)]
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingTransport<T> {
    /// Wrap `inner` with `policy`.
    pub const fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Borrow the wrapped transport.
    pub const fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for RetryingTransport<T> {
    fn fetch(&self, request: &RequestSpec) -> Result<RawResponse, TransportError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.fetch(request) {
                Err(err) if err.is_transient() && attempt < attempts => {
                    attempt += 1;
                    let delay = self.policy.delay_before(attempt);
                    warn!(
                        "transient failure fetching {} ({err}); attempt {attempt}/{attempts} in {delay:?}",
                        request.url
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubTransport;
    use rstest::rstest;

    fn network_error() -> TransportError {
        TransportError::Network {
            url: "http://example.test".to_owned(),
            message: "connection refused".to_owned(),
        }
    }

    #[rstest]
    fn retries_transient_errors_until_success() {
        let stub = StubTransport::sequence(vec![
            Err(network_error()),
            Err(network_error()),
            Ok(StubTransport::json_response(200, br#"{"ok": true}"#)),
        ]);
        let transport = RetryingTransport::new(stub, RetryPolicy::new(3, Duration::ZERO));

        let response = transport
            .fetch(&RequestSpec::new("http://example.test"))
            .expect("third attempt succeeds");

        assert_eq!(response.status, 200);
        assert_eq!(transport.inner().calls(), 3);
    }

    #[rstest]
    fn gives_up_after_max_attempts() {
        let stub = StubTransport::sequence(vec![Err(network_error()), Err(network_error())]);
        let transport = RetryingTransport::new(stub, RetryPolicy::new(2, Duration::ZERO));

        let err = transport
            .fetch(&RequestSpec::new("http://example.test"))
            .expect_err("both attempts fail");

        assert!(matches!(err, TransportError::Network { .. }));
        assert_eq!(transport.inner().calls(), 2);
    }

    #[rstest]
    fn does_not_retry_invalid_requests() {
        let stub = StubTransport::sequence(vec![Err(TransportError::InvalidRequest {
            url: "::".to_owned(),
            message: "relative URL without a base".to_owned(),
        })]);
        let transport = RetryingTransport::new(stub, RetryPolicy::new(5, Duration::ZERO));

        let _ = transport.fetch(&RequestSpec::new("::"));

        assert_eq!(transport.inner().calls(), 1);
    }

    #[rstest]
    fn default_policy_is_single_attempt() {
        let stub = StubTransport::sequence(vec![Err(network_error())]);
        let transport = RetryingTransport::new(stub, RetryPolicy::default());

        let _ = transport.fetch(&RequestSpec::new("http://example.test"));

        assert_eq!(transport.inner().calls(), 1);
    }

    #[rstest]
    #[case(2, 100)]
    #[case(3, 200)]
    #[case(4, 400)]
    fn backoff_doubles(#[case] attempt: u32, #[case] millis: u64) {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_before(attempt), Duration::from_millis(millis));
    }
}
