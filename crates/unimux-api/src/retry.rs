//! Retry policy as a pure decision function.
//!
//! [`RetryPolicy::decide`] turns one failed attempt into either a delay to
//! wait before the next attempt or a final, typed error. It performs no
//! I/O and takes its jitter sample as an argument, so every branch is
//! testable without a network or a random source.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};

use crate::error::{self, Error};

/// Whether a failed request may have reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    /// Failed before any byte left the client (DNS, refused connection).
    NotSent,
    /// The request may have been delivered; the outcome is unknown.
    Sent,
}

/// One failed attempt, as seen by the retry policy.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// The server answered with a non-success status.
    Status {
        status: StatusCode,
        headers: &'a HeaderMap,
        body: &'a str,
    },
    /// No response was received.
    Transport { message: &'a str, phase: SendPhase },
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Fail { error: Error },
}

/// Exponential back-off settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for computed back-off (not for `Retry-After`).
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Fraction of the delay that is randomized, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Back-off before retry number `attempt + 1`.
    ///
    /// `base * multiplier^attempt`, capped at `max_delay`, then scaled into
    /// `[(1 - jitter) * d, d]` by `sample` (expected in `0.0..1.0`).
    pub fn backoff(&self, attempt: u32, sample: f64) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ceiling = self.max_delay.as_secs_f64();
        let raw = (self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent))
            .min(ceiling);

        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let scaled = raw * (1.0 - jitter + jitter * sample);

        if scaled.is_finite() && scaled > 0.0 {
            Duration::from_secs_f64(scaled)
        } else {
            Duration::ZERO
        }
    }

    /// Decide what to do after `failure` on retry number `attempt`
    /// (`0` for the first failure).
    ///
    /// - 429: wait `Retry-After` when present, else back off
    /// - 5xx and transport failures: back off
    /// - 401/403/404/400 and every other status: fail at once
    /// - reads (GET/HEAD) retry any transient failure; mutations retry only
    ///   failures that never reached the server, and never once a response
    ///   has been received
    pub fn decide(
        &self,
        method: &Method,
        failure: &Failure<'_>,
        attempt: u32,
        jitter: f64,
    ) -> RetryDecision {
        let budget_left = attempt < self.max_retries;
        let safe_to_repeat = is_read(method);

        match *failure {
            Failure::Status {
                status,
                headers,
                body,
            } => {
                let retry_after = parse_retry_after(headers);
                let error = error::from_response(status, body, retry_after);
                let transient =
                    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

                if !(transient && safe_to_repeat && budget_left) {
                    return RetryDecision::Fail { error };
                }

                let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                    retry_after.unwrap_or_else(|| self.backoff(attempt, jitter))
                } else {
                    self.backoff(attempt, jitter)
                };
                RetryDecision::Retry { delay }
            }
            Failure::Transport { message, phase } => {
                let repeatable = safe_to_repeat || phase == SendPhase::NotSent;
                if repeatable && budget_left {
                    RetryDecision::Retry {
                        delay: self.backoff(attempt, jitter),
                    }
                } else {
                    RetryDecision::Fail {
                        error: Error::Connection {
                            message: message.to_owned(),
                        },
                    }
                }
            }
        }
    }
}

/// Read-only methods may be repeated after any transient failure.
pub fn is_read(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// `Retry-After` as delta-seconds. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
