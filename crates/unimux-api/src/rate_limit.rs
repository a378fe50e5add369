// Sliding-window admission control, one window per backend kind.
//
// `acquire` suspends the caller until admitting it keeps the number of
// admissions inside any rolling `period` at or below `limit`. Window state
// sits behind a `tokio::sync::Mutex`, whose lock queue is FIFO, so no
// waiter starves while slots keep freeing up.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tracing::trace;

use crate::clock::Clock;
use crate::error::Error;
use crate::profile::BackendKind;

/// Request budget: at most `limit` admissions per rolling `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub period: Duration,
}

impl RateLimit {
    pub const fn new(limit: u32, period: Duration) -> Self {
        Self { limit, period }
    }

    pub const fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Published budgets: the stable cloud tier allows 10 000 requests a
    /// minute, early access 100. Gateways get the early-access budget.
    pub fn default_for(kind: BackendKind) -> Self {
        match kind {
            BackendKind::CloudStable => Self::per_minute(10_000),
            BackendKind::CloudEarlyAccess | BackendKind::LocalGateway => Self::per_minute(100),
        }
    }

    fn validate(self) -> Result<Self, Error> {
        if self.limit == 0 {
            return Err(Error::config("rate limit must admit at least one request"));
        }
        if self.period.is_zero() {
            return Err(Error::config("rate limit period must be non-zero"));
        }
        Ok(self)
    }
}

#[derive(Debug)]
struct Window {
    limit: RateLimit,
    admitted: Mutex<VecDeque<Instant>>,
}

/// Per-backend sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    windows: HashMap<BackendKind, Window>,
}

impl RateLimiter {
    /// A limiter with the default budget for every backend kind.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let windows = BackendKind::iter()
            .map(|kind| {
                (
                    kind,
                    Window {
                        limit: RateLimit::default_for(kind),
                        admitted: Mutex::new(VecDeque::new()),
                    },
                )
            })
            .collect();
        Self { clock, windows }
    }

    /// Replace the budget for `kind`. Zero limits or periods are rejected.
    pub fn with_limit(mut self, kind: BackendKind, limit: RateLimit) -> Result<Self, Error> {
        let limit = limit.validate()?;
        self.windows.insert(
            kind,
            Window {
                limit,
                admitted: Mutex::new(VecDeque::new()),
            },
        );
        Ok(self)
    }

    pub fn limit(&self, kind: BackendKind) -> RateLimit {
        self.windows
            .get(&kind)
            .map_or_else(|| RateLimit::default_for(kind), |w| w.limit)
    }

    /// Wait until a request to `kind` may be sent, then record it.
    ///
    /// Never fails. Callers bound the wait by dropping the future.
    pub async fn acquire(&self, kind: BackendKind) {
        let Some(window) = self.windows.get(&kind) else {
            return;
        };
        let capacity = usize::try_from(window.limit.limit).unwrap_or(usize::MAX);
        let period = window.limit.period;

        loop {
            let wait = {
                let mut admitted = window.admitted.lock().await;
                let now = self.clock.now();

                while admitted
                    .front()
                    .is_some_and(|&oldest| now.saturating_duration_since(oldest) >= period)
                {
                    admitted.pop_front();
                }

                if admitted.len() < capacity {
                    admitted.push_back(now);
                    return;
                }

                // Full: the oldest admission leaves the window first.
                admitted.front().map_or(period, |&oldest| {
                    period.saturating_sub(now.saturating_duration_since(oldest))
                })
            };

            trace!(backend = %kind, wait_ms = wait.as_millis(), "rate limit reached, waiting");
            self.clock.sleep(wait).await;
        }
    }

    /// Admissions currently inside the rolling window for `kind`.
    pub async fn in_window(&self, kind: BackendKind) -> usize {
        let Some(window) = self.windows.get(&kind) else {
            return 0;
        };
        let now = self.clock.now();
        window
            .admitted
            .lock()
            .await
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < window.limit.period)
            .count()
    }
}
