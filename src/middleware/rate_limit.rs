//! Per-client sliding-window rate limiting.
//!
//! Each client key owns a queue of the instants at which its recent
//! requests were admitted. On every check the queue is pruned to the
//! trailing [`WINDOW`], then the request is admitted if fewer than `limit`
//! entries remain. Rejected requests are never recorded, so hammering the
//! server while limited does not push the reset further out.
//!
//! # Locking
//!
//! Queues live in a [`DashMap`]. The prune-check-append sequence for one key
//! runs while holding that key's entry guard, so two concurrent requests
//! from the same client cannot both take the last slot. The guard covers a
//! shard, not the whole map: unrelated clients rarely contend. Nothing
//! inside the critical section awaits, so cancelling a request can never
//! leave a guard held.
//!
//! # Eviction
//!
//! Keys whose newest entry has aged out of the window are swept from the
//! map. The sweep piggybacks on admission checks, at most once per
//! `sweep_interval`; there is no background task.
//!
//! # Unknown clients
//!
//! Requests without a remote address all share the key `"unknown"` and so
//! one budget.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::StatusCode;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::context::{ClientIdentity, RequestContext};
use crate::error::Outcome;
use crate::request::Request;
use crate::response::Response;
use crate::telemetry::Logger;

use super::{BoxFuture, Interceptor, Next};

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// Result of one admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Admitted and recorded; `remaining` more fit in the current window.
    Admitted { remaining: usize },
    /// Over the limit. The oldest recorded request leaves the window after
    /// `retry_after`.
    Rejected { retry_after: Duration },
}

impl Decision {
    pub fn is_admitted(self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Shared sliding-window state for every client.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    sweep_interval: Duration,
    windows: DashMap<ClientIdentity, VecDeque<Instant>>,
    last_sweep: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `requests_per_minute` admissions per client per [`WINDOW`].
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            sweep_interval: window,
            windows: DashMap::new(),
            last_sweep: Mutex::new(None),
        }
    }

    /// How often stale keys are swept. Defaults to the window length.
    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every;
        self
    }

    pub fn limit(&self) -> usize { self.limit }

    /// Checks and, if admitted, records a request from `client` at `now`.
    pub fn check(&self, client: &ClientIdentity, now: Instant) -> Decision {
        self.maybe_sweep(now);

        let mut queue = self.windows.entry(client.clone()).or_default();
        while queue.front().is_some_and(|t| now.saturating_duration_since(*t) >= self.window) {
            queue.pop_front();
        }

        if queue.len() < self.limit {
            // Callers read the clock before taking the guard, so `now` can
            // trail an entry another request just pushed. Keep the queue sorted.
            let at = queue.partition_point(|t| *t <= now);
            queue.insert(at, now);
            Decision::Admitted { remaining: self.limit - queue.len() }
        } else {
            let oldest = queue.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.saturating_duration_since(oldest));
            Decision::Rejected { retry_after }
        }
    }

    /// `true` if a request from `client` at `now` is admitted (and recorded).
    pub fn admit(&self, client: &ClientIdentity, now: Instant) -> bool {
        self.check(client, now).is_admitted()
    }

    /// Drops every key with no entry inside the window. Returns how many
    /// keys were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, queue| {
            queue.back().is_some_and(|t| now.saturating_duration_since(*t) < self.window)
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Entries recorded for `client`, as of its last check.
    pub fn recorded(&self, client: &ClientIdentity) -> usize {
        self.windows.get(client).map_or(0, |queue| queue.len())
    }

    fn maybe_sweep(&self, now: Instant) {
        // Whoever loses the race for the stamp skips the sweep.
        let due = match self.last_sweep.try_lock() {
            Ok(mut last) => {
                let due = last.is_none_or(|t| now.saturating_duration_since(t) >= self.sweep_interval);
                if due {
                    *last = Some(now);
                }
                due
            }
            Err(_) => false,
        };
        if due {
            self.sweep(now);
        }
    }
}

/// Interceptor that answers `429 Too Many Requests` once a client exceeds
/// its budget.
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    clock: SharedClock,
    logger: Logger,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, clock: SharedClock, logger: Logger) -> Self {
        Self { limiter, clock, logger }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> { &self.limiter }
}

impl Interceptor for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let client = ctx.client().clone();
            match self.limiter.check(&client, self.clock.now()) {
                Decision::Admitted { remaining } => {
                    debug!(parent: self.logger.span(), %client, remaining, "admitted");
                    let mut outcome = next.run(ctx, req).await;
                    if let Ok(res) = &mut outcome {
                        res.set_header(LIMIT_HEADER, self.limiter.limit().to_string());
                        res.set_header(REMAINING_HEADER, remaining.to_string());
                    }
                    outcome
                }
                Decision::Rejected { retry_after } => {
                    warn!(
                        parent: self.logger.span(),
                        %client,
                        path = req.path(),
                        retry_after_secs = retry_after.as_secs(),
                        "rate limit exceeded"
                    );
                    let mut res = Response::detail(
                        StatusCode::TOO_MANY_REQUESTS,
                        "Rate limit exceeded. Please try again later.",
                    );
                    res.set_header(LIMIT_HEADER, self.limiter.limit().to_string());
                    res.set_header(REMAINING_HEADER, "0");
                    res.set_header(RETRY_AFTER_HEADER, whole_seconds(retry_after).to_string());
                    Ok(res)
                }
            }
        })
    }
}

/// Rounds up, never below one second.
fn whole_seconds(d: Duration) -> u64 {
    (d.as_secs() + u64::from(d.subsec_nanos() > 0)).max(1)
}
