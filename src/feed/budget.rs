//! Process-wide accounting of the upstream rate budget.
//!
//! The unauthenticated GitHub API allows 60 requests per rolling hour. A
//! single [`RateBudget`] value is shared (behind a mutex) by everything that
//! talks to the API, refined from the `x-ratelimit-*` headers of every
//! response, and consulted before every dispatch.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use core::time::Duration;
use serde::Serialize;

/// Extra wait added on top of the advertised reset time, absorbing clock
/// differences between us and the upstream.
const RESET_BUFFER: Duration = Duration::from_secs(1);

/// Default request ceiling assumed until the upstream tells us otherwise.
const DEFAULT_LIMIT: u32 = 60;

/// Rate-limit values parsed from a single upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Mutable rate-budget state shared by all upstream callers.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBudget {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl RateBudget {
    /// A conservative starting budget for when no upstream headers have been
    /// seen yet: the unauthenticated ceiling with a reset one hour out.
    #[must_use]
    pub fn conservative(now: DateTime<Utc>) -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            remaining: DEFAULT_LIMIT,
            reset_at: now + ChronoDuration::hours(1),
            last_request_at: None,
        }
    }

    /// Replace the tracked quota with values reported by the upstream.
    ///
    /// Applied unconditionally, including for error responses, since the
    /// upstream reports quota on those too.
    pub fn absorb(&mut self, snapshot: RateLimitSnapshot) {
        self.limit = snapshot.limit;
        self.remaining = snapshot.remaining;
        self.reset_at = snapshot.reset_at;
    }

    /// Restore the full quota once the advertised reset time has passed.
    pub fn refresh_if_reset(&mut self, now: DateTime<Utc>) {
        if now >= self.reset_at && self.remaining < self.limit {
            self.remaining = self.limit;
            self.reset_at = now + ChronoDuration::hours(1);
        }
    }

    /// How long the next dispatch must wait.
    ///
    /// An exhausted budget waits until the reset time (plus a small buffer);
    /// otherwise only the minimum inter-request spacing applies.
    #[must_use]
    pub fn delay_before_dispatch(&self, now: DateTime<Utc>, min_interval: Duration) -> Duration {
        if self.remaining == 0 && now < self.reset_at {
            let until_reset = (self.reset_at - now).to_std().unwrap_or(Duration::ZERO);
            return until_reset + RESET_BUFFER;
        }

        if let Some(last) = self.last_request_at {
            let since_last = (now - last).to_std().unwrap_or(Duration::ZERO);
            if since_last < min_interval {
                return min_interval - since_last;
            }
        }

        Duration::ZERO
    }

    /// Record that a request is going out right now.
    pub fn note_dispatch(&mut self, now: DateTime<Utc>) {
        self.last_request_at = Some(now);
        self.remaining = self.remaining.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget_at(now: DateTime<Utc>) -> RateBudget {
        RateBudget::conservative(now)
    }

    #[test]
    fn test_conservative_defaults() {
        let now = Utc::now();
        let budget = budget_at(now);
        assert_eq!(budget.limit, 60);
        assert_eq!(budget.remaining, 60);
        assert!(budget.reset_at > now);
        assert!(budget.last_request_at.is_none());
    }

    #[test]
    fn test_no_delay_when_idle() {
        let now = Utc::now();
        let budget = budget_at(now);
        assert_eq!(budget.delay_before_dispatch(now, Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_spacing_enforced_between_requests() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        budget.note_dispatch(now - ChronoDuration::milliseconds(300));

        let delay = budget.delay_before_dispatch(now, Duration::from_secs(1));
        assert_eq!(delay, Duration::from_millis(700));
    }

    #[test]
    fn test_no_spacing_delay_after_interval_elapsed() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        budget.note_dispatch(now - ChronoDuration::seconds(5));

        assert_eq!(budget.delay_before_dispatch(now, Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_exhausted_budget_waits_for_reset() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        budget.remaining = 0;
        budget.reset_at = now + ChronoDuration::seconds(90);

        let delay = budget.delay_before_dispatch(now, Duration::from_secs(1));
        assert!(delay >= Duration::from_secs(90));
        assert!(delay <= Duration::from_secs(92));
    }

    #[test]
    fn test_exhausted_budget_past_reset_has_no_wait() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        budget.remaining = 0;
        budget.reset_at = now - ChronoDuration::seconds(1);

        assert_eq!(budget.delay_before_dispatch(now, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_refresh_restores_quota_after_reset() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        budget.remaining = 0;
        budget.reset_at = now - ChronoDuration::seconds(1);

        budget.refresh_if_reset(now);
        assert_eq!(budget.remaining, budget.limit);
        assert!(budget.reset_at > now);
    }

    #[test]
    fn test_refresh_is_noop_before_reset() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        budget.remaining = 10;
        let reset_at = budget.reset_at;

        budget.refresh_if_reset(now);
        assert_eq!(budget.remaining, 10);
        assert_eq!(budget.reset_at, reset_at);
    }

    #[test]
    fn test_absorb_overwrites_quota() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        let reset = now + ChronoDuration::minutes(20);

        budget.absorb(RateLimitSnapshot {
            limit: 5000,
            remaining: 4321,
            reset_at: reset,
        });

        assert_eq!(budget.limit, 5000);
        assert_eq!(budget.remaining, 4321);
        assert_eq!(budget.reset_at, reset);
    }

    #[test]
    fn test_note_dispatch_decrements_remaining() {
        let now = Utc::now();
        let mut budget = budget_at(now);
        budget.note_dispatch(now);
        assert_eq!(budget.remaining, 59);
        assert_eq!(budget.last_request_at, Some(now));

        budget.remaining = 0;
        budget.note_dispatch(now);
        assert_eq!(budget.remaining, 0); // saturates
    }
}
