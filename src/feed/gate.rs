//! The single chokepoint for all upstream API traffic.
//!
//! Every request to the hosting API goes through one [`FetchGate`] instance,
//! which enforces a minimum spacing between dispatches, waits out an
//! exhausted [`RateBudget`], and keeps the budget in sync with the
//! `x-ratelimit-*` headers of every response.

use super::budget::{RateBudget, RateLimitSnapshot};
use crate::Result;
use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter};
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use std::sync::Arc;
use tokio::sync::Mutex;

const LOG_TARGET: &str = "      gate";

/// Failure modes of a gated fetch.
#[derive(Debug)]
pub enum FetchError {
    /// The upstream returned 429, or reported an exhausted quota.
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// A non-2xx response that persisted through the single retry.
    Upstream { status: u16 },

    /// The request never produced a usable response (connect/read failure,
    /// or a body that could not be decoded).
    Transport(ohno::AppError),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RateLimited { reset_at: Some(at) } => {
                write!(f, "upstream rate limit exceeded, resets at {at}")
            }
            Self::RateLimited { reset_at: None } => write!(f, "upstream rate limit exceeded"),
            Self::Upstream { status } => write!(f, "upstream API error: HTTP {status}"),
            Self::Transport(e) => write!(f, "request failed: {e}"),
        }
    }
}

impl core::error::Error for FetchError {}

/// Configuration for the fetch gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Identifying `User-Agent` sent with every request.
    pub user_agent: String,

    /// Optional bearer credential; raises the upstream rate ceiling.
    pub token: Option<String>,

    /// Minimum spacing between consecutive dispatches.
    pub min_interval: Duration,

    /// Backoff before the single retry of a generic failure.
    pub retry_backoff: Duration,

    /// Backoff before the single retry of a rate-related failure (403).
    pub rate_backoff: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            user_agent: "devpulse".to_string(),
            token: None,
            min_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(2),
            rate_backoff: Duration::from_secs(5),
        }
    }
}

/// Throttled HTTP gate shared by all upstream query functions.
#[derive(Debug)]
pub struct FetchGate {
    client: reqwest::Client,
    budget: Arc<Mutex<RateBudget>>,
    min_interval: Duration,
    retry_backoff: Duration,
    rate_backoff: Duration,
    /// Diagnostic counter only; not consulted for throttling decisions.
    requests: AtomicU64,
}

impl FetchGate {
    /// Create a gate around a shared budget.
    pub fn new(config: &GateConfig, budget: Arc<Mutex<RateBudget>>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));

        if let Some(token) = &config.token {
            let mut auth_val = HeaderValue::from_str(&format!("token {token}"))?;
            auth_val.set_sensitive(true);
            let _ = headers.insert(AUTHORIZATION, auth_val);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            budget,
            min_interval: config.min_interval,
            retry_backoff: config.retry_backoff,
            rate_backoff: config.rate_backoff,
            requests: AtomicU64::new(0),
        })
    }

    /// Current view of the shared budget.
    pub async fn budget_snapshot(&self) -> RateBudget {
        *self.budget.lock().await
    }

    /// Fold externally obtained quota values into the shared budget.
    pub async fn absorb(&self, snapshot: RateLimitSnapshot) {
        self.budget.lock().await.absorb(snapshot);
    }

    /// Total number of requests dispatched through this gate.
    pub fn requests_issued(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Issue a throttled GET, retrying a failure at most once.
    ///
    /// A 429 fails immediately with [`FetchError::RateLimited`]; other
    /// failures get one retry after a fixed backoff (longer when the failure
    /// looks rate-related).
    pub async fn get(&self, url: &str) -> core::result::Result<reqwest::Response, FetchError> {
        let first = self.attempt(url).await;

        let backoff = match &first {
            Ok(_) | Err(FetchError::RateLimited { .. }) => return first,
            Err(FetchError::Upstream { status: 403 }) => self.rate_backoff,
            Err(_) => self.retry_backoff,
        };

        if let Err(e) = &first {
            log::debug!(target: LOG_TARGET, "request failed ({e}), retrying once after {}ms", backoff.as_millis());
        }

        tokio::time::sleep(backoff).await;
        self.attempt(url).await
    }

    /// One gated dispatch: wait out the budget/spacing, send, absorb headers.
    async fn attempt(&self, url: &str) -> core::result::Result<reqwest::Response, FetchError> {
        // The budget lock is held across the throttle delay so that concurrent
        // callers are serialized at this one point.
        {
            let mut budget = self.budget.lock().await;
            let now = Utc::now();
            budget.refresh_if_reset(now);

            let delay = budget.delay_before_dispatch(now, self.min_interval);
            if !delay.is_zero() {
                log::debug!(target: LOG_TARGET, "throttling {}ms before next request", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            budget.note_dispatch(Utc::now());
        }

        let seq = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(target: LOG_TARGET, "request {seq}: GET {url}");

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return Err(FetchError::Transport(e.into())),
        };

        // Absorb quota headers unconditionally, error responses included.
        let snapshot = rate_limit_from_headers(resp.headers());
        if let Some(snapshot) = snapshot {
            self.budget.lock().await.absorb(snapshot);
        }

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                reset_at: snapshot.map(|s| s.reset_at),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Upstream { status: status.as_u16() });
        }

        Ok(resp)
    }
}

/// Extract rate-limit information from API response headers.
fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    let parse_u32 = |name: &str| headers.get(name)?.to_str().ok()?.parse::<u32>().ok();

    let remaining = parse_u32("x-ratelimit-remaining")?;
    let limit = parse_u32("x-ratelimit-limit").unwrap_or(60);

    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitSnapshot { limit, remaining, reset_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> GateConfig {
        GateConfig {
            user_agent: "devpulse-tests".to_string(),
            token: None,
            min_interval: Duration::ZERO,
            retry_backoff: Duration::from_millis(5),
            rate_backoff: Duration::from_millis(5),
        }
    }

    fn test_gate() -> FetchGate {
        let budget = Arc::new(Mutex::new(RateBudget::conservative(Utc::now())));
        FetchGate::new(&test_config(), budget).unwrap()
    }

    #[test]
    fn test_rate_limit_from_headers() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-limit", HeaderValue::from_static("60"));
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("1704067200"));

        let snapshot = rate_limit_from_headers(&headers).unwrap();
        assert_eq!(snapshot.limit, 60);
        assert_eq!(snapshot.remaining, 42);
        assert_eq!(snapshot.reset_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_rate_limit_missing_headers() {
        assert!(rate_limit_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_rate_limit_invalid_values() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("lots"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("1704067200"));
        assert!(rate_limit_from_headers(&headers).is_none());
    }

    #[test]
    fn test_fetch_error_display_includes_reset_time() {
        let at = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        let msg = FetchError::RateLimited { reset_at: Some(at) }.to_string();
        assert!(msg.contains("rate limit"));
        assert!(msg.contains("2024"));

        let msg = FetchError::Upstream { status: 502 }.to_string();
        assert!(msg.contains("502"));
    }

    #[tokio::test]
    async fn test_success_absorbs_quota_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-limit", "60")
                    .insert_header("x-ratelimit-remaining", "37")
                    .insert_header("x-ratelimit-reset", "1904067200"),
            )
            .mount(&server)
            .await;

        let gate = test_gate();
        let resp = gate.get(&format!("{}/ok", server.uri())).await.unwrap();
        assert!(resp.status().is_success());

        let budget = gate.budget_snapshot().await;
        assert_eq!(budget.remaining, 37);
        assert_eq!(budget.reset_at.timestamp(), 1_904_067_200);
    }

    #[tokio::test]
    async fn test_retries_once_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let gate = test_gate();
        let err = gate.get(&format!("{}/broken", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::Upstream { status: 500 }));
        assert_eq!(gate.requests_issued(), 2);
    }

    #[tokio::test]
    async fn test_recovers_after_single_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let gate = test_gate();
        let resp = gate.get(&format!("{}/flaky", server.uri())).await.unwrap();
        assert!(resp.status().is_success());
    }

    #[tokio::test]
    async fn test_429_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-ratelimit-limit", "60")
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "1904067200"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gate = test_gate();
        let err = gate.get(&format!("{}/limited", server.uri())).await.unwrap_err();
        match err {
            FetchError::RateLimited { reset_at } => {
                assert_eq!(reset_at.unwrap().timestamp(), 1_904_067_200);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_counter_increments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let gate = test_gate();
        assert_eq!(gate.requests_issued(), 0);
        let _ = gate.get(&format!("{}/a", server.uri())).await.unwrap();
        let _ = gate.get(&format!("{}/b", server.uri())).await.unwrap();
        assert_eq!(gate.requests_issued(), 2);
    }
}
