//! Fixed-window rate limiting for the provisioning endpoints.
//!
//! Counters live behind [`CounterStore`] so one limiter logic serves both the
//! in-memory backend and Postgres. A window is identified by its start epoch;
//! a request in a new window simply touches a fresh counter, so expiry needs
//! no timers. The global per-IP ceiling is checked before any endpoint
//! counter and short-circuits it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::warn;

/// Counters older than this are pruned; must exceed the longest window.
const RETENTION_SECS: i64 = 2 * 86_400;
const PRUNE_EVERY: u64 = 256;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `(key, window_start)` and return the new count.
    async fn incr(&self, key: &str, window_start: i64) -> Result<u32, CounterError>;
    /// Current count without incrementing.
    async fn peek(&self, key: &str, window_start: i64) -> Result<u32, CounterError>;
}

/// Endpoints with their own counters. Registration is governed by the global
/// IP ceiling alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Provision,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub max: u32,
    pub window_secs: u64,
}

impl Endpoint {
    pub fn rule(&self) -> Rule {
        match self {
            // 10 starts per hour per application
            Endpoint::Start => Rule { max: 10, window_secs: 3_600 },
            // 1 provisioning attempt per day per registration
            Endpoint::Provision => Rule { max: 1, window_secs: 86_400 },
            // 100 status polls per hour per application
            Endpoint::Status => Rule { max: 100, window_secs: 3_600 },
        }
    }

    fn key_tag(&self) -> &'static str {
        match self {
            Endpoint::Start => "start",
            Endpoint::Provision => "provision",
            Endpoint::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    GlobalIp,
    Endpoint(Endpoint),
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::GlobalIp => "global_ip",
            LimitScope::Endpoint(endpoint) => endpoint.key_tag(),
        }
    }
}

/// Outcome of a limit check, carrying everything the HTTP layer needs for
/// `X-RateLimit-*` headers and 429 bodies.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_epoch: i64,
    pub retry_after_secs: u64,
    pub exceeded_scope: Option<LimitScope>,
}

impl Decision {
    pub fn header_pairs(&self) -> [(&'static str, String); 3] {
        [
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_epoch.to_string()),
        ]
    }

    fn unlimited(limit: u32) -> Self {
        Decision {
            allowed: true,
            limit,
            remaining: limit,
            reset_epoch: Utc::now().timestamp(),
            retry_after_secs: 0,
            exceeded_scope: None,
        }
    }
}

fn window_start(now: i64, window_secs: u64) -> i64 {
    now - now.rem_euclid(window_secs as i64)
}

pub struct RateLimiter {
    store: std::sync::Arc<dyn CounterStore>,
    enabled: bool,
    global: Rule,
}

impl RateLimiter {
    pub fn new(store: std::sync::Arc<dyn CounterStore>, enabled: bool, global: Rule) -> Self {
        Self {
            store,
            enabled,
            global,
        }
    }

    /// Check the global IP ceiling, then the endpoint counter. Both counters
    /// increment; a global rejection never touches the endpoint counter.
    pub async fn check(
        &self,
        endpoint: Endpoint,
        dimension: &str,
        ip: &str,
    ) -> Result<Decision, CounterError> {
        let rule = endpoint.rule();
        if !self.enabled {
            return Ok(Decision::unlimited(rule.max));
        }

        let now = Utc::now().timestamp();
        if let Some(rejected) = self.global_rejection(ip, now).await? {
            return Ok(rejected);
        }

        let key = format!("{}:{}", endpoint.key_tag(), dimension);
        let start = window_start(now, rule.window_secs);
        let count = self.store.incr(&key, start).await?;
        let reset = start + rule.window_secs as i64;
        if count > rule.max {
            warn!(
                endpoint = endpoint.key_tag(),
                dimension, "rate limit exceeded"
            );
            return Ok(Decision {
                allowed: false,
                limit: rule.max,
                remaining: 0,
                reset_epoch: reset,
                retry_after_secs: (reset - now).max(1) as u64,
                exceeded_scope: Some(LimitScope::Endpoint(endpoint)),
            });
        }
        Ok(Decision {
            allowed: true,
            limit: rule.max,
            remaining: rule.max - count,
            reset_epoch: reset,
            retry_after_secs: 0,
            exceeded_scope: None,
        })
    }

    /// Global-IP-only check for endpoints without their own counter.
    pub async fn check_global(&self, ip: &str) -> Result<Decision, CounterError> {
        if !self.enabled {
            return Ok(Decision::unlimited(self.global.max));
        }
        let now = Utc::now().timestamp();
        match self.global_rejection(ip, now).await? {
            Some(rejected) => Ok(rejected),
            None => {
                let start = window_start(now, self.global.window_secs);
                let count = self.store.peek(&global_key(ip), start).await?;
                Ok(Decision {
                    allowed: true,
                    limit: self.global.max,
                    remaining: self.global.max.saturating_sub(count),
                    reset_epoch: start + self.global.window_secs as i64,
                    retry_after_secs: 0,
                    exceeded_scope: None,
                })
            }
        }
    }

    /// Non-mutating view of an endpoint counter, for responses that must
    /// carry headers without consuming budget (the idempotent readback path).
    pub async fn headers(
        &self,
        endpoint: Endpoint,
        dimension: &str,
    ) -> Result<Decision, CounterError> {
        let rule = endpoint.rule();
        if !self.enabled {
            return Ok(Decision::unlimited(rule.max));
        }
        let now = Utc::now().timestamp();
        let start = window_start(now, rule.window_secs);
        let key = format!("{}:{}", endpoint.key_tag(), dimension);
        let count = self.store.peek(&key, start).await?;
        Ok(Decision {
            allowed: true,
            limit: rule.max,
            remaining: rule.max.saturating_sub(count),
            reset_epoch: start + rule.window_secs as i64,
            retry_after_secs: 0,
            exceeded_scope: None,
        })
    }

    /// Increments the global per-IP counter; Some(decision) when it rejects.
    async fn global_rejection(&self, ip: &str, now: i64) -> Result<Option<Decision>, CounterError> {
        let start = window_start(now, self.global.window_secs);
        let count = self.store.incr(&global_key(ip), start).await?;
        if count > self.global.max {
            warn!(ip, "global rate limit exceeded");
            let reset = start + self.global.window_secs as i64;
            return Ok(Some(Decision {
                allowed: false,
                limit: self.global.max,
                remaining: 0,
                reset_epoch: reset,
                retry_after_secs: (reset - now).max(1) as u64,
                exceeded_scope: Some(LimitScope::GlobalIp),
            }));
        }
        Ok(None)
    }
}

fn global_key(ip: &str) -> String {
    format!("global:ip:{ip}")
}

/// Counter store backed by a mutex-guarded map, pruned in passing.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<(String, i64), u32>>,
    ops: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn maybe_prune(&self, counters: &mut HashMap<(String, i64), u32>) {
        let ops = self.ops.fetch_add(1, Ordering::Relaxed);
        if ops > 0 && ops % PRUNE_EVERY == 0 {
            let horizon = Utc::now().timestamp() - RETENTION_SECS;
            counters.retain(|(_, start), _| *start >= horizon);
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, window_start: i64) -> Result<u32, CounterError> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        self.maybe_prune(&mut counters);
        let count = counters
            .entry((key.to_string(), window_start))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn peek(&self, key: &str, window_start: i64) -> Result<u32, CounterError> {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        Ok(counters
            .get(&(key.to_string(), window_start))
            .copied()
            .unwrap_or(0))
    }
}

/// Counter store on the registry database; the upsert is the atomic
/// increment.
pub struct PgCounterStore {
    pool: PgPool,
    ops: AtomicU64,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ops: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn incr(&self, key: &str, window_start: i64) -> Result<u32, CounterError> {
        let ops = self.ops.fetch_add(1, Ordering::Relaxed);
        if ops > 0 && ops % PRUNE_EVERY == 0 {
            let horizon = Utc::now().timestamp() - RETENTION_SECS;
            sqlx::query("DELETE FROM rate_counters WHERE window_start < $1")
                .bind(horizon)
                .execute(&self.pool)
                .await?;
        }

        let count: i32 = sqlx::query_scalar(
            "INSERT INTO rate_counters (counter_key, window_start, count) VALUES ($1, $2, 1) \
             ON CONFLICT (counter_key, window_start) \
             DO UPDATE SET count = rate_counters.count + 1 \
             RETURNING count",
        )
        .bind(key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    async fn peek(&self, key: &str, window_start: i64) -> Result<u32, CounterError> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT count FROM rate_counters WHERE counter_key = $1 AND window_start = $2",
        )
        .bind(key)
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0).max(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn limiter(global_max: u32, global_window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            true,
            Rule {
                max: global_max,
                window_secs: global_window_secs,
            },
        )
    }

    #[tokio::test]
    async fn endpoint_boundary_allows_n_rejects_n_plus_one() {
        let limiter = limiter(1_000, 3_600);
        for i in 0..10 {
            let decision = limiter
                .check(Endpoint::Start, "app_abc", "10.0.0.1")
                .await
                .unwrap();
            assert!(decision.allowed, "request {i} should pass");
            assert_eq!(decision.remaining, 10 - (i + 1));
        }

        let rejected = limiter
            .check(Endpoint::Start, "app_abc", "10.0.0.1")
            .await
            .unwrap();
        assert!(!rejected.allowed);
        assert!(rejected.retry_after_secs > 0);
        assert_eq!(
            rejected.exceeded_scope,
            Some(LimitScope::Endpoint(Endpoint::Start))
        );
    }

    #[tokio::test]
    async fn provision_allows_exactly_one_per_window() {
        let limiter = limiter(1_000, 3_600);
        let first = limiter
            .check(Endpoint::Provision, "some-uuid", "10.0.0.2")
            .await
            .unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 0);

        let second = limiter
            .check(Endpoint::Provision, "some-uuid", "10.0.0.2")
            .await
            .unwrap();
        assert!(!second.allowed);
        assert!(second.retry_after_secs > 0);
        assert!(second.retry_after_secs <= 86_400);
    }

    #[tokio::test]
    async fn dimensions_are_independent() {
        let limiter = limiter(1_000, 3_600);
        limiter
            .check(Endpoint::Provision, "uuid-a", "10.0.0.3")
            .await
            .unwrap();
        let other = limiter
            .check(Endpoint::Provision, "uuid-b", "10.0.0.3")
            .await
            .unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn global_ceiling_short_circuits_endpoint_counter() {
        let limiter = limiter(2, 3_600);
        limiter.check(Endpoint::Status, "app_x", "10.0.0.4").await.unwrap();
        limiter.check(Endpoint::Status, "app_x", "10.0.0.4").await.unwrap();

        let rejected = limiter
            .check(Endpoint::Status, "app_x", "10.0.0.4")
            .await
            .unwrap();
        assert!(!rejected.allowed);
        assert_eq!(rejected.exceeded_scope, Some(LimitScope::GlobalIp));

        // The endpoint counter only saw the two allowed calls.
        let view = limiter.headers(Endpoint::Status, "app_x").await.unwrap();
        assert_eq!(view.remaining, 100 - 2);
    }

    #[tokio::test]
    async fn window_reset_restores_budget() {
        let limiter = limiter(2, 1);
        assert!(limiter.check_global("10.0.0.5").await.unwrap().allowed);
        assert!(limiter.check_global("10.0.0.5").await.unwrap().allowed);
        assert!(!limiter.check_global("10.0.0.5").await.unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(limiter.check_global("10.0.0.5").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn headers_view_never_consumes_budget() {
        let limiter = limiter(1_000, 3_600);
        limiter
            .check(Endpoint::Provision, "uuid-c", "10.0.0.6")
            .await
            .unwrap();

        for _ in 0..5 {
            let view = limiter.headers(Endpoint::Provision, "uuid-c").await.unwrap();
            assert_eq!(view.remaining, 0);
        }
        // Still the same window: a real check is rejected, proving peeks
        // did not add counts of their own.
        let decision = limiter
            .check(Endpoint::Provision, "uuid-c", "10.0.0.6")
            .await
            .unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            false,
            Rule {
                max: 1,
                window_secs: 60,
            },
        );
        for _ in 0..20 {
            assert!(limiter
                .check(Endpoint::Provision, "uuid-d", "10.0.0.7")
                .await
                .unwrap()
                .allowed);
        }
    }

    #[test]
    fn header_pairs_cover_the_contract() {
        let decision = Decision {
            allowed: true,
            limit: 10,
            remaining: 4,
            reset_epoch: 1_700_000_000,
            retry_after_secs: 0,
            exceeded_scope: None,
        };
        let pairs = decision.header_pairs();
        assert_eq!(pairs[0], ("X-RateLimit-Limit", "10".to_string()));
        assert_eq!(pairs[1], ("X-RateLimit-Remaining", "4".to_string()));
        assert_eq!(pairs[2], ("X-RateLimit-Reset", "1700000000".to_string()));
    }
}
