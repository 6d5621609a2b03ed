//! Sliding-window rate limiting.
//!
//! Every feature declares a `RatePolicy`. Requests are keyed by the
//! authenticated user when there is one, otherwise by client IP. Paid tiers
//! get a multiple of the base limit. The per-key request log lives either in
//! process memory or in Redis.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::middleware::CurrentUser;
use crate::auth::users::{ENTERPRISE, PREMIUM};
use crate::config::{Config, RateLimitStorage};
use crate::errors::AppError;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// `limit` requests per `window` for one feature.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub feature: &'static str,
    pub limit: u32,
    pub window: Duration,
}

impl RatePolicy {
    pub const fn per_hour(feature: &'static str, limit: u32) -> Self {
        Self {
            feature,
            limit,
            window: Duration::from_secs(3600),
        }
    }
}

/// Outcome of recording one request against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub allowed: bool,
    pub count: u32,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Drops entries older than `window`, then admits the request if fewer
    /// than `limit` remain. `count` is the log size after the decision.
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<Hit, RateLimitError>;
}

// ─── In-memory backend ──────────────────────────────────────────────────────

/// A sweep for idle keys runs once every this many hits.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug)]
struct RequestLog {
    window: Duration,
    hits: Vec<Instant>,
}

impl RequestLog {
    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.hits.retain(|t| now.saturating_duration_since(*t) < window);
    }
}

#[derive(Default)]
pub struct InMemoryRateLimiter {
    requests: DashMap<String, RequestLog>,
    hits_since_sweep: AtomicU64,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> Hit {
        let hit = {
            let mut log = self.requests.entry(key.to_string()).or_insert_with(|| RequestLog {
                window,
                hits: Vec::new(),
            });
            log.window = window;
            log.prune(now);

            let count = log.hits.len() as u32;
            if count >= limit {
                Hit {
                    allowed: false,
                    count,
                }
            } else {
                log.hits.push(now);
                Hit {
                    allowed: true,
                    count: count + 1,
                }
            }
        };

        // A zero limit leaves nothing logged for this key.
        self.requests.remove_if(key, |_, log| log.hits.is_empty());

        if self.hits_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= SWEEP_EVERY {
            self.hits_since_sweep.store(0, Ordering::Relaxed);
            self.sweep(now);
        }
        hit
    }

    /// Drops keys whose whole log has aged out of its window.
    fn sweep(&self, now: Instant) {
        let before = self.requests.len();
        self.requests.retain(|_, log| {
            log.prune(now);
            !log.hits.is_empty()
        });
        let removed = before.saturating_sub(self.requests.len());
        if removed > 0 {
            debug!("Rate limiter dropped {removed} idle keys");
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimiter {
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<Hit, RateLimitError> {
        Ok(self.hit_at(key, limit, window, Instant::now()))
    }
}

// ─── Redis backend ──────────────────────────────────────────────────────────

/// KEYS[1] = log key; ARGV = now_ms, window_ms, limit, unique member.
const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
  return {0, count}
end
redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return {1, count + 1}
"#;

pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    script: redis::Script,
}

impl RedisRateLimiter {
    pub async fn connect(url: &str) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!("Rate limiter connected to Redis");
        Ok(Self {
            conn,
            script: redis::Script::new(SLIDING_WINDOW_LUA),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<Hit, RateLimitError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4().simple());
        let mut conn = self.conn.clone();

        let (allowed, count): (i64, i64) = self
            .script
            .key(format!("ratelimit:{key}"))
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        Ok(Hit {
            allowed: allowed == 1,
            count: count.max(0) as u32,
        })
    }
}

// ─── Policy enforcement ─────────────────────────────────────────────────────

/// Handle shared through `AppState`.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRateLimiter::new()))
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        match (config.rate_limit_storage, config.redis_url.as_deref()) {
            (RateLimitStorage::Redis, Some(url)) => {
                Ok(Self::new(Arc::new(RedisRateLimiter::connect(url).await?)))
            }
            (RateLimitStorage::Redis, None) => {
                anyhow::bail!("REDIS_URL must be set when RATE_LIMIT_STORAGE=redis")
            }
            (RateLimitStorage::Memory, _) => {
                info!("Rate limiter using in-memory storage");
                Ok(Self::in_memory())
            }
        }
    }

    /// Records one request for `policy` and fails with `AppError::RateLimited`
    /// once the caller's window is full. Store failures let the request through.
    pub async fn enforce(
        &self,
        policy: &RatePolicy,
        user: Option<&CurrentUser>,
        peer: Option<SocketAddr>,
    ) -> Result<(), AppError> {
        let (key, limit) = rate_key(policy, user, peer);

        match self.store.hit(&key, limit, policy.window).await {
            Ok(hit) if hit.allowed => {
                debug!("Rate limit {key}: {}/{limit}", hit.count);
                Ok(())
            }
            Ok(hit) => {
                warn!("Rate limit exceeded for {key} ({}/{limit})", hit.count);
                Err(AppError::RateLimited {
                    limit,
                    window: policy.window.as_secs(),
                    current_count: hit.count,
                })
            }
            Err(e) => {
                warn!("Rate limit store unavailable for {key}: {e}");
                Ok(())
            }
        }
    }
}

/// Builds the log key and the tier-adjusted limit.
fn rate_key(policy: &RatePolicy, user: Option<&CurrentUser>, peer: Option<SocketAddr>) -> (String, u32) {
    match user {
        Some(user) => {
            let multiplier = match user.subscription.as_str() {
                PREMIUM => 10,
                ENTERPRISE => 50,
                _ => 1,
            };
            (
                format!("user:{}:{}", user.user_id, policy.feature),
                policy.limit.saturating_mul(multiplier),
            )
        }
        None => {
            let ip = peer
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (format!("ip:{ip}:{}", policy.feature), policy.limit)
        }
    }
}
