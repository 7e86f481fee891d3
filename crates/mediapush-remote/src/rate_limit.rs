//! Proactive rate limiting for the remote content store
//!
//! Each endpoint class (byte uploads, commits) gets a token bucket sized
//! from the per-minute quotas in `remote` config. A 429 halves the
//! bucket's effective capacity; every 100 consecutive successes restore 5%
//! of it, up to the configured capacity.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mediapush_remote::rate_limit::{AdaptiveRateLimiter, Endpoint};
//!
//! # async fn example() {
//! let limiter = AdaptiveRateLimiter::new(120, 60);
//! limiter.acquire(Endpoint::Upload).await;
//! // ... make API call ...
//! limiter.on_success(Endpoint::Upload);
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use mediapush_core::config::RemoteConfig;

/// Successes needed before capacity grows again
const RECOVERY_STEP: u64 = 100;

/// Longest `Retry-After` date honoured, in seconds
const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Endpoint classes with separate quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Phase 1 byte transfer (raw, resumable start and chunks)
    Upload,
    /// Phase 2 batch create
    Commit,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Upload => "upload",
            Endpoint::Commit => "commit",
        }
    }
}

// ============================================================================
// TokenBucket
// ============================================================================

#[derive(Debug)]
struct BucketState {
    /// Fractional for smooth refill
    tokens: f64,
    last_refill: Instant,
    effective_capacity: u32,
    successes: u64,
}

/// Token bucket for one endpoint class
///
/// Starts full. Tokens refill continuously at `refill_rate` per second up to
/// the effective capacity.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
                effective_capacity: capacity,
                successes: 0,
            }),
        }
    }

    /// Bucket for a per-minute quota
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute, f64::from(requests_per_minute) / 60.0)
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(state: &mut BucketState, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens =
                (state.tokens + elapsed * refill_rate).min(f64::from(state.effective_capacity));
            state.last_refill = now;
        }
    }

    /// Takes one token if available
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one token is available (zero if one is available now)
    pub fn time_until_available(&self) -> Duration {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 {
            return Duration::from_secs(60);
        }
        Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        self.lock().effective_capacity
    }

    pub fn on_success(&self) {
        let mut state = self.lock();
        state.successes += 1;
        if state.successes % RECOVERY_STEP == 0 && state.effective_capacity < self.capacity {
            let increase = ((f64::from(state.effective_capacity) * 0.05) as u32).max(1);
            let new_capacity = (state.effective_capacity + increase).min(self.capacity);
            debug!(
                old_capacity = state.effective_capacity,
                new_capacity, "Rate limit capacity recovering"
            );
            state.effective_capacity = new_capacity;
        }
    }

    /// Halves the effective capacity (never below 1) and drops excess tokens
    pub fn on_throttle(&self) {
        let mut state = self.lock();
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(f64::from(state.effective_capacity));
        state.successes = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttled: halving bucket capacity"
        );
    }
}

// ============================================================================
// AdaptiveRateLimiter
// ============================================================================

/// Token buckets for every endpoint class, shared via `Arc`
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    upload: TokenBucket,
    commit: TokenBucket,
}

impl AdaptiveRateLimiter {
    pub fn new(upload_per_minute: u32, commit_per_minute: u32) -> Self {
        Self {
            upload: TokenBucket::per_minute(upload_per_minute),
            commit: TokenBucket::per_minute(commit_per_minute),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            config.upload_requests_per_minute,
            config.commit_requests_per_minute,
        )
    }

    pub fn bucket(&self, endpoint: Endpoint) -> &TokenBucket {
        match endpoint {
            Endpoint::Upload => &self.upload,
            Endpoint::Commit => &self.commit,
        }
    }

    /// Waits until a token for `endpoint` is available and takes it
    pub async fn acquire(&self, endpoint: Endpoint) {
        let bucket = self.bucket(endpoint);
        loop {
            if bucket.try_acquire() {
                return;
            }
            let wait = bucket.time_until_available().max(Duration::from_millis(10));
            debug!(
                endpoint = endpoint.as_str(),
                wait_ms = wait.as_millis() as u64,
                "No rate limit tokens, waiting for refill"
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub fn on_success(&self, endpoint: Endpoint) {
        self.bucket(endpoint).on_success();
    }

    pub fn on_throttle(&self, endpoint: Endpoint) {
        self.bucket(endpoint).on_throttle();
    }
}

// ============================================================================
// Retry-After parsing
// ============================================================================

/// Parses a `Retry-After` header value
///
/// Accepts delta-seconds or an HTTP date; dates in the past or more than an
/// hour away are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    let secs = u64::try_from(diff.num_seconds()).ok()?;
    if secs <= MAX_RETRY_AFTER_SECS {
        Some(Duration::from_secs(secs))
    } else {
        warn!(value, "Ignoring Retry-After date too far in the future");
        None
    }
}
