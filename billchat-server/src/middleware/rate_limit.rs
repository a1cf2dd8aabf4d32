// Copyright 2025 Billchat Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Sliding-window rate limiting keyed by client identifier.
//!
//! The counter store is injected behind [`CounterStore`] so the quota
//! logic is testable with a fake store and clock, and so a shared
//! external store can back multiple instances. The in-process
//! [`InMemoryCounterStore`] is the default backing.
//!
//! Outage policy: if the counter store errors, the limiter FAILS OPEN —
//! the request is allowed and a warning is logged. This is a deliberate
//! availability-over-enforcement choice for a public read-only service.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Decision for one inbound request. Produced per call, never mutated.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis() as u64
    }
}

/// Windowed counter store: one atomic increment-and-read plus a read
/// of an adjacent window slot. Keys are (client id, window slot).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `(key, slot)` and return
    /// the post-increment count.
    async fn incr(&self, key: &str, slot: u64) -> anyhow::Result<u64>;

    /// Read the counter for `(key, slot)` without modifying it.
    async fn get(&self, key: &str, slot: u64) -> anyhow::Result<u64>;
}

/// In-process counter store backed by a DashMap.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counts: DashMap<(String, u64), u64>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str, slot: u64) -> anyhow::Result<u64> {
        let mut entry = self
            .counts
            .entry((key.to_string(), slot))
            .or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn get(&self, key: &str, slot: u64) -> anyhow::Result<u64> {
        Ok(self
            .counts
            .get(&(key.to_string(), slot))
            .map(|e| *e)
            .unwrap_or(0))
    }
}

/// Sliding-window limiter: N requests per trailing window W.
///
/// The window is tracked as two fixed slots; the trailing-window count
/// is estimated as `prev * (1 - elapsed_fraction) + curr`, the same
/// scheme the hosted sliding-window limiters use. Every call performs
/// exactly one increment against the store, allow or deny.
pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    max_requests: u32,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        max_requests: u32,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            max_requests,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Gate one request for `key`. Increments the current slot, then
    /// allows iff the post-increment sliding estimate stays within the
    /// quota.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let window_ms = self.window.as_millis() as u64;
        let now = self.clock.now_ms();
        let slot = now / window_ms;
        let elapsed = (now % window_ms) as f64 / window_ms as f64;
        let reset_at = self.reset_time(slot, window_ms);

        let current = match self.store.incr(key, slot).await {
            Ok(count) => count,
            Err(e) => {
                // Fail open: availability over enforcement.
                tracing::warn!(key, error = %e, "counter store unavailable, allowing request");
                return RateLimitDecision {
                    allowed: true,
                    limit: self.max_requests,
                    remaining: self.max_requests,
                    reset_at,
                };
            }
        };

        let previous = if slot == 0 {
            0
        } else {
            self.store.get(key, slot - 1).await.unwrap_or_else(|e| {
                tracing::warn!(key, error = %e, "counter store read failed, ignoring previous window");
                0
            })
        };

        let estimate = previous as f64 * (1.0 - elapsed) + current as f64;
        let used = estimate.ceil() as u64;
        let allowed = used <= self.max_requests as u64;

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining: (self.max_requests as u64).saturating_sub(used) as u32,
            reset_at,
        }
    }

    fn reset_time(&self, slot: u64, window_ms: u64) -> DateTime<Utc> {
        let reset_ms = (slot + 1) * window_ms;
        Utc.timestamp_millis_opt(reset_ms as i64)
            .single()
            .unwrap_or_else(Utc::now)
    }
}
