// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-tenant token bucket rate limiting.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tessera_server_auth::TenantId;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ProvisioningError;

#[derive(Debug)]
struct TokenBucket {
	tokens: f64,
	max_tokens: f64,
	refill_rate: f64,
	last_refill: Instant,
}

impl TokenBucket {
	fn new(max_tokens: f64, refill_rate: f64, now: Instant) -> Self {
		Self {
			tokens: max_tokens,
			max_tokens,
			refill_rate,
			last_refill: now,
		}
	}

	/// `None` when a token was taken, otherwise the wait until one is available.
	fn try_consume(&mut self, now: Instant) -> Option<Duration> {
		self.refill(now);

		if self.tokens >= 1.0 {
			self.tokens -= 1.0;
			None
		} else {
			let needed = 1.0 - self.tokens;
			Some(Duration::from_secs_f64(needed / self.refill_rate))
		}
	}

	fn refill(&mut self, now: Instant) {
		let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
		self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
		self.last_refill = now;
	}
}

/// Buckets are created lazily on a tenant's first request. Concurrent first
/// requests for the same tenant share one bucket.
pub struct TenantRateLimiter {
	buckets: RwLock<HashMap<TenantId, Arc<Mutex<TokenBucket>>>>,
	per_second: u32,
	burst: u32,
}

impl TenantRateLimiter {
	pub fn new(per_second: u32, burst: u32) -> Self {
		Self {
			buckets: RwLock::new(HashMap::new()),
			per_second: per_second.max(1),
			burst: burst.max(1),
		}
	}

	pub fn per_second(&self) -> u32 {
		self.per_second
	}

	pub fn check(&self, tenant_id: &TenantId) -> Result<(), ProvisioningError> {
		match self.try_acquire_at(tenant_id, Instant::now()) {
			None => Ok(()),
			Some(_) => Err(ProvisioningError::RateLimited {
				limit: self.per_second,
			}),
		}
	}

	fn try_acquire_at(&self, tenant_id: &TenantId, now: Instant) -> Option<Duration> {
		self.bucket(tenant_id, now).lock().try_consume(now)
	}

	fn bucket(&self, tenant_id: &TenantId, now: Instant) -> Arc<Mutex<TokenBucket>> {
		if let Some(bucket) = self.buckets.read().get(tenant_id) {
			return Arc::clone(bucket);
		}
		let mut buckets = self.buckets.write();
		Arc::clone(buckets.entry(*tenant_id).or_insert_with(|| {
			Arc::new(Mutex::new(TokenBucket::new(
				f64::from(self.burst),
				f64::from(self.per_second),
				now,
			)))
		}))
	}

	pub fn tenant_count(&self) -> usize {
		self.buckets.read().len()
	}

	/// Drop buckets idle for longer than `max_idle`.
	pub fn evict_idle(&self, max_idle: Duration) {
		let now = Instant::now();
		self.buckets
			.write()
			.retain(|_, bucket| now.saturating_duration_since(bucket.lock().last_refill) < max_idle);
	}

	/// Time for an empty bucket to refill completely. An evicted bucket comes
	/// back full, so nothing younger than this is ever evicted.
	fn full_refill(&self) -> Duration {
		Duration::from_secs_f64(f64::from(self.burst) / f64::from(self.per_second))
	}

	/// Evicts idle buckets every `every` until the limiter is dropped.
	pub fn spawn_eviction(limiter: &Arc<Self>, every: Duration) -> JoinHandle<()> {
		let weak: Weak<Self> = Arc::downgrade(limiter);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(every);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			ticker.tick().await;
			loop {
				ticker.tick().await;
				let Some(limiter) = weak.upgrade() else {
					break;
				};
				let before = limiter.tenant_count();
				limiter.evict_idle(every.max(limiter.full_refill()));
				debug!(evicted = before.saturating_sub(limiter.tenant_count()), "rate limit buckets swept");
			}
		})
	}
}
