// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{LockError, Result};

/// Proof of ownership of `key` until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
	pub key: String,
	pub owner: String,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
	/// No retries: one attempt only.
	Never,
	/// Wait `interval` between attempts, at most `max` retries.
	FixedInterval { interval: Duration, max: u32 },
}

impl RetryPolicy {
	/// Delay before retry number `retry` (1-based), or `None` once exhausted.
	pub fn next_delay(&self, retry: u32) -> Option<Duration> {
		match *self {
			RetryPolicy::Never => None,
			RetryPolicy::FixedInterval { interval, max } => (retry <= max).then_some(interval),
		}
	}
}

#[derive(Debug, Clone)]
pub struct AcquireOptions {
	pub ttl: Duration,
	pub retry: RetryPolicy,
	/// Bound on a single attempt against the store.
	pub attempt_timeout: Duration,
	/// Bound on the whole acquisition including retries.
	pub overall_timeout: Duration,
}

impl Default for AcquireOptions {
	fn default() -> Self {
		Self {
			ttl: Duration::from_secs(15),
			retry: RetryPolicy::FixedInterval {
				interval: Duration::from_millis(100),
				max: 3,
			},
			attempt_timeout: Duration::from_secs(1),
			overall_timeout: Duration::from_secs(4),
		}
	}
}

#[async_trait]
pub trait LockService: Send + Sync {
	/// A single attempt. `Ok(None)` means another owner holds an unexpired lease.
	async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>>;

	/// Extends the lease. Fails with `NotHeld` if `token` no longer owns the key.
	async fn refresh(&self, token: &LockToken, ttl: Duration) -> Result<LockToken>;

	async fn release(&self, token: &LockToken) -> Result<()>;

	/// Returns the current, unexpired holder of `key`.
	async fn holder(&self, key: &str) -> Result<Option<String>>;

	/// Acquires `key`, retrying on contention per `opts.retry` within
	/// `opts.overall_timeout`.
	#[instrument(skip(self, opts), fields(ttl_ms = opts.ttl.as_millis() as u64))]
	async fn acquire(&self, key: &str, opts: &AcquireOptions) -> Result<LockToken> {
		let attempts = async {
			let mut retry = 0u32;
			loop {
				match tokio::time::timeout(opts.attempt_timeout, self.try_acquire(key, opts.ttl)).await {
					Ok(Ok(Some(token))) => return Ok(token),
					Ok(Ok(None)) => debug!(key, retry, "lock held elsewhere"),
					Ok(Err(e)) => return Err(e),
					Err(_) => debug!(key, retry, "lock attempt timed out"),
				}

				retry += 1;
				match opts.retry.next_delay(retry) {
					Some(delay) => tokio::time::sleep(delay).await,
					None => {
						return Err(LockError::Unavailable(format!(
							"{key}: gave up after {retry} attempts"
						)))
					}
				}
			}
		};

		tokio::time::timeout(opts.overall_timeout, attempts)
			.await
			.map_err(|_| LockError::Unavailable(format!("{key}: acquisition deadline exceeded")))?
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[test]
	fn test_fixed_interval_exhausts() {
		let policy = RetryPolicy::FixedInterval {
			interval: Duration::from_millis(100),
			max: 2,
		};
		assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
		assert_eq!(policy.next_delay(2), Some(Duration::from_millis(100)));
		assert_eq!(policy.next_delay(3), None);
		assert_eq!(RetryPolicy::Never.next_delay(1), None);
	}

	/// Succeeds on the N-th attempt, hangs when `hang` is set.
	struct FlakyLock {
		succeed_on: u32,
		attempts: AtomicU32,
		hang: bool,
	}

	#[async_trait]
	impl LockService for FlakyLock {
		async fn try_acquire(&self, key: &str, _ttl: Duration) -> Result<Option<LockToken>> {
			let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
			if self.hang {
				std::future::pending::<()>().await;
			}
			Ok((n >= self.succeed_on).then(|| LockToken {
				key: key.to_string(),
				owner: "me".to_string(),
				expires_at: Utc::now(),
			}))
		}

		async fn refresh(&self, token: &LockToken, _ttl: Duration) -> Result<LockToken> {
			Ok(token.clone())
		}

		async fn release(&self, _token: &LockToken) -> Result<()> {
			Ok(())
		}

		async fn holder(&self, _key: &str) -> Result<Option<String>> {
			Ok(None)
		}
	}

	fn flaky(succeed_on: u32, hang: bool) -> FlakyLock {
		FlakyLock {
			succeed_on,
			attempts: AtomicU32::new(0),
			hang,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_acquire_retries_until_success() {
		let lock = flaky(3, false);
		let token = lock.acquire("k", &AcquireOptions::default()).await.unwrap();
		assert_eq!(token.key, "k");
		assert_eq!(lock.attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_acquire_gives_up_after_max_retries() {
		let lock = flaky(100, false);
		let result = lock.acquire("k", &AcquireOptions::default()).await;
		assert!(matches!(result, Err(LockError::Unavailable(_))));
		// one initial attempt plus three retries
		assert_eq!(lock.attempts.load(Ordering::SeqCst), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn test_acquire_respects_overall_deadline() {
		let lock = flaky(1, true);
		let opts = AcquireOptions {
			attempt_timeout: Duration::from_secs(10),
			overall_timeout: Duration::from_secs(2),
			..Default::default()
		};
		let result = lock.acquire("k", &opts).await;
		assert!(matches!(result, Err(LockError::Unavailable(_))));
	}
}
