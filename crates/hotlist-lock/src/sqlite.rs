// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotlist_core::{Clock, SystemClock};
use hotlist_db::{from_millis, to_millis};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{LockError, Result};
use crate::lock::{LockService, LockToken};

/// Locks stored as rows in the shared `distributed_locks` table.
///
/// Every acquisition mints a fresh owner id, so a token only ever matches
/// the lease it was issued for.
#[derive(Clone)]
pub struct SqliteLockService {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
}

impl SqliteLockService {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	fn deadline(&self, ttl: Duration) -> Result<DateTime<Utc>> {
		let ttl = chrono::Duration::from_std(ttl).map_err(|e| LockError::Internal(e.to_string()))?;
		Ok(self.clock.now() + ttl)
	}
}

#[async_trait]
impl LockService for SqliteLockService {
	#[instrument(skip(self))]
	async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>> {
		let now = to_millis(self.clock.now());
		let expires_at = self.deadline(ttl)?;
		let owner = Uuid::new_v4().to_string();

		let result = sqlx::query(
			r#"
			INSERT INTO distributed_locks (lock_key, owner, expires_at)
			VALUES (?, ?, ?)
			ON CONFLICT(lock_key) DO UPDATE
			SET owner = excluded.owner, expires_at = excluded.expires_at
			WHERE distributed_locks.expires_at <= ?
			"#,
		)
		.bind(key)
		.bind(&owner)
		.bind(to_millis(expires_at))
		.bind(now)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Ok(None);
		}

		debug!(key, %owner, "lock acquired");
		Ok(Some(LockToken {
			key: key.to_string(),
			owner,
			expires_at: from_millis(to_millis(expires_at))?,
		}))
	}

	#[instrument(skip(self, token), fields(key = %token.key))]
	async fn refresh(&self, token: &LockToken, ttl: Duration) -> Result<LockToken> {
		let now = to_millis(self.clock.now());
		let expires_at = self.deadline(ttl)?;

		let result = sqlx::query(
			r#"
			UPDATE distributed_locks SET expires_at = ?
			WHERE lock_key = ? AND owner = ? AND expires_at > ?
			"#,
		)
		.bind(to_millis(expires_at))
		.bind(&token.key)
		.bind(&token.owner)
		.bind(now)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(LockError::NotHeld(token.key.clone()));
		}

		Ok(LockToken {
			key: token.key.clone(),
			owner: token.owner.clone(),
			expires_at: from_millis(to_millis(expires_at))?,
		})
	}

	#[instrument(skip(self, token), fields(key = %token.key))]
	async fn release(&self, token: &LockToken) -> Result<()> {
		let result = sqlx::query("DELETE FROM distributed_locks WHERE lock_key = ? AND owner = ?")
			.bind(&token.key)
			.bind(&token.owner)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(LockError::NotHeld(token.key.clone()));
		}
		debug!("lock released");
		Ok(())
	}

	async fn holder(&self, key: &str) -> Result<Option<String>> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT owner FROM distributed_locks WHERE lock_key = ? AND expires_at > ?")
				.bind(key)
				.bind(to_millis(self.clock.now()))
				.fetch_optional(&self.pool)
				.await?;
		Ok(row.map(|(owner,)| owner))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lock::AcquireOptions;
	use hotlist_core::ManualClock;
	use hotlist_db::testing::create_test_pool;

	const TTL: Duration = Duration::from_secs(15);

	async fn make_service() -> (SqliteLockService, Arc<ManualClock>) {
		let pool = create_test_pool().await;
		let clock = Arc::new(ManualClock::default());
		let service = SqliteLockService::new(pool).with_clock(clock.clone());
		(service, clock)
	}

	#[tokio::test]
	async fn test_second_owner_is_refused_while_lease_is_live() {
		let (locks, _) = make_service().await;

		let first = locks.try_acquire("job:ranking", TTL).await.unwrap();
		assert!(first.is_some());
		assert!(locks.try_acquire("job:ranking", TTL).await.unwrap().is_none());

		let holder = locks.holder("job:ranking").await.unwrap();
		assert_eq!(holder, first.map(|t| t.owner));
	}

	#[tokio::test]
	async fn test_expired_lease_can_be_taken_over() {
		let (locks, clock) = make_service().await;

		let first = locks.try_acquire("k", TTL).await.unwrap().unwrap();
		clock.advance(chrono::Duration::seconds(16));

		let second = locks.try_acquire("k", TTL).await.unwrap().unwrap();
		assert_ne!(first.owner, second.owner);

		let err = locks.refresh(&first, TTL).await.unwrap_err();
		assert!(matches!(err, LockError::NotHeld(_)));
		assert!(matches!(locks.release(&first).await, Err(LockError::NotHeld(_))));
	}

	#[tokio::test]
	async fn test_refresh_extends_lease() {
		let (locks, clock) = make_service().await;

		let token = locks.try_acquire("k", TTL).await.unwrap().unwrap();
		clock.advance(chrono::Duration::seconds(10));
		let refreshed = locks.refresh(&token, TTL).await.unwrap();
		assert!(refreshed.expires_at > token.expires_at);

		// past the original expiry but within the refreshed one
		clock.advance(chrono::Duration::seconds(10));
		assert!(locks.try_acquire("k", TTL).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_refresh_after_expiry_fails() {
		let (locks, clock) = make_service().await;

		let token = locks.try_acquire("k", TTL).await.unwrap().unwrap();
		clock.advance(chrono::Duration::seconds(15));
		assert!(matches!(locks.refresh(&token, TTL).await, Err(LockError::NotHeld(_))));
	}

	#[tokio::test]
	async fn test_release_frees_the_key() {
		let (locks, _) = make_service().await;

		let token = locks.try_acquire("k", TTL).await.unwrap().unwrap();
		locks.release(&token).await.unwrap();
		assert_eq!(locks.holder("k").await.unwrap(), None);
		assert!(locks.try_acquire("k", TTL).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_acquire_reports_unavailable_when_held() {
		let (locks, _) = make_service().await;
		let _held = locks.try_acquire("k", TTL).await.unwrap().unwrap();

		let opts = AcquireOptions {
			retry: crate::RetryPolicy::FixedInterval {
				interval: Duration::from_millis(1),
				max: 2,
			},
			..Default::default()
		};
		let result = locks.acquire("k", &opts).await;
		assert!(matches!(result, Err(LockError::Unavailable(_))));
	}

	#[tokio::test]
	async fn test_concurrent_acquire_has_one_winner() {
		let (locks, _) = make_service().await;

		let mut handles = Vec::new();
		for _ in 0..8 {
			let locks = locks.clone();
			handles.push(tokio::spawn(async move { locks.try_acquire("k", TTL).await.unwrap() }));
		}

		let mut winners = 0;
		for handle in handles {
			if handle.await.unwrap().is_some() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
	}
}
