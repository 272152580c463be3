// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotlist_core::{Clock, RankingSnapshot, SystemClock};
use hotlist_db::to_millis;
use sqlx::SqlitePool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{RankingError, Result};

pub const DEFAULT_CACHE_KEY: &str = "ranking:top_n";

/// A store for the latest snapshot. `get` returns `None` on a miss or
/// after expiry.
#[async_trait]
pub trait RankingCache: Send + Sync {
	async fn set(&self, snapshot: &RankingSnapshot) -> Result<()>;

	async fn get(&self) -> Result<Option<RankingSnapshot>>;
}

fn shared_tier_error(e: sqlx::Error) -> RankingError {
	RankingError::Cache(format!("shared tier unavailable: {e}"))
}

fn ttl_or_year(ttl: Duration) -> chrono::Duration {
	chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

struct Entry {
	snapshot: RankingSnapshot,
	deadline: DateTime<Utc>,
}

/// Process-local tier. Keeps the last snapshot past its deadline so that
/// [`LocalRankingCache::force_get`] can still serve it.
pub struct LocalRankingCache {
	entry: RwLock<Option<Entry>>,
	ttl: chrono::Duration,
	clock: Arc<dyn Clock>,
}

impl LocalRankingCache {
	pub fn new(ttl: Duration) -> Self {
		Self {
			entry: RwLock::new(None),
			ttl: ttl_or_year(ttl),
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn store(&self, snapshot: RankingSnapshot) {
		let deadline = self.clock.now() + self.ttl;
		*self.entry.write().unwrap_or_else(|e| e.into_inner()) = Some(Entry { snapshot, deadline });
	}

	/// The snapshot if its deadline has not passed.
	pub fn load(&self) -> Option<RankingSnapshot> {
		let now = self.clock.now();
		self
			.entry
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.as_ref()
			.filter(|e| e.deadline > now)
			.map(|e| e.snapshot.clone())
	}

	/// The last stored snapshot, expired or not.
	pub fn force_get(&self) -> Option<RankingSnapshot> {
		self
			.entry
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.as_ref()
			.map(|e| e.snapshot.clone())
	}
}

/// Shared tier: one JSON row in `ranking_cache` with its own expiry.
#[derive(Clone)]
pub struct SqliteRankingCache {
	pool: SqlitePool,
	key: String,
	ttl: chrono::Duration,
	clock: Arc<dyn Clock>,
}

impl SqliteRankingCache {
	pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
		Self {
			pool,
			key: DEFAULT_CACHE_KEY.to_string(),
			ttl: ttl_or_year(ttl),
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_key(mut self, key: impl Into<String>) -> Self {
		self.key = key.into();
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}
}

#[async_trait]
impl RankingCache for SqliteRankingCache {
	#[tracing::instrument(skip(self, snapshot), fields(key = %self.key, count = snapshot.len()))]
	async fn set(&self, snapshot: &RankingSnapshot) -> Result<()> {
		let payload = serde_json::to_string(snapshot)?;
		let expires_at = self.clock.now() + self.ttl;

		sqlx::query(
			r#"
			INSERT INTO ranking_cache (cache_key, payload, expires_at)
			VALUES (?, ?, ?)
			ON CONFLICT(cache_key) DO UPDATE
			SET payload = excluded.payload, expires_at = excluded.expires_at
			"#,
		)
		.bind(&self.key)
		.bind(payload)
		.bind(to_millis(expires_at))
		.execute(&self.pool)
		.await
		.map_err(shared_tier_error)?;
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(key = %self.key))]
	async fn get(&self) -> Result<Option<RankingSnapshot>> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT payload FROM ranking_cache WHERE cache_key = ? AND expires_at > ?")
				.bind(&self.key)
				.bind(to_millis(self.clock.now()))
				.fetch_optional(&self.pool)
				.await
				.map_err(shared_tier_error)?;

		row
			.map(|(payload,)| serde_json::from_str(&payload).map_err(RankingError::from))
			.transpose()
	}
}
