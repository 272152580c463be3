// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-node load scores used to pick the ranking leader.

use async_trait::async_trait;
use hotlist_core::{CancellationToken, Clock, LoadEntry, PeriodicTask, SystemClock, Tick, MAX_LOAD_SCORE};
use hotlist_db::{from_millis, to_millis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

#[async_trait]
pub trait LoadRegistry: Send + Sync {
	async fn publish(&self, node_id: &str, score: u8) -> Result<()>;

	/// Every live entry, lowest score first; ties broken by node id.
	async fn list(&self) -> Result<Vec<LoadEntry>>;

	async fn remove(&self, node_id: &str) -> Result<()>;

	/// The least loaded node, or `None` when nobody has published recently.
	async fn least_loaded(&self) -> Result<Option<LoadEntry>> {
		Ok(self.list().await?.into_iter().next())
	}
}

/// Entries older than this are treated as belonging to a dead node.
pub const DEFAULT_LOAD_STALE_AFTER: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct SqliteLoadRegistry {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
	stale_after: Duration,
}

impl SqliteLoadRegistry {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			clock: Arc::new(SystemClock),
			stale_after: DEFAULT_LOAD_STALE_AFTER,
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_staleness(mut self, stale_after: Duration) -> Self {
		self.stale_after = stale_after;
		self
	}

	fn fresh_since(&self) -> i64 {
		chrono::Duration::from_std(self.stale_after)
			.ok()
			.and_then(|window| self.clock.now().checked_sub_signed(window))
			.map(to_millis)
			.unwrap_or(i64::MIN)
	}
}

#[async_trait]
impl LoadRegistry for SqliteLoadRegistry {
	#[tracing::instrument(skip(self))]
	async fn publish(&self, node_id: &str, score: u8) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO node_loads (node_id, score, as_of) VALUES (?, ?, ?)
			ON CONFLICT(node_id) DO UPDATE SET score = excluded.score, as_of = excluded.as_of
			"#,
		)
		.bind(node_id)
		.bind(i64::from(score.min(MAX_LOAD_SCORE)))
		.bind(to_millis(self.clock.now()))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	async fn list(&self) -> Result<Vec<LoadEntry>> {
		let rows: Vec<(String, i64, i64)> = sqlx::query_as(
			r#"
			SELECT node_id, score, as_of FROM node_loads
			WHERE as_of >= ?
			ORDER BY score ASC, node_id ASC
			"#,
		)
		.bind(self.fresh_since())
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(node_id, score, as_of)| -> Result<LoadEntry> {
				Ok(LoadEntry {
					node_id,
					score: score.clamp(0, i64::from(MAX_LOAD_SCORE)) as u8,
					as_of: from_millis(as_of)?,
				})
			})
			.collect()
	}

	#[tracing::instrument(skip(self))]
	async fn remove(&self, node_id: &str) -> Result<()> {
		sqlx::query("DELETE FROM node_loads WHERE node_id = ?")
			.bind(node_id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

/// Produces this node's current load score.
pub trait LoadSource: Send + Sync {
	fn sample(&self) -> u8;
}

/// Uniform synthetic load in `0..=100`.
pub struct RandomLoad {
	rng: Mutex<StdRng>,
}

impl RandomLoad {
	pub fn new() -> Self {
		Self {
			rng: Mutex::new(StdRng::from_entropy()),
		}
	}

	pub fn seeded(seed: u64) -> Self {
		Self {
			rng: Mutex::new(StdRng::seed_from_u64(seed)),
		}
	}
}

impl Default for RandomLoad {
	fn default() -> Self {
		Self::new()
	}
}

impl LoadSource for RandomLoad {
	fn sample(&self) -> u8 {
		self
			.rng
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.gen_range(0..=MAX_LOAD_SCORE)
	}
}

/// A load score set by hand.
#[derive(Debug, Default)]
pub struct FixedLoad(AtomicU8);

impl FixedLoad {
	pub fn new(score: u8) -> Self {
		Self(AtomicU8::new(score.min(MAX_LOAD_SCORE)))
	}

	pub fn set(&self, score: u8) {
		self.0.store(score.min(MAX_LOAD_SCORE), Ordering::SeqCst);
	}
}

impl LoadSource for FixedLoad {
	fn sample(&self) -> u8 {
		self.0.load(Ordering::SeqCst)
	}
}

/// Republishes this node's load on a fixed period.
pub struct LoadReporter {
	task: PeriodicTask,
}

impl LoadReporter {
	/// Publishes once before returning, then every `interval`.
	pub async fn start(
		node_id: String,
		registry: Arc<dyn LoadRegistry>,
		source: Arc<dyn LoadSource>,
		interval: Duration,
		parent: &CancellationToken,
	) -> Result<Self> {
		let score = source.sample();
		registry.publish(&node_id, score).await?;
		debug!(%node_id, score, "load published");

		let task = PeriodicTask::start(format!("load:{node_id}"), interval, parent, move || {
			let registry = Arc::clone(&registry);
			let source = Arc::clone(&source);
			let node_id = node_id.clone();
			async move {
				let score = source.sample();
				match registry.publish(&node_id, score).await {
					Ok(()) => debug!(%node_id, score, "load published"),
					Err(e) => warn!(%node_id, error = %e, "failed to publish load"),
				}
				Tick::Continue
			}
		});

		Ok(Self { task })
	}

	pub async fn stop(&self) {
		self.task.join().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use hotlist_core::ManualClock;
	use hotlist_db::testing::create_test_pool;

	#[tokio::test]
	async fn test_list_orders_by_score_then_node() {
		let registry = SqliteLoadRegistry::new(create_test_pool().await);
		registry.publish("node-c", 40).await.unwrap();
		registry.publish("node-b", 10).await.unwrap();
		registry.publish("node-a", 40).await.unwrap();

		let order: Vec<_> = registry
			.list()
			.await
			.unwrap()
			.into_iter()
			.map(|e| (e.node_id, e.score))
			.collect();
		assert_eq!(
			order,
			vec![
				("node-b".to_string(), 10),
				("node-a".to_string(), 40),
				("node-c".to_string(), 40),
			]
		);
	}

	#[tokio::test]
	async fn test_publish_overwrites_and_remove_deletes() {
		let registry = SqliteLoadRegistry::new(create_test_pool().await);
		assert!(registry.least_loaded().await.unwrap().is_none());

		registry.publish("node-a", 10).await.unwrap();
		registry.publish("node-b", 20).await.unwrap();
		registry.publish("node-a", 90).await.unwrap();
		assert_eq!(registry.least_loaded().await.unwrap().unwrap().node_id, "node-b");

		registry.remove("node-b").await.unwrap();
		registry.remove("node-b").await.unwrap();
		let all = registry.list().await.unwrap();
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].score, 90);
	}

	#[tokio::test]
	async fn test_silent_node_drops_out_of_the_list() {
		let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 19, 10, 0, 0).unwrap()));
		let registry = SqliteLoadRegistry::new(create_test_pool().await)
			.with_clock(clock.clone())
			.with_staleness(Duration::from_secs(15));

		registry.publish("node-a", 5).await.unwrap();
		registry.publish("node-b", 60).await.unwrap();
		assert_eq!(registry.least_loaded().await.unwrap().unwrap().node_id, "node-a");

		clock.advance(chrono::Duration::seconds(10));
		registry.publish("node-b", 60).await.unwrap();
		assert_eq!(registry.list().await.unwrap().len(), 2);

		// node-a has not published for 16s
		clock.advance(chrono::Duration::seconds(6));
		let live = registry.list().await.unwrap();
		assert_eq!(live.len(), 1);
		assert_eq!(live[0].node_id, "node-b");

		clock.advance(chrono::Duration::seconds(30));
		assert!(registry.least_loaded().await.unwrap().is_none());

		registry.publish("node-a", 5).await.unwrap();
		assert_eq!(registry.least_loaded().await.unwrap().unwrap().node_id, "node-a");
	}

	#[test]
	fn test_random_load_stays_in_range() {
		let load = RandomLoad::seeded(7);
		for _ in 0..1000 {
			assert!(load.sample() <= MAX_LOAD_SCORE);
		}
	}

	#[test]
	fn test_fixed_load_is_capped() {
		let load = FixedLoad::new(250);
		assert_eq!(load.sample(), MAX_LOAD_SCORE);
		load.set(12);
		assert_eq!(load.sample(), 12);
	}

	#[tokio::test]
	async fn test_reporter_republishes_until_stopped() {
		let registry = Arc::new(SqliteLoadRegistry::new(create_test_pool().await));
		let load = Arc::new(FixedLoad::new(30));
		let reporter = LoadReporter::start(
			"node-a".to_string(),
			registry.clone(),
			load.clone(),
			Duration::from_millis(20),
			&CancellationToken::new(),
		)
		.await
		.unwrap();
		assert_eq!(registry.list().await.unwrap()[0].score, 30);

		load.set(5);
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(registry.list().await.unwrap()[0].score, 5);

		reporter.stop().await;
		load.set(70);
		tokio::time::sleep(Duration::from_millis(60)).await;
		assert_eq!(registry.list().await.unwrap()[0].score, 5);
	}
}
