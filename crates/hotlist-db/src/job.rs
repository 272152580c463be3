// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted job table with optimistic-concurrency claiming.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hotlist_core::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::{from_millis, to_millis};

/// Heartbeat interval (60s) plus a 30s grace period.
pub const DEFAULT_STALENESS_THRESHOLD_SECS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	/// Nobody holds the job.
	Waiting,
	/// Claimed by a worker.
	Running,
	/// No longer scheduled.
	Paused,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Waiting => "waiting",
			JobStatus::Running => "running",
			JobStatus::Paused => "paused",
		}
	}
}

impl std::str::FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"waiting" => Ok(JobStatus::Waiting),
			"running" => Ok(JobStatus::Running),
			"paused" => Ok(JobStatus::Paused),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
	pub id: i64,
	pub name: String,
	pub executor: String,
	pub expression: String,
	pub config: String,
	pub status: JobStatus,
	pub version: i64,
	pub next_run_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
	pub name: String,
	pub executor: String,
	pub expression: String,
	pub config: String,
	pub next_run_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
	/// Claims one eligible job, flipping it to `Running` and bumping its
	/// version. Returns `DbError::NotFound` when nothing is eligible.
	async fn preempt(&self) -> Result<JobRecord>;
	async fn release(&self, id: i64) -> Result<()>;
	/// Heartbeat: proves the holder of `id` is still alive.
	async fn update_utime(&self, id: i64) -> Result<()>;
	async fn update_next_time(&self, id: i64, next: DateTime<Utc>) -> Result<()>;
	async fn insert(&self, job: &NewJob) -> Result<i64>;
	async fn get(&self, id: i64) -> Result<Option<JobRecord>>;
	async fn get_by_name(&self, name: &str) -> Result<Option<JobRecord>>;
	async fn set_status(&self, id: i64, status: JobStatus) -> Result<()>;
}

#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
	staleness_threshold: Duration,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			clock: Arc::new(SystemClock),
			staleness_threshold: Duration::seconds(DEFAULT_STALENESS_THRESHOLD_SECS),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// A `Running` job whose `updated_at` is older than this is presumed
	/// abandoned and becomes claimable again.
	pub fn with_staleness_threshold(mut self, threshold: Duration) -> Self {
		self.staleness_threshold = threshold;
		self
	}

	pub fn staleness_threshold(&self) -> Duration {
		self.staleness_threshold
	}

	async fn touch(&self, id: i64, query: &str, extra: Option<i64>) -> Result<()> {
		let now = to_millis(self.clock.now());
		let mut q = sqlx::query(query).bind(now);
		if let Some(value) = extra {
			q = q.bind(value);
		}
		let result = q.bind(id).execute(&self.pool).await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("job {id}")));
		}
		Ok(())
	}
}

#[async_trait]
impl JobStore for JobRepository {
	#[tracing::instrument(skip(self))]
	async fn preempt(&self) -> Result<JobRecord> {
		loop {
			let now = self.clock.now();
			let stale_before = now - self.staleness_threshold;

			let row = sqlx::query_as::<_, JobRow>(
				r#"
				SELECT id, name, executor, expression, config, status, version,
				       next_run_at, updated_at, created_at
				FROM cron_jobs
				WHERE (status = ? AND next_run_at <= ?)
				   OR (status = ? AND updated_at < ?)
				ORDER BY next_run_at, id
				LIMIT 1
				"#,
			)
			.bind(JobStatus::Waiting.as_str())
			.bind(to_millis(now))
			.bind(JobStatus::Running.as_str())
			.bind(to_millis(stale_before))
			.fetch_optional(&self.pool)
			.await?;

			let Some(row) = row else {
				return Err(DbError::NotFound("no preemptable job".to_string()));
			};

			let result = sqlx::query(
				r#"
				UPDATE cron_jobs
				SET status = ?, version = version + 1, updated_at = ?
				WHERE id = ? AND version = ?
				"#,
			)
			.bind(JobStatus::Running.as_str())
			.bind(to_millis(now))
			.bind(row.id)
			.bind(row.version)
			.execute(&self.pool)
			.await?;

			if result.rows_affected() == 0 {
				// Another worker bumped the version between our read and write.
				tracing::debug!(job_id = row.id, version = row.version, "lost preempt race, retrying");
				continue;
			}

			let mut job = JobRecord::try_from(row)?;
			job.status = JobStatus::Running;
			job.version += 1;
			job.updated_at = from_millis(to_millis(now))?;
			tracing::debug!(job_id = job.id, name = %job.name, version = job.version, "job preempted");
			return Ok(job);
		}
	}

	#[tracing::instrument(skip(self))]
	async fn release(&self, id: i64) -> Result<()> {
		let now = to_millis(self.clock.now());
		let result = sqlx::query("UPDATE cron_jobs SET status = ?, updated_at = ? WHERE id = ?")
			.bind(JobStatus::Waiting.as_str())
			.bind(now)
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("job {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn update_utime(&self, id: i64) -> Result<()> {
		self
			.touch(id, "UPDATE cron_jobs SET updated_at = ? WHERE id = ?", None)
			.await
	}

	#[tracing::instrument(skip(self))]
	async fn update_next_time(&self, id: i64, next: DateTime<Utc>) -> Result<()> {
		self
			.touch(
				id,
				"UPDATE cron_jobs SET updated_at = ?, next_run_at = ? WHERE id = ?",
				Some(to_millis(next)),
			)
			.await
	}

	#[tracing::instrument(skip(self, job), fields(name = %job.name))]
	async fn insert(&self, job: &NewJob) -> Result<i64> {
		let now = to_millis(self.clock.now());
		let result = sqlx::query(
			r#"
			INSERT INTO cron_jobs (name, executor, expression, config, status, version,
			                       next_run_at, updated_at, created_at)
			VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)
			"#,
		)
		.bind(&job.name)
		.bind(&job.executor)
		.bind(&job.expression)
		.bind(&job.config)
		.bind(JobStatus::Waiting.as_str())
		.bind(to_millis(job.next_run_at))
		.bind(now)
		.bind(now)
		.execute(&self.pool)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref db) if db.is_unique_violation() => {
				DbError::Conflict(format!("job name already exists: {}", job.name))
			}
			other => DbError::Sqlx(other),
		})?;

		Ok(result.last_insert_rowid())
	}

	#[tracing::instrument(skip(self))]
	async fn get(&self, id: i64) -> Result<Option<JobRecord>> {
		let row = sqlx::query_as::<_, JobRow>(
			r#"
			SELECT id, name, executor, expression, config, status, version,
			       next_run_at, updated_at, created_at
			FROM cron_jobs
			WHERE id = ?
			"#,
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn get_by_name(&self, name: &str) -> Result<Option<JobRecord>> {
		let row = sqlx::query_as::<_, JobRow>(
			r#"
			SELECT id, name, executor, expression, config, status, version,
			       next_run_at, updated_at, created_at
			FROM cron_jobs
			WHERE name = ?
			"#,
		)
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn set_status(&self, id: i64, status: JobStatus) -> Result<()> {
		let now = to_millis(self.clock.now());
		let result = sqlx::query("UPDATE cron_jobs SET status = ?, updated_at = ? WHERE id = ?")
			.bind(status.as_str())
			.bind(now)
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("job {id}")));
		}
		Ok(())
	}
}

#[derive(sqlx::FromRow)]
struct JobRow {
	id: i64,
	name: String,
	executor: String,
	expression: String,
	config: String,
	status: String,
	version: i64,
	next_run_at: i64,
	updated_at: i64,
	created_at: i64,
}

impl TryFrom<JobRow> for JobRecord {
	type Error = DbError;

	fn try_from(row: JobRow) -> Result<Self> {
		Ok(JobRecord {
			id: row.id,
			name: row.name,
			executor: row.executor,
			expression: row.expression,
			config: row.config,
			status: row.status.parse().map_err(DbError::Internal)?,
			version: row.version,
			next_run_at: from_millis(row.next_run_at)?,
			updated_at: from_millis(row.updated_at)?,
			created_at: from_millis(row.created_at)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use chrono::TimeZone;
	use hotlist_core::ManualClock;
	use proptest::prelude::*;
	use std::collections::HashSet;

	fn start() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 1, 19, 10, 0, 0).unwrap()
	}

	fn new_job(name: &str, next_run_at: DateTime<Utc>) -> NewJob {
		NewJob {
			name: name.to_string(),
			executor: "local".to_string(),
			expression: "*/5 * * * *".to_string(),
			config: String::new(),
			next_run_at,
		}
	}

	async fn setup() -> (JobRepository, Arc<ManualClock>, SqlitePool) {
		let pool = create_test_pool().await;
		let clock = Arc::new(ManualClock::new(start()));
		let repo = JobRepository::new(pool.clone()).with_clock(clock.clone());
		(repo, clock, pool)
	}

	#[test]
	fn test_job_status_roundtrip() {
		for status in [JobStatus::Waiting, JobStatus::Running, JobStatus::Paused] {
			assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
		}
		assert!("bogus".parse::<JobStatus>().is_err());
	}

	proptest! {
		#[test]
		fn only_known_status_names_parse(name in "[a-z_]{0,12}") {
			let known = ["waiting", "running", "paused"].contains(&name.as_str());
			prop_assert_eq!(name.parse::<JobStatus>().is_ok(), known);
		}
	}

	#[tokio::test]
	async fn test_preempt_empty_store_is_not_found() {
		let (repo, _, _) = setup().await;
		let result = repo.preempt().await;
		assert!(matches!(result, Err(DbError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_preempt_claims_due_waiting_job() {
		let (repo, _, _) = setup().await;
		let id = repo
			.insert(&new_job("ranking", start() - Duration::seconds(10)))
			.await
			.unwrap();

		let job = repo.preempt().await.unwrap();
		assert_eq!(job.id, id);
		assert_eq!(job.status, JobStatus::Running);
		assert_eq!(job.version, 1);

		let stored = repo.get(id).await.unwrap().unwrap();
		assert_eq!(stored.status, JobStatus::Running);
		assert_eq!(stored.version, 1);
		assert_eq!(stored.updated_at, start());
	}

	#[tokio::test]
	async fn test_preempt_skips_future_and_paused_jobs() {
		let (repo, _, _) = setup().await;
		repo
			.insert(&new_job("later", start() + Duration::minutes(5)))
			.await
			.unwrap();
		let paused = repo
			.insert(&new_job("paused", start() - Duration::minutes(5)))
			.await
			.unwrap();
		repo.set_status(paused, JobStatus::Paused).await.unwrap();

		assert!(repo.preempt().await.unwrap_err().is_not_found());
	}

	#[tokio::test]
	async fn test_running_job_is_not_claimed_twice() {
		let (repo, clock, _) = setup().await;
		repo
			.insert(&new_job("once", start() - Duration::seconds(1)))
			.await
			.unwrap();

		repo.preempt().await.unwrap();
		clock.advance(Duration::seconds(30));
		assert!(repo.preempt().await.unwrap_err().is_not_found());
	}

	#[tokio::test]
	async fn test_stale_running_job_is_reclaimed() {
		let (repo, clock, pool) = setup().await;
		let id = repo
			.insert(&new_job("stale", start() + Duration::hours(1)))
			.await
			.unwrap();

		// Running, last heartbeat 100s ago, threshold 90s.
		sqlx::query("UPDATE cron_jobs SET status = 'running', version = 4, updated_at = ? WHERE id = ?")
			.bind(to_millis(start() - Duration::seconds(100)))
			.bind(id)
			.execute(&pool)
			.await
			.unwrap();

		let job = repo.preempt().await.unwrap();
		assert_eq!(job.id, id);
		assert_eq!(job.version, 5);
		assert_eq!(job.updated_at, clock.now());
	}

	#[tokio::test]
	async fn test_heartbeat_keeps_running_job_claimed() {
		let (repo, clock, _) = setup().await;
		let id = repo
			.insert(&new_job("alive", start() - Duration::seconds(1)))
			.await
			.unwrap();
		repo.preempt().await.unwrap();

		clock.advance(Duration::seconds(60));
		repo.update_utime(id).await.unwrap();
		clock.advance(Duration::seconds(60));

		assert!(repo.preempt().await.unwrap_err().is_not_found());

		clock.advance(Duration::seconds(31));
		assert_eq!(repo.preempt().await.unwrap().id, id);
	}

	#[tokio::test]
	async fn test_release_and_reschedule() {
		let (repo, clock, _) = setup().await;
		let id = repo
			.insert(&new_job("cycle", start() - Duration::seconds(1)))
			.await
			.unwrap();
		repo.preempt().await.unwrap();

		let next = start() + Duration::minutes(5);
		repo.update_next_time(id, next).await.unwrap();
		repo.release(id).await.unwrap();

		let stored = repo.get(id).await.unwrap().unwrap();
		assert_eq!(stored.status, JobStatus::Waiting);
		assert_eq!(stored.next_run_at, next);
		assert!(repo.preempt().await.unwrap_err().is_not_found());

		clock.set(next);
		let job = repo.preempt().await.unwrap();
		assert_eq!(job.version, 2);
	}

	#[tokio::test]
	async fn test_mutations_on_missing_job_are_not_found() {
		let (repo, _, _) = setup().await;
		assert!(repo.release(42).await.unwrap_err().is_not_found());
		assert!(repo.update_utime(42).await.unwrap_err().is_not_found());
		assert!(repo
			.update_next_time(42, start())
			.await
			.unwrap_err()
			.is_not_found());
		assert!(repo
			.set_status(42, JobStatus::Paused)
			.await
			.unwrap_err()
			.is_not_found());
	}

	#[tokio::test]
	async fn test_duplicate_name_is_conflict() {
		let (repo, _, _) = setup().await;
		repo.insert(&new_job("dup", start())).await.unwrap();
		let result = repo.insert(&new_job("dup", start())).await;
		assert!(matches!(result, Err(DbError::Conflict(_))));

		let by_name = repo.get_by_name("dup").await.unwrap().unwrap();
		assert_eq!(by_name.status, JobStatus::Waiting);
		assert_eq!(by_name.version, 0);
	}

	#[tokio::test]
	async fn test_concurrent_preempt_claims_exactly_once() {
		let (repo, _, _) = setup().await;
		repo
			.insert(&new_job("contended", start() - Duration::seconds(1)))
			.await
			.unwrap();

		let repo = Arc::new(repo);
		let mut handles = Vec::new();
		for _ in 0..16 {
			let repo = Arc::clone(&repo);
			handles.push(tokio::spawn(async move { repo.preempt().await }));
		}

		let mut claimed = Vec::new();
		for handle in handles {
			match handle.await.unwrap() {
				Ok(job) => claimed.push(job),
				Err(e) => assert!(e.is_not_found(), "unexpected error: {e}"),
			}
		}

		assert_eq!(claimed.len(), 1);
		assert_eq!(claimed[0].version, 1);
	}

	#[tokio::test]
	async fn test_concurrent_preempt_spreads_over_eligible_rows() {
		let (repo, _, _) = setup().await;
		let mut ids = HashSet::new();
		for i in 0..8 {
			let id = repo
				.insert(&new_job(&format!("job-{i}"), start() - Duration::seconds(1)))
				.await
				.unwrap();
			ids.insert(id);
		}

		let repo = Arc::new(repo);
		let mut handles = Vec::new();
		for _ in 0..8 {
			let repo = Arc::clone(&repo);
			handles.push(tokio::spawn(async move { repo.preempt().await }));
		}

		// every racer that loses a row moves on to another one
		let mut claimed = HashSet::new();
		for handle in handles {
			let job = handle.await.unwrap().unwrap();
			assert_eq!(job.status, JobStatus::Running);
			assert!(claimed.insert(job.id), "job {} claimed twice", job.id);
		}
		assert_eq!(claimed, ids);
		assert!(repo.preempt().await.unwrap_err().is_not_found());
	}
}
