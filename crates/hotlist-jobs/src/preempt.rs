// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Claiming persisted jobs and keeping claims alive while they run.

use chrono::{DateTime, Utc};
use hotlist_core::{CancellationToken, Clock, PeriodicTask, SystemClock, Tick};
use hotlist_db::{JobRecord, JobStatus, JobStore, NewJob};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::schedule::{next_occurrence, validate_cron_expression};

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

/// Job-store operations with claim heartbeating on top.
pub struct CronJobService {
	store: Arc<dyn JobStore>,
	clock: Arc<dyn Clock>,
	heartbeat_interval: Duration,
	shutdown: CancellationToken,
}

impl CronJobService {
	pub fn new(store: Arc<dyn JobStore>) -> Self {
		Self {
			store,
			clock: Arc::new(SystemClock),
			heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
			shutdown: CancellationToken::new(),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Must stay below the store's staleness threshold or live claims get
	/// reclaimed by other nodes.
	pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
		self.heartbeat_interval = interval;
		self
	}

	/// Claims one due job and starts heartbeating it.
	///
	/// Fails with a not-found database error when nothing is due; see
	/// [`JobError::is_nothing_to_claim`].
	#[instrument(skip(self))]
	pub async fn preempt(&self) -> Result<ClaimedJob> {
		let record = self.store.preempt().await?;
		let id = record.id;

		let store = Arc::clone(&self.store);
		let heartbeat = PeriodicTask::start(
			format!("heartbeat:{id}"),
			self.heartbeat_interval,
			&self.shutdown,
			move || {
				let store = Arc::clone(&store);
				async move {
					match store.update_utime(id).await {
						Ok(()) => Tick::Continue,
						Err(e) if e.is_not_found() => {
							warn!(job_id = id, "claimed job vanished, stopping heartbeat");
							Tick::Stop
						}
						Err(e) => {
							error!(job_id = id, error = %e, "job heartbeat failed");
							Tick::Continue
						}
					}
				}
			},
		);

		info!(job_id = id, name = %record.name, version = record.version, "job claimed");
		Ok(ClaimedJob {
			record,
			store: Arc::clone(&self.store),
			heartbeat,
		})
	}

	/// Moves `job` to the next occurrence of its cron expression.
	#[instrument(skip(self, job), fields(job_id = job.id))]
	pub async fn reset_next_time(&self, job: &JobRecord) -> Result<DateTime<Utc>> {
		let next = next_occurrence(&job.expression, self.clock.now())?;
		self.store.update_next_time(job.id, next).await?;
		debug!(next_run_at = %next, "job rescheduled");
		Ok(next)
	}

	/// Registers a job, first due at the next occurrence of its expression.
	#[instrument(skip(self, config))]
	pub async fn add_job(
		&self,
		name: &str,
		executor: &str,
		expression: &str,
		config: &str,
	) -> Result<i64> {
		validate_cron_expression(expression)?;
		let next_run_at = next_occurrence(expression, self.clock.now())?;
		let id = self
			.store
			.insert(&NewJob {
				name: name.to_string(),
				executor: executor.to_string(),
				expression: expression.to_string(),
				config: config.to_string(),
				next_run_at,
			})
			.await?;
		info!(job_id = id, %next_run_at, "job registered");
		Ok(id)
	}

	pub async fn get(&self, id: i64) -> Result<JobRecord> {
		self
			.store
			.get(id)
			.await?
			.ok_or_else(|| JobError::NotFound(id.to_string()))
	}

	pub async fn get_by_name(&self, name: &str) -> Result<Option<JobRecord>> {
		Ok(self.store.get_by_name(name).await?)
	}

	/// Paused jobs are never claimed.
	pub async fn pause(&self, id: i64) -> Result<()> {
		self.store.set_status(id, JobStatus::Paused).await?;
		info!(job_id = id, "job paused");
		Ok(())
	}

	pub async fn resume(&self, id: i64) -> Result<()> {
		self.store.set_status(id, JobStatus::Waiting).await?;
		info!(job_id = id, "job resumed");
		Ok(())
	}

	/// Stops every heartbeat started by this service.
	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}
}

/// A job this node holds. Heartbeats until [`ClaimedJob::release`].
///
/// Dropping without releasing stops the heartbeat and leaves the row
/// `Running`; another node reclaims it once it goes stale.
pub struct ClaimedJob {
	record: JobRecord,
	store: Arc<dyn JobStore>,
	heartbeat: PeriodicTask,
}

impl ClaimedJob {
	pub fn record(&self) -> &JobRecord {
		&self.record
	}

	/// Stops heartbeating and hands the job back to the store.
	pub async fn release(self) -> Result<()> {
		self.heartbeat.join().await;
		let id = self.record.id;

		match tokio::time::timeout(RELEASE_TIMEOUT, self.store.release(id)).await {
			Ok(Ok(())) => {
				debug!(job_id = id, "job released");
				Ok(())
			}
			Ok(Err(e)) => {
				error!(job_id = id, error = %e, "failed to release job");
				Err(e.into())
			}
			Err(_) => {
				error!(job_id = id, "timed out releasing job");
				Err(JobError::Timeout(RELEASE_TIMEOUT))
			}
		}
	}
}
