// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Utc;
use hotlist_core::{CancellationToken, Clock, SystemClock};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::health::{JobHealthStatus, JobsHealthStatus};
use crate::job::ScheduledJob;
use crate::schedule::JobSchedule;

struct RegisteredJob {
	job: Arc<dyn ScheduledJob>,
	schedule: JobSchedule,
	health: Arc<Mutex<JobHealthStatus>>,
}

/// Drives in-process jobs on their schedules.
///
/// One loop per job; a run that overruns its schedule delays the next one
/// rather than overlapping it.
pub struct JobRunner {
	jobs: Vec<RegisteredJob>,
	clock: Arc<dyn Clock>,
	shutdown: CancellationToken,
	handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl JobRunner {
	pub fn new() -> Self {
		Self {
			jobs: Vec::new(),
			clock: Arc::new(SystemClock),
			shutdown: CancellationToken::new(),
			handles: tokio::sync::Mutex::new(Vec::new()),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn register(&mut self, job: Arc<dyn ScheduledJob>, schedule: JobSchedule) -> Result<()> {
		schedule.validate()?;
		if self.jobs.iter().any(|r| r.job.name() == job.name()) {
			return Err(JobError::Internal(format!(
				"job already registered: {}",
				job.name()
			)));
		}

		let health = Arc::new(Mutex::new(JobHealthStatus::new(job.name())));
		self.jobs.push(RegisteredJob {
			job,
			schedule,
			health,
		});
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut handles = self.handles.lock().await;

		for registered in &self.jobs {
			let job = Arc::clone(&registered.job);
			let schedule = registered.schedule.clone();
			let health = Arc::clone(&registered.health);
			let clock = Arc::clone(&self.clock);
			let shutdown = self.shutdown.child_token();

			handles.push(tokio::spawn(async move {
				loop {
					let delay = match schedule.next_delay(clock.now()) {
						Ok(delay) => delay,
						Err(e) => {
							error!(job = %job.name(), error = %e, "cannot compute next run, stopping job");
							break;
						}
					};

					tokio::select! {
						_ = shutdown.cancelled() => {
							info!(job = %job.name(), "Shutting down scheduled job");
							break;
						}
						_ = tokio::time::sleep(delay) => {
							let _ = run_and_record(&job, &health).await;
						}
					}
				}
			}));
		}

		info!(job_count = handles.len(), "Job runner started");
		Ok(())
	}

	/// Runs `name` immediately, outside its schedule.
	#[instrument(skip(self))]
	pub async fn trigger(&self, name: &str) -> Result<()> {
		let registered = self
			.jobs
			.iter()
			.find(|r| r.job.name() == name)
			.ok_or_else(|| JobError::NotFound(name.to_string()))?;
		run_and_record(&registered.job, &registered.health).await
	}

	/// Stops every loop, waits for in-flight runs, then closes each job.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		self.shutdown.cancel();

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		for registered in &self.jobs {
			if let Err(e) = registered.job.close().await {
				error!(job = %registered.job.name(), error = %e, "failed to close job");
			}
		}
		info!("Job runner shut down");
	}

	pub fn job_names(&self) -> Vec<String> {
		self.jobs.iter().map(|r| r.job.name().to_string()).collect()
	}

	pub fn job_status(&self, name: &str) -> Option<JobHealthStatus> {
		self
			.jobs
			.iter()
			.find(|r| r.job.name() == name)
			.map(|r| r.health.lock().unwrap_or_else(|e| e.into_inner()).clone())
	}

	pub fn health_status(&self) -> JobsHealthStatus {
		JobsHealthStatus::from_jobs(
			self
				.jobs
				.iter()
				.map(|r| r.health.lock().unwrap_or_else(|e| e.into_inner()).clone())
				.collect(),
		)
	}
}

impl Default for JobRunner {
	fn default() -> Self {
		Self::new()
	}
}

async fn run_and_record(job: &Arc<dyn ScheduledJob>, health: &Mutex<JobHealthStatus>) -> Result<()> {
	let started_at = Utc::now();
	let result = job.run().await;

	if let Err(e) = &result {
		warn!(job = %job.name(), error = %e, "Job failed");
	}
	health
		.lock()
		.unwrap_or_else(|e| e.into_inner())
		.record(started_at, result.as_ref().err().map(ToString::to_string));
	result
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::health::HealthState;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
	use std::time::Duration;

	struct MockJob {
		name: String,
		runs: AtomicU32,
		closes: AtomicU32,
		fail: AtomicBool,
	}

	impl MockJob {
		fn new(name: &str) -> Arc<Self> {
			Arc::new(Self {
				name: name.to_string(),
				runs: AtomicU32::new(0),
				closes: AtomicU32::new(0),
				fail: AtomicBool::new(false),
			})
		}
	}

	#[async_trait]
	impl ScheduledJob for MockJob {
		fn name(&self) -> &str {
			&self.name
		}

		async fn run(&self) -> Result<()> {
			self.runs.fetch_add(1, Ordering::SeqCst);
			if self.fail.load(Ordering::SeqCst) {
				return Err(JobError::failed("mock failure"));
			}
			Ok(())
		}

		async fn close(&self) -> Result<()> {
			self.closes.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_register_rejects_duplicates_and_bad_schedules() {
		let mut runner = JobRunner::new();
		runner
			.register(MockJob::new("a"), JobSchedule::Interval(Duration::from_secs(1)))
			.unwrap();
		assert!(runner
			.register(MockJob::new("a"), JobSchedule::Interval(Duration::from_secs(1)))
			.is_err());
		assert!(runner
			.register(MockJob::new("b"), JobSchedule::Cron("nope".to_string()))
			.is_err());
		assert_eq!(runner.job_names(), vec!["a".to_string()]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_interval_job_runs_and_closes_on_shutdown() {
		let job = MockJob::new("ticker");
		let mut runner = JobRunner::new();
		runner
			.register(job.clone(), JobSchedule::Interval(Duration::from_secs(5)))
			.unwrap();
		runner.start().await.unwrap();

		tokio::time::sleep(Duration::from_millis(16_000)).await;
		assert_eq!(job.runs.load(Ordering::SeqCst), 3);

		runner.shutdown().await;
		assert_eq!(job.closes.load(Ordering::SeqCst), 1);

		tokio::time::sleep(Duration::from_secs(20)).await;
		assert_eq!(job.runs.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_trigger_unknown_job_is_not_found() {
		let runner = JobRunner::new();
		match runner.trigger("missing").await {
			Err(JobError::NotFound(name)) => assert_eq!(name, "missing"),
			other => panic!("expected NotFound, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_health_tracks_consecutive_failures() {
		let job = MockJob::new("flaky");
		let mut runner = JobRunner::new();
		runner
			.register(job.clone(), JobSchedule::Interval(Duration::from_secs(60)))
			.unwrap();

		job.fail.store(true, Ordering::SeqCst);
		let _ = runner.trigger("flaky").await;
		assert_eq!(runner.job_status("flaky").unwrap().status, HealthState::Degraded);

		let _ = runner.trigger("flaky").await;
		let _ = runner.trigger("flaky").await;
		assert_eq!(runner.health_status().status, HealthState::Unhealthy);

		job.fail.store(false, Ordering::SeqCst);
		runner.trigger("flaky").await.unwrap();
		let status = runner.job_status("flaky").unwrap();
		assert_eq!(status.status, HealthState::Healthy);
		assert_eq!(status.consecutive_failures, 0);
	}
}
