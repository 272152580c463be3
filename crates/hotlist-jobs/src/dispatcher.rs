// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runs persisted jobs: claim, execute, reschedule, release.

use async_trait::async_trait;
use hotlist_core::CancellationToken;
use hotlist_db::JobRecord;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::preempt::CronJobService;

/// Runs a claimed job. Selected by the job's `executor` column.
#[async_trait]
pub trait Executor: Send + Sync {
	fn name(&self) -> &str;

	async fn exec(&self, job: &JobRecord) -> Result<()>;
}

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Arc<dyn Fn(JobRecord) -> JobFuture + Send + Sync>;

/// Runs in-process functions, looked up by job name.
#[derive(Default)]
pub struct LocalFuncExecutor {
	funcs: HashMap<String, JobFn>,
}

impl LocalFuncExecutor {
	pub const NAME: &'static str = "local";

	pub fn new() -> Self {
		Self::default()
	}

	pub fn register<F, Fut>(&mut self, job_name: impl Into<String>, func: F)
	where
		F: Fn(JobRecord) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		let func: JobFn = Arc::new(move |job| -> JobFuture { Box::pin(func(job)) });
		self.funcs.insert(job_name.into(), func);
	}
}

#[async_trait]
impl Executor for LocalFuncExecutor {
	fn name(&self) -> &str {
		Self::NAME
	}

	async fn exec(&self, job: &JobRecord) -> Result<()> {
		let func = self
			.funcs
			.get(&job.name)
			.ok_or_else(|| JobError::NotFound(format!("no local func for {}", job.name)))?;
		func(job.clone()).await
	}
}

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
	/// Nothing was due.
	Idle,
	/// A job ran (successfully or not) and was handed back.
	Ran { job_id: i64, ok: bool },
}

pub struct JobDispatcher {
	service: Arc<CronJobService>,
	executors: HashMap<String, Arc<dyn Executor>>,
	execution_timeout: Duration,
	idle_interval: Duration,
}

impl JobDispatcher {
	pub fn new(service: Arc<CronJobService>) -> Self {
		Self {
			service,
			executors: HashMap::new(),
			execution_timeout: Duration::from_secs(60),
			idle_interval: Duration::from_secs(1),
		}
	}

	pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
		self.execution_timeout = timeout;
		self
	}

	/// Sleep between polls when nothing is due.
	pub fn with_idle_interval(mut self, interval: Duration) -> Self {
		self.idle_interval = interval;
		self
	}

	pub fn register_executor(&mut self, executor: Arc<dyn Executor>) {
		self.executors.insert(executor.name().to_string(), executor);
	}

	/// Claims and runs at most one job.
	///
	/// A failed execution still reschedules the job; only store errors and
	/// unknown executors surface as `Err`.
	#[instrument(skip(self))]
	pub async fn run_once(&self) -> Result<Dispatch> {
		let claimed = match self.service.preempt().await {
			Ok(claimed) => claimed,
			Err(e) if e.is_nothing_to_claim() => return Ok(Dispatch::Idle),
			Err(e) => return Err(e),
		};
		let job = claimed.record().clone();

		let Some(executor) = self.executors.get(&job.executor).cloned() else {
			error!(job_id = job.id, executor = %job.executor, "no executor for job");
			// Rescheduled so the row does not stay first in line ahead of
			// every other due job.
			self.reschedule(&job).await;
			if let Err(e) = claimed.release().await {
				error!(job_id = job.id, error = %e, "failed to release job");
			}
			return Err(JobError::UnknownExecutor(job.executor));
		};

		let ok = match tokio::time::timeout(self.execution_timeout, executor.exec(&job)).await {
			Ok(Ok(())) => {
				info!(job_id = job.id, name = %job.name, "job executed");
				true
			}
			Ok(Err(e)) => {
				warn!(job_id = job.id, name = %job.name, error = %e, "job execution failed");
				false
			}
			Err(_) => {
				warn!(job_id = job.id, name = %job.name, timeout = ?self.execution_timeout, "job execution timed out");
				false
			}
		};

		self.reschedule(&job).await;
		claimed.release().await?;

		Ok(Dispatch::Ran { job_id: job.id, ok })
	}

	async fn reschedule(&self, job: &JobRecord) {
		if let Err(e) = self.service.reset_next_time(job).await {
			error!(job_id = job.id, error = %e, "failed to reschedule job");
		}
	}

	/// Dispatches until `shutdown` is cancelled.
	pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
		tokio::spawn(async move {
			info!("job dispatcher started");
			loop {
				let pause = match self.run_once().await {
					Ok(Dispatch::Ran { .. }) => Duration::ZERO,
					Ok(Dispatch::Idle) => self.idle_interval,
					Err(e) => {
						warn!(error = %e, "dispatch failed");
						self.idle_interval
					}
				};

				tokio::select! {
					_ = shutdown.cancelled() => break,
					_ = tokio::time::sleep(pause) => {}
				}
			}
			self.service.shutdown();
			debug!("job dispatcher stopped");
		})
	}
}
