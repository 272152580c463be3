// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wires one hotlist node together from its configuration.

use hotlist_core::CancellationToken;
use hotlist_db::{DbError, JobRepository, JobStore};
use hotlist_jobs::{
	CronJobService, JobDispatcher, JobError, JobRunner, JobSchedule, LocalFuncExecutor, ScheduledJob,
};
use hotlist_lock::{AcquireOptions, LockService, RenewOptions, RetryPolicy, SqliteLockService};
use hotlist_ranking::{
	LoadRegistry, LocalRankingCache, RandomLoad, RankingConfig, RankingError, RankingJob,
	RankingJobConfig, RankingJobDeps, RankingService, SqliteArticleSource, SqliteInteractionSource,
	SqliteLoadRegistry, SqliteRankingCache, TieredRankingRepository,
};
use hotlist_server_config::ServerConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Store-driven job that logs what the ranking tiers currently serve.
pub const REPORT_JOB_NAME: &str = "ranking-report";
const REPORT_JOB_EXPRESSION: &str = "* * * * *";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error(transparent)]
	Database(#[from] DbError),

	#[error(transparent)]
	Jobs(#[from] JobError),

	#[error(transparent)]
	Ranking(#[from] RankingError),
}

pub fn ranking_config(config: &ServerConfig) -> RankingConfig {
	let r = &config.ranking;
	RankingConfig {
		batch_size: r.batch_size,
		top_n: r.top_n,
		window: chrono::Duration::days(i64::from(r.window_days)),
		fetch_timeout: Duration::from_secs(r.fetch_timeout_secs),
	}
}

pub fn ranking_job_config(config: &ServerConfig) -> RankingJobConfig {
	let r = &config.ranking;
	RankingJobConfig {
		lock_key: r.lock_key.clone(),
		acquire: AcquireOptions {
			ttl: r.lock_ttl(),
			retry: match r.retry_max {
				0 => RetryPolicy::Never,
				max => RetryPolicy::FixedInterval {
					interval: Duration::from_millis(r.retry_interval_ms),
					max,
				},
			},
			attempt_timeout: Duration::from_millis(r.acquire_attempt_timeout_ms),
			overall_timeout: Duration::from_millis(r.acquire_timeout_ms),
		},
		renew: RenewOptions {
			interval: r.renew_interval(),
			..RenewOptions::for_ttl(r.lock_ttl())
		},
		monitor_interval: r.monitor_interval(),
		load_refresh_interval: r.load_refresh_interval(),
		topn_timeout: Duration::from_secs(r.topn_timeout_secs),
	}
}

/// A running node: the ranking job on its timer plus the job-store
/// dispatcher.
pub struct Node {
	node_id: String,
	ranking: Arc<RankingService>,
	runner: JobRunner,
	dispatcher: JoinHandle<()>,
	shutdown: CancellationToken,
}

impl Node {
	pub async fn start(config: &ServerConfig, pool: SqlitePool) -> Result<Self, ServerError> {
		let node_id = config.node.id.clone();
		let r = &config.ranking;

		let local = LocalRankingCache::new(Duration::from_secs(r.local_cache_ttl_secs));
		let shared = Arc::new(SqliteRankingCache::new(
			pool.clone(),
			Duration::from_secs(r.shared_cache_ttl_secs),
		));
		let repository =
			Arc::new(TieredRankingRepository::new(local, shared).with_abstract_len(r.abstract_len));
		let ranking = Arc::new(RankingService::new(
			Arc::new(SqliteArticleSource::new(pool.clone())),
			Arc::new(SqliteInteractionSource::new(pool.clone())),
			repository,
			ranking_config(config),
		));

		let locks: Arc<dyn LockService> = Arc::new(SqliteLockService::new(pool.clone()));
		let registry: Arc<dyn LoadRegistry> =
			Arc::new(SqliteLoadRegistry::new(pool.clone()).with_staleness(r.load_stale_after()));
		let job = RankingJob::start(
			RankingJobDeps {
				node_id: node_id.clone(),
				ranking: Arc::clone(&ranking),
				locks,
				registry,
				load: Arc::new(RandomLoad::new()),
			},
			ranking_job_config(config),
		)
		.await?;

		let mut runner = JobRunner::new();
		let job: Arc<dyn ScheduledJob> = Arc::new(job);
		runner.register(job, JobSchedule::Interval(r.tick_interval()))?;
		runner.start().await?;

		let store: Arc<dyn JobStore> = Arc::new(
			JobRepository::new(pool)
				.with_staleness_threshold(chrono::Duration::seconds(config.jobs.staleness_threshold_secs as i64)),
		);
		let service = Arc::new(
			CronJobService::new(store).with_heartbeat_interval(config.jobs.heartbeat_interval()),
		);
		seed_report_job(&service).await?;

		let mut dispatcher = JobDispatcher::new(Arc::clone(&service))
			.with_execution_timeout(config.jobs.execution_timeout())
			.with_idle_interval(config.jobs.dispatch_interval());
		dispatcher.register_executor(Arc::new(report_executor(Arc::clone(&ranking))));

		let shutdown = CancellationToken::new();
		let dispatcher = Arc::new(dispatcher).start(shutdown.clone());

		info!(%node_id, "node started");
		Ok(Self {
			node_id,
			ranking,
			runner,
			dispatcher,
			shutdown,
		})
	}

	pub fn node_id(&self) -> &str {
		&self.node_id
	}

	pub fn ranking(&self) -> &Arc<RankingService> {
		&self.ranking
	}

	pub fn runner(&self) -> &JobRunner {
		&self.runner
	}

	/// Stops the dispatcher, then the runner; the ranking job withdraws
	/// its load and releases the lock on close.
	pub async fn shutdown(self) {
		self.shutdown.cancel();
		if let Err(e) = self.dispatcher.await {
			warn!(error = %e, "dispatcher task panicked");
		}
		self.runner.shutdown().await;
		info!(node_id = %self.node_id, "node stopped");
	}
}

async fn seed_report_job(service: &CronJobService) -> Result<(), JobError> {
	if service.get_by_name(REPORT_JOB_NAME).await?.is_some() {
		return Ok(());
	}
	match service
		.add_job(REPORT_JOB_NAME, LocalFuncExecutor::NAME, REPORT_JOB_EXPRESSION, "{}")
		.await
	{
		Ok(_) => Ok(()),
		// another node seeded it first
		Err(JobError::Database(DbError::Conflict(_))) => Ok(()),
		Err(e) => Err(e),
	}
}

fn report_executor(ranking: Arc<RankingService>) -> LocalFuncExecutor {
	let mut executor = LocalFuncExecutor::new();
	executor.register(REPORT_JOB_NAME, move |job| {
		let ranking = Arc::clone(&ranking);
		async move {
			match ranking.get_top_n().await {
				Ok(snapshot) => info!(
					job_id = job.id,
					count = snapshot.len(),
					computed_at = %snapshot.computed_at,
					"serving ranking"
				),
				Err(RankingError::NoSnapshot) => info!(job_id = job.id, "no ranking computed yet"),
				Err(e) => return Err(JobError::failed(e.to_string())),
			}
			Ok(())
		}
	});
	executor
}
