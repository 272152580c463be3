// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The ranking job: leader election by load, guarded by a renewed lease.
//!
//! Every node runs this job on the same timer. On each tick a node checks
//! whether it currently publishes the lowest load; only that node goes on to
//! take the ranking lock. While it holds the lock it recomputes the ranking
//! each tick, renews the lease in the background, and a monitor hands the
//! lock back as soon as another node becomes less loaded.
//!
//! Losing the lease never aborts a ranking pass that is already running.

use async_trait::async_trait;
use hotlist_core::{CancellationToken, PeriodicTask, Tick};
use hotlist_jobs::{JobError, ScheduledJob};
use hotlist_lock::{AcquireOptions, AutoRenew, LockError, LockService, LockToken, RenewOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{RankingError, Result};
use crate::load::{LoadRegistry, LoadReporter, LoadSource};
use crate::service::RankingService;

pub const RANKING_JOB_NAME: &str = "ranking";

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RankingJobConfig {
	pub lock_key: String,
	pub acquire: AcquireOptions,
	pub renew: RenewOptions,
	/// How often the leader re-checks that it is still least loaded.
	pub monitor_interval: Duration,
	pub load_refresh_interval: Duration,
	/// Bound on one ranking pass.
	pub topn_timeout: Duration,
}

impl Default for RankingJobConfig {
	fn default() -> Self {
		let acquire = AcquireOptions::default();
		Self {
			lock_key: "job:ranking".to_string(),
			renew: RenewOptions::for_ttl(acquire.ttl),
			topn_timeout: acquire.ttl,
			acquire,
			monitor_interval: Duration::from_secs(4),
			load_refresh_interval: Duration::from_secs(5),
		}
	}
}

pub struct RankingJobDeps {
	pub node_id: String,
	pub ranking: Arc<RankingService>,
	pub locks: Arc<dyn LockService>,
	pub registry: Arc<dyn LoadRegistry>,
	pub load: Arc<dyn LoadSource>,
}

/// Where this node stands in the election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderPhase {
	Idle,
	AwaitingLock,
	Leading,
}

struct Leadership {
	token: LockToken,
	renewal: AutoRenew,
	monitor: PeriodicTask,
}

enum ElectionState {
	Idle,
	AwaitingLock,
	Leading(Leadership),
}

impl ElectionState {
	fn phase(&self) -> LeaderPhase {
		match self {
			ElectionState::Idle => LeaderPhase::Idle,
			ElectionState::AwaitingLock => LeaderPhase::AwaitingLock,
			ElectionState::Leading(_) => LeaderPhase::Leading,
		}
	}

	/// Takes the leadership out if `owner` still holds it.
	fn take_if_owner(&mut self, owner: &str) -> Option<Leadership> {
		let held = matches!(self, ElectionState::Leading(l) if l.token.owner == owner);
		if held {
			self.take()
		} else {
			None
		}
	}

	fn take(&mut self) -> Option<Leadership> {
		match std::mem::replace(self, ElectionState::Idle) {
			ElectionState::Leading(l) => Some(l),
			_ => None,
		}
	}
}

struct Inner {
	node_id: String,
	ranking: Arc<RankingService>,
	locks: Arc<dyn LockService>,
	registry: Arc<dyn LoadRegistry>,
	config: RankingJobConfig,
	state: Mutex<ElectionState>,
	shutdown: CancellationToken,
	closed: AtomicBool,
}

pub struct RankingJob {
	inner: Arc<Inner>,
	reporter: LoadReporter,
}

impl RankingJob {
	/// Registers this node's load and starts republishing it.
	pub async fn start(deps: RankingJobDeps, config: RankingJobConfig) -> Result<Self> {
		let shutdown = CancellationToken::new();
		let reporter = LoadReporter::start(
			deps.node_id.clone(),
			Arc::clone(&deps.registry),
			deps.load,
			config.load_refresh_interval,
			&shutdown,
		)
		.await?;

		info!(node_id = %deps.node_id, lock_key = %config.lock_key, "ranking job started");
		Ok(Self {
			inner: Arc::new(Inner {
				node_id: deps.node_id,
				ranking: deps.ranking,
				locks: deps.locks,
				registry: deps.registry,
				config,
				state: Mutex::new(ElectionState::Idle),
				shutdown,
				closed: AtomicBool::new(false),
			}),
			reporter,
		})
	}

	pub fn node_id(&self) -> &str {
		&self.inner.node_id
	}

	pub async fn phase(&self) -> LeaderPhase {
		self.inner.state.lock().await.phase()
	}

	/// The lease this node currently holds, as of its last renewal.
	pub async fn current_token(&self) -> Option<LockToken> {
		match &*self.inner.state.lock().await {
			ElectionState::Leading(l) => Some(l.renewal.token()),
			_ => None,
		}
	}

	/// One election round followed, if leading, by a ranking pass.
	#[instrument(skip(self), fields(node_id = %self.inner.node_id))]
	pub async fn tick(&self) -> Result<()> {
		if self.inner.closed.load(Ordering::SeqCst) {
			return Ok(());
		}

		match self.inner.is_least_loaded().await {
			Ok(true) => {}
			Ok(false) => {
				debug!("not the least loaded node, skipping");
				return Ok(());
			}
			Err(e) => {
				warn!(error = %e, "cannot read load registry, skipping");
				return Ok(());
			}
		}

		if !Inner::ensure_leading(&self.inner).await {
			return Ok(());
		}

		let timeout = self.inner.config.topn_timeout;
		match tokio::time::timeout(timeout, self.inner.ranking.top_n()).await {
			Ok(Ok(snapshot)) => {
				debug!(count = snapshot.len(), "ranking pass finished");
				Ok(())
			}
			Ok(Err(RankingError::AlreadyRunning)) => {
				debug!("previous ranking pass still running");
				Ok(())
			}
			Ok(Err(e)) => Err(e),
			Err(_) => Err(RankingError::Timeout {
				what: "ranking pass",
				after: timeout,
			}),
		}
	}

	/// Stops background work, withdraws this node's load and releases the
	/// lock if held. Later calls do nothing.
	#[instrument(skip(self), fields(node_id = %self.inner.node_id))]
	pub async fn shutdown(&self) -> Result<()> {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		self.inner.shutdown.cancel();

		let leadership = self.inner.state.lock().await.take();
		self.reporter.stop().await;

		let mut result = Ok(());
		match tokio::time::timeout(CLEANUP_TIMEOUT, self.inner.registry.remove(&self.inner.node_id)).await {
			Ok(Ok(())) => {}
			Ok(Err(e)) => {
				error!(error = %e, "failed to withdraw load entry");
				result = Err(e);
			}
			Err(_) => error!("timed out withdrawing load entry"),
		}

		if let Some(leadership) = leadership {
			leadership.renewal.join().await;
			leadership.monitor.join().await;
			if let Err(e) = self.inner.release(&leadership.token).await {
				result = result.and(Err(e));
			}
		}

		info!("ranking job closed");
		result
	}
}

impl Inner {
	async fn is_least_loaded(&self) -> Result<bool> {
		Ok(self
			.registry
			.least_loaded()
			.await?
			.is_some_and(|entry| entry.node_id == self.node_id))
	}

	/// Makes sure this node holds the lock. Returns whether it does.
	async fn ensure_leading(this: &Arc<Self>) -> bool {
		{
			let mut state = this.state.lock().await;
			match *state {
				ElectionState::Leading(_) => return true,
				ElectionState::AwaitingLock => return false,
				ElectionState::Idle => *state = ElectionState::AwaitingLock,
			}
		}

		let acquired = this.locks.acquire(&this.config.lock_key, &this.config.acquire).await;

		let mut state = this.state.lock().await;
		let token = match acquired {
			Ok(token) => token,
			Err(LockError::Unavailable(reason)) => {
				info!(node_id = %this.node_id, %reason, "ranking lock unavailable");
				*state = ElectionState::Idle;
				return false;
			}
			Err(e) => {
				warn!(node_id = %this.node_id, error = %e, "failed to acquire ranking lock");
				*state = ElectionState::Idle;
				return false;
			}
		};

		if this.closed.load(Ordering::SeqCst) {
			*state = ElectionState::Idle;
			drop(state);
			let _ = this.release(&token).await;
			return false;
		}

		info!(node_id = %this.node_id, owner = %token.owner, "ranking lock acquired");
		*state = ElectionState::Leading(Leadership {
			renewal: Self::start_renewal(this, &token),
			monitor: Self::start_monitor(this, &token),
			token,
		});
		true
	}

	fn start_renewal(this: &Arc<Self>, token: &LockToken) -> AutoRenew {
		let weak = Arc::downgrade(this);
		let owner = token.owner.clone();
		AutoRenew::start(
			Arc::clone(&this.locks),
			token.clone(),
			this.config.renew,
			&this.shutdown,
			move |err| async move {
				if let Some(inner) = weak.upgrade() {
					inner.on_lease_lost(&owner, err).await;
				}
			},
		)
	}

	fn start_monitor(this: &Arc<Self>, token: &LockToken) -> PeriodicTask {
		let weak: Weak<Self> = Arc::downgrade(this);
		let owner = token.owner.clone();
		PeriodicTask::start(
			format!("leader-monitor:{}", this.node_id),
			this.config.monitor_interval,
			&this.shutdown,
			move || {
				let weak = weak.clone();
				let owner = owner.clone();
				async move {
					match weak.upgrade() {
						Some(inner) => inner.check_still_least_loaded(&owner).await,
						None => Tick::Stop,
					}
				}
			},
		)
	}

	/// Drops local ownership. The ranking pass in flight, if any, keeps
	/// running.
	async fn on_lease_lost(&self, owner: &str, err: LockError) {
		let lost = self.state.lock().await.take_if_owner(owner);
		if let Some(leadership) = lost {
			warn!(node_id = %self.node_id, error = %err, "ranking lease lost");
			leadership.monitor.stop();
		}
	}

	async fn check_still_least_loaded(&self, owner: &str) -> Tick {
		match self.is_least_loaded().await {
			Ok(true) => return Tick::Continue,
			Ok(false) => {}
			Err(e) => {
				warn!(node_id = %self.node_id, error = %e, "cannot read load registry, keeping lock");
				return Tick::Continue;
			}
		}

		let Some(leadership) = self.state.lock().await.take_if_owner(owner) else {
			return Tick::Stop;
		};
		leadership.renewal.stop();
		if self.release(&leadership.token).await.is_ok() {
			info!(node_id = %self.node_id, "no longer least loaded, released ranking lock");
		}
		Tick::Stop
	}

	async fn release(&self, token: &LockToken) -> Result<()> {
		match tokio::time::timeout(CLEANUP_TIMEOUT, self.locks.release(token)).await {
			Ok(Ok(())) => Ok(()),
			Ok(Err(LockError::NotHeld(_))) => {
				debug!(node_id = %self.node_id, "ranking lock already gone");
				Ok(())
			}
			Ok(Err(e)) => {
				error!(node_id = %self.node_id, error = %e, "failed to release ranking lock");
				Err(e.into())
			}
			Err(_) => {
				error!(node_id = %self.node_id, "timed out releasing ranking lock");
				Err(LockError::Timeout.into())
			}
		}
	}
}

#[async_trait]
impl ScheduledJob for RankingJob {
	fn name(&self) -> &str {
		RANKING_JOB_NAME
	}

	async fn run(&self) -> hotlist_jobs::Result<()> {
		self.tick().await.map_err(|e| match e {
			RankingError::Timeout { after, .. } => JobError::Timeout(after),
			other => JobError::failed(other.to_string()),
		})
	}

	async fn close(&self) -> hotlist_jobs::Result<()> {
		self
			.shutdown()
			.await
			.map_err(|e| JobError::failed(e.to_string()))
	}
}
