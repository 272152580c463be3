// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use hotlist_core::{CancellationToken, PeriodicTask, Tick};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::LockError;
use crate::lock::{LockService, LockToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewOptions {
	pub interval: Duration,
	pub ttl: Duration,
	/// Bound on each refresh call.
	pub timeout: Duration,
}

impl RenewOptions {
	/// Refreshes at half the lease, each call bounded by one second.
	pub fn for_ttl(ttl: Duration) -> Self {
		Self {
			interval: ttl / 2,
			ttl,
			timeout: Duration::from_secs(1),
		}
	}
}

/// Keeps a lease alive in the background.
///
/// The first failed or timed-out refresh ends renewal and hands the error
/// to the `on_lost` callback exactly once. Stopping renewal does not
/// release the lock.
pub struct AutoRenew {
	task: PeriodicTask,
	token: Arc<Mutex<LockToken>>,
}

impl AutoRenew {
	pub fn start<F, Fut>(
		locks: Arc<dyn LockService>,
		token: LockToken,
		opts: RenewOptions,
		parent: &CancellationToken,
		on_lost: F,
	) -> Self
	where
		F: FnOnce(LockError) -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let name = format!("renew:{}", token.key);
		let current = Arc::new(Mutex::new(token));
		let on_lost = Arc::new(Mutex::new(Some(on_lost)));

		let state = Arc::clone(&current);
		let task = PeriodicTask::start(name, opts.interval, parent, move || {
			let locks = Arc::clone(&locks);
			let state = Arc::clone(&state);
			let on_lost = Arc::clone(&on_lost);
			async move {
				let token = state.lock().unwrap_or_else(|e| e.into_inner()).clone();

				let err = match tokio::time::timeout(opts.timeout, locks.refresh(&token, opts.ttl)).await {
					Ok(Ok(renewed)) => {
						debug!(key = %renewed.key, expires_at = %renewed.expires_at, "lease renewed");
						*state.lock().unwrap_or_else(|e| e.into_inner()) = renewed;
						return Tick::Continue;
					}
					Ok(Err(e)) => e,
					Err(_) => LockError::Timeout,
				};

				warn!(key = %token.key, error = %err, "lease renewal failed, giving up");
				let callback = on_lost.lock().unwrap_or_else(|e| e.into_inner()).take();
				if let Some(callback) = callback {
					callback(err).await;
				}
				Tick::Stop
			}
		});

		Self {
			task,
			token: current,
		}
	}

	/// The token as of the last successful renewal.
	pub fn token(&self) -> LockToken {
		self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	pub fn stop(&self) {
		self.task.stop();
	}

	pub async fn join(&self) {
		self.task.join().await;
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}
