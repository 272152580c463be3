// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a periodic body wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
	Continue,
	Stop,
}

/// A background activity that runs on a fixed period until stopped.
///
/// The task is a child of the token it was started under: cancelling the
/// parent stops it too. A tick that is already running is allowed to
/// finish. Dropping the handle stops the task.
pub struct PeriodicTask {
	name: String,
	cancel: CancellationToken,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
	/// Starts the task. The first tick fires one `period` after start.
	pub fn start<F, Fut>(
		name: impl Into<String>,
		period: Duration,
		parent: &CancellationToken,
		mut body: F,
	) -> Self
	where
		F: FnMut() -> Fut + Send + 'static,
		Fut: Future<Output = Tick> + Send + 'static,
	{
		let name = name.into();
		let cancel = parent.child_token();
		let token = cancel.clone();
		let task_name = name.clone();

		let handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
			interval.tick().await;

			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					_ = interval.tick() => {
						if body().await == Tick::Stop {
							break;
						}
					}
				}
			}
			debug!(task = %task_name, "periodic task stopped");
		});

		Self {
			name,
			cancel,
			handle: Mutex::new(Some(handle)),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Signals the task to stop without waiting for it.
	pub fn stop(&self) {
		self.cancel.cancel();
	}

	/// Stops the task and waits for its loop to exit.
	pub async fn join(&self) {
		self.stop();
		let handle = self
			.handle
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.take();
		if let Some(handle) = handle {
			let _ = handle.await;
		}
	}

	pub fn is_finished(&self) -> bool {
		self
			.handle
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.as_ref()
			.map_or(true, |h| h.is_finished())
	}
}

impl Drop for PeriodicTask {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
