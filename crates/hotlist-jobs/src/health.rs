// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JobHealthStatus {
	pub name: String,
	pub status: HealthState,
	pub last_run: Option<LastRunInfo>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunInfo {
	pub started_at: DateTime<Utc>,
	pub duration_ms: i64,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub jobs: Vec<JobHealthStatus>,
}

impl JobHealthStatus {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			status: HealthState::Healthy,
			last_run: None,
			consecutive_failures: 0,
		}
	}

	pub(crate) fn record(&mut self, started_at: DateTime<Utc>, error: Option<String>) {
		let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0);
		self.consecutive_failures = match error {
			Some(_) => self.consecutive_failures.saturating_add(1),
			None => 0,
		};
		self.status = determine_health_state(self.consecutive_failures);
		self.last_run = Some(LastRunInfo {
			started_at,
			duration_ms,
			error,
		});
	}
}

impl JobsHealthStatus {
	pub fn from_jobs(jobs: Vec<JobHealthStatus>) -> Self {
		let status = jobs
			.iter()
			.map(|j| j.status)
			.max()
			.unwrap_or(HealthState::Healthy);
		Self { status, jobs }
	}
}

pub(crate) fn determine_health_state(consecutive_failures: u32) -> HealthState {
	match consecutive_failures {
		0 => HealthState::Healthy,
		1..=2 => HealthState::Degraded,
		_ => HealthState::Unhealthy,
	}
}
