// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job store and dispatcher configuration section.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ranking::overlay;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JobsConfigLayer {
	pub heartbeat_interval_secs: Option<u64>,
	pub staleness_threshold_secs: Option<u64>,
	pub dispatch_interval_secs: Option<u64>,
	pub execution_timeout_secs: Option<u64>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		overlay!(
			self,
			other,
			heartbeat_interval_secs,
			staleness_threshold_secs,
			dispatch_interval_secs,
			execution_timeout_secs,
		);
	}

	pub fn finalize(self) -> JobsConfig {
		let d = JobsConfig::default();
		JobsConfig {
			heartbeat_interval_secs: self.heartbeat_interval_secs.unwrap_or(d.heartbeat_interval_secs),
			staleness_threshold_secs: self
				.staleness_threshold_secs
				.unwrap_or(d.staleness_threshold_secs),
			dispatch_interval_secs: self.dispatch_interval_secs.unwrap_or(d.dispatch_interval_secs),
			execution_timeout_secs: self.execution_timeout_secs.unwrap_or(d.execution_timeout_secs),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
	pub heartbeat_interval_secs: u64,
	/// A running job whose heartbeat is older than this may be reclaimed.
	pub staleness_threshold_secs: u64,
	pub dispatch_interval_secs: u64,
	pub execution_timeout_secs: u64,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			heartbeat_interval_secs: 60,
			staleness_threshold_secs: 90,
			dispatch_interval_secs: 1,
			execution_timeout_secs: 60,
		}
	}
}

impl JobsConfig {
	pub fn heartbeat_interval(&self) -> Duration {
		Duration::from_secs(self.heartbeat_interval_secs)
	}

	pub fn dispatch_interval(&self) -> Duration {
		Duration::from_secs(self.dispatch_interval_secs)
	}

	pub fn execution_timeout(&self) -> Duration {
		Duration::from_secs(self.execution_timeout_secs)
	}
}
