// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ranking, election and cache settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Copies every field that `other` sets onto `self`.
macro_rules! overlay {
	($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
		$(
			if $other.$field.is_some() {
				$self.$field = $other.$field;
			}
		)+
	};
}

pub(crate) use overlay;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingConfig {
	pub batch_size: usize,
	pub top_n: usize,
	pub window_days: u32,
	pub lock_key: String,
	pub lock_ttl_secs: u64,
	pub acquire_timeout_ms: u64,
	pub acquire_attempt_timeout_ms: u64,
	pub retry_interval_ms: u64,
	pub retry_max: u32,
	pub topn_timeout_secs: u64,
	pub fetch_timeout_secs: u64,
	pub tick_interval_secs: u64,
	pub monitor_interval_secs: u64,
	pub load_refresh_interval_secs: u64,
	pub load_stale_after_secs: u64,
	pub local_cache_ttl_secs: u64,
	pub shared_cache_ttl_secs: u64,
	pub abstract_len: usize,
}

impl Default for RankingConfig {
	fn default() -> Self {
		Self {
			batch_size: 100,
			top_n: 100,
			window_days: 7,
			lock_key: "job:ranking".to_string(),
			lock_ttl_secs: 15,
			acquire_timeout_ms: 4000,
			acquire_attempt_timeout_ms: 1000,
			retry_interval_ms: 100,
			retry_max: 3,
			topn_timeout_secs: 15,
			fetch_timeout_secs: 3,
			tick_interval_secs: 5,
			monitor_interval_secs: 4,
			load_refresh_interval_secs: 5,
			load_stale_after_secs: 15,
			local_cache_ttl_secs: 600,
			shared_cache_ttl_secs: 180,
			abstract_len: 100,
		}
	}
}

impl RankingConfig {
	pub fn lock_ttl(&self) -> Duration {
		Duration::from_secs(self.lock_ttl_secs)
	}

	/// Lease renewal cadence: half the lease.
	pub fn renew_interval(&self) -> Duration {
		self.lock_ttl() / 2
	}

	pub fn window(&self) -> Duration {
		Duration::from_secs(u64::from(self.window_days) * 24 * 60 * 60)
	}

	pub fn tick_interval(&self) -> Duration {
		Duration::from_secs(self.tick_interval_secs)
	}

	pub fn monitor_interval(&self) -> Duration {
		Duration::from_secs(self.monitor_interval_secs)
	}

	pub fn load_refresh_interval(&self) -> Duration {
		Duration::from_secs(self.load_refresh_interval_secs)
	}

	/// How long a load report counts before its node is presumed dead.
	pub fn load_stale_after(&self) -> Duration {
		Duration::from_secs(self.load_stale_after_secs)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankingConfigLayer {
	pub batch_size: Option<usize>,
	pub top_n: Option<usize>,
	pub window_days: Option<u32>,
	pub lock_key: Option<String>,
	pub lock_ttl_secs: Option<u64>,
	pub acquire_timeout_ms: Option<u64>,
	pub acquire_attempt_timeout_ms: Option<u64>,
	pub retry_interval_ms: Option<u64>,
	pub retry_max: Option<u32>,
	pub topn_timeout_secs: Option<u64>,
	pub fetch_timeout_secs: Option<u64>,
	pub tick_interval_secs: Option<u64>,
	pub monitor_interval_secs: Option<u64>,
	pub load_refresh_interval_secs: Option<u64>,
	pub load_stale_after_secs: Option<u64>,
	pub local_cache_ttl_secs: Option<u64>,
	pub shared_cache_ttl_secs: Option<u64>,
	pub abstract_len: Option<usize>,
}

impl RankingConfigLayer {
	pub fn merge(&mut self, other: RankingConfigLayer) {
		overlay!(
			self,
			other,
			batch_size,
			top_n,
			window_days,
			lock_key,
			lock_ttl_secs,
			acquire_timeout_ms,
			acquire_attempt_timeout_ms,
			retry_interval_ms,
			retry_max,
			topn_timeout_secs,
			fetch_timeout_secs,
			tick_interval_secs,
			monitor_interval_secs,
			load_refresh_interval_secs,
			load_stale_after_secs,
			local_cache_ttl_secs,
			shared_cache_ttl_secs,
			abstract_len,
		);
	}

	pub fn finalize(self) -> RankingConfig {
		let d = RankingConfig::default();
		RankingConfig {
			batch_size: self.batch_size.unwrap_or(d.batch_size),
			top_n: self.top_n.unwrap_or(d.top_n),
			window_days: self.window_days.unwrap_or(d.window_days),
			lock_key: self.lock_key.unwrap_or(d.lock_key),
			lock_ttl_secs: self.lock_ttl_secs.unwrap_or(d.lock_ttl_secs),
			acquire_timeout_ms: self.acquire_timeout_ms.unwrap_or(d.acquire_timeout_ms),
			acquire_attempt_timeout_ms: self
				.acquire_attempt_timeout_ms
				.unwrap_or(d.acquire_attempt_timeout_ms),
			retry_interval_ms: self.retry_interval_ms.unwrap_or(d.retry_interval_ms),
			retry_max: self.retry_max.unwrap_or(d.retry_max),
			topn_timeout_secs: self.topn_timeout_secs.unwrap_or(d.topn_timeout_secs),
			fetch_timeout_secs: self.fetch_timeout_secs.unwrap_or(d.fetch_timeout_secs),
			tick_interval_secs: self.tick_interval_secs.unwrap_or(d.tick_interval_secs),
			monitor_interval_secs: self.monitor_interval_secs.unwrap_or(d.monitor_interval_secs),
			load_refresh_interval_secs: self
				.load_refresh_interval_secs
				.unwrap_or(d.load_refresh_interval_secs),
			load_stale_after_secs: self.load_stale_after_secs.unwrap_or(d.load_stale_after_secs),
			local_cache_ttl_secs: self.local_cache_ttl_secs.unwrap_or(d.local_cache_ttl_secs),
			shared_cache_ttl_secs: self.shared_cache_ttl_secs.unwrap_or(d.shared_cache_ttl_secs),
			abstract_len: self.abstract_len.unwrap_or(d.abstract_len),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty_layer_gives_defaults() {
		let config = RankingConfigLayer::default().finalize();
		assert_eq!(config, RankingConfig::default());
		assert_eq!(config.lock_ttl(), Duration::from_secs(15));
		assert_eq!(config.renew_interval(), Duration::from_millis(7500));
		assert_eq!(config.window(), Duration::from_secs(7 * 86400));
		assert_eq!(config.load_stale_after(), Duration::from_secs(15));
	}

	#[test]
	fn test_partial_toml() {
		let layer: RankingConfigLayer = toml::from_str(
			r#"
top_n = 20
lock_key = "job:ranking:staging"
"#,
		)
		.unwrap();
		let config = layer.finalize();
		assert_eq!(config.top_n, 20);
		assert_eq!(config.lock_key, "job:ranking:staging");
		assert_eq!(config.batch_size, 100);
	}

	#[test]
	fn test_merge_only_overrides_set_fields() {
		let mut base = RankingConfigLayer {
			top_n: Some(50),
			retry_max: Some(5),
			..Default::default()
		};
		base.merge(RankingConfigLayer {
			retry_max: Some(0),
			..Default::default()
		});
		assert_eq!(base.top_n, Some(50));
		assert_eq!(base.retry_max, Some(0));
	}
}
