// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file, and environment
//! variables.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, JobsConfigLayer, LoggingConfigLayer, NodeConfigLayer, RankingConfigLayer,
};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/hotlist/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults live in each section's `finalize`, so this source
/// contributes an empty layer.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: HOTLIST_<SECTION>_<FIELD>, e.g. `HOTLIST_RANKING_TOP_N`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from(|name| std::env::var(name).ok())
	}
}

/// Reads the environment layer through `lookup`, so tests need not touch
/// the process environment.
pub(crate) fn load_from(
	lookup: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfigLayer, ConfigError> {
	let env = Env(lookup);
	Ok(ServerConfigLayer {
		database: Some(DatabaseConfigLayer {
			url: env.var("HOTLIST_DATABASE_URL"),
		}),
		logging: Some(LoggingConfigLayer {
			level: env.var("HOTLIST_LOGGING_LEVEL"),
			format: env.parse("HOTLIST_LOGGING_FORMAT")?,
		}),
		node: Some(NodeConfigLayer {
			id: env.var("HOTLIST_NODE_ID"),
		}),
		ranking: Some(RankingConfigLayer {
			batch_size: env.parse("HOTLIST_RANKING_BATCH_SIZE")?,
			top_n: env.parse("HOTLIST_RANKING_TOP_N")?,
			window_days: env.parse("HOTLIST_RANKING_WINDOW_DAYS")?,
			lock_key: env.var("HOTLIST_RANKING_LOCK_KEY"),
			lock_ttl_secs: env.parse("HOTLIST_RANKING_LOCK_TTL_SECS")?,
			acquire_timeout_ms: env.parse("HOTLIST_RANKING_ACQUIRE_TIMEOUT_MS")?,
			acquire_attempt_timeout_ms: env.parse("HOTLIST_RANKING_ACQUIRE_ATTEMPT_TIMEOUT_MS")?,
			retry_interval_ms: env.parse("HOTLIST_RANKING_RETRY_INTERVAL_MS")?,
			retry_max: env.parse("HOTLIST_RANKING_RETRY_MAX")?,
			topn_timeout_secs: env.parse("HOTLIST_RANKING_TOPN_TIMEOUT_SECS")?,
			fetch_timeout_secs: env.parse("HOTLIST_RANKING_FETCH_TIMEOUT_SECS")?,
			tick_interval_secs: env.parse("HOTLIST_RANKING_TICK_INTERVAL_SECS")?,
			monitor_interval_secs: env.parse("HOTLIST_RANKING_MONITOR_INTERVAL_SECS")?,
			load_refresh_interval_secs: env.parse("HOTLIST_RANKING_LOAD_REFRESH_INTERVAL_SECS")?,
			load_stale_after_secs: env.parse("HOTLIST_RANKING_LOAD_STALE_AFTER_SECS")?,
			local_cache_ttl_secs: env.parse("HOTLIST_RANKING_LOCAL_CACHE_TTL_SECS")?,
			shared_cache_ttl_secs: env.parse("HOTLIST_RANKING_SHARED_CACHE_TTL_SECS")?,
			abstract_len: env.parse("HOTLIST_RANKING_ABSTRACT_LEN")?,
		}),
		jobs: Some(JobsConfigLayer {
			heartbeat_interval_secs: env.parse("HOTLIST_JOBS_HEARTBEAT_INTERVAL_SECS")?,
			staleness_threshold_secs: env.parse("HOTLIST_JOBS_STALENESS_THRESHOLD_SECS")?,
			dispatch_interval_secs: env.parse("HOTLIST_JOBS_DISPATCH_INTERVAL_SECS")?,
			execution_timeout_secs: env.parse("HOTLIST_JOBS_EXECUTION_TIMEOUT_SECS")?,
		}),
	})
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.var(name) {
			Some(v) => v.trim().parse().map(Some).map_err(|e| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid value '{v}': {e}"),
			}),
			None => Ok(None),
		}
	}
}
