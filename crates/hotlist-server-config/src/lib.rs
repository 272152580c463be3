// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the hotlist server.
//!
//! This crate provides:
//! - Layered configuration from defaults, a TOML file and the environment
//! - Type-safe configuration with cross-field validation
//! - Consistent environment variable naming (`HOTLIST_<SECTION>_<FIELD>`)
//!
//! # Usage
//!
//! ```ignore
//! use hotlist_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("node {} ranks the top {}", config.node.id, config.ranking.top_n);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub node: NodeConfig,
	pub ranking: RankingConfig,
	pub jobs: JobsConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`HOTLIST_*`)
/// 2. Config file (`/etc/hotlist/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

pub fn load_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		node: layer.node.unwrap_or_default().finalize(),
		ranking: layer.ranking.unwrap_or_default().finalize(),
		jobs: layer.jobs.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		node_id = %config.node.id,
		database = %config.database.url,
		top_n = config.ranking.top_n,
		lock_key = %config.ranking.lock_key,
		tick_interval_secs = config.ranking.tick_interval_secs,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	let ranking = &config.ranking;
	let jobs = &config.jobs;

	if ranking.top_n == 0 {
		return Err(ConfigError::Validation("ranking.top_n must be at least 1".to_string()));
	}
	if ranking.batch_size == 0 {
		return Err(ConfigError::Validation(
			"ranking.batch_size must be at least 1".to_string(),
		));
	}
	if ranking.lock_ttl_secs == 0 {
		return Err(ConfigError::Validation(
			"ranking.lock_ttl_secs must be at least 1".to_string(),
		));
	}
	if ranking.tick_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"ranking.tick_interval_secs must be at least 1".to_string(),
		));
	}
	if ranking.monitor_interval_secs == 0 || ranking.monitor_interval() >= ranking.lock_ttl() {
		return Err(ConfigError::Validation(format!(
			"ranking.monitor_interval_secs ({}) must be between 1 and lock_ttl_secs ({})",
			ranking.monitor_interval_secs, ranking.lock_ttl_secs
		)));
	}
	if ranking.load_refresh_interval_secs == 0
		|| ranking.load_stale_after_secs <= ranking.load_refresh_interval_secs
	{
		return Err(ConfigError::Validation(format!(
			"ranking.load_stale_after_secs ({}) must exceed load_refresh_interval_secs ({})",
			ranking.load_stale_after_secs, ranking.load_refresh_interval_secs
		)));
	}
	if ranking.shared_cache_ttl_secs > ranking.local_cache_ttl_secs {
		return Err(ConfigError::Validation(format!(
			"ranking.shared_cache_ttl_secs ({}) must not exceed local_cache_ttl_secs ({})",
			ranking.shared_cache_ttl_secs, ranking.local_cache_ttl_secs
		)));
	}
	if jobs.heartbeat_interval_secs == 0 || jobs.staleness_threshold_secs <= jobs.heartbeat_interval_secs
	{
		return Err(ConfigError::Validation(format!(
			"jobs.staleness_threshold_secs ({}) must exceed heartbeat_interval_secs ({})",
			jobs.staleness_threshold_secs, jobs.heartbeat_interval_secs
		)));
	}

	Ok(())
}
