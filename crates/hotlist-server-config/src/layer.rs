// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The partial, mergeable form of the whole server configuration.

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, JobsConfigLayer, LoggingConfigLayer, NodeConfigLayer, RankingConfigLayer,
};

/// One source's view of the configuration. Sections it does not mention
/// stay `None` and leave lower-precedence values alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub node: Option<NodeConfigLayer>,
	#[serde(default)]
	pub ranking: Option<RankingConfigLayer>,
	#[serde(default)]
	pub jobs: Option<JobsConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(base), Some(other)) => merge(base, other),
		(None, Some(other)) => *base = Some(other),
		(_, None) => {}
	}
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(&mut self.node, other.node, NodeConfigLayer::merge);
		merge_section(&mut self.ranking, other.ranking, RankingConfigLayer::merge);
		merge_section(&mut self.jobs, other.jobs, JobsConfigLayer::merge);
	}
}
