// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use hotlist_core::RankingSnapshot;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::cache::{LocalRankingCache, RankingCache};
use crate::error::{RankingError, Result};

pub const DEFAULT_ABSTRACT_LEN: usize = 100;

/// The local tier in front of the shared one.
///
/// Reads prefer a fresh local copy, then the shared tier (backfilling
/// local), then whatever local last held. Once any snapshot has been
/// stored or fetched, reads never fail.
pub struct TieredRankingRepository {
	local: LocalRankingCache,
	shared: Arc<dyn RankingCache>,
	abstract_len: usize,
}

impl TieredRankingRepository {
	pub fn new(local: LocalRankingCache, shared: Arc<dyn RankingCache>) -> Self {
		Self {
			local,
			shared,
			abstract_len: DEFAULT_ABSTRACT_LEN,
		}
	}

	pub fn with_abstract_len(mut self, len: usize) -> Self {
		self.abstract_len = len;
		self
	}

	/// Replaces the snapshot in both tiers, bodies cut to abstracts.
	///
	/// The local tier is always updated; a shared-tier failure is returned.
	#[instrument(skip(self, snapshot), fields(count = snapshot.len()))]
	pub async fn replace_top_n(&self, snapshot: RankingSnapshot) -> Result<()> {
		let RankingSnapshot {
			articles,
			computed_at,
		} = snapshot;
		let articles = articles
			.into_iter()
			.map(|a| a.into_abstract(self.abstract_len))
			.collect();
		let snapshot = RankingSnapshot::new(articles, computed_at);

		self.local.store(snapshot.clone());
		self.shared.set(&snapshot).await.inspect_err(|e| {
			warn!(error = %e, "failed to write ranking to shared cache");
		})
	}

	#[instrument(skip(self))]
	pub async fn get_top_n(&self) -> Result<RankingSnapshot> {
		if let Some(snapshot) = self.local.load() {
			return Ok(snapshot);
		}

		match self.shared.get().await {
			Ok(Some(snapshot)) => {
				debug!("ranking served from shared cache");
				self.local.store(snapshot.clone());
				return Ok(snapshot);
			}
			Ok(None) => debug!("shared ranking cache miss"),
			Err(e) => warn!(error = %e, "shared ranking cache unavailable"),
		}

		self.local.force_get().ok_or(RankingError::NoSnapshot)
	}
}
