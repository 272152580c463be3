// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::ArticleSummary;

/// The computed ranking, ordered by descending score.
///
/// Snapshots are only ever replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
	pub articles: Vec<ArticleSummary>,
	pub computed_at: DateTime<Utc>,
}

impl RankingSnapshot {
	pub fn new(articles: Vec<ArticleSummary>, computed_at: DateTime<Utc>) -> Self {
		Self {
			articles,
			computed_at,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.articles.is_empty()
	}

	pub fn len(&self) -> usize {
		self.articles.len()
	}

	pub fn ids(&self) -> Vec<i64> {
		self.articles.iter().map(|a| a.id).collect()
	}
}
