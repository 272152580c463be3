// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business key under which article interactions are counted.
pub const ARTICLE_BIZ: &str = "article";

/// A published article as seen by the ranking pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
	pub id: i64,
	pub title: String,
	pub content: String,
	pub author_id: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ArticleSummary {
	/// Returns at most `max_chars` characters of the content.
	pub fn abstract_text(&self, max_chars: usize) -> &str {
		match self.content.char_indices().nth(max_chars) {
			Some((idx, _)) => &self.content[..idx],
			None => &self.content,
		}
	}

	/// Replaces the content with its abstract, bounding the payload size.
	pub fn into_abstract(mut self, max_chars: usize) -> Self {
		let len = self.abstract_text(max_chars).len();
		self.content.truncate(len);
		self
	}
}

/// Interaction counters for one business object.
///
/// Unknown objects are represented by `InteractionCounts::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionCounts {
	pub biz: String,
	pub biz_id: i64,
	pub read_count: i64,
	pub like_count: i64,
	pub collect_count: i64,
}
