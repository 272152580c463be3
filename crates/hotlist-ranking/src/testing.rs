// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fixtures and hand-written collaborator fakes shared by this crate's tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotlist_core::{ArticleSummary, InteractionCounts, RankingSnapshot, ARTICLE_BIZ};
use hotlist_db::to_millis;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::RankingCache;
use crate::error::{RankingError, Result};
use crate::source::{ArticleSource, InteractionSource};

pub fn article_at(id: i64, updated_at: DateTime<Utc>) -> ArticleSummary {
	ArticleSummary {
		id,
		title: format!("article {id}"),
		content: format!("body of article {id} ").repeat(20),
		author_id: 1,
		created_at: updated_at,
		updated_at,
	}
}

pub async fn insert_article(pool: &SqlitePool, art: &ArticleSummary, status: i64) {
	sqlx::query(
		"INSERT INTO published_articles (id, title, content, author_id, status, created_at, updated_at)
		 VALUES (?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(art.id)
	.bind(&art.title)
	.bind(&art.content)
	.bind(art.author_id)
	.bind(status)
	.bind(to_millis(art.created_at))
	.bind(to_millis(art.updated_at))
	.execute(pool)
	.await
	.unwrap();
}

pub async fn insert_likes(pool: &SqlitePool, id: i64, likes: i64) {
	sqlx::query("INSERT INTO interactions (biz, biz_id, like_count) VALUES (?, ?, ?)")
		.bind(ARTICLE_BIZ)
		.bind(id)
		.bind(likes)
		.execute(pool)
		.await
		.unwrap();
}

/// Articles held in memory, served most recent first.
#[derive(Default)]
pub struct MemArticleSource {
	articles: Vec<ArticleSummary>,
	pub delay: Duration,
	pub fail: AtomicBool,
	pub calls: AtomicU32,
}

impl MemArticleSource {
	pub fn new(mut articles: Vec<ArticleSummary>) -> Self {
		articles.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
		Self {
			articles,
			..Default::default()
		}
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}
}

#[async_trait]
impl ArticleSource for MemArticleSource {
	async fn list_published(
		&self,
		start: DateTime<Utc>,
		offset: usize,
		limit: usize,
	) -> Result<Vec<ArticleSummary>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		if self.fail.load(Ordering::SeqCst) {
			return Err(RankingError::Source("article service unavailable".to_string()));
		}
		Ok(self
			.articles
			.iter()
			.filter(|a| a.updated_at < start)
			.skip(offset)
			.take(limit)
			.cloned()
			.collect())
	}
}

#[derive(Default)]
pub struct MemInteractionSource {
	likes: HashMap<i64, i64>,
	pub fail: AtomicBool,
}

impl MemInteractionSource {
	pub fn new(likes: impl IntoIterator<Item = (i64, i64)>) -> Self {
		Self {
			likes: likes.into_iter().collect(),
			..Default::default()
		}
	}
}

#[async_trait]
impl InteractionSource for MemInteractionSource {
	async fn get_counts_by_ids(
		&self,
		biz: &str,
		ids: &[i64],
	) -> Result<HashMap<i64, InteractionCounts>> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(RankingError::Source("interaction service unavailable".to_string()));
		}
		Ok(ids
			.iter()
			.filter_map(|id| {
				self.likes.get(id).map(|likes| {
					(
						*id,
						InteractionCounts {
							biz: biz.to_string(),
							biz_id: *id,
							like_count: *likes,
							..Default::default()
						},
					)
				})
			})
			.collect())
	}
}

/// A shared tier that can be switched off.
#[derive(Default)]
pub struct FlakySharedCache {
	snapshot: Mutex<Option<RankingSnapshot>>,
	pub down: AtomicBool,
}

impl FlakySharedCache {
	fn check(&self) -> Result<()> {
		if self.down.load(Ordering::SeqCst) {
			return Err(RankingError::Cache("shared cache unreachable".to_string()));
		}
		Ok(())
	}
}

#[async_trait]
impl RankingCache for FlakySharedCache {
	async fn set(&self, snapshot: &RankingSnapshot) -> Result<()> {
		self.check()?;
		*self.snapshot.lock().unwrap() = Some(snapshot.clone());
		Ok(())
	}

	async fn get(&self) -> Result<Option<RankingSnapshot>> {
		self.check()?;
		Ok(self.snapshot.lock().unwrap().clone())
	}
}
