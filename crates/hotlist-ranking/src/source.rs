// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Where articles and their interaction counts come from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotlist_core::{ArticleSummary, InteractionCounts};
use hotlist_db::{from_millis, to_millis};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::error::{RankingError, Result};

pub const ARTICLE_STATUS_PUBLISHED: i64 = 2;

#[async_trait]
pub trait ArticleSource: Send + Sync {
	/// Published articles last updated before `start`, most recent first.
	/// A page shorter than `limit` means the source is exhausted.
	async fn list_published(
		&self,
		start: DateTime<Utc>,
		offset: usize,
		limit: usize,
	) -> Result<Vec<ArticleSummary>>;
}

#[async_trait]
pub trait InteractionSource: Send + Sync {
	/// Counts keyed by id. Ids without counts are omitted, never an error.
	async fn get_counts_by_ids(
		&self,
		biz: &str,
		ids: &[i64],
	) -> Result<HashMap<i64, InteractionCounts>>;
}

#[derive(Clone)]
pub struct SqliteArticleSource {
	pool: SqlitePool,
}

impl SqliteArticleSource {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
	id: i64,
	title: String,
	content: String,
	author_id: i64,
	created_at: i64,
	updated_at: i64,
}

impl TryFrom<ArticleRow> for ArticleSummary {
	type Error = RankingError;

	fn try_from(row: ArticleRow) -> Result<Self> {
		Ok(ArticleSummary {
			id: row.id,
			title: row.title,
			content: row.content,
			author_id: row.author_id,
			created_at: from_millis(row.created_at)?,
			updated_at: from_millis(row.updated_at)?,
		})
	}
}

#[async_trait]
impl ArticleSource for SqliteArticleSource {
	#[tracing::instrument(skip(self))]
	async fn list_published(
		&self,
		start: DateTime<Utc>,
		offset: usize,
		limit: usize,
	) -> Result<Vec<ArticleSummary>> {
		let rows = sqlx::query_as::<_, ArticleRow>(
			r#"
			SELECT id, title, content, author_id, created_at, updated_at
			FROM published_articles
			WHERE updated_at < ? AND status = ?
			ORDER BY updated_at DESC, id DESC
			LIMIT ? OFFSET ?
			"#,
		)
		.bind(to_millis(start))
		.bind(ARTICLE_STATUS_PUBLISHED)
		.bind(limit as i64)
		.bind(offset as i64)
		.fetch_all(&self.pool)
		.await
		.map_err(|e| RankingError::Source(format!("article query failed: {e}")))?;

		rows.into_iter().map(TryInto::try_into).collect()
	}
}

#[derive(Clone)]
pub struct SqliteInteractionSource {
	pool: SqlitePool,
}

impl SqliteInteractionSource {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
	biz: String,
	biz_id: i64,
	read_count: i64,
	like_count: i64,
	collect_count: i64,
}

#[async_trait]
impl InteractionSource for SqliteInteractionSource {
	#[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
	async fn get_counts_by_ids(
		&self,
		biz: &str,
		ids: &[i64],
	) -> Result<HashMap<i64, InteractionCounts>> {
		if ids.is_empty() {
			return Ok(HashMap::new());
		}

		let mut query = QueryBuilder::<Sqlite>::new(
			"SELECT biz, biz_id, read_count, like_count, collect_count FROM interactions WHERE biz = ",
		);
		query.push_bind(biz).push(" AND biz_id IN (");
		let mut separated = query.separated(", ");
		for id in ids {
			separated.push_bind(*id);
		}
		separated.push_unseparated(")");

		let rows: Vec<InteractionRow> = query
			.build_query_as()
			.fetch_all(&self.pool)
			.await
			.map_err(|e| RankingError::Source(format!("interaction query failed: {e}")))?;
		Ok(rows
			.into_iter()
			.map(|row| {
				(
					row.biz_id,
					InteractionCounts {
						biz: row.biz,
						biz_id: row.biz_id,
						read_count: row.read_count,
						like_count: row.like_count,
						collect_count: row.collect_count,
					},
				)
			})
			.collect())
	}
}
