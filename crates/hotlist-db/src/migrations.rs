// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema for the state shared between worker nodes.
//!
//! All statements are idempotent; every node runs them on startup.

use sqlx::SqlitePool;

use crate::error::Result;

const MIGRATIONS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS cron_jobs (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		name TEXT NOT NULL UNIQUE,
		executor TEXT NOT NULL,
		expression TEXT NOT NULL,
		config TEXT NOT NULL DEFAULT '',
		status TEXT NOT NULL,
		version INTEGER NOT NULL DEFAULT 0,
		next_run_at INTEGER NOT NULL,
		updated_at INTEGER NOT NULL,
		created_at INTEGER NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_cron_jobs_next_run_at ON cron_jobs(next_run_at)",
	r#"
	CREATE TABLE IF NOT EXISTS distributed_locks (
		lock_key TEXT PRIMARY KEY,
		owner TEXT NOT NULL,
		expires_at INTEGER NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS node_loads (
		node_id TEXT PRIMARY KEY,
		score INTEGER NOT NULL,
		as_of INTEGER NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_node_loads_score ON node_loads(score, node_id)",
	r#"
	CREATE TABLE IF NOT EXISTS ranking_cache (
		cache_key TEXT PRIMARY KEY,
		payload TEXT NOT NULL,
		expires_at INTEGER NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS published_articles (
		id INTEGER PRIMARY KEY,
		title TEXT NOT NULL,
		content TEXT NOT NULL,
		author_id INTEGER NOT NULL,
		status INTEGER NOT NULL,
		created_at INTEGER NOT NULL,
		updated_at INTEGER NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_published_articles_updated_at ON published_articles(status, updated_at)",
	r#"
	CREATE TABLE IF NOT EXISTS interactions (
		biz TEXT NOT NULL,
		biz_id INTEGER NOT NULL,
		read_count INTEGER NOT NULL DEFAULT 0,
		like_count INTEGER NOT NULL DEFAULT 0,
		collect_count INTEGER NOT NULL DEFAULT 0,
		PRIMARY KEY (biz, biz_id)
	)
	"#,
];

#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for statement in MIGRATIONS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(count = MIGRATIONS.len(), "migrations applied");
	Ok(())
}
