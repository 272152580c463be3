// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankingError>;

#[derive(Debug, Error)]
pub enum RankingError {
	/// A collaborator (article or interaction source) failed.
	#[error("source error: {0}")]
	Source(String),

	#[error("{what} timed out after {after:?}")]
	Timeout { what: &'static str, after: Duration },

	#[error("cache error: {0}")]
	Cache(String),

	/// `GetTopN` before this process or the shared tier ever saw a snapshot.
	#[error("no ranking snapshot available")]
	NoSnapshot,

	/// Another ranking pass is in flight on this node.
	#[error("ranking pass already running")]
	AlreadyRunning,

	#[error("lock error: {0}")]
	Lock(#[from] hotlist_lock::LockError),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("internal error: {0}")]
	Internal(String),
}

impl From<hotlist_db::DbError> for RankingError {
	fn from(e: hotlist_db::DbError) -> Self {
		match e {
			hotlist_db::DbError::Sqlx(e) => RankingError::Database(e),
			hotlist_db::DbError::Serialization(e) => RankingError::Serialization(e),
			other => RankingError::Internal(other.to_string()),
		}
	}
}
