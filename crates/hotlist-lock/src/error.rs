// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
	/// Someone else holds the lock, or the acquisition deadline passed.
	/// Not fatal: callers skip this cycle.
	#[error("lock unavailable: {0}")]
	Unavailable(String),

	/// The token no longer owns the key (expired or taken over).
	#[error("lock not held: {0}")]
	NotHeld(String),

	#[error("lock operation timed out")]
	Timeout,

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("internal error: {0}")]
	Internal(String),
}

impl From<hotlist_db::DbError> for LockError {
	fn from(e: hotlist_db::DbError) -> Self {
		match e {
			hotlist_db::DbError::Sqlx(e) => LockError::Database(e),
			other => LockError::Internal(other.to_string()),
		}
	}
}
