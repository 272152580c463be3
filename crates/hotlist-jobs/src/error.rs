// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
	#[error("job not found: {0}")]
	NotFound(String),

	#[error("job failed: {0}")]
	Failed(String),

	#[error("job timed out after {0:?}")]
	Timeout(Duration),

	#[error("invalid cron expression: {0}")]
	InvalidCronExpression(String),

	#[error("no executor registered for {0}")]
	UnknownExecutor(String),

	#[error("database error: {0}")]
	Database(#[from] hotlist_db::DbError),

	#[error("internal error: {0}")]
	Internal(String),
}

impl JobError {
	pub fn failed(message: impl Into<String>) -> Self {
		JobError::Failed(message.into())
	}

	/// True when the job store had nothing eligible to claim.
	pub fn is_nothing_to_claim(&self) -> bool {
		matches!(self, JobError::Database(e) if e.is_not_found())
	}
}
