// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for the hotlist scheduler.
//!
//! Owns the SQLite pool, the schema shared by every node, and the
//! optimistic-concurrency job store.

pub mod error;
pub mod job;
pub mod migrations;
pub mod pool;
pub mod testing;

pub use error::{DbError, Result};
pub use job::{
	JobRecord, JobRepository, JobStatus, JobStore, NewJob, DEFAULT_STALENESS_THRESHOLD_SECS,
};
pub use migrations::run_migrations;
pub use pool::create_pool;

use chrono::{DateTime, Utc};

/// Timestamps are stored as unix milliseconds so that range predicates
/// compare numerically.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
	ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
	DateTime::from_timestamp_millis(ms)
		.ok_or_else(|| DbError::Internal(format!("timestamp out of range: {ms}")))
}
