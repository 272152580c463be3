// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schedule parsing and next run calculation for scheduled jobs.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{JobError, Result};

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// expected by the `cron` crate.
///
/// 5-field format: minute hour day-of-month month day-of-week
/// 7-field format: second minute hour day-of-month month day-of-week year
fn convert_to_cron_crate_format(expression: &str) -> String {
	match expression.split_whitespace().count() {
		5 => format!("0 {} *", expression.trim()),
		_ => expression.trim().to_string(),
	}
}

fn parse(expression: &str) -> Result<Schedule> {
	Schedule::from_str(&convert_to_cron_crate_format(expression))
		.map_err(|e| JobError::InvalidCronExpression(format!("{expression}: {e}")))
}

/// The first occurrence of `expression` strictly after `after`, in UTC.
pub fn next_occurrence(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
	parse(expression)?
		.after(&after)
		.next()
		.ok_or_else(|| JobError::InvalidCronExpression(format!("{expression}: no future occurrence")))
}

pub fn validate_cron_expression(expression: &str) -> Result<()> {
	parse(expression).map(|_| ())
}

/// When an in-process job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
	/// Every `Duration`, first run one period after start.
	Interval(Duration),
	/// On each occurrence of a cron expression (UTC).
	Cron(String),
}

impl JobSchedule {
	pub fn validate(&self) -> Result<()> {
		match self {
			JobSchedule::Interval(d) if d.is_zero() => {
				Err(JobError::Internal("interval must be non-zero".to_string()))
			}
			JobSchedule::Interval(_) => Ok(()),
			JobSchedule::Cron(expr) => validate_cron_expression(expr),
		}
	}

	/// How long to wait from `now` until the next run.
	pub fn next_delay(&self, now: DateTime<Utc>) -> Result<Duration> {
		match self {
			JobSchedule::Interval(d) => Ok(*d),
			JobSchedule::Cron(expr) => {
				let next = next_occurrence(expr, now)?;
				Ok((next - now).to_std().unwrap_or(Duration::ZERO))
			}
		}
	}
}
