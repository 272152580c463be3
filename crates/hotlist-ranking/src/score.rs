// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};

const GRAVITY: f64 = 1.5;

/// `(likes - 1) / (age_secs + 2)^1.5`.
///
/// Age is clamped at zero so that clock skew between writers cannot push
/// the base negative.
pub fn hot_score(like_count: i64, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
	let age_secs = ((now - updated_at).num_milliseconds() as f64 / 1000.0).max(0.0);
	(like_count - 1) as f64 / (age_secs + 2.0).powf(GRAVITY)
}
