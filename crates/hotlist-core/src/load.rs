// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_LOAD_SCORE: u8 = 100;

/// A node's most recently published load score (0-100, lower is idler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadEntry {
	pub node_id: String,
	pub score: u8,
	pub as_of: DateTime<Utc>,
}
