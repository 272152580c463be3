// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::Result;

/// A unit of work invoked on a timer by [`crate::JobRunner`].
///
/// `run` is called once per occurrence; calls for one job never overlap.
/// `close` is called once at shutdown but must tolerate repeated calls.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
	fn name(&self) -> &str;

	async fn run(&self) -> Result<()>;

	async fn close(&self) -> Result<()>;
}
