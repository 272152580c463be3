// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core domain types for the hotlist ranking scheduler.
//!
//! Shared by the storage, locking, job and ranking crates: article,
//! snapshot and load types, the injectable [`Clock`], and the
//! [`PeriodicTask`] primitive every background activity is built on.

pub mod article;
pub mod clock;
pub mod load;
pub mod snapshot;
pub mod task;

pub use article::{ArticleSummary, InteractionCounts, ARTICLE_BIZ};
pub use clock::{Clock, ManualClock, SystemClock};
pub use load::{LoadEntry, MAX_LOAD_SCORE};
pub use snapshot::RankingSnapshot;
pub use task::{PeriodicTask, Tick};

pub use tokio_util::sync::CancellationToken;
