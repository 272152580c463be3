// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hot-article ranking.
//!
//! [`RankingService`] streams recently published articles page by page,
//! scores them against their like counts and keeps the best N in a
//! [`BoundedTopN`]. Results land in a [`TieredRankingRepository`] (a
//! process-local tier in front of a shared one). [`RankingJob`] makes sure
//! only the least loaded node in the cluster recomputes the ranking.

pub mod bounded;
pub mod cache;
pub mod error;
pub mod job;
pub mod load;
pub mod repository;
pub mod score;
pub mod service;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use bounded::BoundedTopN;
pub use cache::{LocalRankingCache, RankingCache, SqliteRankingCache};
pub use error::{RankingError, Result};
pub use job::{LeaderPhase, RankingJob, RankingJobConfig, RankingJobDeps, RANKING_JOB_NAME};
pub use load::{
	FixedLoad, LoadRegistry, LoadReporter, LoadSource, RandomLoad, SqliteLoadRegistry, DEFAULT_LOAD_STALE_AFTER,
};
pub use repository::TieredRankingRepository;
pub use score::hot_score;
pub use service::{RankingConfig, RankingService};
pub use source::{
	ArticleSource, InteractionSource, SqliteArticleSource, SqliteInteractionSource,
	ARTICLE_STATUS_PUBLISHED,
};
