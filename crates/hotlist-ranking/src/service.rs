// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use hotlist_core::{ArticleSummary, Clock, RankingSnapshot, SystemClock, ARTICLE_BIZ};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::bounded::BoundedTopN;
use crate::error::{RankingError, Result};
use crate::repository::TieredRankingRepository;
use crate::score::hot_score;
use crate::source::{ArticleSource, InteractionSource};

#[derive(Debug, Clone)]
pub struct RankingConfig {
	pub batch_size: usize,
	pub top_n: usize,
	/// Stop paging once a page reaches articles older than this.
	pub window: chrono::Duration,
	/// Bound on each page or count fetch.
	pub fetch_timeout: Duration,
}

impl Default for RankingConfig {
	fn default() -> Self {
		Self {
			batch_size: 100,
			top_n: 100,
			window: chrono::Duration::days(7),
			fetch_timeout: Duration::from_secs(3),
		}
	}
}

pub struct RankingService {
	articles: Arc<dyn ArticleSource>,
	interactions: Arc<dyn InteractionSource>,
	repository: Arc<TieredRankingRepository>,
	clock: Arc<dyn Clock>,
	config: RankingConfig,
	in_flight: Mutex<()>,
}

impl RankingService {
	pub fn new(
		articles: Arc<dyn ArticleSource>,
		interactions: Arc<dyn InteractionSource>,
		repository: Arc<TieredRankingRepository>,
		config: RankingConfig,
	) -> Self {
		Self {
			articles,
			interactions,
			repository,
			clock: Arc::new(SystemClock),
			config,
			in_flight: Mutex::new(()),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Recomputes the ranking and replaces the cached snapshot.
	///
	/// Fails with [`RankingError::AlreadyRunning`] if a pass is already in
	/// flight on this node. A failed fetch leaves the cache untouched.
	#[instrument(skip(self))]
	pub async fn top_n(&self) -> Result<RankingSnapshot> {
		let _pass = self.in_flight.try_lock().map_err(|_| RankingError::AlreadyRunning)?;

		let snapshot = self.compute().await?;
		self.repository.replace_top_n(snapshot.clone()).await?;
		info!(count = snapshot.len(), "ranking replaced");
		Ok(snapshot)
	}

	pub async fn get_top_n(&self) -> Result<RankingSnapshot> {
		self.repository.get_top_n().await
	}

	/// One streaming pass over recently published articles.
	pub async fn compute(&self) -> Result<RankingSnapshot> {
		let now = self.clock.now();
		let cutoff = now - self.config.window;
		let batch_size = self.config.batch_size;
		let mut top = BoundedTopN::new(self.config.top_n);
		let mut offset = 0usize;

		loop {
			let page = self
				.fetch("article page", self.articles.list_published(now, offset, batch_size))
				.await?;
			if page.is_empty() {
				break;
			}

			let ids: Vec<i64> = page.iter().map(|a| a.id).collect();
			let counts = self
				.fetch(
					"interaction counts",
					self.interactions.get_counts_by_ids(ARTICLE_BIZ, &ids),
				)
				.await?;

			let fetched = page.len();
			let reached_cutoff = page.last().is_some_and(|a| a.updated_at < cutoff);
			for article in page {
				let likes = counts.get(&article.id).map_or(0, |c| c.like_count);
				top.push(hot_score(likes, article.updated_at, now), article);
			}

			offset += fetched;
			debug!(offset, fetched, retained = top.len(), "ranked page");
			if fetched < batch_size || reached_cutoff {
				break;
			}
		}

		let articles: Vec<ArticleSummary> = top.into_sorted_desc();
		Ok(RankingSnapshot::new(articles, now))
	}

	async fn fetch<T>(
		&self,
		what: &'static str,
		fut: impl Future<Output = Result<T>>,
	) -> Result<T> {
		let after = self.config.fetch_timeout;
		tokio::time::timeout(after, fut)
			.await
			.map_err(|_| RankingError::Timeout { what, after })?
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::{LocalRankingCache, RankingCache, SqliteRankingCache};
	use crate::source::{SqliteArticleSource, SqliteInteractionSource, ARTICLE_STATUS_PUBLISHED};
	use crate::testing::*;
	use chrono::{DateTime, TimeZone, Utc};
	use hotlist_core::ManualClock;
	use hotlist_db::testing::create_test_pool;
	use std::sync::atomic::Ordering;

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 1, 19, 10, 0, 0).unwrap()
	}

	struct Fixture {
		service: Arc<RankingService>,
		articles: Arc<MemArticleSource>,
		interactions: Arc<MemInteractionSource>,
		shared: Arc<FlakySharedCache>,
	}

	fn fixture(
		articles: MemArticleSource,
		likes: Vec<(i64, i64)>,
		config: RankingConfig,
	) -> Fixture {
		let clock = Arc::new(ManualClock::new(now()));
		let articles = Arc::new(articles);
		let interactions = Arc::new(MemInteractionSource::new(likes));
		let shared = Arc::new(FlakySharedCache::default());
		let local = LocalRankingCache::new(Duration::from_secs(600)).with_clock(clock.clone());
		let repository = Arc::new(TieredRankingRepository::new(local, shared.clone()));
		let service = RankingService::new(articles.clone(), interactions.clone(), repository, config)
			.with_clock(clock);
		Fixture {
			service: Arc::new(service),
			articles,
			interactions,
			shared,
		}
	}

	fn minutes_ago(id: i64, minutes: i64) -> ArticleSummary {
		article_at(id, now() - chrono::Duration::minutes(minutes))
	}

	#[tokio::test]
	async fn test_ranks_by_score_and_truncates_to_n() {
		let articles = (1..=5).map(|id| minutes_ago(id, 10)).collect();
		let likes = vec![(1, 5), (2, 3), (3, 9), (4, 1), (5, 7)];
		let config = RankingConfig {
			top_n: 3,
			batch_size: 2,
			..Default::default()
		};
		let f = fixture(MemArticleSource::new(articles), likes, config);

		let snapshot = f.service.top_n().await.unwrap();
		assert_eq!(snapshot.ids(), vec![3, 5, 1]);
		assert_eq!(snapshot.computed_at, now());
		assert_eq!(f.service.get_top_n().await.unwrap().ids(), vec![3, 5, 1]);
	}

	#[tokio::test]
	async fn test_missing_counts_score_as_zero_likes() {
		let articles = vec![minutes_ago(1, 5), minutes_ago(2, 5)];
		let f = fixture(MemArticleSource::new(articles), vec![(2, 1)], RankingConfig::default());

		// 2 has one like (score 0), 1 has none (negative)
		assert_eq!(f.service.top_n().await.unwrap().ids(), vec![2, 1]);
	}

	#[tokio::test]
	async fn test_stops_paging_past_the_window() {
		let day = 24 * 60;
		let articles = vec![
			minutes_ago(1, 1),
			minutes_ago(2, 8 * day),
			minutes_ago(3, 9 * day),
			minutes_ago(4, 10 * day),
		];
		let config = RankingConfig {
			batch_size: 2,
			..Default::default()
		};
		let f = fixture(MemArticleSource::new(articles), vec![(1, 10)], config);

		let snapshot = f.service.top_n().await.unwrap();
		// the first page already reached the cutoff
		assert_eq!(f.articles.calls.load(Ordering::SeqCst), 1);
		assert_eq!(snapshot.ids(), vec![1, 2]);
	}

	#[tokio::test]
	async fn test_full_page_then_empty_page_terminates() {
		let articles = vec![minutes_ago(1, 1), minutes_ago(2, 2)];
		let config = RankingConfig {
			batch_size: 2,
			..Default::default()
		};
		let f = fixture(MemArticleSource::new(articles), vec![], config);

		let snapshot = f.service.top_n().await.unwrap();
		assert_eq!(f.articles.calls.load(Ordering::SeqCst), 2);
		assert_eq!(snapshot.len(), 2);
	}

	#[tokio::test]
	async fn test_fetch_error_keeps_last_good_snapshot() {
		let articles = vec![minutes_ago(1, 1)];
		let f = fixture(MemArticleSource::new(articles), vec![(1, 3)], RankingConfig::default());
		f.service.top_n().await.unwrap();

		f.interactions.fail.store(true, Ordering::SeqCst);
		assert!(matches!(f.service.top_n().await, Err(RankingError::Source(_))));
		assert_eq!(f.service.get_top_n().await.unwrap().ids(), vec![1]);

		f.interactions.fail.store(false, Ordering::SeqCst);
		f.articles.fail.store(true, Ordering::SeqCst);
		assert!(f.service.top_n().await.is_err());
		assert_eq!(f.shared.get().await.unwrap().unwrap().ids(), vec![1]);
	}

	#[tokio::test]
	async fn test_slow_page_times_out() {
		let articles = MemArticleSource::new(vec![minutes_ago(1, 1)]).with_delay(Duration::from_millis(200));
		let config = RankingConfig {
			fetch_timeout: Duration::from_millis(20),
			..Default::default()
		};
		let f = fixture(articles, vec![], config);

		let err = f.service.top_n().await.unwrap_err();
		assert!(matches!(err, RankingError::Timeout { what: "article page", .. }));
		assert!(matches!(f.service.get_top_n().await, Err(RankingError::NoSnapshot)));
	}

	#[tokio::test]
	async fn test_overlapping_pass_is_rejected() {
		let articles = MemArticleSource::new(vec![minutes_ago(1, 1)]).with_delay(Duration::from_millis(100));
		let f = fixture(articles, vec![], RankingConfig::default());

		let first = tokio::spawn({
			let service = f.service.clone();
			async move { service.top_n().await }
		});
		tokio::time::sleep(Duration::from_millis(20)).await;

		assert!(matches!(f.service.top_n().await, Err(RankingError::AlreadyRunning)));
		assert!(first.await.unwrap().is_ok());
		assert!(f.service.top_n().await.is_ok());
	}

	#[tokio::test]
	async fn test_end_to_end_over_sqlite() {
		let pool = create_test_pool().await;
		for (id, minutes, likes) in [(1, 60, 10), (2, 5, 10), (3, 30, 100)] {
			insert_article(&pool, &minutes_ago(id, minutes), ARTICLE_STATUS_PUBLISHED).await;
			insert_likes(&pool, id, likes).await;
		}

		let clock = Arc::new(ManualClock::new(now()));
		let shared = Arc::new(SqliteRankingCache::new(pool.clone(), Duration::from_secs(180)).with_clock(clock.clone()));
		let local = LocalRankingCache::new(Duration::from_secs(600)).with_clock(clock.clone());
		let repository = Arc::new(TieredRankingRepository::new(local, shared.clone()));
		let service = RankingService::new(
			Arc::new(SqliteArticleSource::new(pool.clone())),
			Arc::new(SqliteInteractionSource::new(pool)),
			repository,
			RankingConfig::default(),
		)
		.with_clock(clock);

		let snapshot = service.top_n().await.unwrap();
		// recency beats ten times the likes at half an hour's age difference
		assert_eq!(snapshot.ids(), vec![2, 3, 1]);
		assert_eq!(shared.get().await.unwrap().unwrap().ids(), vec![2, 3, 1]);
	}
}
