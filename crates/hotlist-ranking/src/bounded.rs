// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Scored<T> {
	score: f64,
	item: T,
}

impl<T> PartialEq for Scored<T> {
	fn eq(&self, other: &Self) -> bool {
		self.score.total_cmp(&other.score) == Ordering::Equal
	}
}

impl<T> Eq for Scored<T> {}

impl<T> PartialOrd for Scored<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<T> Ord for Scored<T> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.score.total_cmp(&other.score)
	}
}

/// Keeps the `capacity` highest-scoring items seen so far.
///
/// Backed by a min-heap: once full, a candidate replaces the current
/// minimum only if its score is strictly greater.
pub struct BoundedTopN<T> {
	capacity: usize,
	heap: BinaryHeap<Reverse<Scored<T>>>,
}

impl<T> BoundedTopN<T> {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			heap: BinaryHeap::with_capacity(capacity),
		}
	}

	/// Offers a candidate. Returns whether it was retained.
	pub fn push(&mut self, score: f64, item: T) -> bool {
		if self.heap.len() < self.capacity {
			self.heap.push(Reverse(Scored { score, item }));
			return true;
		}

		match self.heap.peek_mut() {
			Some(mut min) if score > min.0.score => {
				*min = Reverse(Scored { score, item });
				true
			}
			_ => false,
		}
	}

	pub fn len(&self) -> usize {
		self.heap.len()
	}

	pub fn is_empty(&self) -> bool {
		self.heap.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Lowest retained score.
	pub fn min_score(&self) -> Option<f64> {
		self.heap.peek().map(|min| min.0.score)
	}

	/// Retained items with their scores, highest score first.
	pub fn into_scored_desc(self) -> Vec<(f64, T)> {
		// ascending order of `Reverse` is descending score
		self
			.heap
			.into_sorted_vec()
			.into_iter()
			.map(|Reverse(s)| (s.score, s.item))
			.collect()
	}

	pub fn into_sorted_desc(self) -> Vec<T> {
		self.into_scored_desc().into_iter().map(|(_, item)| item).collect()
	}
}
