// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Thread-safe counters describing broker activity.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	delegations: AtomicU64,
	retries: AtomicU64,
	failures: AtomicU64,
	timeouts: AtomicU64,
}
impl BrokerMetrics {
	/// Requests served from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Requests that needed a refresh (started or joined).
	pub fn cache_misses(&self) -> u64 {
		self.cache_misses.load(Ordering::Relaxed)
	}

	/// Delegation attempts sent to the engine.
	pub fn delegations(&self) -> u64 {
		self.delegations.load(Ordering::Relaxed)
	}

	/// Retries scheduled after transient failures.
	pub fn retries(&self) -> u64 {
		self.retries.load(Ordering::Relaxed)
	}

	/// Refresh flights that ended in failure.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Callers that gave up waiting.
	pub fn timeouts(&self) -> u64 {
		self.timeouts.load(Ordering::Relaxed)
	}

	/// Point-in-time copy of every counter.
	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			cache_hits: self.cache_hits(),
			cache_misses: self.cache_misses(),
			delegations: self.delegations(),
			retries: self.retries(),
			failures: self.failures(),
			timeouts: self.timeouts(),
		}
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_miss(&self) {
		self.cache_misses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_delegation(&self) {
		self.delegations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_timeout(&self) {
		self.timeouts.fetch_add(1, Ordering::Relaxed);
	}
}

/// Copy of [`BrokerMetrics`] counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
	/// See [`BrokerMetrics::cache_hits`].
	pub cache_hits: u64,
	/// See [`BrokerMetrics::cache_misses`].
	pub cache_misses: u64,
	/// See [`BrokerMetrics::delegations`].
	pub delegations: u64,
	/// See [`BrokerMetrics::retries`].
	pub retries: u64,
	/// See [`BrokerMetrics::failures`].
	pub failures: u64,
	/// See [`BrokerMetrics::timeouts`].
	pub timeouts: u64,
}
