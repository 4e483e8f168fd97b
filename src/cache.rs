//! In-memory credential cache keyed by [`CacheKey`].
//!
//! Every mutation is a single operation under the write lock, so readers never observe a
//! partially written entry. Lookups only take the read lock; access times are tracked with
//! atomics.

// std
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{CacheKey, Credential, IdentityDescriptor},
};

/// Observable per-key lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
	/// No usable credential is cached.
	Absent,
	/// A credential is cached and outside the safety margin.
	Fresh,
	/// A credential is cached but expires within the safety margin.
	ExpiringSoon,
	/// A refresh is running for the key.
	Refreshing,
}

/// Snapshot of a cached credential and its bookkeeping.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	credential: Credential,
	refreshed_at: OffsetDateTime,
	last_accessed: OffsetDateTime,
	refreshing: bool,
}
impl CacheEntry {
	/// Cached credential.
	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Consumes the snapshot, returning the credential.
	pub fn into_credential(self) -> Credential {
		self.credential
	}

	/// When the credential was stored.
	pub fn refreshed_at(&self) -> OffsetDateTime {
		self.refreshed_at
	}

	/// Most recent lookup (or the store time when never read).
	pub fn last_accessed(&self) -> OffsetDateTime {
		self.last_accessed
	}

	/// Whether a refresh was running when the snapshot was taken.
	pub fn is_refreshing(&self) -> bool {
		self.refreshing
	}
}

struct Slot {
	credential: Credential,
	refreshed_at: OffsetDateTime,
	last_accessed_ms: AtomicI64,
	refreshing: AtomicBool,
}
impl Slot {
	fn new(credential: Credential, now: OffsetDateTime) -> Self {
		Self {
			credential,
			refreshed_at: now,
			last_accessed_ms: AtomicI64::new(unix_ms(now)),
			refreshing: AtomicBool::new(false),
		}
	}

	fn last_accessed(&self) -> OffsetDateTime {
		from_unix_ms(self.last_accessed_ms.load(Ordering::Relaxed)).unwrap_or(self.refreshed_at)
	}

	fn snapshot(&self) -> CacheEntry {
		CacheEntry {
			credential: self.credential.clone(),
			refreshed_at: self.refreshed_at,
			last_accessed: self.last_accessed(),
			refreshing: self.refreshing.load(Ordering::Acquire),
		}
	}
}

/// Thread-safe credential cache.
#[derive(Default)]
pub struct CredentialCache {
	entries: RwLock<HashMap<CacheKey, Slot>>,
}
impl CredentialCache {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the entry for `descriptor`, treating an expired entry as absent and removing it.
	pub fn get(&self, descriptor: &IdentityDescriptor) -> Option<CacheEntry> {
		self.get_at(descriptor, OffsetDateTime::now_utc())
	}

	/// [`CredentialCache::get`] evaluated at `now`.
	pub fn get_at(&self, descriptor: &IdentityDescriptor, now: OffsetDateTime) -> Option<CacheEntry> {
		let key = descriptor.cache_key();

		{
			let entries = self.entries.read();
			let slot = entries.get(&key)?;

			if !slot.credential.is_expired_at(now) {
				slot.last_accessed_ms.store(unix_ms(now), Ordering::Relaxed);

				return Some(slot.snapshot());
			}
		}

		let mut entries = self.entries.write();

		// Another writer may have replaced the entry between the two locks.
		match entries.get(&key) {
			Some(slot) if slot.credential.is_expired_at(now) => {
				entries.remove(&key);

				None
			},
			Some(slot) => {
				slot.last_accessed_ms.store(unix_ms(now), Ordering::Relaxed);

				Some(slot.snapshot())
			},
			None => None,
		}
	}

	/// Stores `credential` for `descriptor`, replacing any previous entry.
	pub fn put(&self, descriptor: &IdentityDescriptor, credential: Credential) {
		self.put_at(descriptor, credential, OffsetDateTime::now_utc());
	}

	/// [`CredentialCache::put`] recorded at `now`.
	pub fn put_at(&self, descriptor: &IdentityDescriptor, credential: Credential, now: OffsetDateTime) {
		self.entries.write().insert(descriptor.cache_key(), Slot::new(credential, now));
	}

	/// Removes the entry for `descriptor`; returns whether one existed.
	pub fn invalidate(&self, descriptor: &IdentityDescriptor) -> bool {
		self.entries.write().remove(&descriptor.cache_key()).is_some()
	}

	/// Returns `true` when the entry expires within `safety_margin` of now.
	pub fn is_expiring_soon(&self, entry: &CacheEntry, safety_margin: Duration) -> bool {
		entry.credential.expires_within(safety_margin, OffsetDateTime::now_utc())
	}

	/// Flags (or clears) an in-flight refresh on an existing entry; returns whether one existed.
	pub fn mark_refreshing(&self, descriptor: &IdentityDescriptor, refreshing: bool) -> bool {
		match self.entries.read().get(&descriptor.cache_key()) {
			Some(slot) => {
				slot.refreshing.store(refreshing, Ordering::Release);

				true
			},
			None => false,
		}
	}

	/// Lifecycle state of the key. Does not count as an access.
	pub fn state(&self, descriptor: &IdentityDescriptor, safety_margin: Duration) -> CredentialState {
		self.state_at(descriptor, safety_margin, OffsetDateTime::now_utc())
	}

	/// [`CredentialCache::state`] evaluated at `now`.
	pub fn state_at(
		&self,
		descriptor: &IdentityDescriptor,
		safety_margin: Duration,
		now: OffsetDateTime,
	) -> CredentialState {
		let entries = self.entries.read();

		match entries.get(&descriptor.cache_key()) {
			Some(slot) if slot.refreshing.load(Ordering::Acquire) => CredentialState::Refreshing,
			Some(slot) if slot.credential.is_expired_at(now) => CredentialState::Absent,
			Some(slot) if slot.credential.expires_within(safety_margin, now) =>
				CredentialState::ExpiringSoon,
			Some(_) => CredentialState::Fresh,
			None => CredentialState::Absent,
		}
	}

	/// Drops entries not accessed for `idle_period` as well as expired ones; returns how many.
	pub fn evict_idle(&self, idle_period: Duration) -> usize {
		self.evict_idle_at(idle_period, OffsetDateTime::now_utc())
	}

	/// [`CredentialCache::evict_idle`] evaluated at `now`.
	pub fn evict_idle_at(&self, idle_period: Duration, now: OffsetDateTime) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, slot| {
			!slot.credential.is_expired_at(now)
				&& (slot.refreshing.load(Ordering::Acquire) || now - slot.last_accessed() < idle_period)
		});

		before - entries.len()
	}

	/// Number of cached entries (expired ones included until touched).
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
impl Debug for CredentialCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialCache").field("len", &self.len()).finish()
	}
}

fn unix_ms(instant: OffsetDateTime) -> i64 {
	i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn from_unix_ms(ms: i64) -> Option<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}
