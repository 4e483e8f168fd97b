//! Broker facade: the single entry point consumers call.
//!
//! [`Broker::get_credential`] serves a cached credential when one is comfortably valid and
//! otherwise joins (or starts) the single refresh flight for the descriptor's key. The flight
//! acquires a source credential, delegates, and retries transient failures with jittered
//! exponential backoff before updating the cache. Callers waiting with a timeout stop waiting
//! without cancelling the flight.

mod metrics;
mod retry;

pub use metrics::*;
pub use retry::*;

// self
use crate::{
	_prelude::*,
	auth::{Credential, IdentityDescriptor, PrincipalId, ScopeSet},
	cache::{CredentialCache, CredentialState},
	config::BrokerConfig,
	coordinator::{Flight, RefreshCoordinator, RefreshFailed},
	delegation::{DelegationEngine, DelegationError, validate_descriptor},
	error::{BrokerError, ConfigError, ErrorKind},
	obs::{self, BrokerSpan, Outcome, Stage},
	source::CredentialSource,
};

// Upper bound between opportunistic eviction sweeps.
const EVICTION_INTERVAL: Duration = Duration::minutes(1);

/// Credential broker facade. Cheap to clone; clones share the cache and flights.
#[derive(Clone)]
pub struct Broker {
	inner: Arc<BrokerInner>,
}
impl Broker {
	/// Builds a broker over `source` and `engine`.
	pub fn new<S, E>(source: S, engine: E, config: BrokerConfig) -> Result<Self, ConfigError>
	where
		S: 'static + CredentialSource,
		E: 'static + DelegationEngine,
	{
		config.validate()?;

		Ok(Self {
			inner: Arc::new(BrokerInner {
				source: Arc::new(source),
				engine: Arc::new(engine),
				cache: CredentialCache::new(),
				coordinator: RefreshCoordinator::new(),
				metrics: BrokerMetrics::default(),
				last_eviction: Mutex::new(OffsetDateTime::now_utc()),
				config,
			}),
		})
	}

	/// Returns a credential for `descriptor` that expires strictly after now plus the safety
	/// margin, waiting at most the configured default timeout.
	pub async fn get_credential(
		&self,
		descriptor: &IdentityDescriptor,
	) -> Result<Credential, BrokerError> {
		self.get_credential_with_timeout(descriptor, self.inner.config.wait_timeout()).await
	}

	/// [`Broker::get_credential`] with an explicit wait bound (`None` waits for the flight).
	pub async fn get_credential_with_timeout(
		&self,
		descriptor: &IdentityDescriptor,
		timeout: Option<Duration>,
	) -> Result<Credential, BrokerError> {
		let span = BrokerSpan::new(Stage::Request, descriptor.principal());

		span.instrument(self.inner.serve(descriptor, timeout)).await
	}

	/// Builds a descriptor from raw consumer input and requests a credential for it.
	pub async fn request<I, T>(
		&self,
		principal: &str,
		scopes: I,
		lifetime_seconds: i64,
	) -> Result<Credential, BrokerError>
	where
		I: IntoIterator<Item = T>,
		T: Into<String>,
	{
		let principal = PrincipalId::new(principal).map_err(|e| invalid_input(e.to_string()))?;
		let scopes = ScopeSet::new(scopes).map_err(|e| invalid_input(e.to_string()))?;
		let descriptor = IdentityDescriptor::with_lifetime_secs(principal, scopes, lifetime_seconds);

		self.get_credential(&descriptor).await
	}

	/// Drops the cached credential for `descriptor`; returns whether one existed.
	pub fn invalidate(&self, descriptor: &IdentityDescriptor) -> bool {
		self.inner.cache.invalidate(descriptor)
	}

	/// Evicts entries idle longer than the configured period; returns how many were dropped.
	pub fn evict_idle(&self) -> usize {
		let evicted = self.inner.cache.evict_idle(self.inner.config.idle_eviction());

		*self.inner.last_eviction.lock() = OffsetDateTime::now_utc();
		obs::entries_evicted(evicted);

		evicted
	}

	/// Lifecycle state of `descriptor`'s key.
	pub fn state(&self, descriptor: &IdentityDescriptor) -> CredentialState {
		if self.inner.coordinator.in_flight(descriptor) {
			return CredentialState::Refreshing;
		}

		self.inner.cache.state_at(
			descriptor,
			self.inner.config.safety_margin(),
			OffsetDateTime::now_utc(),
		)
	}

	/// Activity counters.
	pub fn metrics(&self) -> &BrokerMetrics {
		&self.inner.metrics
	}

	/// Configuration the broker was built with.
	pub fn config(&self) -> &BrokerConfig {
		&self.inner.config
	}

	/// Number of refresh flights currently running.
	pub fn in_flight_count(&self) -> usize {
		self.inner.coordinator.in_flight_count()
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("source", self.inner.source.id())
			.field("cache", &self.inner.cache)
			.field("coordinator", &self.inner.coordinator)
			.field("config", &self.inner.config)
			.finish()
	}
}

struct BrokerInner {
	source: Arc<dyn CredentialSource>,
	engine: Arc<dyn DelegationEngine>,
	cache: CredentialCache,
	coordinator: RefreshCoordinator,
	config: BrokerConfig,
	metrics: BrokerMetrics,
	last_eviction: Mutex<OffsetDateTime>,
}
impl BrokerInner {
	async fn serve(
		self: &Arc<Self>,
		descriptor: &IdentityDescriptor,
		timeout: Option<Duration>,
	) -> Result<Credential, BrokerError> {
		obs::record_outcome(Stage::Request, Outcome::Attempt);

		let now = OffsetDateTime::now_utc();

		self.maybe_evict(now);

		let result = self.serve_inner(descriptor, timeout, now).await;

		obs::record_outcome(
			Stage::Request,
			if result.is_ok() { Outcome::Success } else { Outcome::Failure },
		);

		result
	}

	async fn serve_inner(
		self: &Arc<Self>,
		descriptor: &IdentityDescriptor,
		timeout: Option<Duration>,
		now: OffsetDateTime,
	) -> Result<Credential, BrokerError> {
		let margin = self.config.safety_margin();

		self.validate(descriptor)?;

		if let Some(entry) = self.cache.get_at(descriptor, now) {
			if !entry.credential().expires_within(margin, now) {
				self.metrics.record_cache_hit();
				obs::record_outcome(Stage::Request, Outcome::CacheHit);

				return Ok(entry.into_credential());
			}
		}

		self.metrics.record_cache_miss();

		let flight = self.refresh(descriptor);
		let outcome = match timeout {
			None => flight.await,
			Some(limit) => {
				let limit = std::time::Duration::try_from(limit).unwrap_or_default();

				match tokio::time::timeout(limit, flight).await {
					Ok(outcome) => outcome,
					Err(_) => {
						self.metrics.record_timeout();

						return Err(BrokerError::new(ErrorKind::Timeout, Some(descriptor.clone())));
					},
				}
			},
		};

		outcome.map_err(|failed| failed.into_broker_error(descriptor))
	}

	fn validate(&self, descriptor: &IdentityDescriptor) -> Result<(), BrokerError> {
		let check = validate_descriptor(descriptor).and_then(|()| {
			if descriptor.lifetime() <= self.config.safety_margin() {
				Err(DelegationError::invalid("lifetime must exceed the safety margin"))
			} else {
				Ok(())
			}
		});

		check.map_err(|cause| {
			BrokerError::new(cause.kind(), Some(descriptor.clone())).with_cause(cause)
		})
	}

	fn refresh(self: &Arc<Self>, descriptor: &IdentityDescriptor) -> Flight {
		let inner = Arc::clone(self);
		let target = descriptor.clone();

		self.coordinator.ensure_fresh(descriptor, move || async move {
			let span = BrokerSpan::new(Stage::Refresh, target.principal());

			span.instrument(inner.run_refresh(target)).await
		})
	}

	async fn run_refresh(&self, descriptor: IdentityDescriptor) -> Result<Credential, RefreshFailed> {
		let margin = self.config.safety_margin();

		// A flight that finished just before this one started may already have refreshed the key.
		if let Some(entry) = self.cache.get(&descriptor) {
			if !entry.credential().expires_within(margin, OffsetDateTime::now_utc()) {
				return Ok(entry.into_credential());
			}
		}

		// Only the running flight flags the entry; `put` and `invalidate` both clear it.
		self.cache.mark_refreshing(&descriptor, true);
		obs::record_outcome(Stage::Refresh, Outcome::Attempt);

		let key = descriptor.cache_key();
		let backoff = Backoff::new(self.config.backoff_base(), self.config.backoff_cap());
		let mut attempt = 0;

		loop {
			attempt += 1;

			match self.attempt(&descriptor, margin).await {
				Ok(credential) => {
					self.cache.put(&descriptor, credential.clone());
					obs::credential_issued(&credential, attempt);
					obs::record_outcome(Stage::Refresh, Outcome::Success);

					return Ok(credential);
				},
				Err(cause) if cause.is_retryable() && attempt <= self.config.max_retries() => {
					let delay = backoff.delay(attempt, cause.retry_after());

					self.metrics.record_retry();
					obs::retry_scheduled(&key, attempt, delay);
					tokio::time::sleep(std::time::Duration::try_from(delay).unwrap_or_default())
						.await;
				},
				Err(cause) => {
					self.cache.invalidate(&descriptor);
					self.metrics.record_failure();
					obs::refresh_failed(&key, cause.kind(), attempt);
					obs::record_outcome(Stage::Refresh, Outcome::Failure);

					return Err(RefreshFailed::new(cause, attempt));
				},
			}
		}
	}

	async fn attempt(
		&self,
		descriptor: &IdentityDescriptor,
		margin: Duration,
	) -> Result<Credential, DelegationError> {
		let span = BrokerSpan::new(Stage::Acquire, descriptor.principal());
		let source = span.instrument(self.source.acquire()).await;

		obs::record_outcome(
			Stage::Acquire,
			if source.is_ok() { Outcome::Success } else { Outcome::Failure },
		);

		let source = source?;

		self.metrics.record_delegation();

		let credential = self.engine.delegate(&source, descriptor).await?;

		if credential.expires_within(margin, OffsetDateTime::now_utc()) {
			return Err(DelegationError::unavailable(
				"issued credential expires within the safety margin",
			));
		}

		Ok(credential)
	}

	fn maybe_evict(&self, now: OffsetDateTime) {
		let idle = self.config.idle_eviction();
		let interval = if idle < EVICTION_INTERVAL { idle } else { EVICTION_INTERVAL };
		let Some(mut last) = self.last_eviction.try_lock() else {
			return;
		};

		if now - *last < interval {
			return;
		}

		*last = now;

		drop(last);
		obs::entries_evicted(self.cache.evict_idle_at(idle, now));
	}
}

fn invalid_input(reason: String) -> BrokerError {
	let cause = DelegationError::RequestInvalid { reason };

	BrokerError::new(ErrorKind::DelegationRequestInvalid, None).with_cause(cause)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::SourceId,
		delegation::DelegationFuture,
		source::{SourceCredential, StaticSource},
	};

	struct UnreachableEngine;
	impl DelegationEngine for UnreachableEngine {
		fn delegate<'a>(
			&'a self,
			_: &'a SourceCredential,
			_: &'a IdentityDescriptor,
		) -> DelegationFuture<'a> {
			Box::pin(async { Err(DelegationError::invalid("engine should not be called")) })
		}
	}

	fn descriptor() -> IdentityDescriptor {
		IdentityDescriptor::with_lifetime_secs(
			PrincipalId::new("svc-a@x").expect("Principal fixture should be valid."),
			ScopeSet::new(["scope1"]).expect("Scope fixture should be valid."),
			3600,
		)
	}

	fn credential(descriptor: &IdentityDescriptor, token: &str) -> Credential {
		Credential::builder(descriptor.clone())
			.token(token)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Credential fixture should build.")
	}

	#[tokio::test]
	async fn joining_a_finishing_flight_leaves_the_entry_unflagged() {
		let broker = Broker::new(
			StaticSource::new(SourceId::new("static").expect("Source fixture should be valid."), "base"),
			UnreachableEngine,
			BrokerConfig::default(),
		)
		.expect("Broker should build.");
		let inner = &broker.inner;
		let key = descriptor();
		let (release, mut released) = tokio::sync::watch::channel(false);
		let leader_credential = credential(&key, "tok-leader");
		let leader = inner.coordinator.ensure_fresh(&key, move || async move {
			let _ = released.wait_for(|done| *done).await;

			Ok(leader_credential)
		});

		// The leader already stored its result but its flight is still registered.
		inner.cache.put(&key, credential(&key, "tok-leader"));

		let joiner = inner.refresh(&key);

		assert!(joiner.joined());

		release.send(true).expect("Leader should still be waiting.");

		let (lhs, rhs) = tokio::join!(leader, joiner);

		assert_eq!(
			lhs.expect("Leader should succeed.").token().expose(),
			rhs.expect("Joiner should share the result.").token().expose()
		);

		let entry = inner.cache.get(&key).expect("Leader credential should stay cached.");

		assert!(!entry.is_refreshing());
		assert_eq!(broker.state(&key), CredentialState::Fresh);

		let later = OffsetDateTime::now_utc() + Duration::minutes(2);

		assert_eq!(inner.cache.evict_idle_at(Duration::minutes(1), later), 1);
	}
}
