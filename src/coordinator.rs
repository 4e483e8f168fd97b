//! Single-flight refresh coordination.
//!
//! At most one refresh runs per [`CacheKey`]. The refresh is spawned onto the Tokio runtime and
//! shared with every caller that arrives while it runs, so a caller that stops waiting never
//! cancels the work other callers depend on. Must be used from within a Tokio runtime.

// std
use std::{
	sync::atomic::{AtomicU64, Ordering},
	task::{Context, Poll},
};
// crates.io
use futures_util::future::{FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{CacheKey, Credential, IdentityDescriptor},
	delegation::DelegationError,
	error::{BrokerError, ErrorKind},
};

/// Outcome shared by every waiter of a flight.
pub type RefreshResult = Result<Credential, RefreshFailed>;

type SharedRefresh = Shared<Pin<Box<dyn Future<Output = RefreshResult> + Send>>>;
type FlightTable = Arc<Mutex<HashMap<CacheKey, (u64, SharedRefresh)>>>;

/// Failure of a refresh flight, identical for every waiter.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Refresh failed after {attempts} attempt(s).")]
pub struct RefreshFailed {
	#[source]
	cause: DelegationError,
	attempts: u32,
}
impl RefreshFailed {
	/// Wraps the last delegation failure.
	pub fn new(cause: DelegationError, attempts: u32) -> Self {
		Self { cause, attempts }
	}

	/// Last delegation failure.
	pub fn cause(&self) -> &DelegationError {
		&self.cause
	}

	/// Attempts performed by the flight.
	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// Broker-facing error kind.
	pub fn kind(&self) -> ErrorKind {
		self.cause.kind()
	}

	/// Converts into the facade error for `descriptor`.
	pub fn into_broker_error(self, descriptor: &IdentityDescriptor) -> BrokerError {
		BrokerError::new(self.cause.kind(), Some(descriptor.clone()))
			.with_cause(self.cause)
			.with_attempts(self.attempts)
	}
}

/// Handle to an in-flight (or finished) refresh.
#[must_use = "a flight does nothing for the caller unless awaited"]
pub struct Flight {
	shared: SharedRefresh,
	joined: bool,
}
impl Flight {
	/// Returns `true` when this handle joined a refresh started by another caller.
	pub fn joined(&self) -> bool {
		self.joined
	}
}
impl Future for Flight {
	type Output = RefreshResult;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.shared).poll(cx)
	}
}
impl Debug for Flight {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Flight").field("joined", &self.joined).finish()
	}
}

/// Collapses concurrent refreshes per key into one.
#[derive(Default)]
pub struct RefreshCoordinator {
	flights: FlightTable,
	generation: AtomicU64,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Joins the running refresh for `descriptor`'s key, or starts one with `refresh`.
	///
	/// `refresh` is only invoked when no flight is running for the key.
	pub fn ensure_fresh<F, Fut>(&self, descriptor: &IdentityDescriptor, refresh: F) -> Flight
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = RefreshResult>,
	{
		let key = descriptor.cache_key();
		let mut flights = self.flights.lock();

		if let Some((_, shared)) = flights.get(&key) {
			return Flight { shared: shared.clone(), joined: true };
		}

		let generation = self.generation.fetch_add(1, Ordering::Relaxed);
		let guard = FlightGuard { flights: Arc::clone(&self.flights), key: key.clone(), generation };
		let work = refresh();
		// The table lock is still held, so the task cannot finish before its entry exists.
		let handle = tokio::spawn(async move {
			let _guard = guard;

			work.await
		});
		let shared = async move {
			handle.await.unwrap_or_else(|e| {
				Err(RefreshFailed::new(
					DelegationError::unavailable(format!("refresh task did not complete: {e}")),
					0,
				))
			})
		}
		.boxed()
		.shared();

		flights.insert(key, (generation, shared.clone()));

		Flight { shared, joined: false }
	}

	/// Returns `true` while a refresh runs for `descriptor`'s key.
	pub fn in_flight(&self, descriptor: &IdentityDescriptor) -> bool {
		self.flights.lock().contains_key(&descriptor.cache_key())
	}

	/// Number of running refreshes.
	pub fn in_flight_count(&self) -> usize {
		self.flights.lock().len()
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator").field("in_flight", &self.in_flight_count()).finish()
	}
}

// Removes the flight entry when the task ends, including on panic or runtime shutdown.
struct FlightGuard {
	flights: FlightTable,
	key: CacheKey,
	generation: u64,
}
impl Drop for FlightGuard {
	fn drop(&mut self) {
		let mut flights = self.flights.lock();

		if flights.get(&self.key).is_some_and(|(generation, _)| *generation == self.generation) {
			flights.remove(&self.key);
		}
	}
}
