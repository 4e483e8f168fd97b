// self
use crate::{
	_prelude::*,
	auth::SourceId,
	source::{CredentialSource, SourceCredential, SourceFuture},
};

/// Memoizes another source's credential until it comes within `margin` of its expiry.
///
/// Concurrent acquisitions are serialized so the wrapped source is called at most once per
/// expiry window. Credentials without an expiry stay memoized until [`CachedSource::clear`].
#[derive(Debug)]
pub struct CachedSource<S> {
	inner: S,
	margin: Duration,
	slot: AsyncMutex<Option<SourceCredential>>,
}
impl<S> CachedSource<S>
where
	S: CredentialSource,
{
	/// Default margin applied before a memoized credential's expiry.
	pub const DEFAULT_MARGIN: Duration = Duration::seconds(60);

	/// Wraps `inner` with the default margin.
	pub fn new(inner: S) -> Self {
		Self { inner, margin: Self::DEFAULT_MARGIN, slot: AsyncMutex::new(None) }
	}

	/// Overrides the margin; negative values clamp to zero.
	pub fn with_margin(mut self, margin: Duration) -> Self {
		self.margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Drops the memoized credential.
	pub async fn clear(&self) {
		self.slot.lock().await.take();
	}

	/// Wrapped source.
	pub fn inner(&self) -> &S {
		&self.inner
	}
}
impl<S> CredentialSource for CachedSource<S>
where
	S: CredentialSource,
{
	fn id(&self) -> &SourceId {
		self.inner.id()
	}

	fn acquire(&self) -> SourceFuture<'_> {
		Box::pin(async move {
			let mut slot = self.slot.lock().await;

			let now = OffsetDateTime::now_utc();

			if let Some(credential) = slot.as_ref().filter(|c| !c.expires_within(self.margin, now)) {
				return Ok(credential.clone());
			}

			let credential = self.inner.acquire().await?;

			*slot = Some(credential.clone());

			Ok(credential)
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::source::SourceError;

	struct CountingSource {
		id: SourceId,
		calls: AtomicUsize,
		lifetime: Duration,
	}
	impl CountingSource {
		fn new(lifetime: Duration) -> Self {
			Self {
				id: SourceId::new("counting").expect("Source fixture should be valid."),
				calls: AtomicUsize::new(0),
				lifetime,
			}
		}
	}
	impl CredentialSource for CountingSource {
		fn id(&self) -> &SourceId {
			&self.id
		}

		fn acquire(&self) -> SourceFuture<'_> {
			Box::pin(async move {
				let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

				if self.lifetime.is_zero() {
					return Err(SourceError::Format { message: format!("call {call}") });
				}

				Ok(SourceCredential::new(self.id.clone(), format!("base-{call}"))
					.with_expiry(OffsetDateTime::now_utc() + self.lifetime))
			})
		}
	}

	#[tokio::test]
	async fn memoizes_until_margin() {
		let long_lived = CachedSource::new(CountingSource::new(Duration::hours(1)));

		for _ in 0..3 {
			let credential = long_lived.acquire().await.expect("Acquire should succeed.");

			assert_eq!(credential.token().expose(), "base-1");
		}

		assert_eq!(long_lived.inner().calls.load(Ordering::SeqCst), 1);

		let short_lived = CachedSource::new(CountingSource::new(Duration::seconds(30)));

		short_lived.acquire().await.expect("First acquire should succeed.");
		short_lived.acquire().await.expect("Second acquire should succeed.");

		assert_eq!(short_lived.inner().calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn failures_are_not_memoized() {
		let source = CachedSource::new(CountingSource::new(Duration::ZERO));

		assert!(source.acquire().await.is_err());
		assert!(source.acquire().await.is_err());
		assert_eq!(source.inner().calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn clear_forces_reacquisition() {
		let source = CachedSource::new(CountingSource::new(Duration::hours(1)));

		source.acquire().await.expect("Acquire should succeed.");
		source.clear().await;

		let credential = source.acquire().await.expect("Acquire should succeed.");

		assert_eq!(credential.token().expose(), "base-2");
	}
}
