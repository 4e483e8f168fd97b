//! Identity descriptors: what a consumer asks the broker for.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, ScopeSet},
};

/// Granularity used to collapse nearby lifetimes onto one cache key.
pub const LIFETIME_BUCKET: Duration = Duration::minutes(5);

/// Immutable request for a delegated credential.
///
/// Equality and hashing cover the principal, the normalized scopes, and the lifetime bucket, so
/// two requests differing only by a few seconds of requested lifetime share cached credentials.
/// The exact lifetime is still what gets sent upstream.
#[derive(Clone)]
pub struct IdentityDescriptor {
	principal: PrincipalId,
	scopes: ScopeSet,
	lifetime: Duration,
}
impl IdentityDescriptor {
	/// Creates a descriptor. Validation of the lifetime and scopes is deferred to the engine.
	pub fn new(principal: PrincipalId, scopes: ScopeSet, lifetime: Duration) -> Self {
		Self { principal, scopes, lifetime }
	}

	/// Convenience constructor taking the lifetime in whole seconds.
	pub fn with_lifetime_secs(principal: PrincipalId, scopes: ScopeSet, lifetime_secs: i64) -> Self {
		Self::new(principal, scopes, Duration::seconds(lifetime_secs))
	}

	/// Target principal.
	pub fn principal(&self) -> &PrincipalId {
		&self.principal
	}

	/// Requested scopes.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Requested lifetime.
	pub fn lifetime(&self) -> Duration {
		self.lifetime
	}

	/// Lifetime rounded up to [`LIFETIME_BUCKET`] steps; non-positive lifetimes land in bucket 0.
	pub fn lifetime_bucket(&self) -> u64 {
		let secs = u64::try_from(self.lifetime.whole_seconds()).unwrap_or(0);
		let step = LIFETIME_BUCKET.whole_seconds().unsigned_abs();

		secs.div_ceil(step)
	}

	/// Key under which credentials for this descriptor are cached and coordinated.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey {
			principal: self.principal.clone(),
			scope_fingerprint: Arc::from(self.scopes.fingerprint()),
			lifetime_bucket: self.lifetime_bucket(),
		}
	}
}
impl PartialEq for IdentityDescriptor {
	fn eq(&self, other: &Self) -> bool {
		self.principal == other.principal
			&& self.scopes == other.scopes
			&& self.lifetime_bucket() == other.lifetime_bucket()
	}
}
impl Eq for IdentityDescriptor {}
impl Hash for IdentityDescriptor {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.principal.hash(state);
		self.scopes.hash(state);
		self.lifetime_bucket().hash(state);
	}
}
impl Debug for IdentityDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityDescriptor")
			.field("principal", &self.principal)
			.field("scopes", &self.scopes)
			.field("lifetime_secs", &self.lifetime.whole_seconds())
			.finish()
	}
}
impl Display for IdentityDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(
			f,
			"{} [{}] for {}s",
			self.principal,
			self.scopes,
			self.lifetime.whole_seconds()
		)
	}
}

/// Cache and single-flight key derived from an [`IdentityDescriptor`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	/// Target principal.
	pub principal: PrincipalId,
	/// Fingerprint of the normalized scope set.
	pub scope_fingerprint: Arc<str>,
	/// Lifetime bucket (see [`IdentityDescriptor::lifetime_bucket`]).
	pub lifetime_bucket: u64,
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}#{}#{}", self.principal, self.scope_fingerprint, self.lifetime_bucket)
	}
}
