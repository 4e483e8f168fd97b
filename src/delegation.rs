//! Delegation engines: turn a source credential plus an identity descriptor into a derived,
//! short-lived credential.

mod endpoint;
mod engine;
mod strategy;

pub use endpoint::*;
pub use engine::*;
pub use strategy::*;

// self
use crate::{
	_prelude::*,
	auth::{Credential, IdentityDescriptor},
	error::{ErrorKind, TransportError},
	source::{SourceCredential, SourceError},
};

/// Boxed future returned by [`DelegationEngine::delegate`].
pub type DelegationFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, DelegationError>> + 'a + Send>>;

/// Exchanges a source credential for a credential scoped to a target identity.
///
/// Engines never retry; the broker owns retry policy. Implementations should call
/// [`validate_descriptor`] before performing any I/O.
pub trait DelegationEngine
where
	Self: Send + Sync,
{
	/// Performs one delegation attempt.
	fn delegate<'a>(
		&'a self,
		source: &'a SourceCredential,
		descriptor: &'a IdentityDescriptor,
	) -> DelegationFuture<'a>;
}
impl<E> DelegationEngine for Arc<E>
where
	E: ?Sized + DelegationEngine,
{
	fn delegate<'a>(
		&'a self,
		source: &'a SourceCredential,
		descriptor: &'a IdentityDescriptor,
	) -> DelegationFuture<'a> {
		(**self).delegate(source, descriptor)
	}
}

/// Failures produced by a single delegation attempt.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DelegationError {
	/// The request is malformed; retrying cannot help.
	#[error("Delegation request is invalid: {reason}.")]
	RequestInvalid {
		/// What was wrong with the request.
		reason: String,
	},
	/// The trust broker refused to let the source act as the target.
	#[error("Delegation was denied: {reason}.")]
	Denied {
		/// Broker-provided reason.
		reason: String,
		/// HTTP status code, if available.
		status: Option<u16>,
	},
	/// Transient network or service failure.
	#[error("Delegation upstream is unavailable: {message}.")]
	UpstreamUnavailable {
		/// Failure description.
		message: String,
		/// HTTP status code, if available.
		status: Option<u16>,
		/// Retry-After hint, if available.
		retry_after: Option<Duration>,
	},
	/// The source credential could not be obtained.
	#[error("Source credential is unavailable.")]
	Source(#[from] SourceError),
}
impl DelegationError {
	/// Shorthand for [`DelegationError::RequestInvalid`].
	pub fn invalid(reason: impl Into<String>) -> Self {
		Self::RequestInvalid { reason: reason.into() }
	}

	/// Shorthand for an [`DelegationError::UpstreamUnavailable`] without HTTP metadata.
	pub fn unavailable(message: impl Into<String>) -> Self {
		Self::UpstreamUnavailable { message: message.into(), status: None, retry_after: None }
	}

	/// Broker-facing error kind.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::RequestInvalid { .. } => ErrorKind::DelegationRequestInvalid,
			Self::Denied { .. } => ErrorKind::DelegationDenied,
			Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
			Self::Source(_) => ErrorKind::SourceUnavailable,
		}
	}

	/// Only upstream unavailability is worth retrying.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::UpstreamUnavailable { .. })
	}

	/// Retry-After hint, if the upstream supplied one.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::UpstreamUnavailable { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}
impl From<TransportError> for DelegationError {
	fn from(e: TransportError) -> Self {
		if !e.is_retryable() {
			return Self::invalid(e.to_string());
		}

		Self::UpstreamUnavailable {
			status: e.status(),
			retry_after: e.retry_after(),
			message: e.to_string(),
		}
	}
}

/// Rejects descriptors no engine could satisfy: an empty principal, a non-positive lifetime, or
/// an empty scope set.
pub fn validate_descriptor(descriptor: &IdentityDescriptor) -> Result<(), DelegationError> {
	if descriptor.principal().trim().is_empty() {
		return Err(DelegationError::invalid("principal is empty"));
	}
	if !descriptor.lifetime().is_positive() {
		return Err(DelegationError::invalid("lifetime must be positive"));
	}
	if descriptor.scopes().is_empty() {
		return Err(DelegationError::invalid("scope set is empty"));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{PrincipalId, ScopeSet};

	fn descriptor(scopes: &[&str], lifetime_secs: i64) -> IdentityDescriptor {
		IdentityDescriptor::with_lifetime_secs(
			PrincipalId::new("svc-a@x").expect("Principal fixture should be valid."),
			ScopeSet::new(scopes.iter().copied()).expect("Scope fixture should be valid."),
			lifetime_secs,
		)
	}

	#[test]
	fn validation_rejects_unsatisfiable_descriptors() {
		assert!(validate_descriptor(&descriptor(&["scope1"], 3600)).is_ok());
		assert_eq!(
			validate_descriptor(&descriptor(&[], 3600)),
			Err(DelegationError::invalid("scope set is empty"))
		);
		assert_eq!(
			validate_descriptor(&descriptor(&["scope1"], 0)),
			Err(DelegationError::invalid("lifetime must be positive"))
		);
		assert!(validate_descriptor(&descriptor(&["scope1"], -5)).is_err());
	}

	#[test]
	fn kinds_and_retryability() {
		let transient = DelegationError::UpstreamUnavailable {
			message: "busy".into(),
			status: Some(503),
			retry_after: Some(Duration::seconds(3)),
		};

		assert_eq!(transient.kind(), ErrorKind::UpstreamUnavailable);
		assert!(transient.is_retryable());
		assert_eq!(transient.retry_after(), Some(Duration::seconds(3)));
		assert_eq!(
			DelegationError::Denied { reason: "no".into(), status: Some(403) }.kind(),
			ErrorKind::DelegationDenied
		);
		assert!(!DelegationError::invalid("bad").is_retryable());

		let source: DelegationError =
			SourceError::MissingEnvironment { variable: "TOKEN".into() }.into();

		assert_eq!(source.kind(), ErrorKind::SourceUnavailable);
		assert!(!source.is_retryable());
	}

	#[test]
	fn transport_failures_map_by_retryability() {
		let network: DelegationError = TransportError::Network {
			endpoint: "delegation",
			message: "reset".into(),
			status: None,
			retry_after: None,
		}
		.into();
		let request: DelegationError =
			TransportError::Request { endpoint: "delegation", message: "bad uri".into() }.into();

		assert!(network.is_retryable());
		assert_eq!(request.kind(), ErrorKind::DelegationRequestInvalid);
	}
}
