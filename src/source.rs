//! Credential sources: where the broker's base credential comes from.
//!
//! A [`CredentialSource`] produces a [`SourceCredential`] on demand and never retries on its
//! own; retry policy belongs to the broker. Every failure is reported as a [`SourceError`],
//! which the broker surfaces as [`ErrorKind::SourceUnavailable`].

mod cached;
mod client_credentials;
mod environment;
mod federated;
mod file;
mod static_token;

pub use cached::*;
pub use client_credentials::*;
pub use environment::*;
pub use federated::*;
pub use file::*;
pub use static_token::*;

// self
use crate::{
	_prelude::*,
	auth::{SourceId, TokenSecret},
	error::{ErrorKind, TransportError},
};

/// Boxed future returned by [`CredentialSource::acquire`].
pub type SourceFuture<'a> =
	Pin<Box<dyn Future<Output = Result<SourceCredential, SourceError>> + 'a + Send>>;

/// Acquires the base credential that delegation is performed with.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Label identifying the origin (surfaced in logs and on the produced credential).
	fn id(&self) -> &SourceId;

	/// Obtains a base credential.
	fn acquire(&self) -> SourceFuture<'_>;
}
impl<S> CredentialSource for Arc<S>
where
	S: ?Sized + CredentialSource,
{
	fn id(&self) -> &SourceId {
		(**self).id()
	}

	fn acquire(&self) -> SourceFuture<'_> {
		(**self).acquire()
	}
}

/// Base credential handed to a delegation engine.
#[derive(Clone)]
pub struct SourceCredential {
	origin: SourceId,
	token: TokenSecret,
	expires_at: Option<OffsetDateTime>,
}
impl SourceCredential {
	/// Creates a credential without a known expiry.
	pub fn new(origin: SourceId, token: impl AsRef<str>) -> Self {
		Self { origin, token: TokenSecret::new(token), expires_at: None }
	}

	/// Attaches an absolute expiry.
	pub fn with_expiry(mut self, expires_at: OffsetDateTime) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Attaches an expiry reported relative to `issued_at`, rejecting values that overflow the
	/// representable time range.
	pub fn with_expires_in(
		self,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Result<Self, SourceError> {
		let expires_at = issued_at.checked_add(expires_in).ok_or_else(|| SourceError::Format {
			message: format!("expires_in of {}s is out of range", expires_in.whole_seconds()),
		})?;

		Ok(self.with_expiry(expires_at))
	}

	/// Origin label.
	pub fn origin(&self) -> &SourceId {
		&self.origin
	}

	/// Opaque token; callers must avoid logging it.
	pub fn token(&self) -> &TokenSecret {
		&self.token
	}

	/// Expiry instant, when the origin reports one.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns `true` once the expiry (if any) has passed at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expiry| instant >= expiry)
	}

	/// Returns `true` when the credential expires at or before `instant + margin`.
	///
	/// Credentials without an expiry never report as expiring.
	pub fn expires_within(&self, margin: Duration, instant: OffsetDateTime) -> bool {
		self.expires_at
			.is_some_and(|expiry| instant.checked_add(margin).is_none_or(|limit| expiry <= limit))
	}
}
impl Debug for SourceCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SourceCredential")
			.field("origin", &self.origin)
			.field("token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Failures raised while acquiring a base credential.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SourceError {
	/// A statically configured credential is past its expiry.
	#[error("Source credential `{origin}` has expired.")]
	Expired {
		/// Origin label.
		origin: SourceId,
	},
	/// The ambient environment variable is missing or empty.
	#[error("Environment variable `{variable}` is not set.")]
	MissingEnvironment {
		/// Variable name.
		variable: String,
	},
	/// A credential file could not be read.
	#[error("Credential file `{path}` could not be read: {message}.")]
	Io {
		/// File path.
		path: String,
		/// IO error description.
		message: String,
	},
	/// Credential content did not match the expected format.
	#[error("Credential content is malformed: {message}.")]
	Format {
		/// What was wrong with the content.
		message: String,
	},
	/// The issuing endpoint rejected the source's own authentication.
	#[error("Source endpoint rejected the request: {reason}.")]
	Rejected {
		/// Endpoint-provided reason.
		reason: String,
		/// HTTP status code, if available.
		status: Option<u16>,
	},
	/// A token exchange returned a non-success response.
	#[error("Token exchange failed: {message}.")]
	Exchange {
		/// HTTP status code, if available.
		status: Option<u16>,
		/// Error description extracted from the response.
		message: String,
	},
	/// The transport failed before a response was received.
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl SourceError {
	/// Every source failure surfaces as [`ErrorKind::SourceUnavailable`].
	pub fn kind(&self) -> ErrorKind {
		ErrorKind::SourceUnavailable
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn expiry_checks_ignore_missing_expiry() {
		let origin = SourceId::new("env").expect("Source fixture should be valid.");
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let unbounded = SourceCredential::new(origin.clone(), "base");
		let bounded = SourceCredential::new(origin, "base").with_expiry(now + Duration::seconds(30));

		assert!(!unbounded.is_expired_at(now));
		assert!(!unbounded.expires_within(Duration::hours(24), now));
		assert!(bounded.expires_within(Duration::minutes(1), now));
		assert!(!bounded.is_expired_at(now));
		assert!(bounded.is_expired_at(now + Duration::seconds(30)));
	}

	#[test]
	fn relative_expiry_rejects_overflow() {
		let origin = SourceId::new("sts").expect("Source fixture should be valid.");
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let credential = SourceCredential::new(origin.clone(), "base")
			.with_expires_in(now, Duration::hours(1))
			.expect("An hour-long expiry should be accepted.");

		assert_eq!(credential.expires_at(), Some(macros::datetime!(2025-01-01 01:00 UTC)));

		let err = SourceCredential::new(origin, "base")
			.with_expires_in(now, Duration::seconds(9_000_000_000_000_000))
			.expect_err("An out-of-range expiry should be rejected.");

		assert!(matches!(err, SourceError::Format { .. }));
		assert!(credential.expires_within(Duration::MAX, now));
	}

	#[test]
	fn debug_output_redacts_the_token() {
		let credential = SourceCredential::new(
			SourceId::new("static").expect("Source fixture should be valid."),
			"base-secret",
		);

		assert!(!format!("{credential:?}").contains("base-secret"));
		assert_eq!(
			SourceError::MissingEnvironment { variable: "X".into() }.kind(),
			ErrorKind::SourceUnavailable
		);
	}
}
