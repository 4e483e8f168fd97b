//! Immutable delegated credentials and their builder.

// self
use crate::{
	_prelude::*,
	auth::{IdentityDescriptor, TokenSecret},
};

/// Lifecycle status of a credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// The issued-at instant lies in the future (clock skew upstream).
	Pending,
	/// The credential is usable.
	Active,
	/// The expiry instant has passed.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// No token value was provided.
	#[error("Access token is required.")]
	MissingToken,
	/// No expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// The expiry does not come after the issued-at instant.
	#[error("Expiry must be later than the issued-at instant.")]
	ExpiryBeforeIssue,
	/// The relative expiry overflows the representable time range.
	#[error("Expiry is out of range.")]
	ExpiryOutOfRange,
}

/// A derived, short-lived credential issued for one [`IdentityDescriptor`].
///
/// Credentials are never mutated; a refresh yields a new value. Cloning is cheap and is how the
/// cache hands credentials to callers.
#[derive(Clone)]
pub struct Credential {
	descriptor: IdentityDescriptor,
	token: TokenSecret,
	issued_at: OffsetDateTime,
	expires_at: OffsetDateTime,
}
impl Credential {
	/// Returns a builder for the provided descriptor.
	pub fn builder(descriptor: IdentityDescriptor) -> CredentialBuilder {
		CredentialBuilder::new(descriptor)
	}

	/// Descriptor this credential was issued for.
	pub fn descriptor(&self) -> &IdentityDescriptor {
		&self.descriptor
	}

	/// Opaque token; callers must avoid logging it.
	pub fn token(&self) -> &TokenSecret {
		&self.token
	}

	/// Issued-at instant.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Absolute expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Lifecycle status at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		if instant < self.issued_at {
			return CredentialStatus::Pending;
		}
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}

		CredentialStatus::Active
	}

	/// Returns `true` if the credential has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the credential is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Time left before expiry, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Returns `true` when the credential expires at or before `instant + margin`.
	pub fn expires_within(&self, margin: Duration, instant: OffsetDateTime) -> bool {
		instant.checked_add(margin).is_none_or(|limit| self.expires_at <= limit)
	}

	/// Returns `true` when `other` carries the same token and expiry.
	pub fn same_issue(&self, other: &Self) -> bool {
		self.token == other.token && self.expires_at == other.expires_at
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("descriptor", &self.descriptor)
			.field("token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	descriptor: IdentityDescriptor,
	token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(descriptor: IdentityDescriptor) -> Self {
		Self { descriptor, token: None, issued_at: None, expires_at: None, expires_in: None }
	}

	/// Provides the token value.
	pub fn token(mut self, token: impl AsRef<str>) -> Self {
		self.token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets an expiry relative to the issued-at instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let token =
			self.token.filter(|t| !t.is_empty()).ok_or(CredentialBuilderError::MissingToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(CredentialBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(CredentialBuilderError::ExpiryBeforeIssue);
		}

		Ok(Credential { descriptor: self.descriptor, token, issued_at, expires_at })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{PrincipalId, ScopeSet};

	fn descriptor() -> IdentityDescriptor {
		IdentityDescriptor::with_lifetime_secs(
			PrincipalId::new("svc-a@x").expect("Principal fixture should be valid."),
			ScopeSet::new(["scope1"]).expect("Scope fixture should be valid."),
			3600,
		)
	}

	#[test]
	fn status_transitions_cover_all_states() {
		let credential = Credential::builder(descriptor())
			.token("tok1")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Credential builder should succeed.");

		assert_eq!(
			credential.status_at(macros::datetime!(2024-12-31 23:59 UTC)),
			CredentialStatus::Pending
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-01 00:30 UTC)),
			CredentialStatus::Active
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-01 01:00 UTC)),
			CredentialStatus::Expired
		);
	}

	#[test]
	fn margins_and_remaining_time() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let credential = Credential::builder(descriptor())
			.token("tok1")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Relative expiry should build.");
		let now = macros::datetime!(2025-01-01 00:58 UTC);

		assert_eq!(credential.expires_at(), macros::datetime!(2025-01-01 01:00 UTC));
		assert_eq!(credential.remaining_at(now), Duration::minutes(2));
		assert!(credential.expires_within(Duration::minutes(2), now));
		assert!(!credential.expires_within(Duration::minutes(1), now));
		assert_eq!(
			credential.remaining_at(macros::datetime!(2025-01-01 02:00 UTC)),
			Duration::ZERO
		);
	}

	#[test]
	fn builder_rejects_incomplete_input() {
		assert_eq!(
			Credential::builder(descriptor()).expires_in(Duration::hours(1)).build().err(),
			Some(CredentialBuilderError::MissingToken)
		);
		assert_eq!(
			Credential::builder(descriptor()).token("").expires_in(Duration::hours(1)).build().err(),
			Some(CredentialBuilderError::MissingToken)
		);
		assert_eq!(
			Credential::builder(descriptor()).token("tok").build().err(),
			Some(CredentialBuilderError::MissingExpiry)
		);
		assert_eq!(
			Credential::builder(descriptor()).token("tok").expires_in(Duration::ZERO).build().err(),
			Some(CredentialBuilderError::ExpiryBeforeIssue)
		);
		assert_eq!(
			Credential::builder(descriptor())
				.token("tok")
				.expires_in(Duration::MAX)
				.build()
				.err(),
			Some(CredentialBuilderError::ExpiryOutOfRange)
		);
	}

	#[test]
	fn debug_output_redacts_the_token() {
		let credential = Credential::builder(descriptor())
			.token("very-secret")
			.expires_in(Duration::minutes(5))
			.build()
			.expect("Credential builder should succeed.");
		let rendered = format!("{credential:?}");

		assert!(!rendered.contains("very-secret"));
		assert!(rendered.contains("svc-a@x"));
	}
}
