// self
use crate::{
	_prelude::*,
	auth::{SourceId, TokenSecret},
	source::{CredentialSource, SourceCredential, SourceError, SourceFuture},
};

/// Long-lived key or token supplied directly by the caller.
#[derive(Clone, Debug)]
pub struct StaticSource {
	id: SourceId,
	token: TokenSecret,
	expires_at: Option<OffsetDateTime>,
}
impl StaticSource {
	/// Creates a source that always yields `token`.
	pub fn new(id: SourceId, token: impl AsRef<str>) -> Self {
		Self { id, token: TokenSecret::new(token), expires_at: None }
	}

	/// Declares when the supplied token stops being valid.
	pub fn with_expiry(mut self, expires_at: OffsetDateTime) -> Self {
		self.expires_at = Some(expires_at);

		self
	}
}
impl CredentialSource for StaticSource {
	fn id(&self) -> &SourceId {
		&self.id
	}

	fn acquire(&self) -> SourceFuture<'_> {
		Box::pin(async move {
			let mut credential = SourceCredential::new(self.id.clone(), self.token.expose());

			if let Some(expiry) = self.expires_at {
				if OffsetDateTime::now_utc() >= expiry {
					return Err(SourceError::Expired { origin: self.id.clone() });
				}

				credential = credential.with_expiry(expiry);
			}

			Ok(credential)
		})
	}
}
