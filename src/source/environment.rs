// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::SourceId,
	source::{CredentialSource, SourceCredential, SourceError, SourceFuture},
};

/// Ambient credential read from an environment variable on every acquisition.
#[derive(Clone, Debug)]
pub struct EnvironmentSource {
	id: SourceId,
	variable: String,
}
impl EnvironmentSource {
	/// Reads the token from `variable`.
	pub fn new(id: SourceId, variable: impl Into<String>) -> Self {
		Self { id, variable: variable.into() }
	}

	/// Environment variable name.
	pub fn variable(&self) -> &str {
		&self.variable
	}
}
impl CredentialSource for EnvironmentSource {
	fn id(&self) -> &SourceId {
		&self.id
	}

	fn acquire(&self) -> SourceFuture<'_> {
		Box::pin(async move {
			let value = env::var(&self.variable).unwrap_or_default();
			let token = value.trim();

			if token.is_empty() {
				return Err(SourceError::MissingEnvironment { variable: self.variable.clone() });
			}

			Ok(SourceCredential::new(self.id.clone(), token))
		})
	}
}
