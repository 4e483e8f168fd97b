// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, SourceId},
	error::ConfigError,
	http::{TokenHttpClient, TransportErrorMapper},
	oauth::ClientCredentialsFacade,
	source::{CredentialSource, SourceCredential, SourceFuture},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

/// Base credential minted through the OAuth 2.0 client-credentials grant.
pub struct ClientCredentialsSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	id: SourceId,
	scopes: ScopeSet,
	facade: ClientCredentialsFacade<C, M>,
}
impl<C, M> ClientCredentialsSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a source that authenticates with HTTP Basic client credentials.
	pub fn with_http_client(
		id: SourceId,
		token_url: &str,
		client_id: &str,
		client_secret: &str,
		scopes: ScopeSet,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self, ConfigError> {
		let facade = ClientCredentialsFacade::new(
			token_url,
			client_id,
			Some(client_secret),
			false,
			http_client.into(),
			error_mapper.into(),
		)?;

		Ok(Self { id, scopes, facade })
	}
}
#[cfg(feature = "reqwest")]
impl ClientCredentialsSource<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a source backed by the default reqwest transport.
	pub fn new(
		id: SourceId,
		token_url: &str,
		client_id: &str,
		client_secret: &str,
		scopes: ScopeSet,
	) -> Result<Self, ConfigError> {
		Self::with_http_client(
			id,
			token_url,
			client_id,
			client_secret,
			scopes,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> CredentialSource for ClientCredentialsSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn id(&self) -> &SourceId {
		&self.id
	}

	fn acquire(&self) -> SourceFuture<'_> {
		Box::pin(async move {
			let issued_at = OffsetDateTime::now_utc();
			let issued = self.facade.exchange(&self.scopes).await?;
			let mut credential = SourceCredential::new(self.id.clone(), issued.token.expose());

			if let Some(expires_in) = issued.expires_in {
				credential = credential.with_expires_in(issued_at, expires_in)?;
			}

			Ok(credential)
		})
	}
}
impl<C, M> Debug for ClientCredentialsSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsSource")
			.field("id", &self.id)
			.field("scopes", &self.scopes)
			.finish()
	}
}
