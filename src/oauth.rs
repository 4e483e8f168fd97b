//! OAuth 2.0 client facade used by the client-credentials source.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
	http::{self, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient, TransportErrorMapper},
	source::SourceError,
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const ENDPOINT: &str = "token";

/// Token issued by a client-credentials exchange.
#[derive(Clone, Debug)]
pub(crate) struct IssuedToken {
	pub(crate) token: TokenSecret,
	pub(crate) expires_in: Option<Duration>,
}

pub(crate) struct ClientCredentialsFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> ClientCredentialsFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(
		token_url: &str,
		client_id: &str,
		client_secret: Option<&str>,
		send_credentials_in_body: bool,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self, ConfigError> {
		let token_url = http::parse_endpoint(ENDPOINT, token_url)?;
		let token_url = TokenUrl::from_url(token_url);
		let mut oauth_client =
			BasicClient::new(ClientId::new(client_id.to_owned())).set_token_uri(token_url);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if send_credentials_in_body {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	pub(crate) async fn exchange(&self, scopes: &ScopeSet) -> Result<IssuedToken, SourceError> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in scopes.iter() {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;
		let expires_in = response
			.expires_in()
			.and_then(|value| i64::try_from(value.as_secs()).ok())
			.filter(|secs| *secs > 0)
			.map(Duration::seconds);

		Ok(IssuedToken { token: TokenSecret::new(response.access_token().secret()), expires_in })
	}
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> SourceError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, status),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(ENDPOINT, meta.as_ref(), error).into(),
		RequestTokenError::Parse(error, _body) =>
			SourceError::Format { message: format!("token response could not be parsed: {error}") },
		RequestTokenError::Other(message) => SourceError::Exchange { status, message },
	}
}

fn map_server_response_error(response: BasicErrorResponse, status: Option<u16>) -> SourceError {
	let reason = match response.error_description() {
		Some(description) => description.clone(),
		None => response.error().as_ref().to_string(),
	};

	SourceError::Rejected { reason, status }
}
