// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::http::{
	Method, Request,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use url::form_urlencoded::Serializer as FormSerializer;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, SourceId},
	delegation::ExchangeErrorContext,
	error::ConfigError,
	http::{self, TokenHttpClient, TransportErrorMapper},
	source::{CredentialSource, SourceCredential, SourceError, SourceFuture},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

const ENDPOINT: &str = "sts";

/// RFC 8693 token-exchange grant type.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
/// Token type of an OAuth 2.0 access token.
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
/// Token type of a JWT (typical OIDC subject token).
pub const JWT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";

#[derive(Debug, Deserialize)]
struct StsTokenResponse {
	access_token: String,
	#[serde(default)]
	expires_in: Option<i64>,
}

/// Security token service the subject token is exchanged at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StsEndpoint {
	token_url: Url,
	audience: String,
	subject_token_type: String,
	requested_token_type: String,
	scopes: ScopeSet,
	client_id: Option<String>,
	client_secret: Option<String>,
}
impl StsEndpoint {
	/// Default token URL of the public STS.
	pub const DEFAULT_TOKEN_URL: &'static str = "https://sts.googleapis.com/v1/token";

	/// Starts a builder for `audience`.
	pub fn builder(audience: impl Into<String>) -> StsEndpointBuilder {
		StsEndpointBuilder {
			audience: audience.into(),
			token_url: None,
			subject_token_type: None,
			requested_token_type: None,
			scopes: ScopeSet::default(),
			client_id: None,
			client_secret: None,
		}
	}

	/// Token endpoint.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	/// Audience the exchanged token is requested for.
	pub fn audience(&self) -> &str {
		&self.audience
	}

	fn form(&self, subject_token: &str) -> String {
		let mut form = FormSerializer::new(String::new());

		form.append_pair("grant_type", TOKEN_EXCHANGE_GRANT_TYPE)
			.append_pair("audience", &self.audience)
			.append_pair("requested_token_type", &self.requested_token_type)
			.append_pair("subject_token", subject_token)
			.append_pair("subject_token_type", &self.subject_token_type);

		if let Some(scope) = self.scopes.join(' ') {
			form.append_pair("scope", &scope);
		}

		form.finish()
	}

	fn basic_auth(&self) -> Option<String> {
		let client_id = self.client_id.as_deref()?;
		let secret = self.client_secret.as_deref().unwrap_or_default();

		Some(format!("Basic {}", STANDARD.encode(format!("{client_id}:{secret}"))))
	}
}

/// Builder for [`StsEndpoint`].
#[derive(Clone, Debug)]
pub struct StsEndpointBuilder {
	audience: String,
	token_url: Option<String>,
	subject_token_type: Option<String>,
	requested_token_type: Option<String>,
	scopes: ScopeSet,
	client_id: Option<String>,
	client_secret: Option<String>,
}
impl StsEndpointBuilder {
	/// Overrides the token URL (defaults to [`StsEndpoint::DEFAULT_TOKEN_URL`]).
	pub fn token_url(mut self, url: impl Into<String>) -> Self {
		self.token_url = Some(url.into());

		self
	}

	/// Overrides the subject token type (defaults to [`JWT_TOKEN_TYPE`]).
	pub fn subject_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.subject_token_type = Some(token_type.into());

		self
	}

	/// Overrides the requested token type (defaults to [`ACCESS_TOKEN_TYPE`]).
	pub fn requested_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.requested_token_type = Some(token_type.into());

		self
	}

	/// Scopes requested for the exchanged token.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Authenticates the exchange with HTTP Basic client credentials.
	pub fn client_credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		self.client_id = Some(client_id.into());
		self.client_secret = Some(client_secret.into());

		self
	}

	/// Validates the settings and produces the endpoint.
	pub fn build(self) -> Result<StsEndpoint, ConfigError> {
		if self.audience.trim().is_empty() {
			return Err(ConfigError::MissingSetting { field: "audience" });
		}

		let token_url = http::parse_endpoint(
			ENDPOINT,
			self.token_url.as_deref().unwrap_or(StsEndpoint::DEFAULT_TOKEN_URL),
		)?;

		Ok(StsEndpoint {
			token_url,
			audience: self.audience,
			subject_token_type: self.subject_token_type.unwrap_or_else(|| JWT_TOKEN_TYPE.into()),
			requested_token_type: self
				.requested_token_type
				.unwrap_or_else(|| ACCESS_TOKEN_TYPE.into()),
			scopes: self.scopes,
			client_id: self.client_id,
			client_secret: self.client_secret,
		})
	}
}

/// Exchanges a subject token obtained from another source at an STS (workload identity
/// federation).
pub struct FederatedSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	id: SourceId,
	endpoint: StsEndpoint,
	subject: Arc<dyn CredentialSource>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> FederatedSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a source backed by a caller-supplied transport and error mapper.
	pub fn with_http_client(
		id: SourceId,
		endpoint: StsEndpoint,
		subject: Arc<dyn CredentialSource>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			id,
			endpoint,
			subject,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		}
	}

	async fn exchange(&self) -> Result<SourceCredential, SourceError> {
		let subject = self.subject.acquire().await?;
		let mut builder = Request::builder()
			.method(Method::POST)
			.uri(self.endpoint.token_url.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json");

		if let Some(authorization) = self.endpoint.basic_auth() {
			builder = builder.header(AUTHORIZATION, authorization);
		}

		let request = builder
			.body(self.endpoint.form(subject.token().expose()).into_bytes())
			.map_err(|e| SourceError::Format { message: e.to_string() })?;
		let issued_at = OffsetDateTime::now_utc();
		let (response, _meta) =
			http::send(self.http_client.as_ref(), self.error_mapper.as_ref(), ENDPOINT, request)
				.await?;
		let status = response.status();

		if !status.is_success() {
			let ctx = ExchangeErrorContext::from_response(status.as_u16(), response.body());

			return Err(SourceError::Exchange {
				status: Some(status.as_u16()),
				message: ctx.summary(),
			});
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let parsed: StsTokenResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| SourceError::Format { message: format!("STS response: {e}") })?;

		if parsed.access_token.is_empty() {
			return Err(SourceError::Format { message: "STS returned an empty token".into() });
		}

		let mut credential = SourceCredential::new(self.id.clone(), &parsed.access_token);

		if let Some(secs) = parsed.expires_in.filter(|secs| *secs > 0) {
			credential = credential.with_expires_in(issued_at, Duration::seconds(secs))?;
		}

		Ok(credential)
	}
}
#[cfg(feature = "reqwest")]
impl FederatedSource<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a source backed by the default reqwest transport.
	pub fn new(id: SourceId, endpoint: StsEndpoint, subject: Arc<dyn CredentialSource>) -> Self {
		Self::with_http_client(
			id,
			endpoint,
			subject,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> CredentialSource for FederatedSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn id(&self) -> &SourceId {
		&self.id
	}

	fn acquire(&self) -> SourceFuture<'_> {
		Box::pin(self.exchange())
	}
}
impl<C, M> Debug for FederatedSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FederatedSource")
			.field("id", &self.id)
			.field("audience", &self.endpoint.audience)
			.field("token_url", &self.endpoint.token_url.as_str())
			.finish()
	}
}
